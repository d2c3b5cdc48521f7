//! Integration tests driving the tap-release binary against a scratch tap
//! repository with a bare `origin` and a stub `gh`.

#![cfg(unix)]

mod helpers;
mod test_release;
mod test_status;
