//! CLI commands for tap-release
//!
//! - **release**: run the pipeline (default command)
//! - **status**: repository version, history and staged files
//!
//! All commands accept `&TapContext` so the repository is resolved once.

pub mod release;
pub mod status;

pub use release::run_release;
pub use status::run_status;
