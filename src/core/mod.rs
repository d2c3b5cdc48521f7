//! Core building blocks shared by every tap-release command
//!
//! - **config**: tap.toml parsing and validation
//! - **context**: repository context threaded through every phase
//! - **error**: error types with contextual help messages and exit codes
//! - **lock**: single-writer run lock
//! - **vcs**: git commit/push seam (SystemGit)

pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod vcs;
