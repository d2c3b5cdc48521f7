//! Version control seam for the publish phase
//!
//! The coordinator only needs to commit the tap's generated files and push them.
//! [`SystemGit`] does that through the git executable; tests substitute a recorder.

pub mod system_git;

pub use system_git::SystemGit;

use crate::core::error::TapResult;
use std::path::PathBuf;

/// Commit and push operations used by the release pipeline
pub trait Vcs {
  /// Stage `paths` (relative to the repository root) and commit them.
  ///
  /// Returns `Ok(false)` when the paths carry no changes, so a resumed run
  /// does not create an empty commit.
  fn commit_paths(&self, paths: &[PathBuf], message: &str) -> TapResult<bool>;

  /// Push `branch` to `remote`
  fn push(&self, remote: &str, branch: &str) -> TapResult<()>;
}
