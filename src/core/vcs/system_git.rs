//! System git backend - zero dependencies
//!
//! Uses the git executable for the handful of operations a release needs:
//! - remote discovery (repository slug fallback)
//! - staging and committing the tap's generated files
//! - pushing the release branch

use super::Vcs;
use crate::core::error::{GitError, ResultExt, TapError, TapResult};
use crate::utils::path_to_git_format;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git backend using system git (zero crate dependencies)
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,
}

impl SystemGit {
  /// Open a git repository
  ///
  /// This performs ONE subprocess call to get the repository metadata.
  pub fn open(path: &Path) -> TapResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(TapError::Git(GitError::RepoNotFound {
          path: path.to_path_buf(),
        }));
      }
      return Err(TapError::message(format!("Failed to open git repository: {}", stderr)));
    }

    log::debug!("git work tree: {}", String::from_utf8_lossy(&output.stdout).trim());

    Ok(Self {
      repo_path: path.to_path_buf(),
    })
  }

  /// Get the URL of a named remote, if configured
  pub fn remote_url(&self, name: &str) -> TapResult<Option<String>> {
    let output = self
      .git_cmd()
      .args(["remote", "get-url", name])
      .output()
      .context("Failed to read remote URL")?;

    if !output.status.success() {
      return Ok(None);
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(if url.is_empty() { None } else { Some(url) })
  }

  fn run(&self, args: &[&str]) -> TapResult<std::process::Output> {
    log::debug!("git {}", args.join(" "));
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))?;

    if !output.status.success() {
      return Err(TapError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }));
    }

    Ok(output)
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists PATH, HOME and the SSH agent/command variables push needs
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");

    cmd.arg("-C").arg(&self.repo_path);

    // Isolated environment (don't trust global config)
    cmd.env_clear();
    for var in ["PATH", "HOME", "SSH_AUTH_SOCK", "GIT_SSH_COMMAND"] {
      if let Ok(value) = std::env::var(var) {
        cmd.env(var, value);
      }
    }

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false"); // Don't escape non-ASCII

    cmd
  }
}

impl Vcs for SystemGit {
  fn commit_paths(&self, paths: &[PathBuf], message: &str) -> TapResult<bool> {
    // Missing paths would make `git add` fail on the pathspec
    let specs: Vec<String> = paths
      .iter()
      .filter(|p| self.repo_path.join(p).exists())
      .map(|p| path_to_git_format(p))
      .collect();

    if specs.is_empty() {
      return Ok(false);
    }

    let mut add = vec!["add", "-A", "--"];
    add.extend(specs.iter().map(String::as_str));
    self.run(&add)?;

    // `diff --cached --quiet` exits 1 when something is staged
    let mut diff = vec!["diff", "--cached", "--quiet", "--"];
    diff.extend(specs.iter().map(String::as_str));
    let status = self
      .git_cmd()
      .args(&diff)
      .status()
      .context("Failed to inspect staged changes")?;
    if status.success() {
      log::info!("no staged changes under {:?}, skipping commit", specs);
      return Ok(false);
    }

    let mut commit = vec!["commit", "-m", message, "--"];
    commit.extend(specs.iter().map(String::as_str));
    self.run(&commit)?;

    Ok(true)
  }

  fn push(&self, remote: &str, branch: &str) -> TapResult<()> {
    let output = self
      .git_cmd()
      .args(["push", remote, branch])
      .output()
      .context("Failed to push")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(TapError::Git(GitError::PushFailed {
        remote: remote.to_string(),
        branch: branch.to_string(),
        reason: stderr.to_string(),
      }));
    }

    Ok(())
  }
}
