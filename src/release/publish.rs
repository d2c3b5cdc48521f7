//! Release hosting: tag, release and asset upload
//!
//! [`ReleaseHost`] is the seam; [`GhCli`] talks to GitHub through the `gh`
//! executable, which owns authentication (`GH_TOKEN` / `GITHUB_TOKEN`).
//! [`publish_release`] is idempotent: an existing release is reused and assets
//! already attached to the tag are skipped, so a resumed run never duplicates
//! anything. Every request is retried with exponential backoff.

use crate::core::error::{ReleaseError, TapError, TapResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Operations consumed from the hosting service
pub trait ReleaseHost {
  /// Asset names attached to `tag`, or `None` when no release exists
  fn release_assets(&self, tag: &str) -> TapResult<Option<Vec<String>>>;

  /// Create the tag and release
  fn create_release(&self, tag: &str, title: &str, notes: &str) -> TapResult<()>;

  /// Attach one file
  fn upload_asset(&self, tag: &str, file: &Path) -> TapResult<()>;
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub backoff: Duration,
}

impl RetryPolicy {
  pub fn new(attempts: u32, backoff_ms: u64) -> Self {
    Self {
      attempts: attempts.max(1),
      backoff: Duration::from_millis(backoff_ms),
    }
  }

  /// Run `op`, retrying failures; the last failure becomes a `PublishFailure`
  pub fn run<T>(&self, operation: &str, mut op: impl FnMut() -> TapResult<T>) -> TapResult<T> {
    let mut delay = self.backoff;
    let mut attempt = 1;
    loop {
      match op() {
        Ok(value) => return Ok(value),
        Err(e) if attempt < self.attempts => {
          log::warn!(
            "{} failed (attempt {}/{}): {}; retrying in {}ms",
            operation,
            attempt,
            self.attempts,
            e,
            delay.as_millis()
          );
          thread::sleep(delay);
          delay *= 2;
          attempt += 1;
        }
        Err(e) => {
          return Err(
            ReleaseError::PublishFailure {
              operation: operation.to_string(),
              reason: e.to_string(),
            }
            .into(),
          );
        }
      }
    }
  }
}

/// What the publish phase sends
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
  pub tag: &'a str,
  pub title: &'a str,
  pub notes: &'a str,
  pub assets: &'a [PathBuf],
}

/// What the publish phase did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
  pub created: bool,
  pub uploaded: Vec<String>,
  pub skipped: Vec<String>,
}

/// Create the release if needed and upload every missing asset
pub fn publish_release(host: &dyn ReleaseHost, request: &PublishRequest<'_>, retry: &RetryPolicy) -> TapResult<PublishReport> {
  let mut report = PublishReport::default();

  let existing = match retry.run("release lookup", || host.release_assets(request.tag))? {
    Some(assets) => {
      println!("   ⏭️  Release {} already exists", request.tag);
      assets
    }
    None => {
      println!("   🚀 Creating release {}...", request.tag);
      retry.run("release creation", || {
        host.create_release(request.tag, request.title, request.notes)
      })?;
      report.created = true;
      Vec::new()
    }
  };

  for asset in request.assets {
    let name = asset_name(asset);
    if existing.iter().any(|a| a == &name) {
      println!("   ⏭️  {} already attached", name);
      report.skipped.push(name);
      continue;
    }

    retry.run(&format!("upload of {}", name), || host.upload_asset(request.tag, asset))?;
    println!("   ✅ Uploaded {}", name);
    report.uploaded.push(name);
  }

  Ok(report)
}

fn asset_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default()
}

/// GitHub releases through the `gh` CLI
pub struct GhCli {
  program: String,
  repo: String,
  target: String,
  work_dir: PathBuf,
}

impl GhCli {
  pub fn new(program: impl Into<String>, repo: impl Into<String>, target: impl Into<String>, work_dir: &Path) -> Self {
    Self {
      program: program.into(),
      repo: repo.into(),
      target: target.into(),
      work_dir: work_dir.to_path_buf(),
    }
  }

  fn gh(&self, args: &[&str]) -> TapResult<std::process::Output> {
    log::debug!("{} {}", self.program, args.join(" "));
    Command::new(&self.program)
      .current_dir(&self.work_dir)
      .args(args)
      .args(["--repo", &self.repo])
      .output()
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          TapError::with_help(
            format!("Release CLI '{}' not found", self.program),
            "Install the GitHub CLI (https://cli.github.com) or set [publish] gh in tap.toml.",
          )
        } else {
          TapError::message(format!("Failed to run {}: {}", self.program, e))
        }
      })
  }

  fn check(&self, what: &str, output: std::process::Output) -> TapResult<std::process::Output> {
    if output.status.success() {
      return Ok(output);
    }
    Err(TapError::message(format!(
      "{} {} failed: {}",
      self.program,
      what,
      String::from_utf8_lossy(&output.stderr).trim()
    )))
  }
}

impl ReleaseHost for GhCli {
  fn release_assets(&self, tag: &str) -> TapResult<Option<Vec<String>>> {
    let output = self.gh(&["release", "view", tag, "--json", "assets", "--jq", ".assets[].name"])?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not found") {
        return Ok(None);
      }
      return Err(TapError::message(format!(
        "{} release view failed: {}",
        self.program,
        stderr.trim()
      )));
    }

    let names = String::from_utf8(output.stdout)?
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(String::from)
      .collect();
    Ok(Some(names))
  }

  fn create_release(&self, tag: &str, title: &str, notes: &str) -> TapResult<()> {
    let output = self.gh(&[
      "release",
      "create",
      tag,
      "--title",
      title,
      "--notes",
      notes,
      "--target",
      &self.target,
    ])?;
    self.check("release create", output).map(|_| ())
  }

  fn upload_asset(&self, tag: &str, file: &Path) -> TapResult<()> {
    let file = file.to_string_lossy();
    let output = self.gh(&["release", "upload", tag, &file])?;
    self.check("release upload", output).map(|_| ())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::cell::{Cell, RefCell};

  /// In-memory host; `failures` makes the next N requests fail
  #[derive(Default)]
  pub(crate) struct FakeHost {
    pub releases: RefCell<Vec<(String, String, Vec<String>)>>,
    pub failures: Cell<u32>,
    pub calls: Cell<u32>,
  }

  impl FakeHost {
    fn trip(&self) -> TapResult<()> {
      self.calls.set(self.calls.get() + 1);
      if self.failures.get() > 0 {
        self.failures.set(self.failures.get() - 1);
        return Err(TapError::message("HTTP 502"));
      }
      Ok(())
    }

    pub(crate) fn assets(&self, tag: &str) -> Vec<String> {
      self
        .releases
        .borrow()
        .iter()
        .find(|(t, _, _)| t == tag)
        .map(|(_, _, a)| a.clone())
        .unwrap_or_default()
    }

    pub(crate) fn notes(&self, tag: &str) -> Option<String> {
      self
        .releases
        .borrow()
        .iter()
        .find(|(t, _, _)| t == tag)
        .map(|(_, n, _)| n.clone())
    }
  }

  impl ReleaseHost for FakeHost {
    fn release_assets(&self, tag: &str) -> TapResult<Option<Vec<String>>> {
      self.trip()?;
      Ok(
        self
          .releases
          .borrow()
          .iter()
          .find(|(t, _, _)| t == tag)
          .map(|(_, _, a)| a.clone()),
      )
    }

    fn create_release(&self, tag: &str, _title: &str, notes: &str) -> TapResult<()> {
      self.trip()?;
      self
        .releases
        .borrow_mut()
        .push((tag.to_string(), notes.to_string(), Vec::new()));
      Ok(())
    }

    fn upload_asset(&self, tag: &str, file: &Path) -> TapResult<()> {
      self.trip()?;
      let mut releases = self.releases.borrow_mut();
      let release = releases
        .iter_mut()
        .find(|(t, _, _)| t == tag)
        .ok_or_else(|| TapError::message("release not found"))?;
      release.2.push(asset_name(file));
      Ok(())
    }
  }

  fn no_wait(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, 0)
  }

  fn request<'a>(assets: &'a [PathBuf]) -> PublishRequest<'a> {
    PublishRequest {
      tag: "v0.1.0",
      title: "Release v0.1.0",
      notes: "## Updates\n",
      assets,
    }
  }

  #[test]
  fn test_retry_recovers_from_transient_failure() {
    let host = FakeHost::default();
    host.failures.set(2);
    let assets = vec![PathBuf::from("/tmp/FineTune-1.0.0.dmg")];

    let report = publish_release(&host, &request(&assets), &no_wait(3)).unwrap();
    assert!(report.created);
    assert_eq!(report.uploaded, vec!["FineTune-1.0.0.dmg".to_string()]);
  }

  #[test]
  fn test_retry_exhaustion_is_publish_failure() {
    let host = FakeHost::default();
    host.failures.set(5);
    let assets = vec![PathBuf::from("/tmp/FineTune-1.0.0.dmg")];

    let err = publish_release(&host, &request(&assets), &no_wait(2)).unwrap_err();
    assert!(matches!(
      err.as_release(),
      Some(ReleaseError::PublishFailure { operation, .. }) if operation == "release lookup"
    ));
    assert_eq!(host.calls.get(), 2);
  }

  #[test]
  fn test_existing_assets_are_skipped() {
    let host = FakeHost::default();
    host.releases.borrow_mut().push((
      "v0.1.0".to_string(),
      String::new(),
      vec!["FineTune-1.0.0.dmg".to_string()],
    ));
    let assets = vec![
      PathBuf::from("/tmp/FineTune-1.0.0.dmg"),
      PathBuf::from("/tmp/MyTool-1.1.0.dmg"),
    ];

    let report = publish_release(&host, &request(&assets), &no_wait(1)).unwrap();
    assert!(!report.created);
    assert_eq!(report.skipped, vec!["FineTune-1.0.0.dmg".to_string()]);
    assert_eq!(report.uploaded, vec!["MyTool-1.1.0.dmg".to_string()]);
    assert_eq!(host.assets("v0.1.0").len(), 2);
  }

  #[test]
  fn test_zero_attempts_still_tries_once() {
    let policy = RetryPolicy::new(0, 0);
    assert_eq!(policy.attempts, 1);
  }
}
