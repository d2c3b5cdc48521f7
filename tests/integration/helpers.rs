//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Stands in for `gh`: releases are files under `releases/`, one asset name per line.
/// `FAKE_GH_FAIL=1` makes every call fail like a flaky network.
const FAKE_GH: &str = r#"#!/bin/sh
here="$(cd "$(dirname "$0")" && pwd)"
dir="$here/releases"
mkdir -p "$dir"
echo "$@" >> "$here/gh.log"
if [ "$FAKE_GH_FAIL" = "1" ]; then
  echo "HTTP 502: Bad Gateway" >&2
  exit 1
fi
case "$1 $2" in
  "release view")
    if [ -f "$dir/$3" ]; then cat "$dir/$3"; else echo "release not found" >&2; exit 1; fi ;;
  "release create")
    : > "$dir/$3" ;;
  "release upload")
    basename "$4" >> "$dir/$3" ;;
  *)
    echo "unexpected gh call: $*" >&2
    exit 2 ;;
esac
"#;

/// A tap repository with a bare origin and a fake release host
pub struct TestTap {
  _root: TempDir,
  pub path: PathBuf,
  pub origin: PathBuf,
  pub bin: PathBuf,
}

impl TestTap {
  /// Create a tap with one pushed commit on `main`
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("tap");
    let origin = root.path().join("origin.git");
    let bin = root.path().join("bin");
    std::fs::create_dir_all(&path)?;
    std::fs::create_dir_all(&bin)?;

    git(root.path(), &["init", "--bare", "--initial-branch=main", "origin.git"])?;

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    git(&path, &["remote", "add", "origin", &origin.to_string_lossy()])?;

    let gh = bin.join("gh");
    std::fs::write(&gh, FAKE_GH)?;
    std::fs::set_permissions(&gh, std::fs::Permissions::from_mode(0o755))?;

    std::fs::write(
      path.join("tap.toml"),
      format!(
        r#"[repository]
slug = "acme/homebrew-tools"

[publish]
gh = "{}"
retries = 1
backoff_ms = 0
"#,
        gh.display()
      ),
    )?;
    std::fs::write(path.join(".gitignore"), "upload/\nuploaded/\n")?;
    std::fs::write(path.join("README.md"), "# homebrew-tools\n")?;
    std::fs::create_dir_all(path.join("upload"))?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial tap"])?;
    git(&path, &["push", "origin", "main"])?;

    Ok(Self {
      _root: root,
      path,
      origin,
      bin,
    })
  }

  /// Put a file into the staging folder
  pub fn stage(&self, name: &str, bytes: &[u8]) -> Result<()> {
    std::fs::write(self.path.join("upload").join(name), bytes)?;
    Ok(())
  }

  /// Check if a file exists
  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }

  /// Read a file
  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }

  /// Parsed state.json
  pub fn state(&self) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&self.read_file("state.json")?)?)
  }

  /// Asset names attached to a release on the fake host
  pub fn release_assets(&self, tag: &str) -> Vec<String> {
    std::fs::read_to_string(self.bin.join("releases").join(tag))
      .map(|s| s.lines().map(String::from).collect())
      .unwrap_or_default()
  }

  /// Every gh invocation, one per line
  pub fn gh_log(&self) -> String {
    std::fs::read_to_string(self.bin.join("gh.log")).unwrap_or_default()
  }

  /// Commit subjects on origin/main, newest first
  pub fn origin_log(&self) -> Result<Vec<String>> {
    let output = Command::new("git")
      .arg("--git-dir")
      .arg(&self.origin)
      .args(["log", "--format=%s", "main"])
      .output()
      .context("Failed to run git log")?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(String::from)
        .collect(),
    )
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run tap-release and return its output whatever the exit status
pub fn run_tap_release_raw(cwd: &Path, args: &[&str], envs: &[(&str, &str)]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_tap-release");

  Command::new(bin)
    .current_dir(cwd)
    .args(args)
    .envs(envs.iter().copied())
    .env_remove("GITHUB_REPOSITORY")
    .output()
    .context("Failed to run tap-release")
}

/// Run tap-release, failing on a non-zero exit
pub fn run_tap_release(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_tap_release_raw(cwd, args, &[])?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "tap-release command failed: tap-release {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}
