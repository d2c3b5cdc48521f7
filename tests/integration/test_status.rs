//! Integration tests for `tap-release status`

use crate::helpers::{TestTap, run_tap_release, run_tap_release_raw};
use anyhow::Result;

#[test]
fn test_status_on_fresh_tap() -> Result<()> {
  let tap = TestTap::new()?;

  let output = run_tap_release(&tap.path, &["status"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("acme/homebrew-tools at v0.0.0"));
  assert!(stdout.contains("Nothing staged"));

  Ok(())
}

#[test]
fn test_status_json_after_release() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;
  run_tap_release(&tap.path, &["--non-interactive"])?;
  tap.stage("MyTool-1.0.0.dmg", b"my tool")?;

  let output = run_tap_release(&tap.path, &["status", "--json"])?;
  let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;

  assert_eq!(status["current_version"], "0.1.0");
  assert_eq!(status["apps"][0]["token"], "fine-tune");
  assert_eq!(status["apps"][0]["quarantine"], true);
  assert_eq!(status["staged"][0]["file"], "MyTool-1.0.0.dmg");
  assert_eq!(status["staged"][0]["state"], "ready");
  assert_eq!(status["history"][0]["version"], "v0.1.0");

  Ok(())
}

#[test]
fn test_corrupt_state_is_fatal() -> Result<()> {
  let tap = TestTap::new()?;
  std::fs::write(tap.path.join("state.json"), "{ not json")?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;

  let output = run_tap_release_raw(&tap.path, &["--non-interactive"], &[])?;
  assert_eq!(output.status.code(), Some(4));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("is corrupt"));
  assert!(tap.file_exists("upload/FineTune-1.0.0.dmg"));
  assert!(!tap.file_exists("Casks"));

  let status = run_tap_release_raw(&tap.path, &["status"], &[])?;
  assert_eq!(status.status.code(), Some(4));

  Ok(())
}

#[test]
fn test_directory_flag() -> Result<()> {
  let tap = TestTap::new()?;
  let parent = tap.path.parent().map(|p| p.to_path_buf()).unwrap_or_default();

  let output = run_tap_release(&parent, &["-C", "tap", "status"])?;
  assert!(String::from_utf8_lossy(&output.stdout).contains("acme/homebrew-tools"));

  Ok(())
}
