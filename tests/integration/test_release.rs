//! Integration tests for the release pipeline

use crate::helpers::{TestTap, git, run_tap_release, run_tap_release_raw};
use anyhow::Result;

#[test]
fn test_first_release_end_to_end() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;

  let output = run_tap_release(&tap.path, &["--non-interactive"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("v0.0.0 -> v0.1.0 (minor bump)"), "stdout: {}", stdout);
  assert!(stdout.contains("Released v0.1.0"));

  let cask = tap.read_file("Casks/fine-tune.rb")?;
  assert!(cask.starts_with("cask \"fine-tune\" do\n"));
  assert!(cask.contains("  app \"FineTune.app\"\n"));
  assert!(cask.contains("url \"https://github.com/acme/homebrew-tools/releases/download/v0.1.0/FineTune-1.0.0.dmg\""));
  // No signature on test bytes: the quarantine stanza is added
  assert!(cask.contains("com.apple.quarantine"));
  assert!(cask.contains("sudo: true"));

  let state = tap.state()?;
  assert_eq!(state["currentVersion"], "0.1.0");
  assert_eq!(state["history"][0]["changes"][0]["token"], "fine-tune");
  let change = state["history"][0]["changes"][0].as_object().cloned().unwrap_or_default();
  assert_eq!(change.get("fromVersion"), Some(&serde_json::Value::Null));
  assert_eq!(state["releasedChecksums"].as_array().map(Vec::len), Some(1));

  assert_eq!(tap.origin_log()?[0], "Update apps: FineTune (Bump to v0.1.0)");
  assert_eq!(tap.release_assets("v0.1.0"), vec!["FineTune-1.0.0.dmg".to_string()]);
  assert!(tap.gh_log().contains("release create v0.1.0 --title Release v0.1.0"));

  assert!(!tap.file_exists("upload/FineTune-1.0.0.dmg"));
  assert!(tap.file_exists("uploaded/FineTune-1.0.0.dmg"));
  assert!(tap.read_file("APPS.md")?.contains("brew install acme/tools/fine-tune"));

  Ok(())
}

#[test]
fn test_second_run_with_nothing_staged_is_noop() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;
  run_tap_release(&tap.path, &["--non-interactive"])?;

  let state_before = tap.read_file("state.json")?;
  let commits_before = tap.origin_log()?.len();

  let output = run_tap_release(&tap.path, &["--non-interactive"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Nothing staged"));
  assert_eq!(tap.read_file("state.json")?, state_before);
  assert_eq!(tap.origin_log()?.len(), commits_before);

  Ok(())
}

#[test]
fn test_publish_failure_is_resumed() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;

  let failed = run_tap_release_raw(&tap.path, &["--non-interactive"], &[("FAKE_GH_FAIL", "1")])?;
  assert_eq!(failed.status.code(), Some(2));
  let stderr = String::from_utf8_lossy(&failed.stderr);
  assert!(stderr.contains("Publishing failed"), "stderr: {}", stderr);
  assert!(stderr.contains("Re-run tap-release"));

  // Persisted and pushed, but not published or cleaned up
  assert_eq!(tap.state()?["currentVersion"], "0.1.0");
  assert!(tap.file_exists("upload/FineTune-1.0.0.dmg"));
  assert_eq!(tap.origin_log()?[0], "Update apps: FineTune (Bump to v0.1.0)");

  let output = run_tap_release(&tap.path, &["--non-interactive"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Finishing v0.1.0"), "stdout: {}", stdout);

  let state = tap.state()?;
  assert_eq!(state["currentVersion"], "0.1.0");
  assert_eq!(state["history"].as_array().map(Vec::len), Some(1));
  assert_eq!(tap.release_assets("v0.1.0"), vec!["FineTune-1.0.0.dmg".to_string()]);
  assert!(tap.file_exists("uploaded/FineTune-1.0.0.dmg"));
  assert_eq!(tap.origin_log()?.len(), 2);

  Ok(())
}

#[test]
fn test_dry_run_changes_nothing() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;

  let output = run_tap_release(&tap.path, &["--dry-run"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Release plan: v0.0.0 -> v0.1.0"));
  assert!(stdout.contains("+++ b/fine-tune.rb"));

  assert!(!tap.file_exists("Casks"));
  assert!(!tap.file_exists("state.json"));
  assert!(tap.file_exists("upload/FineTune-1.0.0.dmg"));
  assert!(tap.gh_log().is_empty());

  let status = git(&tap.path, &["status", "--porcelain"])?;
  assert_eq!(String::from_utf8_lossy(&status.stdout), "");

  Ok(())
}

#[test]
fn test_release_leaves_clean_worktree() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"fine tune disk image")?;
  run_tap_release(&tap.path, &["--non-interactive"])?;

  let status = git(&tap.path, &["status", "--porcelain"])?;
  assert_eq!(String::from_utf8_lossy(&status.stdout), "");
  assert!(!tap.file_exists(".tap-release.lock"));

  Ok(())
}

#[test]
fn test_major_flag_and_update() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("FineTune-1.0.0.dmg", b"first")?;
  run_tap_release(&tap.path, &["--non-interactive"])?;

  tap.stage("FineTune-1.1.0.dmg", b"second")?;
  run_tap_release(&tap.path, &["--non-interactive"])?;
  assert_eq!(tap.state()?["currentVersion"], "0.1.1");

  tap.stage("FineTune-2.0.0.dmg", b"third")?;
  run_tap_release(&tap.path, &["--non-interactive", "--major"])?;
  assert_eq!(tap.state()?["currentVersion"], "1.0.0");

  let cask = tap.read_file("Casks/fine-tune.rb")?;
  assert!(cask.contains("version \"2.0.0\""));
  assert_eq!(cask.matches("postflight do").count(), 1);
  assert_eq!(tap.origin_log()?[0], "Update apps: FineTune (Bump to v1.0.0)");

  Ok(())
}

#[test]
fn test_unusable_upload_is_skipped() -> Result<()> {
  let tap = TestTap::new()?;
  tap.stage("notes.txt", b"not an app")?;

  let output = run_tap_release(&tap.path, &["--non-interactive"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Skipping notes.txt"));
  assert!(stdout.contains("Nothing new to release"));
  assert!(tap.file_exists("upload/notes.txt"));
  assert!(!tap.file_exists("state.json"));

  Ok(())
}
