//! Status command: repository version, history and what a run would do next

use crate::artifact::{CanonicalName, sha256_file};
use crate::core::context::TapContext;
use crate::core::error::{ResultExt, TapResult};
use crate::release::StateStore;
use crate::release::docs::load_records;
use serde::Serialize;
use std::fs;

/// What a staged file would become on the next run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum StagedState {
  /// Canonical and not yet released
  Ready,
  /// Needs inspection and repacking
  NeedsNormalizing,
  /// Recorded in the latest release; the next run finishes publishing it
  Unfinished { release: String },
  /// Recorded in an older release; the next run archives it
  Released { release: String },
}

/// One file in the staging folder
#[derive(Debug, Clone, Serialize)]
pub struct StagedFile {
  pub file: String,
  #[serde(flatten)]
  pub state: StagedState,
}

/// One history entry
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseStatus {
  pub version: String,
  pub timestamp: Option<String>,
  pub apps: Vec<String>,
}

/// One published definition
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
  pub token: String,
  pub name: String,
  pub version: String,
  pub quarantine: bool,
}

/// Everything `tap-release status` reports
#[derive(Debug, Clone, Serialize)]
pub struct TapStatus {
  pub repository: String,
  pub current_version: String,
  pub pending: Option<String>,
  pub staged: Vec<StagedFile>,
  pub history: Vec<ReleaseStatus>,
  pub apps: Vec<AppStatus>,
}

/// Gather status without changing anything
pub fn collect_status(ctx: &TapContext) -> TapResult<TapStatus> {
  let state = StateStore::new(ctx.state_path()).load()?;

  let mut staged = Vec::new();
  let upload = ctx.upload_dir();
  if upload.exists() {
    let mut entries: Vec<_> = fs::read_dir(&upload)
      .with_context(|| format!("Failed to read {}", upload.display()))?
      .collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
      let file = entry.file_name().to_string_lossy().to_string();
      if file.starts_with('.') || !entry.file_type()?.is_file() {
        continue;
      }
      let state = if CanonicalName::parse(&file).is_none() {
        StagedState::NeedsNormalizing
      } else {
        let checksum = sha256_file(&entry.path())?;
        match state.release_of(&checksum) {
          Some(release) if release.version == state.current_version => StagedState::Unfinished {
            release: release.tag(),
          },
          Some(release) => StagedState::Released {
            release: release.tag(),
          },
          None => StagedState::Ready,
        }
      };
      staged.push(StagedFile { file, state });
    }
  }

  let history = state
    .history
    .iter()
    .rev()
    .map(|entry| ReleaseStatus {
      version: entry.tag(),
      timestamp: entry.timestamp.map(|t| t.to_rfc3339()),
      apps: entry.summary(),
    })
    .collect();

  let apps = load_records(&ctx.casks_dir())?
    .into_iter()
    .map(|r| AppStatus {
      token: r.token,
      name: r.name,
      version: r.version,
      quarantine: r.quarantine,
    })
    .collect();

  Ok(TapStatus {
    repository: ctx.repo_slug.clone(),
    current_version: state.current_version.to_string(),
    pending: state.pending.as_ref().map(|p| p.tag()),
    staged,
    history,
    apps,
  })
}

/// Run the status command
pub fn run_status(ctx: &TapContext, json: bool) -> TapResult<()> {
  let status = collect_status(ctx)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&status)?);
  } else {
    print_status(&status);
  }
  Ok(())
}

fn print_status(status: &TapStatus) {
  println!("\n📊 {} at v{}\n", status.repository, status.current_version);

  if let Some(pending) = &status.pending {
    println!("⚠️  Pending release {} was interrupted; the next run resumes it\n", pending);
  }

  if status.staged.is_empty() {
    println!("Nothing staged.");
  } else {
    println!("{:<40} STATE", "STAGED");
    println!("{:-<70}", "");
    for staged in &status.staged {
      let state = match &staged.state {
        StagedState::Ready => "ready".to_string(),
        StagedState::NeedsNormalizing => "needs repacking".to_string(),
        StagedState::Unfinished { release } => format!("finishes {}", release),
        StagedState::Released { release } => format!("already in {}", release),
      };
      println!("{:<40} {}", staged.file, state);
    }
  }
  println!();

  if !status.apps.is_empty() {
    println!("{:<24} {:<24} {:<12} QUARANTINE", "TOKEN", "NAME", "VERSION");
    println!("{:-<70}", "");
    for app in &status.apps {
      let quarantine = if app.quarantine { "yes" } else { "no" };
      println!("{:<24} {:<24} {:<12} {}", app.token, app.name, app.version, quarantine);
    }
    println!();
  }

  for release in status.history.iter().take(5) {
    let when = release.timestamp.as_deref().unwrap_or("-");
    println!("📦 {} ({})", release.version, when);
    for app in &release.apps {
      println!("   • {}", app);
    }
  }
  if status.history.len() > 5 {
    println!("   ... {} older release(s)", status.history.len() - 5);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::config::TapConfig;
  use crate::release::StateStore;
  use crate::release::plan::ReleasePlan;
  use crate::release::plan::tests::change;
  use crate::release::state::RepositoryState;
  use tempfile::TempDir;

  #[test]
  fn test_status_classifies_staged_files() {
    let dir = TempDir::new().unwrap();
    let ctx = TapContext::new(dir.path().to_path_buf(), TapConfig::default(), "acme/homebrew-tools");
    fs::create_dir_all(ctx.upload_dir()).unwrap();
    fs::write(ctx.upload_dir().join("FineTune-1.0.0.dmg"), b"released").unwrap();
    fs::write(ctx.upload_dir().join("MyTool-2.0.0.dmg"), b"new").unwrap();
    fs::write(ctx.upload_dir().join("my tool.zip"), b"messy").unwrap();
    fs::write(ctx.upload_dir().join(".DS_Store"), b"").unwrap();

    let mut released = change("FineTune", None, "1.0.0");
    released.checksum = sha256_file(&ctx.upload_dir().join("FineTune-1.0.0.dmg")).unwrap();
    let plan = ReleasePlan::resolve(&semver::Version::new(0, 0, 0), false, vec![released]);
    let store = StateStore::new(ctx.state_path());
    store.commit(&RepositoryState::default(), &plan).unwrap();

    let status = collect_status(&ctx).unwrap();
    assert_eq!(status.current_version, "0.1.0");
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.history[0].apps, vec!["**FineTune**: Initial Release (v1.0.0)".to_string()]);

    let states: Vec<(&str, &StagedState)> = status.staged.iter().map(|s| (s.file.as_str(), &s.state)).collect();
    assert_eq!(
      states,
      vec![
        (
          "FineTune-1.0.0.dmg",
          &StagedState::Unfinished {
            release: "v0.1.0".to_string()
          }
        ),
        ("MyTool-2.0.0.dmg", &StagedState::Ready),
        ("my tool.zip", &StagedState::NeedsNormalizing),
      ]
    );

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["staged"][0]["state"], "unfinished");
    assert_eq!(json["staged"][0]["release"], "v0.1.0");
  }
}
