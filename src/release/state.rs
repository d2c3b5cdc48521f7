//! Persisted repository state (`state.json`)
//!
//! Holds the current repository version, the release history and the set of
//! checksums already released. Every write goes through a temp file in the same
//! directory followed by a rename, so a crash leaves either the old or the new
//! file, never a torn one.
//!
//! Legacy state files (`version` plus `history[].updates`) load unchanged and
//! are rewritten in this shape on the next write.

use crate::core::error::{ReleaseError, TapResult};
use crate::release::plan::{BumpClass, PlannedChange, ReleasePlan};
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Everything the tap remembers between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
  #[serde(alias = "version", default = "initial_version")]
  pub current_version: semver::Version,

  #[serde(default)]
  pub released_checksums: BTreeSet<String>,

  #[serde(default)]
  pub history: Vec<HistoryEntry>,

  /// Plan of a run that resolved its version but has not persisted yet
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pending: Option<ReleasePlan>,
}

fn initial_version() -> semver::Version {
  semver::Version::new(0, 0, 0)
}

impl Default for RepositoryState {
  fn default() -> Self {
    Self {
      current_version: initial_version(),
      released_checksums: BTreeSet::new(),
      history: Vec::new(),
      pending: None,
    }
  }
}

/// One repository release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub version: semver::Version,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<DateTime<Utc>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bump: Option<BumpClass>,

  #[serde(default)]
  pub changes: Vec<PlannedChange>,

  /// `Name 1.0.0` lines from legacy state files
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub updates: Vec<String>,
}

impl HistoryEntry {
  pub fn tag(&self) -> String {
    format!("v{}", self.version)
  }

  /// Asset file names of this release
  pub fn assets(&self) -> impl Iterator<Item = &str> {
    self.changes.iter().map(|c| c.asset.as_str())
  }

  /// One line per app, for either history shape
  pub fn summary(&self) -> Vec<String> {
    if self.changes.is_empty() {
      self.updates.clone()
    } else {
      self.changes.iter().map(PlannedChange::summary).collect()
    }
  }

  /// Rebuild the plan this entry was persisted from
  pub fn to_plan(&self, from_version: semver::Version) -> ReleasePlan {
    ReleasePlan {
      bump: self.bump.unwrap_or(BumpClass::Patch),
      from_version,
      version: self.version.clone(),
      changes: self.changes.clone(),
    }
  }
}

impl RepositoryState {
  pub fn is_released(&self, checksum: &str) -> bool {
    self.released_checksums.contains(checksum)
  }

  /// Release an artifact checksum was recorded in
  pub fn release_of(&self, checksum: &str) -> Option<&HistoryEntry> {
    self
      .history
      .iter()
      .rev()
      .find(|e| e.changes.iter().any(|c| c.checksum == checksum))
  }

  /// Version before `version` in history order (0.0.0 for the first release)
  pub fn version_before(&self, version: &semver::Version) -> semver::Version {
    self
      .history
      .iter()
      .take_while(|e| &e.version != version)
      .last()
      .map(|e| e.version.clone())
      .unwrap_or_else(initial_version)
  }

  fn check(&self) -> Result<(), String> {
    if let Some(newer) = self.history.iter().find(|e| e.version > self.current_version) {
      return Err(format!(
        "history entry v{} is newer than currentVersion {}",
        newer.version, self.current_version
      ));
    }
    if let Some(pending) = &self.pending
      && pending.from_version != self.current_version
    {
      return Err(format!(
        "pending release v{} was planned on top of v{}, but currentVersion is {}",
        pending.version, pending.from_version, self.current_version
      ));
    }
    Ok(())
  }
}

/// Reads and writes `state.json`
#[derive(Debug, Clone)]
pub struct StateStore {
  path: PathBuf,
}

impl StateStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the state; a missing file is a fresh repository at 0.0.0
  pub fn load(&self) -> TapResult<RepositoryState> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        log::debug!("no state file at {}, starting at 0.0.0", self.path.display());
        return Ok(RepositoryState::default());
      }
      Err(e) => return Err(self.corruption(format!("unreadable: {}", e))),
    };

    let state: RepositoryState =
      serde_json::from_str(&content).map_err(|e| self.corruption(format!("malformed JSON: {}", e)))?;
    state.check().map_err(|reason| self.corruption(reason))?;
    Ok(state)
  }

  /// Atomically replace the state file
  pub fn save(&self, state: &RepositoryState) -> TapResult<()> {
    let mut json = serde_json::to_string_pretty(state)?;
    json.push('\n');
    write_atomic(&self.path, json.as_bytes())
  }

  /// Record the resolved plan before any definition is written
  pub fn checkpoint(&self, state: &RepositoryState, plan: &ReleasePlan) -> TapResult<RepositoryState> {
    let mut next = state.clone();
    next.pending = Some(plan.clone());
    self.save(&next)?;
    log::info!("checkpointed pending release {}", plan.tag());
    Ok(next)
  }

  /// Fold `plan` into history and advance the current version
  ///
  /// Returns the state unchanged (and `false`) when every checksum in the plan
  /// was already released, so a re-run after a crash never bumps twice.
  pub fn commit(&self, state: &RepositoryState, plan: &ReleasePlan) -> TapResult<(RepositoryState, bool)> {
    if plan.checksums().all(|c| state.is_released(c)) {
      log::info!("{} already recorded, nothing to commit", plan.tag());
      return Ok((state.clone(), false));
    }

    let mut next = state.clone();
    next.current_version = plan.version.clone();
    next.released_checksums.extend(plan.checksums().map(String::from));
    next.history.push(HistoryEntry {
      version: plan.version.clone(),
      timestamp: Some(Utc::now()),
      bump: Some(plan.bump),
      changes: plan.changes.clone(),
      updates: Vec::new(),
    });
    next.pending = None;

    self.save(&next)?;
    Ok((next, true))
  }

  fn corruption(&self, reason: impl Into<String>) -> crate::core::error::TapError {
    ReleaseError::StateCorruption {
      path: self.path.clone(),
      reason: reason.into(),
    }
    .into()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::plan::tests::change;
  use tempfile::TempDir;

  fn store(dir: &TempDir) -> StateStore {
    StateStore::new(dir.path().join("state.json"))
  }

  fn fine_tune_plan(current: (u64, u64, u64)) -> ReleasePlan {
    ReleasePlan::resolve(
      &semver::Version::new(current.0, current.1, current.2),
      false,
      vec![change("FineTune", None, "1.0.0")],
    )
  }

  #[test]
  fn test_missing_file_is_fresh_state() {
    let dir = TempDir::new().unwrap();
    let state = store(&dir).load().unwrap();
    assert_eq!(state.current_version, semver::Version::new(0, 0, 0));
    assert!(state.history.is_empty());
  }

  #[test]
  fn test_legacy_state_loads() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    fs::write(
      store.path(),
      r#"{"version": "0.2.0", "history": [{"version": "0.1.0", "updates": ["FineTune 1.0.0"]}, {"version": "0.2.0", "updates": ["MyTool 1.1.0"]}]}"#,
    )
    .unwrap();

    let state = store.load().unwrap();
    assert_eq!(state.current_version, semver::Version::new(0, 2, 0));
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.history[1].summary(), vec!["MyTool 1.1.0".to_string()]);
    assert!(state.release_of("abc").is_none());
  }

  #[test]
  fn test_malformed_state_is_corruption() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    fs::write(store.path(), "{\"currentVersion\": ").unwrap();

    let err = store.load().unwrap_err();
    assert!(matches!(err.as_release(), Some(ReleaseError::StateCorruption { .. })));
  }

  #[test]
  fn test_inconsistent_history_is_corruption() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    fs::write(
      store.path(),
      r#"{"currentVersion": "0.1.0", "history": [{"version": "0.3.0"}]}"#,
    )
    .unwrap();

    let err = store.load().unwrap_err();
    assert!(err.to_string().contains("newer than currentVersion"));
  }

  #[test]
  fn test_commit_appends_history_entry() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let state = store.load().unwrap();
    let plan = fine_tune_plan((0, 0, 0));

    let state = store.checkpoint(&state, &plan).unwrap();
    assert!(store.load().unwrap().pending.is_some());

    let (state, changed) = store.commit(&state, &plan).unwrap();
    assert!(changed);
    assert_eq!(state.current_version, semver::Version::new(0, 1, 0));
    assert!(state.pending.is_none());
    assert!(state.is_released(&plan.changes[0].checksum));
    assert_eq!(
      state.release_of(&plan.changes[0].checksum).map(|e| e.tag()),
      Some("v0.1.0".to_string())
    );

    assert_eq!(store.load().unwrap(), state);
  }

  #[test]
  fn test_commit_is_noop_when_already_released() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let plan = fine_tune_plan((0, 0, 0));
    let (state, _) = store.commit(&RepositoryState::default(), &plan).unwrap();

    let replay = fine_tune_plan((0, 1, 0));
    let (again, changed) = store.commit(&state, &replay).unwrap();
    assert!(!changed);
    assert_eq!(again, state);
    assert_eq!(again.history.len(), 1);
  }

  #[test]
  fn test_version_before() {
    let mut state = RepositoryState::default();
    for v in ["0.1.0", "0.2.0", "0.2.1"] {
      state.history.push(HistoryEntry {
        version: semver::Version::parse(v).unwrap(),
        timestamp: None,
        bump: None,
        changes: Vec::new(),
        updates: Vec::new(),
      });
    }
    assert_eq!(state.version_before(&semver::Version::new(0, 2, 1)).to_string(), "0.2.0");
    assert_eq!(state.version_before(&semver::Version::new(0, 1, 0)).to_string(), "0.0.0");
  }
}
