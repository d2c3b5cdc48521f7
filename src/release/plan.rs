//! Release planning: decide the repository version for a run (Phase 3)
//!
//! One run produces one repository release. Its bump class is the most severe
//! trigger among the inputs, in strict precedence order:
//!
//! 1. `--major` forces a major bump
//! 2. any artifact whose token has no definition yet bumps minor
//! 3. otherwise patch
//!
//! Triggers never accumulate: three new apps are still a single minor bump.

use crate::artifact::PayloadKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version bump class, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpClass {
  /// Only existing records were updated
  Patch,
  /// At least one new record
  Minor,
  /// Forced by the operator
  Major,
}

impl BumpClass {
  /// Apply bump to a semver version
  pub fn apply(&self, version: &semver::Version) -> semver::Version {
    match self {
      BumpClass::Major => semver::Version::new(version.major + 1, 0, 0),
      BumpClass::Minor => semver::Version::new(version.major, version.minor + 1, 0),
      BumpClass::Patch => semver::Version::new(version.major, version.minor, version.patch + 1),
    }
  }
}

impl fmt::Display for BumpClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BumpClass::Major => write!(f, "major"),
      BumpClass::Minor => write!(f, "minor"),
      BumpClass::Patch => write!(f, "patch"),
    }
  }
}

/// One artifact and the record it changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedChange {
  pub token: String,
  pub name: String,

  /// Version in the existing record; `null` creates the record
  #[serde(default)]
  pub from_version: Option<String>,

  pub to_version: String,
  pub checksum: String,

  /// Canonical file name, uploaded as a release asset
  pub asset: String,

  pub payload: PayloadKind,

  /// `.app` stem; kept because a repacked image no longer carries the original name
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bundle_name: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub identifier: Option<String>,
}

impl PlannedChange {
  pub fn is_new(&self) -> bool {
    self.from_version.is_none()
  }

  /// `.app` stem used for the `app` stanza
  pub fn bundle(&self) -> &str {
    self.bundle_name.as_deref().unwrap_or(&self.name)
  }

  /// `**Name**: v1.0.0 -> v1.1.0` / `**Name**: Initial Release (v1.0.0)`
  pub fn summary(&self) -> String {
    match &self.from_version {
      Some(from) => format!("**{}**: v{} -> v{}", self.name, from, self.to_version),
      None => format!("**{}**: Initial Release (v{})", self.name, self.to_version),
    }
  }
}

/// The decision for one run; immutable once resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePlan {
  pub bump: BumpClass,
  pub from_version: semver::Version,
  pub version: semver::Version,
  pub changes: Vec<PlannedChange>,
}

impl ReleasePlan {
  /// Resolve the plan for `changes` on top of `current`
  pub fn resolve(current: &semver::Version, forced_major: bool, changes: Vec<PlannedChange>) -> Self {
    let (bump, version) = VersionResolver::resolve(&changes, forced_major, current);
    Self {
      bump,
      from_version: current.clone(),
      version,
      changes,
    }
  }

  /// Git tag and release name
  pub fn tag(&self) -> String {
    format!("v{}", self.version)
  }

  /// Checksums of every planned asset
  pub fn checksums(&self) -> impl Iterator<Item = &str> {
    self.changes.iter().map(|c| c.checksum.as_str())
  }

  /// Canonical file names of every planned asset
  pub fn assets(&self) -> impl Iterator<Item = &str> {
    self.changes.iter().map(|c| c.asset.as_str())
  }

  /// True when `other` covers exactly the same assets and bytes
  pub fn same_inputs(&self, other: &[PlannedChange]) -> bool {
    let mut mine: Vec<(&str, &str)> = self.changes.iter().map(|c| (c.asset.as_str(), c.checksum.as_str())).collect();
    let mut theirs: Vec<(&str, &str)> = other.iter().map(|c| (c.asset.as_str(), c.checksum.as_str())).collect();
    mine.sort_unstable();
    theirs.sort_unstable();
    mine == theirs
  }
}

/// Computes the single repository version for a run
pub struct VersionResolver;

impl VersionResolver {
  /// Most severe trigger wins; triggers of the same class do not compound
  pub fn classify(changes: &[PlannedChange], forced_major: bool) -> BumpClass {
    if forced_major {
      BumpClass::Major
    } else if changes.iter().any(PlannedChange::is_new) {
      BumpClass::Minor
    } else {
      BumpClass::Patch
    }
  }

  pub fn resolve(
    changes: &[PlannedChange],
    forced_major: bool,
    current: &semver::Version,
  ) -> (BumpClass, semver::Version) {
    let bump = Self::classify(changes, forced_major);
    (bump, bump.apply(current))
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn change(name: &str, from: Option<&str>, to: &str) -> PlannedChange {
    PlannedChange {
      token: crate::artifact::naming::token_for(name),
      name: name.to_string(),
      from_version: from.map(String::from),
      to_version: to.to_string(),
      checksum: format!("{:0>64}", name.len()),
      asset: format!("{}-{}.dmg", name, to),
      payload: PayloadKind::Bundle,
      bundle_name: None,
      identifier: None,
    }
  }

  #[test]
  fn test_bump_apply() {
    let v = semver::Version::new(1, 2, 3);

    assert_eq!(BumpClass::Major.apply(&v).to_string(), "2.0.0");
    assert_eq!(BumpClass::Minor.apply(&v).to_string(), "1.3.0");
    assert_eq!(BumpClass::Patch.apply(&v).to_string(), "1.2.4");
  }

  #[test]
  fn test_bump_ordering() {
    assert!(BumpClass::Major > BumpClass::Minor);
    assert!(BumpClass::Minor > BumpClass::Patch);
  }

  #[test]
  fn test_forced_major_dominates_new_app() {
    let changes = vec![change("FineTune", None, "1.0.0")];
    assert_eq!(VersionResolver::classify(&changes, true), BumpClass::Major);
  }

  #[test]
  fn test_new_app_with_update_is_minor() {
    let changes = vec![change("FineTune", None, "1.0.0"), change("MyTool", Some("1.0.0"), "1.1.0")];
    assert_eq!(VersionResolver::classify(&changes, false), BumpClass::Minor);
  }

  #[test]
  fn test_updates_only_is_patch() {
    let changes = vec![change("MyTool", Some("1.0.0"), "1.1.0")];
    assert_eq!(VersionResolver::classify(&changes, false), BumpClass::Patch);
  }

  #[test]
  fn test_two_new_apps_bump_minor_once() {
    let changes = vec![change("FineTune", None, "1.0.0"), change("Other", None, "2.0.0")];
    let (bump, next) = VersionResolver::resolve(&changes, false, &semver::Version::new(0, 3, 2));
    assert_eq!(bump, BumpClass::Minor);
    assert_eq!(next, semver::Version::new(0, 4, 0));
  }

  #[test]
  fn test_plan_summary_and_tag() {
    let plan = ReleasePlan::resolve(
      &semver::Version::new(0, 1, 0),
      false,
      vec![change("FineTune", None, "1.0.0"), change("MyTool", Some("1.0.0"), "1.1.0")],
    );
    assert_eq!(plan.tag(), "v0.2.0");
    assert_eq!(
      plan.changes.iter().map(PlannedChange::summary).collect::<Vec<_>>(),
      vec![
        "**FineTune**: Initial Release (v1.0.0)".to_string(),
        "**MyTool**: v1.0.0 -> v1.1.0".to_string(),
      ]
    );
  }

  #[test]
  fn test_same_inputs_ignores_order() {
    let a = change("FineTune", None, "1.0.0");
    let b = change("MyTool", Some("1.0.0"), "1.1.0");
    let plan = ReleasePlan::resolve(&semver::Version::new(0, 1, 0), false, vec![a.clone(), b.clone()]);

    assert!(plan.same_inputs(&[b.clone(), a.clone()]));
    assert!(!plan.same_inputs(&[a]));
  }

  #[test]
  fn test_pending_plan_json_shape() {
    let plan = ReleasePlan::resolve(&semver::Version::new(0, 1, 0), false, vec![change("FineTune", None, "1.0.0")]);
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["bump"], "minor");
    assert_eq!(json["version"], "0.2.0");
    assert_eq!(json["changes"][0]["toVersion"], "1.0.0");
    assert_eq!(json["changes"][0]["payload"], "bundle");
    assert_eq!(json["changes"][0].get("fromVersion"), Some(&serde_json::Value::Null));

    let back: ReleasePlan = serde_json::from_value(json).unwrap();
    assert_eq!(back, plan);
  }
}
