//! Canonical artifact naming
//!
//! Every artifact that survives Phase 1 is named `AppName-Version.ext`, where
//! `AppName` is ASCII alphanumeric, `Version` is dot-separated digits and `ext`
//! is `dmg`, `pkg` or `zip`. The record token is derived from `AppName` alone.

use crate::core::error::{ReleaseError, TapResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<name>[A-Za-z0-9]+)-(?P<version>[0-9]+(\.[0-9]+)*)\.(?P<ext>dmg|pkg|zip)$")
    .expect("valid canonical name regex")
});

// `FineTune` -> `Fine-Tune`, `HTTPServer` -> `HTTP-Server`
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid word regex"));
static HUMP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid hump regex"));

/// What an upload contains, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  /// `.dmg`
  DiskImage,
  /// `.pkg`
  InstallerPackage,
  /// `.zip`
  Archive,
}

impl ArtifactKind {
  /// Kind for a canonical extension
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext {
      "dmg" => Some(ArtifactKind::DiskImage),
      "pkg" => Some(ArtifactKind::InstallerPackage),
      "zip" => Some(ArtifactKind::Archive),
      _ => None,
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      ArtifactKind::DiskImage => "dmg",
      ArtifactKind::InstallerPackage => "pkg",
      ArtifactKind::Archive => "zip",
    }
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactKind::DiskImage => write!(f, "disk image"),
      ArtifactKind::InstallerPackage => write!(f, "installer package"),
      ArtifactKind::Archive => write!(f, "archive"),
    }
  }
}

/// A file name that matches the naming convention, split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalName {
  pub name: String,
  pub version: String,
  pub kind: ArtifactKind,
}

impl CanonicalName {
  /// Parse a bare file name; `None` when it is not canonical
  pub fn parse(file_name: &str) -> Option<Self> {
    let caps = CANONICAL_RE.captures(file_name)?;
    let kind = ArtifactKind::from_extension(&caps["ext"])?;
    Some(Self {
      name: caps["name"].to_string(),
      version: caps["version"].to_string(),
      kind,
    })
  }

  /// Build a canonical name from detected parts, sanitizing the app name
  ///
  /// Fails with `NamingViolation` when nothing usable is left of the name or
  /// the version is not dot-separated digits.
  pub fn build(source: &str, raw_name: &str, version: &str, kind: ArtifactKind) -> TapResult<Self> {
    let name = sanitize_name(raw_name);
    if name.is_empty() {
      return Err(
        ReleaseError::NamingViolation {
          file: source.to_string(),
          rule: format!("app name '{}' has no ASCII letters or digits", raw_name),
        }
        .into(),
      );
    }

    let candidate = format!("{}-{}.{}", name, version, kind.extension());
    Self::parse(&candidate).filter(|_| is_canonical_version(version)).ok_or_else(|| {
      ReleaseError::NamingViolation {
        file: source.to_string(),
        rule: format!("version '{}' must be dot-separated digits", version),
      }
      .into()
    })
  }

  pub fn file_name(&self) -> String {
    format!("{}-{}.{}", self.name, self.version, self.kind.extension())
  }
}

impl fmt::Display for CanonicalName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.file_name())
  }
}

/// Record token for an application name: kebab-case, lower-cased
///
/// CamelCase words are split (`FineTune` -> `fine-tune`), whitespace becomes a
/// hyphen. Applying it to its own output returns the same token.
pub fn token_for(name: &str) -> String {
  name
    .split_whitespace()
    .map(|word| {
      let split = WORD_RE.replace_all(word, "${1}-${2}");
      HUMP_RE.replace_all(&split, "${1}-${2}").into_owned()
    })
    .collect::<Vec<_>>()
    .join("-")
    .to_lowercase()
}

/// Strip everything that may not appear in a canonical app name
pub fn sanitize_name(raw: &str) -> String {
  raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Whether a version string can appear in a canonical name
pub fn is_canonical_version(version: &str) -> bool {
  !version.is_empty()
    && version
      .split('.')
      .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_canonical_names() {
    let parsed = CanonicalName::parse("FineTune-1.0.0.dmg").unwrap();
    assert_eq!(parsed.name, "FineTune");
    assert_eq!(parsed.version, "1.0.0");
    assert_eq!(parsed.kind, ArtifactKind::DiskImage);

    assert!(CanonicalName::parse("MyTool-2.pkg").is_some());
    assert!(CanonicalName::parse("MyTool-1.0.2.zip").is_some());
  }

  #[test]
  fn test_reject_non_canonical_names() {
    assert!(CanonicalName::parse("My Tool-1.0.dmg").is_none());
    assert!(CanonicalName::parse("MyTool_v1.0.dmg").is_none());
    assert!(CanonicalName::parse("MyTool-1.0.0.tar.gz").is_none());
    assert!(CanonicalName::parse("MyTool-1.0.0-beta.dmg").is_none());
    assert!(CanonicalName::parse("MyTool-.dmg").is_none());
  }

  #[test]
  fn test_token_derivation() {
    assert_eq!(token_for("FineTune"), "fine-tune");
    assert_eq!(token_for("MyTool"), "my-tool");
    assert_eq!(token_for("HTTPServer"), "http-server");
    assert_eq!(token_for("Fine Tune"), "fine-tune");
    assert_eq!(token_for("app2go"), "app2go");
  }

  #[test]
  fn test_token_is_stable() {
    for name in ["FineTune", "MyTool", "HTTPServer", "Zed", "SuperApp3"] {
      let token = token_for(name);
      assert_eq!(token_for(&token), token);
      assert_eq!(token_for(&CanonicalName::parse(&format!("{}-1.2.3.dmg", name)).unwrap().name), token);
    }
  }

  #[test]
  fn test_build_sanitizes_name() {
    let built = CanonicalName::build("Fine Tune (beta).zip", "Fine Tune!", "1.4", ArtifactKind::DiskImage).unwrap();
    assert_eq!(built.file_name(), "FineTune-1.4.dmg");
  }

  #[test]
  fn test_build_rejects_unusable_parts() {
    let err = CanonicalName::build("x.zip", "???", "1.0", ArtifactKind::DiskImage).unwrap_err();
    assert!(matches!(err.as_release(), Some(ReleaseError::NamingViolation { .. })));

    let err = CanonicalName::build("x.zip", "Tool", "1.0b3", ArtifactKind::DiskImage).unwrap_err();
    assert!(matches!(err.as_release(), Some(ReleaseError::NamingViolation { .. })));
  }

  #[test]
  fn test_canonical_version() {
    assert!(is_canonical_version("1.0.0"));
    assert!(is_canonical_version("12"));
    assert!(!is_canonical_version("1..0"));
    assert!(!is_canonical_version("1.0b"));
    assert!(!is_canonical_version(""));
  }
}
