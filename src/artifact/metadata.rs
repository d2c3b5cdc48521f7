//! Name and version recovery for non-canonical uploads
//!
//! Structured metadata wins: a bundle's `Contents/Info.plist`, or an
//! installer's `PackageInfo`/`Distribution`. When a field is missing there, it
//! is parsed heuristically out of the bundle or file name
//! (`Fine Tune v1.4 (beta).zip` -> `Fine Tune`, `1.4`).

use crate::core::error::{ResultExt, TapResult};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static NAME_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<name>.*?)[\s._-]*[vV]?(?P<version>\d+(?:\.\d+)+)").expect("valid name/version regex")
});
static LEADING_VERSION_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\s*[vV]?(\d+(?:\.\d+)*)").expect("valid version regex"));
static PKG_INFO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<pkg-info\b[^>]*>").expect("valid pkg-info regex"));
static PKG_REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<pkg-ref\b[^>]*>").expect("valid pkg-ref regex"));
static TITLE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"<title>\s*([^<]+?)\s*</title>").expect("valid title regex"));

/// Fields read from an application bundle's Info.plist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleInfo {
  pub name: Option<String>,
  pub version: Option<String>,
  pub identifier: Option<String>,
}

/// Fields read from an installer package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerInfo {
  pub identifier: Option<String>,
  pub version: Option<String>,
  pub title: Option<String>,
}

impl InstallerInfo {
  /// Fill fields missing here from `other`
  pub fn or(self, other: InstallerInfo) -> InstallerInfo {
    InstallerInfo {
      identifier: self.identifier.or(other.identifier),
      version: self.version.or(other.version),
      title: self.title.or(other.title),
    }
  }
}

/// Read `Contents/Info.plist` of a `.app` bundle
///
/// A bundle without an Info.plist yields empty info rather than an error; the
/// heuristics still get a chance.
pub fn read_bundle_info(bundle: &Path) -> TapResult<BundleInfo> {
  let plist_path = bundle.join("Contents").join("Info.plist");
  if !plist_path.is_file() {
    log::debug!("{} has no Info.plist", bundle.display());
    return Ok(BundleInfo::default());
  }

  let value = plist::Value::from_file(&plist_path)
    .with_context(|| format!("Failed to read {}", plist_path.display()))?;
  let Some(dict) = value.as_dictionary() else {
    return Ok(BundleInfo::default());
  };

  let string = |key: &str| {
    dict
      .get(key)
      .and_then(plist::Value::as_string)
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(String::from)
  };

  Ok(BundleInfo {
    name: string("CFBundleDisplayName").or_else(|| string("CFBundleName")),
    version: string("CFBundleShortVersionString")
      .and_then(|v| normalize_version(&v))
      .or_else(|| string("CFBundleVersion").and_then(|v| normalize_version(&v))),
    identifier: string("CFBundleIdentifier"),
  })
}

/// Parse a component package's `PackageInfo`
pub fn parse_package_info(xml: &str) -> InstallerInfo {
  let Some(tag) = PKG_INFO_RE.find(xml) else {
    return InstallerInfo::default();
  };
  InstallerInfo {
    identifier: attribute(tag.as_str(), "identifier"),
    version: attribute(tag.as_str(), "version").and_then(|v| normalize_version(&v)),
    title: None,
  }
}

/// Parse a product archive's `Distribution`
pub fn parse_distribution(xml: &str) -> InstallerInfo {
  let title = TITLE_RE.captures(xml).map(|c| c[1].to_string());
  let pkg_ref = PKG_REF_RE
    .find_iter(xml)
    .map(|m| m.as_str())
    .find(|tag| attribute(tag, "version").is_some());

  InstallerInfo {
    identifier: pkg_ref.and_then(|tag| attribute(tag, "id")),
    version: pkg_ref
      .and_then(|tag| attribute(tag, "version"))
      .and_then(|v| normalize_version(&v)),
    title,
  }
}

fn attribute(tag: &str, name: &str) -> Option<String> {
  let needle = format!("{}=\"", name);
  let mut search = tag;
  // Require a word boundary so `id` does not match `identifier`
  while let Some(pos) = search.find(&needle) {
    let boundary = pos == 0 || search[..pos].ends_with(char::is_whitespace);
    let rest = &search[pos + needle.len()..];
    if boundary {
      return rest.split('"').next().map(str::trim).filter(|v| !v.is_empty()).map(String::from);
    }
    search = rest;
  }
  None
}

/// Leading dotted-number part of a version string (`1.4 (312)` -> `1.4`)
pub fn normalize_version(raw: &str) -> Option<String> {
  LEADING_VERSION_RE.captures(raw).map(|c| c[1].to_string())
}

/// Best-effort name and version from a bundle or file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameGuess {
  pub name: Option<String>,
  pub version: Option<String>,
}

/// Split `Fine Tune v1.4 (beta)` into `Fine Tune` and `1.4`
///
/// Without a dotted version the whole stem is taken as the name.
pub fn guess_name_version(stem: &str) -> NameGuess {
  let stem = stem.trim();
  match NAME_VERSION_RE.captures(stem) {
    Some(caps) => {
      let name = caps["name"].trim_end_matches(|c: char| c.is_whitespace() || "._-".contains(c));
      NameGuess {
        name: (!name.is_empty()).then(|| name.to_string()),
        version: Some(caps["version"].to_string()),
      }
    }
    None => NameGuess {
      name: (!stem.is_empty()).then(|| stem.to_string()),
      version: None,
    },
  }
}

/// File name without its archive extension (`.tar.gz` counts as one)
pub fn archive_stem(file_name: &str) -> &str {
  let lower = file_name.to_lowercase();
  for ext in [".tar.gz", ".tgz", ".zip", ".dmg", ".pkg", ".app"] {
    if lower.ends_with(ext) {
      return &file_name[..file_name.len() - ext.len()];
    }
  }
  file_name
}
