//! Archive inspection
//!
//! Expands an upload into scoped work directories, looks for exactly one
//! application bundle or installer package, and recovers its name and
//! version. Nested archives are opened level by level up to
//! `max_nesting_depth`; the work directories live as long as the returned
//! [`Inspection`] and are removed when it drops, on every exit path.

use crate::artifact::metadata::{InstallerInfo, archive_stem, guess_name_version, read_bundle_info};
use crate::artifact::tools::{ContainerKind, PlatformTools};
use crate::core::error::{ReleaseError, ResultExt, TapResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// What was found inside the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
  /// `.app` bundle, shipped in a disk image
  Bundle,
  /// `.pkg` installer
  Installer,
}

/// Result of inspecting one upload
#[derive(Debug)]
pub struct Inspection {
  pub kind: PayloadKind,

  /// Payload location (inside a work directory unless the upload is the payload)
  pub payload: PathBuf,

  /// Detected display name (unsanitized)
  pub name: String,

  /// Detected version, if any source yielded one
  pub version: Option<String>,

  /// `.app` file stem, used for the record's artifact stanza
  pub bundle_name: Option<String>,

  /// Bundle or package identifier
  pub identifier: Option<String>,

  _workdirs: Vec<TempDir>,
}

/// Opens uploads and finds their payload
pub struct ArchiveInspector<'a> {
  tools: &'a dyn PlatformTools,
  max_depth: usize,
}

#[derive(Default)]
struct Found {
  bundles: Vec<PathBuf>,
  installers: Vec<PathBuf>,
  archives: Vec<PathBuf>,
}

impl<'a> ArchiveInspector<'a> {
  pub fn new(tools: &'a dyn PlatformTools, max_depth: usize) -> Self {
    Self { tools, max_depth }
  }

  /// Inspect an upload that does not follow the naming convention
  pub fn inspect(&self, upload: &Path) -> TapResult<Inspection> {
    let file_name = upload
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    let mut workdirs = Vec::new();

    let (kind, payload) = if file_name.to_lowercase().ends_with(".pkg") {
      (PayloadKind::Installer, upload.to_path_buf())
    } else if ContainerKind::detect(upload).is_some() {
      self.find_payload(upload, &mut workdirs)?
    } else {
      return Err(
        ReleaseError::NamingViolation {
          file: file_name,
          rule: "unsupported file type (expected .dmg, .pkg, .zip or .tar.gz)".to_string(),
        }
        .into(),
      );
    };

    log::debug!("{}: {:?} payload at {}", file_name, kind, payload.display());
    self.describe(upload, kind, payload, workdirs)
  }

  /// Breadth-first over archive levels; the first level holding payloads wins
  fn find_payload(&self, upload: &Path, workdirs: &mut Vec<TempDir>) -> TapResult<(PayloadKind, PathBuf)> {
    let mut level = vec![upload.to_path_buf()];
    let mut depth = 0;

    while !level.is_empty() {
      depth += 1;
      if depth > self.max_depth {
        return Err(
          ReleaseError::NestingTooDeep {
            archive: upload.to_path_buf(),
            limit: self.max_depth,
          }
          .into(),
        );
      }

      let mut found = Found::default();
      for archive in &level {
        let dir = TempDir::new().context("Failed to create inspection directory")?;
        self
          .tools
          .expand(archive, dir.path())
          .with_context(|| format!("Failed to expand {}", archive.display()))?;
        scan(dir.path(), &mut found)?;
        workdirs.push(dir);
      }

      let mut payloads: Vec<(PayloadKind, PathBuf)> = found
        .bundles
        .into_iter()
        .map(|p| (PayloadKind::Bundle, p))
        .chain(found.installers.into_iter().map(|p| (PayloadKind::Installer, p)))
        .collect();

      match payloads.len() {
        0 => level = found.archives,
        1 => return Ok(payloads.remove(0)),
        n => {
          let names: Vec<String> = payloads
            .iter()
            .filter_map(|(_, p)| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
          return Err(
            ReleaseError::PayloadNotFound {
              archive: upload.to_path_buf(),
              reason: format!("ambiguous, {} payloads found ({})", n, names.join(", ")),
            }
            .into(),
          );
        }
      }
    }

    Err(
      ReleaseError::PayloadNotFound {
        archive: upload.to_path_buf(),
        reason: "no .app bundle or .pkg installer inside".to_string(),
      }
      .into(),
    )
  }

  fn describe(
    &self,
    upload: &Path,
    kind: PayloadKind,
    payload: PathBuf,
    workdirs: Vec<TempDir>,
  ) -> TapResult<Inspection> {
    let upload_name = upload
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    let payload_name = payload
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();

    let payload_guess = guess_name_version(archive_stem(&payload_name));
    let upload_guess = guess_name_version(archive_stem(&upload_name));

    let (meta_name, meta_version, identifier, bundle_name) = match kind {
      PayloadKind::Bundle => {
        let info = read_bundle_info(&payload)?;
        (
          info.name,
          info.version,
          info.identifier,
          Some(archive_stem(&payload_name).to_string()),
        )
      }
      PayloadKind::Installer => {
        let info = match self.tools.installer_info(&payload) {
          Ok(info) => info,
          Err(e) => {
            log::warn!("could not read installer metadata from {}: {}", payload_name, e);
            InstallerInfo::default()
          }
        };
        (info.title, info.version, info.identifier, None)
      }
    };

    let name = meta_name
      .or(payload_guess.name)
      .or(upload_guess.name)
      .unwrap_or_else(|| archive_stem(&upload_name).to_string());
    let version = meta_version.or(payload_guess.version).or(upload_guess.version);

    Ok(Inspection {
      kind,
      payload,
      name,
      version,
      bundle_name,
      identifier,
      _workdirs: workdirs,
    })
  }
}

/// Collect top-level bundles, installers and nested archives under `root`
///
/// Does not descend into bundles or package directories; skips hidden entries
/// and `__MACOSX` resource forks.
fn scan(root: &Path, found: &mut Found) -> TapResult<()> {
  let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

  while let Some(entry) = walker.next() {
    let entry = entry?;
    let name = entry.file_name().to_string_lossy().to_string();
    let lower = name.to_lowercase();

    if name.starts_with('.') || name == "__MACOSX" {
      if entry.file_type().is_dir() {
        walker.skip_current_dir();
      }
      continue;
    }

    if entry.file_type().is_dir() {
      if lower.ends_with(".app") {
        found.bundles.push(entry.path().to_path_buf());
        walker.skip_current_dir();
      } else if lower.ends_with(".pkg") {
        found.installers.push(entry.path().to_path_buf());
        walker.skip_current_dir();
      }
      continue;
    }

    if !entry.file_type().is_file() {
      continue;
    }
    if lower.ends_with(".pkg") {
      found.installers.push(entry.path().to_path_buf());
    } else if ContainerKind::detect(entry.path()).is_some() {
      found.archives.push(entry.path().to_path_buf());
    }
  }

  Ok(())
}
