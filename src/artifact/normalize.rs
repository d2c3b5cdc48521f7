//! Artifact normalization (Phase 1)
//!
//! Turns every staged upload into a canonical `<Name>-<Version>.<ext>` file:
//! canonical uploads pass through untouched, anything else is inspected and
//! repacked as a `.dmg` (bundle) or `.pkg` (installer) next to the original,
//! which is then deleted. Re-running on the output is a no-op because the
//! output is canonical.

use crate::artifact::checksum::sha256_file;
use crate::artifact::inspect::{ArchiveInspector, Inspection, PayloadKind};
use crate::artifact::naming::{ArtifactKind, CanonicalName, token_for};
use crate::artifact::tools::PlatformTools;
use crate::core::error::{ReleaseError, ResultExt, TapError, TapResult};
use crate::ui::prompt::Operator;
use std::fs;
use std::path::{Path, PathBuf};

/// One staged file after Phase 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArtifact {
  /// Staged location (canonical unless this is a dry run)
  pub path: PathBuf,

  /// File name as uploaded
  pub source_name: String,

  /// Canonical application name
  pub name: String,

  /// Application version
  pub version: String,

  /// Kind of the staged file
  pub kind: ArtifactKind,

  /// What the record installs
  pub payload: PayloadKind,

  /// `.app` stem for the record's `app` stanza
  pub bundle_name: String,

  /// Bundle or package identifier, when known
  pub identifier: Option<String>,

  /// SHA-256 of the staged bytes, computed once
  pub checksum: String,

  /// Already canonical when staged
  pub canonical: bool,
}

impl UploadArtifact {
  pub fn token(&self) -> String {
    token_for(&self.name)
  }

  /// Staged file name
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default()
  }

  /// Name the artifact is released under (differs from `file_name` only in a dry run)
  pub fn canonical_file_name(&self) -> String {
    CanonicalName {
      name: self.name.clone(),
      version: self.version.clone(),
      kind: self.kind,
    }
    .file_name()
  }
}

/// Produces canonical artifacts
pub struct ArtifactNormalizer<'a> {
  tools: &'a dyn PlatformTools,
  operator: &'a dyn Operator,
  max_depth: usize,
  dry_run: bool,
}

impl<'a> ArtifactNormalizer<'a> {
  pub fn new(tools: &'a dyn PlatformTools, operator: &'a dyn Operator, max_depth: usize, dry_run: bool) -> Self {
    Self {
      tools,
      operator,
      max_depth,
      dry_run,
    }
  }

  /// Normalize one staged file
  ///
  /// Per-artifact failures (`VersionUndetermined`, `NamingViolation`,
  /// `PayloadNotFound`, `NestingTooDeep`) are skippable; `Cancelled` aborts.
  pub fn normalize(&self, path: &Path) -> TapResult<UploadArtifact> {
    let source_name = file_name(path);

    if let Some(canonical) = CanonicalName::parse(&source_name) {
      return self.pass_through(path, source_name, canonical);
    }

    let inspection = ArchiveInspector::new(self.tools, self.max_depth).inspect(path)?;
    let version = inspection
      .version
      .clone()
      .ok_or_else(|| ReleaseError::VersionUndetermined {
        file: source_name.clone(),
      })?;

    let kind = match inspection.kind {
      PayloadKind::Bundle => ArtifactKind::DiskImage,
      PayloadKind::Installer => ArtifactKind::InstallerPackage,
    };
    let canonical = CanonicalName::build(&source_name, &inspection.name, &version, kind)?;
    let target = path.with_file_name(canonical.file_name());

    if target.exists() {
      return Err(
        ReleaseError::NamingViolation {
          file: source_name,
          rule: format!("canonical name {} is already staged", canonical),
        }
        .into(),
      );
    }

    if self.dry_run {
      println!("   🔍 {} would be repacked as {}", source_name, canonical);
      return Ok(self.artifact(path.to_path_buf(), source_name, &canonical, &inspection, sha256_file(path)?));
    }

    self.repack(&inspection, &canonical, &target)?;
    fs::remove_file(path).with_context(|| format!("Failed to remove original upload {}", path.display()))?;
    println!("   📦 Repacked {} -> {}", source_name, canonical);

    let checksum = sha256_file(&target)?;
    let artifact = self.artifact(target, source_name.clone(), &canonical, &inspection, checksum);

    let question = format!("Inspect {} before it is released.", artifact.path.display());
    if !self.operator.confirm(&question)? {
      return Err(ReleaseError::Cancelled { file: source_name }.into());
    }

    Ok(artifact)
  }

  fn pass_through(&self, path: &Path, source_name: String, canonical: CanonicalName) -> TapResult<UploadArtifact> {
    let payload = match canonical.kind {
      ArtifactKind::InstallerPackage => PayloadKind::Installer,
      ArtifactKind::DiskImage | ArtifactKind::Archive => PayloadKind::Bundle,
    };

    let identifier = match payload {
      PayloadKind::Installer => match self.tools.installer_info(path) {
        Ok(info) => info.identifier,
        Err(e) => {
          log::debug!("no installer metadata for {}: {}", source_name, e);
          None
        }
      },
      PayloadKind::Bundle => None,
    };

    Ok(UploadArtifact {
      checksum: sha256_file(path)?,
      path: path.to_path_buf(),
      source_name,
      bundle_name: canonical.name.clone(),
      name: canonical.name,
      version: canonical.version,
      kind: canonical.kind,
      payload,
      identifier,
      canonical: true,
    })
  }

  fn repack(&self, inspection: &Inspection, canonical: &CanonicalName, target: &Path) -> TapResult<()> {
    let result = match inspection.kind {
      PayloadKind::Bundle => self.tools.pack_disk_image(&inspection.payload, &canonical.name, target),
      PayloadKind::Installer => fs::copy(&inspection.payload, target).map(|_| ()).map_err(TapError::from),
    };

    if let Err(e) = result {
      // Never leave a half-written canonical file behind for the next run to trust
      let _ = fs::remove_file(target);
      return Err(e.context(format!("Failed to repack {} as {}", inspection.payload.display(), canonical)));
    }
    Ok(())
  }

  fn artifact(
    &self,
    path: PathBuf,
    source_name: String,
    canonical: &CanonicalName,
    inspection: &Inspection,
    checksum: String,
  ) -> UploadArtifact {
    UploadArtifact {
      path,
      source_name,
      name: canonical.name.clone(),
      version: canonical.version.clone(),
      kind: canonical.kind,
      payload: inspection.kind,
      bundle_name: inspection.bundle_name.clone().unwrap_or_else(|| canonical.name.clone()),
      identifier: inspection.identifier.clone(),
      checksum,
      canonical: false,
    }
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default()
}
