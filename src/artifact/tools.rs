//! Platform tool capabilities
//!
//! Everything that touches macOS tooling goes through [`PlatformTools`]:
//! expanding containers, reading installer metadata, building disk images and
//! checking code signatures. [`SystemTools`] shells out to `hdiutil`, `ditto`,
//! `pkgutil` and `codesign`; zip and tar.gz archives are expanded in-process so
//! inspection also works where those tools are missing.

use crate::artifact::metadata::{InstallerInfo, parse_distribution, parse_package_info};
use crate::core::error::{ResultExt, TapError, TapResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Container formats the inspector can open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
  Zip,
  TarGz,
  DiskImage,
}

impl ContainerKind {
  /// Detect by file name
  pub fn detect(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".zip") {
      Some(ContainerKind::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(ContainerKind::TarGz)
    } else if name.ends_with(".dmg") {
      Some(ContainerKind::DiskImage)
    } else {
      None
    }
  }
}

/// Code-signing verdict for an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
  Signed,
  Unsigned,
}

impl Verification {
  pub fn is_signed(self) -> bool {
    self == Verification::Signed
  }
}

/// OS tooling used by inspection, repacking and verification
pub trait PlatformTools {
  /// Expand a container into `dest` (which exists and is empty)
  fn expand(&self, archive: &Path, dest: &Path) -> TapResult<()>;

  /// Read identifier, version and title from an installer package
  fn installer_info(&self, package: &Path) -> TapResult<InstallerInfo>;

  /// Build a compressed disk image at `output` holding `bundle`
  fn pack_disk_image(&self, bundle: &Path, volume_name: &str, output: &Path) -> TapResult<()>;

  /// Check the code signature of a staged artifact
  ///
  /// An error means the verifier could not run, not that the signature is bad.
  fn check_signature(&self, artifact: &Path) -> TapResult<Verification>;
}

/// Real tooling (macOS for disk images, installers and signatures)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTools;

impl PlatformTools for SystemTools {
  fn expand(&self, archive: &Path, dest: &Path) -> TapResult<()> {
    match ContainerKind::detect(archive) {
      Some(ContainerKind::Zip) => expand_zip(archive, dest),
      Some(ContainerKind::TarGz) => expand_tar_gz(archive, dest),
      Some(ContainerKind::DiskImage) => expand_disk_image(archive, dest),
      None => Err(TapError::message(format!("{} is not a supported archive", archive.display()))),
    }
  }

  fn installer_info(&self, package: &Path) -> TapResult<InstallerInfo> {
    let work = TempDir::new().context("Failed to create scratch directory for installer")?;
    let expanded = work.path().join("expanded");

    run_tool(
      Command::new("pkgutil").arg("--expand").arg(package).arg(&expanded),
      "pkgutil --expand",
    )?;

    let mut info = InstallerInfo::default();
    let distribution = expanded.join("Distribution");
    if distribution.is_file() {
      info = parse_distribution(&fs::read_to_string(&distribution)?);
    }

    // Component packages carry PackageInfo at the root, product archives one per component
    let package_info = expanded.join("PackageInfo");
    let component_info = if package_info.is_file() {
      Some(package_info)
    } else {
      first_component_info(&expanded)?
    };
    if let Some(path) = component_info {
      info = info.or(parse_package_info(&fs::read_to_string(&path)?));
    }

    Ok(info)
  }

  fn pack_disk_image(&self, bundle: &Path, volume_name: &str, output: &Path) -> TapResult<()> {
    let staging = TempDir::new().context("Failed to create disk image staging directory")?;
    let bundle_name = bundle
      .file_name()
      .ok_or_else(|| TapError::message(format!("Invalid bundle path {}", bundle.display())))?;

    run_tool(
      Command::new("ditto").arg(bundle).arg(staging.path().join(bundle_name)),
      "ditto",
    )?;
    #[cfg(unix)]
    std::os::unix::fs::symlink("/Applications", staging.path().join("Applications"))
      .context("Failed to create Applications link")?;

    run_tool(
      Command::new("hdiutil")
        .args(["create", "-volname", volume_name, "-srcfolder"])
        .arg(staging.path())
        .args(["-ov", "-format", "UDZO"])
        .arg(output),
      "hdiutil create",
    )?;

    Ok(())
  }

  fn check_signature(&self, artifact: &Path) -> TapResult<Verification> {
    match SignatureCheck::for_artifact(artifact) {
      SignatureCheck::Installer => signature_status(Command::new("pkgutil").arg("--check-signature").arg(artifact)),
      SignatureCheck::BundleInZip => {
        let work = TempDir::new().context("Failed to create scratch directory for verification")?;
        expand_zip(artifact, work.path())?;
        bundle_signature(work.path())
      }
      SignatureCheck::BundleInImage => {
        let mounted = MountedImage::attach(artifact)?;
        bundle_signature(mounted.path())
      }
      SignatureCheck::Artifact => signature_status(Command::new("codesign").args(["--verify", "--strict"]).arg(artifact)),
    }
  }
}

/// What a signature verdict is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureCheck {
  /// `pkgutil --check-signature` on the package itself
  Installer,
  /// The `.app` inside a zip; zips carry no signature of their own
  BundleInZip,
  /// The `.app` inside a disk image; images are rarely signed even when the app is
  BundleInImage,
  /// `codesign` on the file itself
  Artifact,
}

impl SignatureCheck {
  fn for_artifact(artifact: &Path) -> Self {
    let name = artifact.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    if name.ends_with(".pkg") {
      SignatureCheck::Installer
    } else if name.ends_with(".zip") {
      SignatureCheck::BundleInZip
    } else if name.ends_with(".dmg") {
      SignatureCheck::BundleInImage
    } else {
      SignatureCheck::Artifact
    }
  }
}

/// Verdict for the first `.app` under `root`; no bundle means unsigned
fn bundle_signature(root: &Path) -> TapResult<Verification> {
  match first_bundle(root) {
    Some(app) => signature_status(Command::new("codesign").args(["--verify", "--deep", "--strict"]).arg(app)),
    None => Ok(Verification::Unsigned),
  }
}

/// Expand a zip archive; entry names that escape `dest` are rejected
pub fn expand_zip(archive: &Path, dest: &Path) -> TapResult<()> {
  let file = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
  let mut zip = zip::ZipArchive::new(file).with_context(|| format!("Failed to read zip {}", archive.display()))?;
  zip
    .extract(dest)
    .with_context(|| format!("Failed to extract {}", archive.display()))?;
  Ok(())
}

/// Expand a gzip-compressed tarball
pub fn expand_tar_gz(archive: &Path, dest: &Path) -> TapResult<()> {
  let file = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
  let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
  // `unpack` refuses entries outside `dest`
  tarball
    .unpack(dest)
    .with_context(|| format!("Failed to extract {}", archive.display()))?;
  Ok(())
}

/// Mount read-only, copy the volume out, always detach
fn expand_disk_image(image: &Path, dest: &Path) -> TapResult<()> {
  let mounted = MountedImage::attach(image)?;
  run_tool(Command::new("ditto").arg(mounted.path()).arg(dest), "ditto")?;
  Ok(())
}

/// A read-only disk image mount, detached on drop
struct MountedImage {
  // Detach before the mount point directory is removed
  _guard: MountGuard,
  mount: TempDir,
}

impl MountedImage {
  fn attach(image: &Path) -> TapResult<Self> {
    let mount = TempDir::new().context("Failed to create mount point")?;
    run_tool(
      Command::new("hdiutil")
        .args(["attach", "-nobrowse", "-readonly", "-noautoopen", "-mountpoint"])
        .arg(mount.path())
        .arg(image),
      "hdiutil attach",
    )?;
    Ok(Self {
      _guard: MountGuard(mount.path().to_path_buf()),
      mount,
    })
  }

  fn path(&self) -> &Path {
    self.mount.path()
  }
}

struct MountGuard(PathBuf);

impl Drop for MountGuard {
  fn drop(&mut self) {
    let detached = Command::new("hdiutil")
      .args(["detach", "-quiet", "-force"])
      .arg(&self.0)
      .status();
    if !matches!(detached, Ok(status) if status.success()) {
      log::warn!("failed to detach disk image mounted at {}", self.0.display());
    }
  }
}

fn first_component_info(expanded: &Path) -> TapResult<Option<PathBuf>> {
  let mut entries: Vec<PathBuf> = fs::read_dir(expanded)?
    .filter_map(|e| e.ok().map(|e| e.path()))
    .filter(|p| p.join("PackageInfo").is_file())
    .collect();
  entries.sort();
  Ok(entries.into_iter().next().map(|p| p.join("PackageInfo")))
}

fn first_bundle(root: &Path) -> Option<PathBuf> {
  walkdir::WalkDir::new(root)
    .min_depth(1)
    .max_depth(3)
    .sort_by_file_name()
    .into_iter()
    .filter_map(Result::ok)
    .find(|e| e.file_type().is_dir() && e.file_name().to_string_lossy().ends_with(".app"))
    .map(|e| e.into_path())
}

/// Run a tool, failing with its stderr on a non-zero exit
fn run_tool(cmd: &mut Command, what: &str) -> TapResult<Output> {
  log::debug!("running {:?}", cmd);
  let output = cmd.output().map_err(|e| tool_spawn_error(what, e))?;

  if !output.status.success() {
    return Err(TapError::message(format!(
      "{} failed: {}",
      what,
      String::from_utf8_lossy(&output.stderr).trim()
    )));
  }

  Ok(output)
}

/// Exit status is the verdict; a spawn failure is an error
fn signature_status(cmd: &mut Command) -> TapResult<Verification> {
  log::debug!("verifying with {:?}", cmd);
  let output = cmd.output().map_err(|e| tool_spawn_error("signature check", e))?;
  Ok(if output.status.success() {
    Verification::Signed
  } else {
    log::debug!("verifier says unsigned: {}", String::from_utf8_lossy(&output.stderr).trim());
    Verification::Unsigned
  })
}

fn tool_spawn_error(what: &str, err: std::io::Error) -> TapError {
  if err.kind() == std::io::ErrorKind::NotFound {
    TapError::with_help(
      format!("{}: tool not found", what),
      "Disk images, installers and signatures need the macOS command line tools.",
    )
  } else {
    TapError::message(format!("Failed to run {}: {}", what, err))
  }
}
