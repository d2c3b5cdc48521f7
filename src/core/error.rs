//! Error types for tap-release with contextual messages and exit codes
//!
//! This module provides a unified error type that categorizes errors and provides
//! contextual help messages to users. Release pipeline failures live in
//! [`ReleaseError`]; each variant names the offending artifact or field and the
//! rule it violated.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for tap-release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, network, I/O)
  System = 2,
  /// Validation failure (record parse, version resolution)
  Validation = 3,
  /// Requires operator intervention (corrupt state, concurrent run)
  Fatal = 4,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for tap-release
#[derive(Debug)]
pub enum TapError {
  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// Release pipeline errors
  Release(ReleaseError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl TapError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    TapError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    TapError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      TapError::Message { message, context, help } => TapError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      TapError::Io(err) => TapError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      TapError::Config(_) => ExitCode::User,
      TapError::Git(_) => ExitCode::System,
      TapError::Release(e) => e.exit_code(),
      TapError::Io(_) => ExitCode::System,
      TapError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      TapError::Config(e) => e.help_message(),
      TapError::Git(e) => e.help_message(),
      TapError::Release(e) => e.help_message(),
      TapError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }

  /// The release error behind this error, if any
  pub fn as_release(&self) -> Option<&ReleaseError> {
    match self {
      TapError::Release(e) => Some(e),
      _ => None,
    }
  }
}

impl fmt::Display for TapError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TapError::Config(e) => write!(f, "{}", e),
      TapError::Git(e) => write!(f, "{}", e),
      TapError::Release(e) => write!(f, "{}", e),
      TapError::Io(e) => write!(f, "I/O error: {}", e),
      TapError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for TapError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      TapError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for TapError {
  fn from(err: io::Error) -> Self {
    TapError::Io(err)
  }
}

impl From<String> for TapError {
  fn from(msg: String) -> Self {
    TapError::message(msg)
  }
}

impl From<&str> for TapError {
  fn from(msg: &str) -> Self {
    TapError::message(msg)
  }
}

impl From<ReleaseError> for TapError {
  fn from(err: ReleaseError) -> Self {
    TapError::Release(err)
  }
}

impl From<toml_edit::de::Error> for TapError {
  fn from(err: toml_edit::de::Error) -> Self {
    TapError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for TapError {
  fn from(err: serde_json::Error) -> Self {
    TapError::message(format!("JSON error: {}", err))
  }
}

impl From<semver::Error> for TapError {
  fn from(err: semver::Error) -> Self {
    TapError::message(format!("Version parse error: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for TapError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    TapError::message(format!("UTF-8 conversion error: {}", err))
  }
}

impl From<zip::result::ZipError> for TapError {
  fn from(err: zip::result::ZipError) -> Self {
    TapError::message(format!("Zip archive error: {}", err))
  }
}

impl From<plist::Error> for TapError {
  fn from(err: plist::Error) -> Self {
    TapError::message(format!("Property list error: {}", err))
  }
}

impl From<walkdir::Error> for TapError {
  fn from(err: walkdir::Error) -> Self {
    TapError::message(format!("Directory traversal error: {}", err))
  }
}

impl From<tempfile::PersistError> for TapError {
  fn from(err: tempfile::PersistError) -> Self {
    TapError::Io(err.error)
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// Value failed validation
  InvalidValue { field: String, reason: String },

  /// Repository slug could not be determined
  MissingRepository { root: PathBuf },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::MissingRepository { .. } => Some(
        "Set `slug = \"owner/repo\"` under [repository] in tap.toml, export GITHUB_REPOSITORY, \
         or add a github.com `origin` remote."
          .to_string(),
      ),
      ConfigError::InvalidValue { .. } => Some("Fix the value in tap.toml and re-run.".to_string()),
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::InvalidValue { field, reason } => {
        write!(f, "Invalid config value for `{}`: {}", field, reason)
      }
      ConfigError::MissingRepository { root } => {
        write!(f, "Could not determine the GitHub repository for {}", root.display())
      }
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Push failed
  PushFailed {
    remote: String,
    branch: String,
    reason: String,
  },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") {
          Some("The remote has commits you don't have. Pull first, then re-run to resume publishing.".to_string())
        } else if reason.contains("permission denied") || reason.contains("403") {
          Some("Check your SSH key permissions and GitHub access.".to_string())
        } else {
          Some("The release is committed locally; re-run to resume publishing.".to_string())
        }
      }
      GitError::RepoNotFound { path } => Some(format!(
        "Initialize the repository first or check the path: {}",
        path.display()
      )),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::PushFailed { remote, branch, reason } => {
        write!(f, "Push to {}/{} failed: {}", remote, branch, reason)
      }
    }
  }
}

/// Release pipeline errors
#[derive(Debug)]
pub enum ReleaseError {
  /// File name (or derived canonical name) breaks the `AppName-Version.ext` convention
  NamingViolation { file: String, rule: String },

  /// No application bundle or installer inside the archive
  PayloadNotFound { archive: PathBuf, reason: String },

  /// Archives nested deeper than the configured bound
  NestingTooDeep { archive: PathBuf, limit: usize },

  /// Neither metadata nor heuristics produced a version
  VersionUndetermined { file: String },

  /// A package definition could not be edited unambiguously
  RecordParseError { token: String, field: String, reason: String },

  /// Bytes on disk no longer match the recorded checksum
  ChecksumMismatch {
    file: String,
    expected: String,
    actual: String,
  },

  /// The state file is unreadable or inconsistent
  StateCorruption { path: PathBuf, reason: String },

  /// The hosting service rejected or failed a request
  PublishFailure { operation: String, reason: String },

  /// Another coordinator holds the repository lock
  ConcurrentRunDetected { lock_path: PathBuf, holder: String },

  /// The operator declined to continue at the inspection pause
  Cancelled { file: String },
}

impl ReleaseError {
  /// Per-artifact errors that are recovered by skipping the artifact
  pub fn is_skippable(&self) -> bool {
    matches!(
      self,
      ReleaseError::NamingViolation { .. }
        | ReleaseError::PayloadNotFound { .. }
        | ReleaseError::NestingTooDeep { .. }
        | ReleaseError::VersionUndetermined { .. }
        | ReleaseError::ChecksumMismatch { .. }
    )
  }

  fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::StateCorruption { .. } | ReleaseError::ConcurrentRunDetected { .. } => ExitCode::Fatal,
      ReleaseError::PublishFailure { .. } => ExitCode::System,
      ReleaseError::Cancelled { .. } => ExitCode::User,
      _ => ExitCode::Validation,
    }
  }

  fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::NamingViolation { .. } => {
        Some("Rename the file to `AppName-Version.ext`, e.g. `MyTool-1.0.2.dmg`.".to_string())
      }
      ReleaseError::VersionUndetermined { .. } => {
        Some("Rename the upload to include its version, e.g. `MyTool-1.0.2.zip`.".to_string())
      }
      ReleaseError::RecordParseError { token, .. } => Some(format!(
        "Edit Casks/{}.rb so each of `version`, `sha256` and `url` appears exactly once at the top level.",
        token
      )),
      ReleaseError::StateCorruption { path, .. } => Some(format!(
        "Inspect {} by hand; tap-release never repairs state automatically.",
        path.display()
      )),
      ReleaseError::ConcurrentRunDetected { lock_path, .. } => Some(format!(
        "Wait for the other run to finish. If it crashed, its lock is released with the process; \
         otherwise remove {}.",
        lock_path.display()
      )),
      ReleaseError::PublishFailure { .. } => {
        Some("The release is committed locally. Re-run tap-release to resume publishing.".to_string())
      }
      _ => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::NamingViolation { file, rule } => {
        write!(f, "Naming violation in '{}': {}", file, rule)
      }
      ReleaseError::PayloadNotFound { archive, reason } => {
        write!(f, "No payload found in {}: {}", archive.display(), reason)
      }
      ReleaseError::NestingTooDeep { archive, limit } => {
        write!(
          f,
          "Archive {} nests archives deeper than {} level(s)",
          archive.display(),
          limit
        )
      }
      ReleaseError::VersionUndetermined { file } => {
        write!(f, "Could not determine a version for '{}'", file)
      }
      ReleaseError::RecordParseError { token, field, reason } => {
        write!(f, "Cannot edit `{}` in cask '{}': {}", field, token, reason)
      }
      ReleaseError::ChecksumMismatch { file, expected, actual } => {
        write!(
          f,
          "Checksum mismatch for '{}': expected {}, recomputed {}",
          file, expected, actual
        )
      }
      ReleaseError::StateCorruption { path, reason } => {
        write!(f, "State file {} is corrupt: {}", path.display(), reason)
      }
      ReleaseError::PublishFailure { operation, reason } => {
        write!(f, "Publishing failed during {}: {}", operation, reason)
      }
      ReleaseError::ConcurrentRunDetected { lock_path, holder } => {
        write!(
          f,
          "Another tap-release run holds {} ({})",
          lock_path.display(),
          holder
        )
      }
      ReleaseError::Cancelled { file } => {
        write!(f, "Run cancelled by operator after inspecting '{}'", file)
      }
    }
  }
}

/// Result type alias for tap-release
pub type TapResult<T> = Result<T, TapError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> TapResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> TapResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<TapError>,
{
  fn context(self, ctx: impl Into<String>) -> TapResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> TapResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &TapError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

/// Convert anyhow::Error to TapError
impl From<anyhow::Error> for TapError {
  fn from(err: anyhow::Error) -> Self {
    TapError::message(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_codes_by_category() {
    let corrupt = TapError::from(ReleaseError::StateCorruption {
      path: PathBuf::from("state.json"),
      reason: "bad json".to_string(),
    });
    assert_eq!(corrupt.exit_code(), ExitCode::Fatal);

    let record = TapError::from(ReleaseError::RecordParseError {
      token: "my-tool".to_string(),
      field: "url".to_string(),
      reason: "missing".to_string(),
    });
    assert_eq!(record.exit_code(), ExitCode::Validation);
    assert_eq!(TapError::message("x").exit_code(), ExitCode::User);
  }

  #[test]
  fn test_skippable_errors() {
    assert!(
      ReleaseError::VersionUndetermined {
        file: "a.zip".to_string()
      }
      .is_skippable()
    );
    assert!(
      !ReleaseError::PublishFailure {
        operation: "upload".to_string(),
        reason: "401".to_string()
      }
      .is_skippable()
    );
  }

  #[test]
  fn test_display_names_field_and_rule() {
    let err = ReleaseError::RecordParseError {
      token: "fine-tune".to_string(),
      field: "sha256".to_string(),
      reason: "appears 2 times at the top level".to_string(),
    };
    let text = err.to_string();
    assert!(text.contains("sha256"));
    assert!(text.contains("fine-tune"));
    assert!(err.help_message().is_some());
  }

  #[test]
  fn test_context_on_io_error() {
    let err = TapError::from(io::Error::other("disk full")).context("Failed to write state");
    let text = err.to_string();
    assert!(text.contains("disk full"));
    assert!(text.contains("Failed to write state"));
  }
}
