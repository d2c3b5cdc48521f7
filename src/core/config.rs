use crate::core::error::{ConfigError, ResultExt, TapError, TapResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for tap-release
/// Searched in order: tap.toml, .tap.toml, .config/tap.toml. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapConfig {
  #[serde(default)]
  pub repository: RepositoryConfig,
  #[serde(default)]
  pub paths: PathsConfig,
  #[serde(default)]
  pub release: ReleaseSettings,
  #[serde(default)]
  pub publish: PublishConfig,
  #[serde(default)]
  pub git: GitConfig,
}

/// Hosted repository the tap is published from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
  /// `owner/repo` slug; falls back to GITHUB_REPOSITORY, then the origin remote
  #[serde(default)]
  pub slug: Option<String>,
}

/// Layout of the tap repository (relative to its root)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
  /// Staging folder scanned for new uploads
  #[serde(default = "default_upload")]
  pub upload: PathBuf,

  /// Archive folder released artifacts are moved to
  #[serde(default = "default_uploaded")]
  pub uploaded: PathBuf,

  /// Package definition store
  #[serde(default = "default_casks")]
  pub casks: PathBuf,

  /// Persisted repository state
  #[serde(default = "default_state")]
  pub state: PathBuf,

  /// Generated catalog of published apps
  #[serde(default = "default_docs")]
  pub docs: PathBuf,
}

fn default_upload() -> PathBuf {
  PathBuf::from("upload")
}

fn default_uploaded() -> PathBuf {
  PathBuf::from("uploaded")
}

fn default_casks() -> PathBuf {
  PathBuf::from("Casks")
}

fn default_state() -> PathBuf {
  PathBuf::from("state.json")
}

fn default_docs() -> PathBuf {
  PathBuf::from("APPS.md")
}

impl Default for PathsConfig {
  fn default() -> Self {
    Self {
      upload: default_upload(),
      uploaded: default_uploaded(),
      casks: default_casks(),
      state: default_state(),
      docs: default_docs(),
    }
  }
}

/// Release shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
  /// Download URL written into package definitions.
  /// Placeholders: {repo}, {tag}, {version}, {file}
  #[serde(default = "default_url_template")]
  pub url_template: String,

  /// How many archive levels the inspector descends before giving up
  #[serde(default = "default_max_nesting_depth")]
  pub max_nesting_depth: usize,
}

fn default_url_template() -> String {
  "https://github.com/{repo}/releases/download/{tag}/{file}".to_string()
}

fn default_max_nesting_depth() -> usize {
  3
}

impl Default for ReleaseSettings {
  fn default() -> Self {
    Self {
      url_template: default_url_template(),
      max_nesting_depth: default_max_nesting_depth(),
    }
  }
}

/// Release hosting (gh CLI) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
  /// Executable used to talk to the hosting service
  #[serde(default = "default_gh")]
  pub gh: String,

  /// Attempts per request (including the first)
  #[serde(default = "default_retries")]
  pub retries: u32,

  /// Initial backoff between attempts, doubled each retry
  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
}

fn default_gh() -> String {
  "gh".to_string()
}

fn default_retries() -> u32 {
  3
}

fn default_backoff_ms() -> u64 {
  500
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      gh: default_gh(),
      retries: default_retries(),
      backoff_ms: default_backoff_ms(),
    }
  }
}

/// Git commit/push settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
  #[serde(default = "default_remote")]
  pub remote: String,

  #[serde(default = "default_branch")]
  pub branch: String,

  /// Push after committing (disable for local dry runs of the tap)
  #[serde(default = "default_push")]
  pub push: bool,
}

fn default_remote() -> String {
  "origin".to_string()
}

fn default_branch() -> String {
  "main".to_string()
}

fn default_push() -> bool {
  true
}

impl Default for GitConfig {
  fn default() -> Self {
    Self {
      remote: default_remote(),
      branch: default_branch(),
      push: default_push(),
    }
  }
}

impl TapConfig {
  /// Find config file in search order: tap.toml, .tap.toml, .config/tap.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = vec![
      path.join("tap.toml"),
      path.join(".tap.toml"),
      path.join(".config").join("tap.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config, falling back to defaults when no file exists
  pub fn load(path: &Path) -> TapResult<Self> {
    let Some(config_path) = Self::find_config_path(path) else {
      log::debug!("no tap.toml under {}, using defaults", path.display());
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config: TapConfig = toml_edit::de::from_str(&content)
      .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    config
      .validate()
      .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    Ok(config)
  }

  /// Validate values that serde cannot
  pub fn validate(&self) -> TapResult<()> {
    let paths = [
      ("paths.upload", &self.paths.upload),
      ("paths.uploaded", &self.paths.uploaded),
      ("paths.casks", &self.paths.casks),
      ("paths.state", &self.paths.state),
      ("paths.docs", &self.paths.docs),
    ];
    for (field, path) in paths {
      if path.as_os_str().is_empty() {
        return Err(invalid(field, "must not be empty"));
      }
    }

    if self.paths.upload == self.paths.uploaded {
      return Err(invalid("paths.uploaded", "must differ from paths.upload"));
    }

    if !self.release.url_template.contains("{file}") {
      return Err(invalid("release.url_template", "must contain the {file} placeholder"));
    }

    if self.release.max_nesting_depth == 0 {
      return Err(invalid("release.max_nesting_depth", "must be at least 1"));
    }

    if self.publish.retries == 0 {
      return Err(invalid("publish.retries", "must be at least 1"));
    }

    if let Some(slug) = &self.repository.slug
      && !is_valid_slug(slug)
    {
      return Err(invalid("repository.slug", "must look like `owner/repo`"));
    }

    Ok(())
  }
}

fn invalid(field: &str, reason: &str) -> TapError {
  TapError::Config(ConfigError::InvalidValue {
    field: field.to_string(),
    reason: reason.to_string(),
  })
}

/// `owner/repo` with no empty halves and no whitespace
pub fn is_valid_slug(slug: &str) -> bool {
  match slug.split_once('/') {
    Some((owner, repo)) => {
      !owner.is_empty() && !repo.is_empty() && !repo.contains('/') && !slug.chars().any(char::is_whitespace)
    }
    None => false,
  }
}
