//! Unified repository context - build once, pass everywhere
//!
//! # Design
//!
//! TapContext carries everything a run needs to know about the tap repository:
//! its root, the loaded configuration, the resolved `owner/repo` slug and the
//! absolute locations of the staging folder, archive folder, definition store,
//! state file and docs catalog. It is built once in the command layer and passed
//! by reference through every phase; nothing reads ambient globals.
//!
//! ```text
//! commands/release.rs:
//!   TapContext::build() -> &TapContext
//!   |
//!   v
//! release/coordinator.rs:
//!   Coordinator::new(&ctx, collaborators).run(options)
//! ```

use crate::core::config::{TapConfig, is_valid_slug};
use crate::core::error::{ConfigError, TapError, TapResult};
use crate::core::vcs::SystemGit;
use crate::utils::parse_github_slug;
use std::path::{Path, PathBuf};

/// Repository context shared by all phases of a run.
#[derive(Debug, Clone)]
pub struct TapContext {
  /// Tap repository root (absolute path)
  pub root: PathBuf,

  /// Loaded configuration (defaults when no tap.toml exists)
  pub config: TapConfig,

  /// `owner/repo` of the hosted repository
  pub repo_slug: String,
}

impl TapContext {
  /// Build the context for a repository root.
  ///
  /// Slug resolution order: `[repository] slug`, `GITHUB_REPOSITORY`,
  /// then the configured git remote's URL.
  pub fn build(root: &Path) -> TapResult<Self> {
    let config = TapConfig::load(root)?;
    let env_slug = std::env::var("GITHUB_REPOSITORY").ok();

    let repo_slug = match resolve_slug(&config, env_slug.as_deref()) {
      Some(slug) => slug,
      None => slug_from_remote(root, &config.git.remote).ok_or_else(|| {
        TapError::Config(ConfigError::MissingRepository {
          root: root.to_path_buf(),
        })
      })?,
    };

    Ok(Self::new(root.to_path_buf(), config, repo_slug))
  }

  /// Assemble a context from parts (used by tests and `build`)
  pub fn new(root: PathBuf, config: TapConfig, repo_slug: impl Into<String>) -> Self {
    Self {
      root,
      config,
      repo_slug: repo_slug.into(),
    }
  }

  /// Staging folder scanned for uploads
  pub fn upload_dir(&self) -> PathBuf {
    self.root.join(&self.config.paths.upload)
  }

  /// Folder released artifacts are archived to
  pub fn uploaded_dir(&self) -> PathBuf {
    self.root.join(&self.config.paths.uploaded)
  }

  /// Package definition store
  pub fn casks_dir(&self) -> PathBuf {
    self.root.join(&self.config.paths.casks)
  }

  /// Definition file for a token
  pub fn cask_path(&self, token: &str) -> PathBuf {
    self.casks_dir().join(format!("{}.rb", token))
  }

  /// Persisted state file
  pub fn state_path(&self) -> PathBuf {
    self.root.join(&self.config.paths.state)
  }

  /// Generated catalog
  pub fn docs_path(&self) -> PathBuf {
    self.root.join(&self.config.paths.docs)
  }

  /// Run lock file, kept inside `.git/` so it never shows up as a change
  ///
  /// Roots without a `.git` directory (worktrees, plain folders) fall back to
  /// a dot-file in the root.
  pub fn lock_path(&self) -> PathBuf {
    let git_dir = self.root.join(".git");
    if git_dir.is_dir() {
      git_dir.join("tap-release.lock")
    } else {
      self.root.join(".tap-release.lock")
    }
  }

  /// Paths committed at the end of a release (relative to the root)
  pub fn tracked_paths(&self) -> Vec<PathBuf> {
    vec![
      self.config.paths.casks.clone(),
      self.config.paths.state.clone(),
      self.config.paths.docs.clone(),
    ]
  }

  /// Homepage for newly created records
  pub fn homepage(&self) -> String {
    format!("https://github.com/{}", self.repo_slug)
  }

  /// Download URL for an asset of release `version`
  pub fn download_url(&self, version: &semver::Version, file: &str) -> String {
    self
      .config
      .release
      .url_template
      .replace("{repo}", &self.repo_slug)
      .replace("{tag}", &format!("v{}", version))
      .replace("{version}", &version.to_string())
      .replace("{file}", file)
  }

  /// `brew tap` name: `owner/homebrew-tools` is tapped as `owner/tools`
  pub fn tap_name(&self) -> String {
    match self.repo_slug.split_once('/') {
      Some((owner, repo)) => format!("{}/{}", owner, repo.strip_prefix("homebrew-").unwrap_or(repo)),
      None => self.repo_slug.clone(),
    }
  }
}

fn resolve_slug(config: &TapConfig, env_slug: Option<&str>) -> Option<String> {
  if let Some(slug) = &config.repository.slug {
    return Some(slug.clone());
  }
  env_slug
    .map(str::trim)
    .filter(|s| is_valid_slug(s))
    .map(String::from)
}

fn slug_from_remote(root: &Path, remote: &str) -> Option<String> {
  let git = SystemGit::open(root).ok()?;
  let url = git.remote_url(remote).ok()??;
  log::debug!("deriving repository slug from remote {} ({})", remote, url);
  parse_github_slug(&url)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx(slug: &str) -> TapContext {
    TapContext::new(PathBuf::from("/tap"), TapConfig::default(), slug)
  }

  #[test]
  fn test_resolved_paths() {
    let ctx = ctx("acme/homebrew-tools");
    assert_eq!(ctx.upload_dir(), PathBuf::from("/tap/upload"));
    assert_eq!(ctx.cask_path("fine-tune"), PathBuf::from("/tap/Casks/fine-tune.rb"));
    assert_eq!(ctx.state_path(), PathBuf::from("/tap/state.json"));
  }

  #[test]
  fn test_download_url_default_template() {
    let ctx = ctx("acme/homebrew-tools");
    let url = ctx.download_url(&semver::Version::new(0, 2, 0), "FineTune-1.0.0.dmg");
    assert_eq!(
      url,
      "https://github.com/acme/homebrew-tools/releases/download/v0.2.0/FineTune-1.0.0.dmg"
    );
  }

  #[test]
  fn test_tap_name_strips_homebrew_prefix() {
    assert_eq!(ctx("acme/homebrew-tools").tap_name(), "acme/tools");
    assert_eq!(ctx("acme/casks").tap_name(), "acme/casks");
  }

  #[test]
  fn test_lock_lives_in_git_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = TapContext::new(dir.path().to_path_buf(), TapConfig::default(), "acme/homebrew-tools");
    assert_eq!(ctx.lock_path(), dir.path().join(".tap-release.lock"));

    std::fs::create_dir(dir.path().join(".git")).unwrap();
    assert_eq!(ctx.lock_path(), dir.path().join(".git/tap-release.lock"));
  }

  #[test]
  fn test_slug_precedence() {
    let mut config = TapConfig::default();
    assert_eq!(resolve_slug(&config, Some("env/repo")).as_deref(), Some("env/repo"));
    assert_eq!(resolve_slug(&config, Some("garbage")), None);

    config.repository.slug = Some("file/repo".to_string());
    assert_eq!(resolve_slug(&config, Some("env/repo")).as_deref(), Some("file/repo"));
  }
}
