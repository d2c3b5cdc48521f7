//! Utility functions for remote URLs, atomic writes and cross-platform path handling

use crate::core::error::{ResultExt, TapResult};
use std::io::Write;
use std::path::Path;

/// Extract `owner/repo` from a GitHub remote URL
///
/// Accepts:
/// - SSH URLs: git@github.com:owner/repo.git
/// - HTTPS URLs: <https://github.com/owner/repo.git>
/// - ssh:// URLs: ssh://git@github.com/owner/repo
///
/// Returns None for non-GitHub remotes and local paths.
pub fn parse_github_slug(remote_url: &str) -> Option<String> {
  let url = remote_url.trim();
  let (_, rest) = url.split_once("github.com")?;

  // Separator after the host is ':' for scp-style SSH, '/' otherwise
  let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('/'))?;
  let rest = rest.trim_end_matches('/');
  let rest = rest.strip_suffix(".git").unwrap_or(rest);

  let mut parts = rest.splitn(3, '/');
  let owner = parts.next()?;
  let repo = parts.next()?;
  if owner.is_empty() || repo.is_empty() || parts.next().is_some() {
    return None;
  }

  Some(format!("{}/{}", owner, repo))
}

/// Replace `path` with `contents` atomically
///
/// Writes a temporary file in the same directory, syncs it, then renames it
/// over the target. A crash leaves either the old or the new file, never a
/// partial one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> TapResult<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

  let mut tmp = tempfile::NamedTempFile::new_in(dir)
    .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
  tmp.write_all(contents)?;
  tmp.as_file().sync_all()?;
  tmp
    .persist(path)
    .with_context(|| format!("Failed to replace {}", path.display()))?;
  Ok(())
}

/// Convert a path to Git format (always forward slashes)
///
/// Git expects paths with forward slashes, even on Windows.
pub fn path_to_git_format(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}
