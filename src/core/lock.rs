//! Single-writer run lock
//!
//! One coordinator owns the definition store and state file at a time. The lock
//! is an advisory OS lock on `.git/tap-release.lock` (see
//! `TapContext::lock_path`). The file also records the holder's pid and start
//! time so a refusal can say who is running. The OS releases the lock when the
//! process exits, so a crashed run never leaves a stale lock behind.

use crate::core::error::{ReleaseError, ResultExt, TapResult};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Written into the lock file for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub started_at: DateTime<Utc>,
}

impl std::fmt::Display for LockHolder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "pid {} since {}", self.pid, self.started_at.to_rfc3339())
  }
}

/// Held for the lifetime of a run; unlocks on drop
#[derive(Debug)]
pub struct RunLock {
  file: File,
}

impl RunLock {
  /// Acquire the lock or fail with `ConcurrentRunDetected`
  pub fn acquire(path: &Path) -> TapResult<Self> {
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path)
      .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
      let mut content = String::new();
      let holder = match file.read_to_string(&mut content) {
        Ok(_) => serde_json::from_str::<LockHolder>(&content)
          .map(|h| h.to_string())
          .unwrap_or_else(|_| "unknown holder".to_string()),
        Err(_) => "unknown holder".to_string(),
      };
      return Err(
        ReleaseError::ConcurrentRunDetected {
          lock_path: path.to_path_buf(),
          holder,
        }
        .into(),
      );
    }

    let holder = LockHolder {
      pid: std::process::id(),
      started_at: Utc::now(),
    };
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serde_json::to_string(&holder)?.as_bytes())?;
    file.sync_all()?;
    log::debug!("acquired run lock {} ({})", path.display(), holder);

    Ok(Self { file })
  }
}

impl Drop for RunLock {
  fn drop(&mut self) {
    let _ = self.file.set_len(0);
    let _ = FileExt::unlock(&self.file);
  }
}
