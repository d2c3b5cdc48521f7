//! Streaming SHA-256 of artifact contents

use crate::core::error::{ResultExt, TapResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Lower-case hex SHA-256 of a file, read in 8 KiB chunks
pub fn sha256_file(path: &Path) -> TapResult<String> {
  let mut file = File::open(path).with_context(|| format!("Failed to open {} for hashing", path.display()))?;
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 8192];

  loop {
    let n = file
      .read(&mut buf)
      .with_context(|| format!("Failed to read {}", path.display()))?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }

  Ok(format!("{:x}", hasher.finalize()))
}
