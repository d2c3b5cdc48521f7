//! `APPS.md` catalog of every published definition (Phase 5)

use crate::cask::{CaskDocument, DefinitionRecord};
use crate::core::error::{ResultExt, TapResult};
use crate::utils::write_atomic;
use std::fs;
use std::path::Path;

/// Read every definition in the store, sorted by token
///
/// Definitions this tool cannot summarize are left out of the catalog with a
/// warning; they are still published as written.
pub fn load_records(casks_dir: &Path) -> TapResult<Vec<DefinitionRecord>> {
  if !casks_dir.exists() {
    return Ok(Vec::new());
  }

  let mut records = Vec::new();
  for entry in fs::read_dir(casks_dir).with_context(|| format!("Failed to read {}", casks_dir.display()))? {
    let path = entry?.path();
    if path.extension().and_then(|e| e.to_str()) != Some("rb") {
      continue;
    }
    let Some(token) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
      continue;
    };

    let source = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    match CaskDocument::parse(&token, &source).and_then(|doc| DefinitionRecord::from_document(&token, &doc)) {
      Ok(record) => records.push(record),
      Err(e) => log::warn!("leaving {} out of the catalog: {}", token, e),
    }
  }

  records.sort_by(|a, b| a.token.cmp(&b.token));
  Ok(records)
}

/// Markdown table of apps with their install commands
pub fn render_catalog(records: &[DefinitionRecord], tap_name: &str) -> String {
  let mut out = String::from("# Apps\n\n");
  if records.is_empty() {
    out.push_str("No apps published yet.\n");
    return out;
  }

  out.push_str(&format!("Tap: `brew tap {}`\n\n", tap_name));
  out.push_str("| App | Token | Version | Install |\n");
  out.push_str("|-----|-------|---------|---------|\n");
  for record in records {
    out.push_str(&format!(
      "| {} | `{}` | {} | `brew install {}/{}` |\n",
      record.name, record.token, record.version, tap_name, record.token
    ));
  }
  out
}

/// Regenerate the catalog; returns whether the file changed
pub fn write_catalog(casks_dir: &Path, docs_path: &Path, tap_name: &str) -> TapResult<bool> {
  let catalog = render_catalog(&load_records(casks_dir)?, tap_name);
  if fs::read_to_string(docs_path).ok().as_deref() == Some(catalog.as_str()) {
    return Ok(false);
  }
  write_atomic(docs_path, catalog.as_bytes())?;
  Ok(true)
}
