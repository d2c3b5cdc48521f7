//! Package definition mutation (Phase 4)
//!
//! An existing definition gets exactly three values rewritten (`version`,
//! `sha256`, `url`) and, for unverified artifacts, a quarantine-removal stanza
//! appended if it has none. A missing definition is rendered from the template.
//! Stanzas are only ever added, never removed.
//!
//! All new texts are computed before anything is written, so a record that
//! cannot be edited aborts the phase with every file untouched.

use crate::artifact::PayloadKind;
use crate::cask::document::{CaskDocument, EDITABLE_FIELDS};
use crate::cask::template::{ArtifactStanza, NewRecord, quarantine_stanza, render_new};
use crate::core::error::{ResultExt, TapResult};
use crate::utils::write_atomic;
use similar::TextDiff;
use std::path::{Path, PathBuf};

/// What the mutator needs to know about one artifact
#[derive(Debug, Clone)]
pub struct RecordInput<'a> {
  pub token: &'a str,
  pub name: &'a str,
  pub version: &'a str,
  pub sha256: &'a str,
  pub url: &'a str,
  pub payload: PayloadKind,
  pub bundle_name: &'a str,
  pub identifier: Option<&'a str>,
  pub unverified: bool,
}

/// Summary of a definition as published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRecord {
  pub token: String,
  pub name: String,
  pub version: String,
  pub sha256: String,
  pub url: String,
  pub payload: PayloadKind,
  pub quarantine: bool,
}

impl DefinitionRecord {
  /// Read the summary back out of a parsed definition
  pub fn from_document(token: &str, doc: &CaskDocument) -> TapResult<Self> {
    Ok(Self {
      token: token.to_string(),
      name: doc.first_value("name").unwrap_or_else(|| token.to_string()),
      version: doc.value("version")?,
      sha256: doc.value("sha256")?,
      url: doc.value("url")?,
      payload: if doc.has("pkg") {
        PayloadKind::Installer
      } else {
        PayloadKind::Bundle
      },
      quarantine: doc.has_quarantine_stanza(),
    })
  }
}

/// One definition's before/after
#[derive(Debug, Clone)]
pub struct RecordChange {
  pub token: String,
  pub path: PathBuf,
  pub before: Option<String>,
  pub after: String,
  pub record: DefinitionRecord,
  pub quarantine_added: bool,
}

impl RecordChange {
  pub fn is_new(&self) -> bool {
    self.before.is_none()
  }

  /// Unified diff against the current file (`/dev/null` for new records)
  pub fn diff(&self) -> String {
    let before = self.before.as_deref().unwrap_or("");
    let old_name = if self.is_new() {
      "/dev/null".to_string()
    } else {
      format!("a/{}.rb", self.token)
    };
    let new_name = format!("b/{}.rb", self.token);

    TextDiff::from_lines(before, self.after.as_str())
      .unified_diff()
      .context_radius(1)
      .header(&old_name, &new_name)
      .to_string()
  }
}

/// Applies artifacts to definitions
pub struct PackageDefinitionMutator<'a> {
  homepage: &'a str,
}

impl<'a> PackageDefinitionMutator<'a> {
  pub fn new(homepage: &'a str) -> Self {
    Self { homepage }
  }

  /// Compute the new text for one definition
  ///
  /// `existing` is the current file content, if the record exists.
  pub fn apply(&self, input: &RecordInput<'_>, path: &Path, existing: Option<&str>) -> TapResult<RecordChange> {
    let (doc, created) = match existing {
      Some(text) => (CaskDocument::parse(input.token, text)?, false),
      None => {
        let fresh = render_new(&self.new_record(input));
        (CaskDocument::parse(input.token, &fresh)?, true)
      }
    };

    let needs_quarantine = input.unverified && !doc.has_quarantine_stanza();
    let insert = needs_quarantine.then(|| {
      let bundle = doc
        .first_value("app")
        .and_then(|app| app.strip_suffix(".app").map(String::from))
        .unwrap_or_else(|| input.bundle_name.to_string());
      quarantine_stanza(&bundle)
    });

    let updates: Vec<(&str, &str)> = if created {
      Vec::new()
    } else {
      EDITABLE_FIELDS
        .into_iter()
        .zip([input.version, input.sha256, input.url])
        .collect()
    };
    let after = doc.render(&updates, insert.as_deref())?;

    let record = DefinitionRecord::from_document(input.token, &CaskDocument::parse(input.token, &after)?)?;

    Ok(RecordChange {
      token: input.token.to_string(),
      path: path.to_path_buf(),
      before: existing.map(String::from),
      after,
      record,
      quarantine_added: needs_quarantine,
    })
  }

  fn new_record<'b>(&self, input: &'b RecordInput<'b>) -> NewRecord<'b>
  where
    'a: 'b,
  {
    let stanza = match input.payload {
      PayloadKind::Bundle => ArtifactStanza::App {
        bundle: input.bundle_name.to_string(),
      },
      PayloadKind::Installer => ArtifactStanza::Pkg {
        name: input.name.to_string(),
        identifier: input.identifier.map(String::from),
      },
    };
    NewRecord {
      token: input.token,
      name: input.name,
      version: input.version,
      sha256: input.sha256,
      url: input.url,
      homepage: self.homepage,
      stanza,
    }
  }
}

/// Write every changed definition
///
/// Files whose content is already `after` are left alone so a resumed run
/// does not touch their modification time.
pub fn write_changes(changes: &[RecordChange]) -> TapResult<usize> {
  let mut written = 0;
  for change in changes {
    if change.before.as_deref() == Some(change.after.as_str()) {
      continue;
    }
    write_atomic(&change.path, change.after.as_bytes())
      .with_context(|| format!("Failed to write definition {}", change.path.display()))?;
    written += 1;
  }
  Ok(written)
}
