//! Release title, notes and commit message

use crate::release::plan::{PlannedChange, ReleasePlan};

/// `Release v0.2.0`
pub fn release_title(tag: &str) -> String {
  format!("Release {}", tag)
}

/// Markdown body: `## Updates` followed by one bullet per app
pub fn release_notes(changes: &[PlannedChange]) -> String {
  let mut notes = String::from("## Updates\n");
  for change in changes {
    notes.push_str(&format!("* {}\n", change.summary()));
  }
  notes
}

/// `Update apps: FineTune, MyTool (Bump to v0.2.0)`
pub fn commit_message(plan: &ReleasePlan) -> String {
  let names: Vec<&str> = plan.changes.iter().map(|c| c.name.as_str()).collect();
  format!("Update apps: {} (Bump to {})", names.join(", "), plan.tag())
}
