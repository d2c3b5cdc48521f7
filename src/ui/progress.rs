//! Progress indicators for long-running operations
//!
//! Uses `linya` for allocation-free progress bars. Phase 1 draws one bar over
//! the staged files; a single file gets no bar.

use linya::{Bar, Progress};

/// Progress bar over staged artifacts
pub struct ArtifactProgress {
  progress: Progress,
  bar: Bar,
}

impl ArtifactProgress {
  /// Create a new progress bar, or `None` when there is too little to track
  pub fn new(total: usize, label: impl Into<String>) -> Option<Self> {
    if total < 2 {
      return None;
    }
    let mut progress = Progress::new();
    let bar = progress.bar(total, label.into());
    Some(Self { progress, bar })
  }

  /// Increment progress by 1
  pub fn inc(&mut self) {
    self.progress.inc_and_draw(&self.bar, 1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_no_bar_for_single_file() {
    assert!(ArtifactProgress::new(0, "Inspecting").is_none());
    assert!(ArtifactProgress::new(1, "Inspecting").is_none());
    assert!(ArtifactProgress::new(3, "Inspecting").is_some());
  }
}
