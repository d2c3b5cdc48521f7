//! Operator confirmation
//!
//! The pipeline's single suspension point: after a messy upload has been
//! repacked, the operator may look at the result before the run continues.

use crate::core::error::{ResultExt, TapResult};
use std::io::{BufRead, Write};

/// Someone (or something) that answers yes/no questions
pub trait Operator {
  /// Ask `question`; `true` means continue
  fn confirm(&self, question: &str) -> TapResult<bool>;
}

/// Prompts on stdout and reads the answer from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinOperator;

impl Operator for StdinOperator {
  fn confirm(&self, question: &str) -> TapResult<bool> {
    print!("   {} Continue? [y/N] ", question);
    std::io::stdout().flush().context("Failed to flush prompt")?;

    let mut input = String::new();
    std::io::stdin()
      .lock()
      .read_line(&mut input)
      .context("Failed to read input")?;

    Ok(is_yes(&input))
  }
}

/// `--non-interactive`: every question is answered yes without asking
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Operator for AutoApprove {
  fn confirm(&self, question: &str) -> TapResult<bool> {
    log::debug!("auto-approved: {}", question);
    Ok(true)
  }
}

fn is_yes(input: &str) -> bool {
  let input = input.trim().to_lowercase();
  input == "y" || input == "yes"
}
