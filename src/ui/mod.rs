//! Terminal interaction: progress bars and operator prompts

pub mod progress;
pub mod prompt;
