//! Homebrew cask definitions: parsing, templating and in-place mutation

pub mod document;
pub mod mutate;
pub mod template;

pub use document::CaskDocument;
pub use mutate::{DefinitionRecord, PackageDefinitionMutator, RecordChange, RecordInput, write_changes};
