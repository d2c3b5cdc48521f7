//! Upload artifacts: naming, checksums, inspection and canonical repacking
//!
//! Phase 1 of a release runs every staged file through
//! [`ArtifactNormalizer`], which leaves behind one canonical
//! `AppName-Version.ext` file per upload and an [`UploadArtifact`] describing it.
//! All OS tooling is reached through [`PlatformTools`] so tests can swap it out.

pub mod checksum;
pub mod inspect;
pub mod metadata;
pub mod naming;
pub mod normalize;
pub mod tools;

pub use checksum::sha256_file;
pub use inspect::PayloadKind;
pub use naming::CanonicalName;
pub use normalize::{ArtifactNormalizer, UploadArtifact};
pub use tools::{PlatformTools, SystemTools, Verification};
