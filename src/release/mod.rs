//! Release pipeline: planning, state, publishing and orchestration
//!
//! # Core Invariants
//!
//! 1. **One run, one repository version**
//!    - The bump class is the most severe trigger in the run, never a sum
//!    - Once resolved, the plan is immutable (and checkpointed as `pending`)
//!
//! 2. **Nothing external before the plan is valid**
//!    - Definitions are written only after every new text has been computed
//!    - Commit, push and publish follow the persisted state entry
//!
//! 3. **Re-runs are safe**
//!    - Released checksums are never released twice
//!    - Publishing skips releases and assets that already exist
//!
//! # Architecture
//!
//! - **plan**: `BumpClass`, `ReleasePlan`, `VersionResolver`
//! - **state**: `StateStore` over `state.json`
//! - **publish**: `ReleaseHost` seam and the `gh` implementation
//! - **notes**: release title/body and commit message
//! - **docs**: `APPS.md` catalog
//! - **coordinator**: the phase state machine

pub mod coordinator;
pub mod docs;
pub mod notes;
pub mod plan;
pub mod publish;
pub mod state;

pub use coordinator::{Collaborators, ReleaseCoordinator, RunOptions, RunReport};
pub use publish::GhCli;
pub use state::StateStore;
