//! Two-tier checkpoint storage inside the host git repository.
//!
//! Temporary full-state snapshots live on per-base shadow branches
//! (`entire/<short-hash>`); permanent metadata records live on the single
//! `entire/sessions` branch, sharded by checkpoint id. Condensation
//! promotes the former into the latter when the user commits.

pub mod condense;
pub mod janitor;
pub mod lock;
pub mod repo;
pub mod sessions;
pub mod shadow;
pub mod state;

pub use condense::Condenser;
pub use lock::StateLock;
pub use repo::GitStore;
pub use sessions::{CommittedMetadata, CommittedRecord, SessionsStore};
pub use shadow::{ShadowStore, Snapshot, SnapshotInfo};
pub use state::{SessionState, StateStore};
