//! Persistent backends for the [`gm_core`] classifier.
//!
//! Three adapters with different durability and cost trade-offs:
//! - [`SnapshotStore`]: everything in memory, one JSON file per `store`
//! - [`IncrementalStore`]: SQLite, flush cost sized to the training delta
//! - [`ImmutableHashStore`]: a constant-database file rebuilt on `store`
//!
//! The constant-database engine itself lives in [`cdb`] and knows nothing
//! about classifiers; [`lock`] holds the shared file-locking and
//! atomic-replacement plumbing.

pub mod cdb;
pub mod immutable;
pub mod incremental;
pub mod lock;
pub mod snapshot;

pub use cdb::{Cdb, CdbWriter, cdb_hash};
pub use immutable::ImmutableHashStore;
pub use incremental::IncrementalStore;
pub use lock::{DEFAULT_LOCK_TIMEOUT, FileLock};
pub use snapshot::SnapshotStore;
