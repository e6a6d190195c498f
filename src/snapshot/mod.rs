//! Schema Snapshot Module
//!
//! Detecting what a deployment changed in the database:
//! - Schema snapshots (point-in-time captures of column metadata)
//! - Schema diff engine (comparing two snapshots)

pub mod store;
pub mod diff;

pub use store::{ColumnDescriptor, SchemaSnapshot, SchemaSnapshotStore};
pub use diff::{ChangeType, DiffEngine, DiffSummary, SchemaDiffEntry};
