//! Repository methods on `MemoryService`, one module per table plus the
//! cross-table operations.
//!
//! Free functions taking a `&libsql::Connection` are the building blocks
//! shared by single-row writes and the atomic complete-entity path; they run
//! equally on the shared connection or inside a transaction.

pub mod complete;
pub mod entity;
pub mod graph;
pub mod observation;
pub mod relationship;

pub use complete::{CompleteEntity, NewRelation, RelationTarget};
pub use entity::EntityFilter;
