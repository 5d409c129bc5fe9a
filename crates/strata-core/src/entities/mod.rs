//! Entity structs for the memory store.
//!
//! Each struct maps to a table in the libSQL database. All of them derive
//! `Serialize`, `Deserialize`, and `JsonSchema` for JSON roundtrip and schema
//! export.

mod entity;
mod observation;
mod relationship;
mod schema;
mod stamp;

pub use entity::{Entity, Metadata};
pub use observation::{DEFAULT_SOURCE, NewObservation, Observation, ObservationState};
pub use relationship::{RelationType, Relationship};
pub use schema::SchemaDefinition;
pub use stamp::{VALIDATION_KEY, ValidationStamp};
