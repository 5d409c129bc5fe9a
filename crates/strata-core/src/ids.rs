//! ID prefix constants.
//!
//! Every stored row gets a prefixed ID of the form `{prefix}-{16 hex chars}`,
//! generated by the database layer.

pub const PREFIX_ENTITY: &str = "ent";
pub const PREFIX_RELATIONSHIP: &str = "rel";
pub const PREFIX_OBSERVATION: &str = "obs";

/// All prefixes, for exhaustive tests.
pub const ALL_PREFIXES: [&str; 3] = [PREFIX_ENTITY, PREFIX_RELATIONSHIP, PREFIX_OBSERVATION];

/// Return the prefix of an ID, if it has one.
#[must_use]
pub fn prefix_of(id: &str) -> Option<&str> {
    id.split_once('-').map(|(prefix, _)| prefix)
}
