//! # strata-core
//!
//! Core types, ID generation, and error types for Strata.
//!
//! This crate provides the foundational types shared across all Strata crates:
//! - The closed realm union (`RealmKind`) with its fixed precedence tiers
//! - Entity, relationship, observation, and schema-definition structs
//! - The validation stamp written into validated metadata
//! - ID prefix constants and entity-name rules
//! - Resolution, traversal, and consolidation response types
//! - Bounded exponential-backoff retry shared by every external call
//! - Cross-cutting error types

pub mod entities;
pub mod errors;
pub mod ids;
pub mod names;
pub mod realm;
pub mod responses;
pub mod retry;

pub use errors::CoreError;
pub use realm::{RealmKind, RealmMembership, RealmRef};
