//! # strata-directory
//!
//! Actor existence checks and realm-membership lookup.
//!
//! The directory itself is an external service. This crate defines the
//! traits it is consumed through, an HTTP client for it, an in-memory
//! implementation for tests and single-node use, and the two caching
//! front-ends the memory service holds:
//!
//! - [`ActorResolver`] answers "does this realm's actor exist?" with a TTL
//!   cache, explicit invalidation, timeouts, and bounded retry.
//! - [`MembershipCache`] answers "which realms can this caller see?" with a
//!   short-TTL cache in front of the membership directory.

mod error;
mod http;
mod membership;
mod resolver;
mod static_dir;

pub use error::DirectoryError;
pub use http::HttpActorDirectory;
pub use membership::{DEFAULT_MEMBERSHIP_TTL, MAX_CACHED_MEMBERSHIPS, MembershipCache};
pub use resolver::{ActorResolver, DEFAULT_ACTOR_TTL, MAX_CACHED_ACTORS};
pub use static_dir::StaticDirectory;

use async_trait::async_trait;
use strata_core::{RealmMembership, RealmRef};

/// Source of truth for actor existence.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Whether the actor owning `realm` exists.
    async fn exists(&self, realm: &RealmRef) -> Result<bool, DirectoryError>;
}

/// Source of truth for which realms a caller belongs to.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// The realms visible to `caller`.
    ///
    /// Returns `DirectoryError::ActorNotFound` for unknown callers.
    async fn membership(&self, caller: &RealmRef) -> Result<RealmMembership, DirectoryError>;
}
