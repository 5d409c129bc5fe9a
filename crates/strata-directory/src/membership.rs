//! Short-TTL cache in front of a [`MembershipDirectory`].

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use strata_core::retry::{RetryConfig, retry};
use strata_core::{RealmMembership, RealmRef};

use crate::{DirectoryError, MembershipDirectory};

/// Default time a caller's membership stays cached.
pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(300);

/// Upper bound on cached memberships.
pub const MAX_CACHED_MEMBERSHIPS: u64 = 10_000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Explicitly constructed membership cache handle, shared by `Arc`.
pub struct MembershipCache {
    directory: Arc<dyn MembershipDirectory>,
    cache: Cache<RealmRef, RealmMembership>,
    retry: RetryConfig,
    timeout: Duration,
}

impl MembershipCache {
    #[must_use]
    pub fn new(directory: Arc<dyn MembershipDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_CACHED_MEMBERSHIPS)
                .build(),
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The realms visible to `caller`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::ActorNotFound` for unknown callers and
    /// `DirectoryError::ServiceUnavailable` when the directory stays down.
    pub async fn membership(&self, caller: &RealmRef) -> Result<RealmMembership, DirectoryError> {
        if let Some(hit) = self.cache.get(caller) {
            tracing::debug!(caller = %caller, "membership cache hit");
            return Ok(hit);
        }
        tracing::debug!(caller = %caller, "membership cache miss");

        let membership = retry(&self.retry, "membership", || async {
            match tokio::time::timeout(self.timeout, self.directory.membership(caller)).await {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::Timeout(self.timeout)),
            }
        })
        .await?;

        if membership.own != *caller {
            return Err(DirectoryError::Malformed(format!(
                "membership for {caller} reports own realm {}",
                membership.own
            )));
        }

        self.cache.insert(caller.clone(), membership.clone());
        Ok(membership)
    }

    pub fn invalidate(&self, caller: &RealmRef) {
        self.cache.invalidate(caller);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticDirectory;
    use pretty_assertions::assert_eq;

    fn membership() -> RealmMembership {
        RealmMembership {
            own: RealmRef::synth("s-1"),
            synth_class: Some(RealmRef::synth_class("24")),
            skill_modules: Vec::new(),
            client: Some(RealmRef::client("vervelyn")),
        }
    }

    #[tokio::test]
    async fn membership_is_cached_until_invalidated() {
        let directory = Arc::new(StaticDirectory::new().with_membership(membership()));
        let dir: Arc<dyn MembershipDirectory> = directory.clone();
        let cache = MembershipCache::new(dir, DEFAULT_MEMBERSHIP_TTL);

        let first = cache.membership(&RealmRef::synth("s-1")).await.unwrap();
        let second = cache.membership(&RealmRef::synth("s-1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.membership_calls(), 1);

        cache.invalidate(&RealmRef::synth("s-1"));
        cache.membership(&RealmRef::synth("s-1")).await.unwrap();
        assert_eq!(directory.membership_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_caller_is_not_found() {
        let dir: Arc<dyn MembershipDirectory> = Arc::new(StaticDirectory::new());
        let cache = MembershipCache::new(dir, DEFAULT_MEMBERSHIP_TTL);
        let err = cache.membership(&RealmRef::synth("ghost")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ActorNotFound { .. }));
    }
}
