//! Actor resolver: cached existence checks in front of an [`ActorDirectory`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use strata_core::retry::{RetryConfig, retry};
use strata_core::{RealmKind, RealmRef};

use crate::{ActorDirectory, DirectoryError};

/// Default time an existence answer stays cached.
pub const DEFAULT_ACTOR_TTL: Duration = Duration::from_secs(300);

/// Upper bound on cached existence answers.
pub const MAX_CACHED_ACTORS: u64 = 10_000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Validates that the actor owning a realm exists.
///
/// Both positive and negative answers are cached for the TTL, up to
/// [`MAX_CACHED_ACTORS`] entries. Transient directory failures are retried
/// and never cached.
pub struct ActorResolver {
    directory: Arc<dyn ActorDirectory>,
    cache: Cache<RealmRef, bool>,
    retry: RetryConfig,
    timeout: Duration,
}

impl ActorResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn ActorDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_CACHED_ACTORS)
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

    /// Whether the realm's actor exists.
    ///
    /// `System` realms always exist and bypass the directory.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::ServiceUnavailable` when transient failures
    /// outlast the retry policy, or the directory's permanent error.
    pub async fn exists(&self, realm: &RealmRef) -> Result<bool, DirectoryError> {
        if realm.kind == RealmKind::System {
            return Ok(true);
        }
        if let Some(hit) = self.cache.get(realm) {
            tracing::debug!(realm = %realm, exists = hit, "actor cache hit");
            return Ok(hit);
        }
        tracing::debug!(realm = %realm, "actor cache miss");

        let exists = retry(&self.retry, "actor_exists", || async {
            match tokio::time::timeout(self.timeout, self.directory.exists(realm)).await {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::Timeout(self.timeout)),
            }
        })
        .await?;

        self.cache.insert(realm.clone(), exists);
        Ok(exists)
    }

    /// Fail unless the realm's actor exists.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::ActorNotFound` when the directory says no,
    /// plus any error from [`Self::exists`].
    pub async fn validate(&self, realm: &RealmRef) -> Result<(), DirectoryError> {
        if self.exists(realm).await? {
            Ok(())
        } else {
            Err(DirectoryError::ActorNotFound {
                realm: realm.clone(),
            })
        }
    }

    /// Check several realms, deduplicated. Stops at the first directory error.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Self::exists`].
    pub async fn validate_batch(
        &self,
        realms: &[RealmRef],
    ) -> Result<BTreeMap<RealmRef, bool>, DirectoryError> {
        let mut results = BTreeMap::new();
        for realm in realms {
            if results.contains_key(realm) {
                continue;
            }
            let exists = self.exists(realm).await?;
            results.insert(realm.clone(), exists);
        }
        Ok(results)
    }

    /// Drop cached answers for every realm of `kind`. Returns the count dropped.
    pub fn invalidate(&self, kind: RealmKind) -> usize {
        let stale: Vec<RealmRef> = self
            .cache
            .iter()
            .filter(|(realm, _)| realm.kind == kind)
            .map(|(realm, _)| RealmRef::clone(&realm))
            .collect();
        let dropped = stale.len();
        for realm in &stale {
            self.cache.invalidate(realm);
        }
        tracing::debug!(kind = %kind, dropped, "actor cache invalidated");
        dropped
    }

    /// Drop the cached answer for one realm.
    pub fn invalidate_realm(&self, realm: &RealmRef) {
        self.cache.invalidate(realm);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticDirectory;
    use pretty_assertions::assert_eq;

    fn resolver(directory: &Arc<StaticDirectory>) -> ActorResolver {
        let dir: Arc<dyn ActorDirectory> = directory.clone();
        ActorResolver::new(dir, DEFAULT_ACTOR_TTL).with_retry(RetryConfig::immediate(3))
    }

    #[tokio::test]
    async fn known_actor_validates_and_is_cached() {
        let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::client("vervelyn")));
        let resolver = resolver(&directory);

        resolver.validate(&RealmRef::client("vervelyn")).await.unwrap();
        resolver.validate(&RealmRef::client("vervelyn")).await.unwrap();
        assert_eq!(directory.exists_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_actor_is_not_found_and_negative_is_cached() {
        let directory = Arc::new(StaticDirectory::new());
        let resolver = resolver(&directory);

        let err = resolver.validate(&RealmRef::synth("ghost")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ActorNotFound { .. }));
        assert!(!err.is_retryable());

        let _ = resolver.validate(&RealmRef::synth("ghost")).await;
        assert_eq!(directory.exists_calls(), 1);
    }

    #[tokio::test]
    async fn system_realm_skips_directory() {
        let directory = Arc::new(StaticDirectory::new());
        let resolver = resolver(&directory);
        resolver
            .validate(&RealmRef::new(RealmKind::System, "core"))
            .await
            .unwrap();
        assert_eq!(directory.exists_calls(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::synth_class("24")));
        directory.fail_next(2);
        let resolver = resolver(&directory);

        resolver.validate(&RealmRef::synth_class("24")).await.unwrap();
        assert_eq!(directory.exists_calls(), 3);
    }

    #[tokio::test]
    async fn persistent_outage_becomes_service_unavailable() {
        let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::synth_class("24")));
        directory.fail_next(10);
        let resolver = resolver(&directory);

        let err = resolver.validate(&RealmRef::synth_class("24")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ServiceUnavailable { attempts: 3, .. }));
        // Failures are not cached, so the next call hits the directory again.
        directory.fail_next(0);
        resolver.validate(&RealmRef::synth_class("24")).await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_by_kind_forces_refetch() {
        let directory = Arc::new(
            StaticDirectory::new()
                .with_actor(RealmRef::client("vervelyn"))
                .with_actor(RealmRef::synth_class("24")),
        );
        let resolver = resolver(&directory);
        resolver.validate(&RealmRef::client("vervelyn")).await.unwrap();
        resolver.validate(&RealmRef::synth_class("24")).await.unwrap();

        directory.remove_actor(&RealmRef::client("vervelyn"));
        assert_eq!(resolver.invalidate(RealmKind::Client), 1);

        assert!(resolver.validate(&RealmRef::client("vervelyn")).await.is_err());
        resolver.validate(&RealmRef::synth_class("24")).await.unwrap();
        assert_eq!(directory.exists_calls(), 3);
    }

    #[tokio::test]
    async fn answers_expire_after_the_ttl() {
        let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::client("vervelyn")));
        let dir: Arc<dyn ActorDirectory> = directory.clone();
        let resolver = ActorResolver::new(dir, Duration::from_millis(50));

        resolver.validate(&RealmRef::client("vervelyn")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        resolver.validate(&RealmRef::client("vervelyn")).await.unwrap();
        assert_eq!(directory.exists_calls(), 2);
    }

    #[tokio::test]
    async fn cache_stays_bounded() {
        let directory = Arc::new(StaticDirectory::new());
        let resolver = resolver(&directory);
        let realms: Vec<RealmRef> = (0..200).map(|i| RealmRef::synth(format!("s-{i}"))).collect();
        resolver.validate_batch(&realms).await.unwrap();

        resolver.cache.run_pending_tasks();
        assert!(resolver.cache.entry_count() <= MAX_CACHED_ACTORS);
        assert_eq!(resolver.cache.policy().max_capacity(), Some(MAX_CACHED_ACTORS));
        resolver.invalidate_all();
        resolver.cache.run_pending_tasks();
        assert_eq!(resolver.cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn batch_deduplicates() {
        let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::client("vervelyn")));
        let resolver = resolver(&directory);
        let results = resolver
            .validate_batch(&[
                RealmRef::client("vervelyn"),
                RealmRef::client("vervelyn"),
                RealmRef::synth("ghost"),
            ])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&RealmRef::client("vervelyn")], true);
        assert_eq!(results[&RealmRef::synth("ghost")], false);
    }
}
