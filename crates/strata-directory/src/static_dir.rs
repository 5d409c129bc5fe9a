//! In-memory directory for tests and single-node deployments.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use strata_core::{RealmKind, RealmMembership, RealmRef};

use crate::{ActorDirectory, DirectoryError, MembershipDirectory};

/// A directory whose contents live in memory.
///
/// Registering a membership also registers every realm it mentions as an
/// existing actor. `fail_next` injects transient failures for retry tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    actors: RwLock<HashSet<RealmRef>>,
    memberships: RwLock<HashMap<RealmRef, RealmMembership>>,
    pending_failures: AtomicU32,
    exists_calls: AtomicU32,
    membership_calls: AtomicU32,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_actor(self, realm: RealmRef) -> Self {
        self.add_actor(realm);
        self
    }

    #[must_use]
    pub fn with_membership(self, membership: RealmMembership) -> Self {
        self.set_membership(membership);
        self
    }

    pub fn add_actor(&self, realm: RealmRef) {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(realm);
    }

    pub fn remove_actor(&self, realm: &RealmRef) {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(realm);
    }

    pub fn set_membership(&self, membership: RealmMembership) {
        for realm in membership.visible_realms() {
            self.add_actor(realm);
        }
        self.memberships
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(membership.own.clone(), membership);
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `exists` calls received, failed ones included.
    pub fn exists_calls(&self) -> u32 {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// Number of `membership` calls received, failed ones included.
    pub fn membership_calls(&self) -> u32 {
        self.membership_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<(), DirectoryError> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(DirectoryError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn has_actor(&self, realm: &RealmRef) -> bool {
        realm.kind == RealmKind::System
            || self
                .actors
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(realm)
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn exists(&self, realm: &RealmRef) -> Result<bool, DirectoryError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(self.has_actor(realm))
    }
}

#[async_trait]
impl MembershipDirectory for StaticDirectory {
    async fn membership(&self, caller: &RealmRef) -> Result<RealmMembership, DirectoryError> {
        self.membership_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        if let Some(membership) = self
            .memberships
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(caller)
        {
            return Ok(membership.clone());
        }
        if self.has_actor(caller) {
            Ok(RealmMembership::solo(caller.clone()))
        } else {
            Err(DirectoryError::ActorNotFound {
                realm: caller.clone(),
            })
        }
    }
}
