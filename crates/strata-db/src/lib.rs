//! # strata-db
//!
//! libSQL storage for Strata's hierarchical memory, plus the two engines
//! that run over it.
//!
//! - [`repos`]: entities, relationships, observations, atomic complete-entity
//!   creation, and store-wide reads
//! - [`resolver`]: cross-realm precedence resolution, bounded traversal, and
//!   connection finding
//! - [`consolidation`]: merging of statistical observations that share a
//!   consolidation key, and the periodic scheduler that drives it
//!
//! Everything is exposed as async methods on [`MemoryService`], which owns
//! the database handle and the external collaborators (actor directory,
//! membership directory, schema source, embedder).
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) on a single connection.
//! A transaction on that connection is visible to every statement issued on
//! it, so access goes through an async read/write lock: writers hold the
//! write half for the whole transaction, readers hold the read half for the
//! statements of one operation. Neither half is held across external calls.

pub mod consolidation;
pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod resolver;
pub mod schema_source;
pub mod service;

mod test_support;

pub use error::{DatabaseError, MemoryError};
pub use service::{Collaborators, MemoryService, ServiceSettings};

use std::ops::Deref;
use std::sync::Arc;

use libsql::Builder;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Central database handle.
///
/// Wraps a libSQL database and its one connection. Every `:memory:`
/// connection is a separate database, so the connection is shared rather
/// than pooled.
pub struct StrataDb {
    #[allow(dead_code)]
    db: libsql::Database,
    handle: ConnHandle,
}

/// The shared connection plus the lock that keeps readers out of an open
/// transaction. Cheap to clone.
#[derive(Clone)]
pub struct ConnHandle {
    conn: libsql::Connection,
    lock: Arc<RwLock<()>>,
}

impl ConnHandle {
    fn new(conn: libsql::Connection) -> Self {
        Self {
            conn,
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Wait for any open transaction to finish, then read.
    ///
    /// Never acquire a second reader while holding one: the lock is
    /// write-preferring, so a queued writer would deadlock the pair.
    pub async fn read(&self) -> Reader<'_> {
        Reader {
            _guard: self.lock.read().await,
            conn: &self.conn,
        }
    }

    /// Exclusive access for one transaction or standalone write.
    pub async fn write(&self) -> Writer<'_> {
        Writer {
            _guard: self.lock.write().await,
            conn: &self.conn,
        }
    }
}

/// Shared access to the connection. Derefs to `libsql::Connection`.
pub struct Reader<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    conn: &'a libsql::Connection,
}

impl Deref for Reader<'_> {
    type Target = libsql::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

/// Exclusive access to the connection. Derefs to `libsql::Connection`.
pub struct Writer<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    conn: &'a libsql::Connection,
}

impl Deref for Writer<'_> {
    type Target = libsql::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl StrataDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let strata_db = Self {
            db,
            handle: ConnHandle::new(conn),
        };
        strata_db.run_migrations().await?;
        Ok(strata_db)
    }

    /// The raw connection, bypassing the lock. Only for migrations and
    /// for code already holding a [`Writer`].
    #[must_use]
    pub(crate) const fn conn(&self) -> &libsql::Connection {
        &self.handle.conn
    }

    /// Shared access that never observes an uncommitted transaction.
    pub async fn read(&self) -> Reader<'_> {
        self.handle.read().await
    }

    /// Exclusive access for a write.
    pub async fn write(&self) -> Writer<'_> {
        self.handle.write().await
    }

    /// A clonable handle for collaborators that read the store on their own.
    #[must_use]
    pub fn handle(&self) -> ConnHandle {
        self.handle.clone()
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"ent-a3f8b2c1d4e5f607"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        generate_id(&*self.read().await, prefix).await
    }
}

/// Generate a prefixed ID on a specific connection or transaction.
///
/// Uses `randomblob(8)` in SQL to produce 16 hex chars, then prepends the prefix.
pub(crate) async fn generate_id(
    conn: &libsql::Connection,
    prefix: &str,
) -> Result<String, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT '{prefix}-' || lower(hex(randomblob(8)))"),
            (),
        )
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    Ok(row.get::<String>(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_db() -> StrataDb {
        StrataDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;

        for table in ["entities", "relationships", "observations", "schema_definitions"] {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_are_enabled() {
        let db = test_db().await;
        let mut rows = db.conn().query("PRAGMA foreign_keys", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn generate_id_has_prefix_and_is_unique() {
        let db = test_db().await;
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = db.generate_id("ent").await.unwrap();
            assert!(id.starts_with("ent-"));
            assert_eq!(id.len(), 4 + 16);
            assert!(seen.insert(id));
        }
    }

    #[tokio::test]
    async fn self_edge_is_rejected_by_storage() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO entities (id, realm_kind, realm_id, entity_name, entity_kind, created_at, updated_at)
                 VALUES ('ent-1', 'client', 'c', 'a', 'sop', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap();
        let result = db
            .conn()
            .execute(
                "INSERT INTO relationships (id, from_entity_id, to_entity_id, relation_type, created_at, updated_at)
                 VALUES ('rel-1', 'ent-1', 'ent-1', 'requires', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
