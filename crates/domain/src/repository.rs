//! Persistence contracts shared by every repository, plus the versioned
//! in-memory table backing the in-memory implementations.

use std::collections::HashMap;

use common::Version;
use thiserror::Error;

use crate::aggregate::Aggregate;

/// Errors surfaced by repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The stored version moved on since the aggregate was loaded.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A natural key (code, provider transaction id, ...) is already taken.
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// The aggregate was never inserted, so it cannot be saved.
    #[error("{entity} has not been persisted yet")]
    NotPersisted { entity: &'static str },

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Builds a not-found error for an aggregate type.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Versioned rows keyed by storage-assigned id.
///
/// Mirrors the guarantees a database-backed repository gives: ids come from a
/// sequence, and a save only succeeds when the caller's version matches the
/// stored one.
#[derive(Debug)]
pub(crate) struct VersionedTable<A: Aggregate> {
    rows: HashMap<A::Id, A>,
    next_id: i64,
}

impl<A: Aggregate> Default for VersionedTable<A> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<A: Aggregate> VersionedTable<A> {
    /// Hands out the next sequence value.
    pub(crate) fn allocate_id(&mut self) -> A::Id {
        self.next_id += 1;
        A::Id::from(self.next_id)
    }

    /// Stores an aggregate that already carries its freshly allocated id.
    pub(crate) fn insert(&mut self, mut aggregate: A) -> RepositoryResult<A> {
        let id = aggregate.id().ok_or(RepositoryError::NotPersisted {
            entity: A::aggregate_type(),
        })?;
        aggregate.set_version(Version::first());
        self.rows.insert(id, aggregate.clone());
        Ok(aggregate)
    }

    pub(crate) fn get(&self, id: A::Id) -> Option<&A> {
        self.rows.get(&id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &A> {
        self.rows.values()
    }

    /// Checks that the stored row is at the caller's version and returns its id.
    pub(crate) fn ensure_current(&self, aggregate: &A) -> RepositoryResult<A::Id> {
        let entity = A::aggregate_type();
        let id = aggregate
            .id()
            .ok_or(RepositoryError::NotPersisted { entity })?;
        let stored = self
            .rows
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found(entity, id))?;

        if stored.version() != aggregate.version() {
            return Err(RepositoryError::ConcurrencyConflict {
                entity,
                id: id.to_string(),
                expected: aggregate.version(),
                actual: stored.version(),
            });
        }
        Ok(id)
    }

    /// Replaces the stored row if the caller's version is current.
    pub(crate) fn save(&mut self, aggregate: &A) -> RepositoryResult<A> {
        let id = self.ensure_current(aggregate)?;
        let mut updated = aggregate.clone();
        updated.set_version(aggregate.version().next());
        self.rows.insert(id, updated.clone());
        Ok(updated)
    }

    pub(crate) fn remove(&mut self, id: A::Id) -> Option<A> {
        self.rows.remove(&id)
    }
}
