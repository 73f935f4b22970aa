//! Repository layer
//!
//! Typed storage for cards and users. Handlers only see `Repository<E>`
//! trait objects, so the same code runs against PostgreSQL or the
//! in-memory store.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Card, User};

pub use memory::InMemoryRepository;
pub use postgres::{PgCardRepository, PgUserRepository};

/// Errors that can occur in a repository
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No row with this ID
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for {kind} {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        kind: &'static str,
        id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Unique key already taken
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored row could not be mapped back to the domain
    #[error("Corrupt {kind} row {id}: {reason}")]
    Corrupt {
        kind: &'static str,
        id: Uuid,
        reason: String,
    },
}

impl RepositoryError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, RepositoryError::VersionConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Something a repository can store.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Human readable kind used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;

    /// Owning user, if the entity belongs to one
    fn owner_id(&self) -> Option<Uuid> {
        None
    }

    /// Version read from the store; unversioned entities stay at 0
    fn version(&self) -> i64 {
        0
    }

    fn set_version(&mut self, _version: i64) {}

    /// Values that must be unique across all entities of this kind
    fn unique_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Entity for Card {
    const KIND: &'static str = "Card";

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.user_id)
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

impl Entity for User {
    const KIND: &'static str = "User";

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![
            format!("username:{}", self.username),
            format!("email:{}", self.email),
        ]
    }
}

/// Listing options. Results are ordered by creation time, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl ListFilter {
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn page(limit: i64, offset: i64) -> Self {
        Self {
            owner_id: None,
            limit: Some(limit),
            offset,
        }
    }
}

/// Typed storage for one entity kind.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<E, RepositoryError>;

    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>, RepositoryError>;

    /// Insert a new entity; it is returned with version 0
    async fn create(&self, entity: &E) -> Result<E, RepositoryError>;

    /// Replace a stored entity.
    ///
    /// Succeeds only if the stored version still equals `entity.version()`;
    /// the returned entity carries the bumped version.
    async fn update(&self, entity: &E) -> Result<E, RepositoryError>;
}
