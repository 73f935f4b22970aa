//! In-memory repository
//!
//! Used for development and tests. Same version semantics as PostgreSQL.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Entity, ListFilter, Repository, RepositoryError};

pub struct InMemoryRepository<E: Entity> {
    rows: RwLock<HashMap<Uuid, E>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    async fn get(&self, id: Uuid) -> Result<E, RepositoryError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound { kind: E::KIND, id })
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<E> = rows
            .values()
            .filter(|e| filter.owner_id.is_none() || e.owner_id() == filter.owner_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| (e.created_at(), e.id()));

        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn create(&self, entity: &E) -> Result<E, RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&entity.id()) {
            return Err(RepositoryError::AlreadyExists {
                kind: E::KIND,
                key: entity.id().to_string(),
            });
        }
        let keys = entity.unique_keys();
        if let Some(taken) = keys
            .iter()
            .find(|key| rows.values().any(|other| other.unique_keys().contains(key)))
        {
            return Err(RepositoryError::AlreadyExists {
                kind: E::KIND,
                key: taken.clone(),
            });
        }

        let mut stored = entity.clone();
        stored.set_version(0);
        rows.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, entity: &E) -> Result<E, RepositoryError> {
        let mut rows = self.rows.write().await;
        let id = entity.id();
        let current = rows
            .get(&id)
            .ok_or(RepositoryError::NotFound { kind: E::KIND, id })?;

        if current.version() != entity.version() {
            return Err(RepositoryError::VersionConflict {
                kind: E::KIND,
                id,
                expected: entity.version(),
                actual: current.version(),
            });
        }

        let mut stored = entity.clone();
        stored.set_version(entity.version() + 1);
        rows.insert(id, stored.clone());
        Ok(stored)
    }
}
