//! Shared application state
//!
//! Store handles and settings passed to every handler through axum state.

use sqlx::PgPool;
use std::sync::Arc;

use crate::api::middleware::ApiKeyRegistry;
use crate::audit::{AuditLogService, PgAuditStore};
use crate::domain::{Card, User};
use crate::repository::{InMemoryRepository, PgCardRepository, PgUserRepository, Repository};

/// Cards a user may hold when not configured otherwise
pub const DEFAULT_MAX_CARDS_PER_USER: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub cards: Arc<dyn Repository<Card>>,
    pub users: Arc<dyn Repository<User>>,
    pub audit: AuditLogService,
    pub api_keys: Arc<ApiKeyRegistry>,
    pub max_cards_per_user: usize,
}

impl AppState {
    /// State backed by PostgreSQL
    pub fn postgres(pool: PgPool, api_keys: ApiKeyRegistry, max_cards_per_user: usize) -> Self {
        Self {
            cards: Arc::new(PgCardRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            audit: AuditLogService::new(Arc::new(PgAuditStore::new(pool))),
            api_keys: Arc::new(api_keys),
            max_cards_per_user,
        }
    }

    /// State backed by process memory
    pub fn in_memory(api_keys: ApiKeyRegistry, max_cards_per_user: usize) -> Self {
        Self {
            cards: Arc::new(InMemoryRepository::<Card>::new()),
            users: Arc::new(InMemoryRepository::<User>::new()),
            audit: AuditLogService::in_memory(),
            api_keys: Arc::new(api_keys),
            max_cards_per_user,
        }
    }
}
