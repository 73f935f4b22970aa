//! Audit log storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditLogEntry, AuditLogError};

/// Append-only storage for chained audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Sequence number and hash of the newest entry
    async fn last_link(&self) -> Result<Option<(i64, String)>, AuditLogError>;

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError>;

    /// Newest first, optionally restricted to one acting user
    async fn recent(&self, limit: i64, user_id: Option<Uuid>) -> Result<Vec<AuditLogEntry>, AuditLogError>;

    /// Oldest first, from the start of the chain
    async fn chain(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn last_link(&self) -> Result<Option<(i64, String)>, AuditLogError> {
        Ok(self
            .entries
            .read()
            .await
            .last()
            .map(|e| (e.sequence_number, e.current_hash.clone())))
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64, user_id: Option<Uuid>) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| user_id.is_none() || e.request_user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn chain(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

type AuditRow = (
    Uuid, i64, Option<Uuid>, Option<Uuid>, Option<Uuid>,
    String, Option<String>, Option<Uuid>,
    Option<serde_json::Value>, Option<serde_json::Value>, Option<Vec<String>>,
    Option<String>, String, String, DateTime<Utc>,
);

fn entry_from_row(
    (
        id, sequence_number, api_key_id, request_user_id, correlation_id,
        action, resource_type, resource_id,
        before_state, after_state, changed_fields,
        client_ip, previous_hash, current_hash, created_at,
    ): AuditRow,
) -> AuditLogEntry {
    AuditLogEntry {
        id,
        sequence_number,
        api_key_id,
        request_user_id,
        correlation_id,
        action,
        resource_type,
        resource_id,
        before_state,
        after_state,
        changed_fields,
        client_ip: client_ip.and_then(|s| s.parse().ok()),
        previous_hash,
        current_hash,
        created_at,
    }
}

const AUDIT_COLUMNS: &str = r#"
    id, sequence_number, api_key_id, request_user_id, correlation_id,
    action, resource_type, resource_id,
    before_state, after_state, changed_fields,
    client_ip, previous_hash, current_hash, created_at
"#;

/// Audit storage in the `audit_logs` table
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn last_link(&self) -> Result<Option<(i64, String)>, AuditLogError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT sequence_number, current_hash FROM audit_logs ORDER BY sequence_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, sequence_number, api_key_id, request_user_id, correlation_id,
                action, resource_type, resource_id,
                before_state, after_state, changed_fields,
                client_ip, previous_hash, current_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(entry.id)
        .bind(entry.sequence_number)
        .bind(entry.api_key_id)
        .bind(entry.request_user_id)
        .bind(entry.correlation_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.before_state)
        .bind(&entry.after_state)
        .bind(&entry.changed_fields)
        .bind(entry.client_ip.map(|ip| ip.to_string()))
        .bind(&entry.previous_hash)
        .bind(&entry.current_hash)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: i64, user_id: Option<Uuid>) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let rows: Vec<AuditRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR request_user_id = $1)
            ORDER BY sequence_number DESC
            LIMIT $2
            "#,
            AUDIT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    async fn chain(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let rows: Vec<AuditRow> = sqlx::query_as(&format!(
            "SELECT {} FROM audit_logs ORDER BY sequence_number ASC LIMIT $1",
            AUDIT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }
}
