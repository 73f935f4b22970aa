//! Audit Log Service
//!
//! Provides tamper-evident audit logging with hash chain verification.
//! Every card and user state change is recorded with before/after state.

mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::OperationContext;

pub use store::{AuditStore, InMemoryAuditStore, PgAuditStore};

/// `previous_hash` of the first entry in the chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sequence_number: i64,
    pub api_key_id: Option<Uuid>,
    pub request_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub changed_fields: Option<Vec<String>>,
    pub client_ip: Option<IpAddr>,
    pub previous_hash: String,
    pub current_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Hash over the chained fields of this entry
    pub fn compute_hash(&self) -> String {
        let hash_input = format!(
            "{}{}{}{}{}{}{}",
            self.id,
            self.sequence_number,
            self.action,
            self.request_user_id.map(|u| u.to_string()).unwrap_or_default(),
            self.before_state.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            self.after_state.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            self.previous_hash
        );
        sha256_hex(&hash_input)
    }
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserCreated,
    CardIssued,
    CardSettingsUpdated,
    CardStatusChanged,
    CardLimitSet,
    CardLimitsRolledOver,
    SpendAuthorized,
    SpendDeclined,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserCreated => "user.created",
            AuditAction::CardIssued => "card.issued",
            AuditAction::CardSettingsUpdated => "card.settings_updated",
            AuditAction::CardStatusChanged => "card.status_changed",
            AuditAction::CardLimitSet => "card.limit_set",
            AuditAction::CardLimitsRolledOver => "card.limits_rolled_over",
            AuditAction::SpendAuthorized => "card.spend_authorized",
            AuditAction::SpendDeclined => "card.spend_declined",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    changed_fields: Option<Vec<String>>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            before_state: None,
            after_state: None,
            changed_fields: None,
        }
    }

    /// Set the resource type and ID
    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    pub fn changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = Some(fields);
        self
    }
}

/// Audit Log Service
///
/// Entries are chained in the application: the writer lock serializes
/// appends so each entry links to the one before it.
#[derive(Clone)]
pub struct AuditLogService {
    store: Arc<dyn AuditStore>,
    writer: Arc<Mutex<()>>,
}

impl AuditLogService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuditStore::new()))
    }

    /// Write an audit log entry
    pub async fn log(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let _guard = self.writer.lock().await;

        let (sequence_number, previous_hash) = match self.store.last_link().await? {
            Some((sequence, hash)) => (sequence + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let mut entry = AuditLogEntry {
            id: Uuid::new_v4(),
            sequence_number,
            api_key_id: context.api_key_id,
            request_user_id: context.request_user_id,
            correlation_id: context.correlation_id,
            action: builder.action.as_str().to_string(),
            resource_type: builder.resource_type,
            resource_id: builder.resource_id,
            before_state: builder.before_state,
            after_state: builder.after_state,
            changed_fields: builder.changed_fields,
            client_ip: context.client_ip,
            previous_hash,
            current_hash: String::new(),
            created_at: context.requested_at,
        };
        entry.current_hash = entry.compute_hash();
        self.store.append(&entry).await?;

        tracing::debug!(
            audit_id = %entry.id,
            sequence = entry.sequence_number,
            action = %entry.action,
            "Audit log entry created"
        );

        Ok(entry.id)
    }

    /// Log without failing the caller; the state change already happened.
    pub async fn record(&self, builder: AuditLogBuilder, context: &OperationContext) {
        let action = builder.action;
        if let Err(e) = self.log(builder, context).await {
            tracing::error!(action = %action, error = %e, "Failed to write audit log entry");
        }
    }

    /// Verify the integrity of the audit log hash chain
    pub async fn verify_hash_chain(&self, limit: Option<i64>) -> Result<ChainVerificationResult, AuditLogError> {
        let entries = self.store.chain(limit.unwrap_or(1000)).await?;
        Ok(verify_entries(&entries))
    }

    /// Most recent entries, newest first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        self.store.recent(limit, None).await
    }

    /// Most recent entries made by one user, newest first
    pub async fn get_by_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        self.store.recent(limit, Some(user_id)).await
    }
}

/// Walk entries in sequence order, checking linkage and recomputing hashes.
pub fn verify_entries(entries: &[AuditLogEntry]) -> ChainVerificationResult {
    let mut previous_hash = GENESIS_HASH.to_string();

    for (checked, entry) in entries.iter().enumerate() {
        if entry.previous_hash != previous_hash {
            return ChainVerificationResult::broken(checked, entry, previous_hash, entry.previous_hash.clone());
        }

        let calculated_hash = entry.compute_hash();
        if calculated_hash != entry.current_hash {
            return ChainVerificationResult::broken(checked, entry, calculated_hash, entry.current_hash.clone());
        }

        previous_hash = entry.current_hash.clone();
    }

    ChainVerificationResult {
        is_valid: true,
        entries_checked: entries.len() as u64,
        first_invalid_entry: None,
        expected_hash: None,
        actual_hash: None,
    }
}

/// Result of hash chain verification
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

impl ChainVerificationResult {
    fn broken(checked: usize, entry: &AuditLogEntry, expected: String, actual: String) -> Self {
        Self {
            is_valid: false,
            entries_checked: checked as u64,
            first_invalid_entry: Some(entry.id),
            expected_hash: Some(expected),
            actual_hash: Some(actual),
        }
    }
}

/// Calculate SHA-256 hash and return as hex string
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::UserCreated.as_str(), "user.created");
        assert_eq!(AuditAction::CardLimitSet.as_str(), "card.limit_set");
        assert_eq!(AuditAction::SpendDeclined.as_str(), "card.spend_declined");
    }

    #[test]
    fn test_audit_log_builder() {
        let builder = AuditLogBuilder::new(AuditAction::CardSettingsUpdated)
            .resource("Card", Uuid::new_v4())
            .changed_fields(vec!["card_name".to_string()]);

        assert_eq!(builder.action, AuditAction::CardSettingsUpdated);
        assert_eq!(builder.resource_type, Some("Card".to_string()));
        assert!(builder.changed_fields.is_some());
    }

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("test input");
        assert_eq!(hash.len(), 64);
    }

    #[tokio::test]
    async fn test_chain_links_entries() {
        let service = AuditLogService::in_memory();
        let user_id = Uuid::new_v4();
        let context = OperationContext::new().with_request_user(user_id);

        for action in [AuditAction::CardIssued, AuditAction::CardLimitSet, AuditAction::SpendAuthorized] {
            service
                .log(
                    AuditLogBuilder::new(action)
                        .resource("Card", Uuid::new_v4())
                        .after_state(&serde_json::json!({"limit_amount": "1000.00"})),
                    &context,
                )
                .await
                .unwrap();
        }

        let recent = service.get_recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].sequence_number, 3);
        assert_eq!(recent[2].previous_hash, GENESIS_HASH);
        assert_eq!(recent[1].previous_hash, recent[2].current_hash);

        let result = service.verify_hash_chain(None).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.entries_checked, 3);

        assert_eq!(service.get_by_user(user_id, 10).await.unwrap().len(), 3);
        assert!(service.get_by_user(Uuid::new_v4(), 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_tampered_entry_detected() {
        let mut first = AuditLogEntry {
            id: Uuid::new_v4(),
            sequence_number: 1,
            api_key_id: None,
            request_user_id: None,
            correlation_id: None,
            action: AuditAction::CardLimitSet.as_str().to_string(),
            resource_type: Some("Card".to_string()),
            resource_id: None,
            before_state: None,
            after_state: Some(serde_json::json!({"limit_amount": "500.00"})),
            changed_fields: None,
            client_ip: None,
            previous_hash: GENESIS_HASH.to_string(),
            current_hash: String::new(),
            created_at: Utc::now(),
        };
        first.current_hash = first.compute_hash();
        assert!(verify_entries(std::slice::from_ref(&first)).is_valid);

        first.after_state = Some(serde_json::json!({"limit_amount": "50000.00"}));
        let result = verify_entries(&[first.clone()]);
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_entry, Some(first.id));
        assert_eq!(result.entries_checked, 0);
    }
}
