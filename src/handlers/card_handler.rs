//! Card Handlers
//!
//! Issuing cards, reading them, updating settings and moving them between
//! statuses.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{
    Card, CardNetwork, CardSettings, CardStatus, CardType, DomainError, NewCard, OperationContext,
    User,
};
use crate::error::AppError;
use crate::repository::{ListFilter, Repository, RepositoryError};
use crate::state::AppState;

use super::limit_handler::persist_rollover;
use super::{
    load_owned_card, parse_field, require_request_user, ChangeCardStatusCommand, CardStatusResult,
    IssueCardCommand, IssueCardResult, ListCardsQuery, UpdateCardSettingsCommand,
};

// =========================================================================
// IssueCardHandler
// =========================================================================

/// Handler for issuing a card
pub struct IssueCardHandler {
    cards: Arc<dyn Repository<Card>>,
    users: Arc<dyn Repository<User>>,
    audit: AuditLogService,
    max_cards_per_user: usize,
}

impl IssueCardHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            users: state.users.clone(),
            audit: state.audit.clone(),
            max_cards_per_user: state.max_cards_per_user,
        }
    }

    pub async fn execute(
        &self,
        command: IssueCardCommand,
        context: &OperationContext,
    ) -> Result<IssueCardResult, AppError> {
        let user_id = require_request_user(context)?;

        let card_type: CardType = parse_field("card_type", &command.card_type)?;
        let card_network: CardNetwork = parse_field("card_network", &command.card_network)?;

        let user = self.users.get(user_id).await.map_err(|e| match e {
            RepositoryError::NotFound { .. } => DomainError::user_not_found(user_id).into(),
            other => AppError::from(other),
        })?;
        user.ensure_active()?;

        let existing = self.cards.list(&ListFilter::owned_by(user_id)).await?;
        if existing.len() >= self.max_cards_per_user {
            return Err(DomainError::BusinessRuleViolation(format!(
                "Maximum number of cards reached ({})",
                self.max_cards_per_user
            ))
            .into());
        }

        let card = Card::issue(
            NewCard {
                user_id,
                account_id: command.account_id,
                card_type,
                card_network,
                card_name: command.card_name,
                is_contactless_enabled: command.is_contactless_enabled,
                is_online_enabled: command.is_online_enabled,
                is_international_enabled: command.is_international_enabled,
            },
            context.requested_at,
            &mut rand::thread_rng(),
        )?;
        let card = self.cards.create(&card).await?;

        tracing::info!(
            card_id = %card.id,
            user_id = %user_id,
            card_type = %card.card_type,
            card_network = %card.card_network,
            "Card issued"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardIssued)
                    .resource("Card", card.id)
                    .after_state(&card),
                context,
            )
            .await;

        Ok(IssueCardResult {
            delivery_estimate: card.card_type.delivery_estimate().to_string(),
            card,
        })
    }
}

// =========================================================================
// CardQueryHandler
// =========================================================================

/// Read-side handler for cards. Elapsed limit windows are rolled over and
/// persisted before a card is returned.
pub struct CardQueryHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl CardQueryHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    /// The requesting user's cards, oldest first
    pub async fn list(
        &self,
        query: ListCardsQuery,
        context: &OperationContext,
    ) -> Result<Vec<Card>, AppError> {
        let user_id = require_request_user(context)?;

        let card_type: Option<CardType> = query
            .card_type
            .as_deref()
            .map(|t| parse_field("card_type", t))
            .transpose()?;
        let status: Option<CardStatus> = query
            .status
            .as_deref()
            .map(|s| parse_field("status", s))
            .transpose()?;

        let mut cards: Vec<Card> = self
            .cards
            .list(&ListFilter::owned_by(user_id))
            .await?
            .into_iter()
            .filter(|c| card_type.map_or(true, |t| c.card_type == t))
            .filter(|c| status.map_or(true, |s| c.status == s))
            .filter(|c| query.account_id.map_or(true, |a| c.account_id == a))
            .collect();

        for card in &mut cards {
            persist_rollover(self.cards.as_ref(), &self.audit, card, context).await;
        }
        Ok(cards)
    }

    pub async fn get(&self, card_id: Uuid, context: &OperationContext) -> Result<Card, AppError> {
        let mut card = load_owned_card(self.cards.as_ref(), card_id, context).await?;
        persist_rollover(self.cards.as_ref(), &self.audit, &mut card, context).await;
        Ok(card)
    }
}

// =========================================================================
// UpdateCardSettingsHandler
// =========================================================================

/// Handler for card name and channel toggles
pub struct UpdateCardSettingsHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl UpdateCardSettingsHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: UpdateCardSettingsCommand,
        context: &OperationContext,
    ) -> Result<Card, AppError> {
        let mut card = load_owned_card(self.cards.as_ref(), command.card_id, context).await?;
        // Saved with the settings; a no-op update still reports fresh windows
        card.roll_over_limits(context.requested_at);
        let before = card.clone();

        let changed = card.update_settings(
            CardSettings {
                card_name: command.card_name,
                is_contactless_enabled: command.is_contactless_enabled,
                is_online_enabled: command.is_online_enabled,
                is_international_enabled: command.is_international_enabled,
            },
            context.requested_at,
        )?;
        if changed.is_empty() {
            return Ok(card);
        }

        let card = self.cards.update(&card).await?;
        tracing::info!(card_id = %card.id, changed = ?changed, "Card settings updated");

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardSettingsUpdated)
                    .resource("Card", card.id)
                    .before_state(&before)
                    .after_state(&card)
                    .changed_fields(changed),
                context,
            )
            .await;

        Ok(card)
    }
}

// =========================================================================
// ChangeCardStatusHandler
// =========================================================================

/// Handler for freeze / unfreeze / block / cancel
pub struct ChangeCardStatusHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl ChangeCardStatusHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: ChangeCardStatusCommand,
        context: &OperationContext,
    ) -> Result<CardStatusResult, AppError> {
        let mut card = load_owned_card(self.cards.as_ref(), command.card_id, context).await?;

        let previous_status = card.change_status(command.status, context.requested_at)?;
        let card = self.cards.update(&card).await?;

        tracing::info!(
            card_id = %card.id,
            from = %previous_status,
            to = %card.status,
            reason = ?command.reason,
            "Card status changed"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardStatusChanged)
                    .resource("Card", card.id)
                    .before_state(&serde_json::json!({ "status": previous_status }))
                    .after_state(&serde_json::json!({
                        "status": card.status,
                        "reason": command.reason,
                    }))
                    .changed_fields(vec!["status".to_string()]),
                context,
            )
            .await;

        Ok(CardStatusResult {
            card_id: card.id,
            previous_status,
            status: card.status,
        })
    }
}
