//! Limit Handlers
//!
//! Reading a card's limits (rolling elapsed windows over on the way) and
//! replacing a single limit.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{Amount, Card, LimitPeriod, LimitSetting, OperationContext, TransactionType};
use crate::error::AppError;
use crate::repository::Repository;
use crate::state::AppState;

use super::{load_owned_card, parse_field, retry_on_conflict, CardLimitsResult, SetCardLimitCommand};

// =========================================================================
// CardLimitsHandler
// =========================================================================

/// Handler for `GET /cards/:card_id/limits`
pub struct CardLimitsHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl CardLimitsHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    /// Current limits. Elapsed windows are rolled over and persisted.
    pub async fn execute(&self, card_id: Uuid, context: &OperationContext) -> Result<CardLimitsResult, AppError> {
        let mut card = load_owned_card(self.cards.as_ref(), card_id, context).await?;
        persist_rollover(self.cards.as_ref(), &self.audit, &mut card, context).await;
        Ok(CardLimitsResult::from_card(&card))
    }
}

/// Roll over elapsed windows on `card` and save them if anything changed.
///
/// Losing a version race is not an error here: whoever won already stored
/// a card whose windows roll over the same way on the next read.
pub(crate) async fn persist_rollover(
    cards: &dyn Repository<Card>,
    audit: &AuditLogService,
    card: &mut Card,
    context: &OperationContext,
) -> usize {
    let rolled = card.roll_over_limits(context.requested_at);
    if rolled == 0 {
        return 0;
    }

    match cards.update(card).await {
        Ok(stored) => {
            *card = stored;
            tracing::debug!(card_id = %card.id, rolled, "Limit windows rolled over");
            audit
                .record(
                    AuditLogBuilder::new(AuditAction::CardLimitsRolledOver)
                        .resource("Card", card.id)
                        .after_state(&card.limits),
                    context,
                )
                .await;
        }
        Err(e) if e.is_version_conflict() => {
            tracing::debug!(card_id = %card.id, "Rollover already persisted by a concurrent request");
        }
        Err(e) => {
            tracing::warn!(card_id = %card.id, error = %e, "Failed to persist limit rollover");
        }
    }
    rolled
}

// =========================================================================
// SetCardLimitHandler
// =========================================================================

/// Handler for `POST /cards/:card_id/limits`
pub struct SetCardLimitHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl SetCardLimitHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: SetCardLimitCommand,
        context: &OperationContext,
    ) -> Result<CardLimitsResult, AppError> {
        let setting = LimitSetting {
            transaction_type: parse_field::<TransactionType>("transaction_type", &command.transaction_type)?,
            period: parse_field::<LimitPeriod>("period", &command.period)?,
            limit_amount: parse_field::<Amount>("limit_amount", &command.limit_amount)?,
            is_enabled: command.is_enabled,
        };

        let command = &command;
        let setting = &setting;
        retry_on_conflict(move || self.try_execute(command, setting, context)).await
    }

    async fn try_execute(
        &self,
        command: &SetCardLimitCommand,
        setting: &LimitSetting,
        context: &OperationContext,
    ) -> Result<CardLimitsResult, AppError> {
        let mut card = load_owned_card(self.cards.as_ref(), command.card_id, context).await?;
        // Saved together with the new limit
        card.roll_over_limits(context.requested_at);
        let before = card
            .limit(setting.transaction_type, setting.period)
            .cloned();

        let limit = card.set_limit(setting.clone(), context.requested_at)?.clone();
        let card = self.cards.update(&card).await?;

        tracing::info!(
            card_id = %card.id,
            transaction_type = %limit.transaction_type,
            period = %limit.period,
            limit_amount = %limit.limit_amount,
            current_usage = %limit.current_usage,
            "Card limit set"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardLimitSet)
                    .resource("Card", card.id)
                    .before_state(&before)
                    .after_state(&limit),
                context,
            )
            .await;

        Ok(CardLimitsResult::from_card(&card))
    }
}
