//! Spend Authorization Handler
//!
//! Checks a spend against a card's limits and records it when allowed.

use std::sync::Arc;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{Amount, Card, DomainError, OperationContext, TransactionType};
use crate::error::AppError;
use crate::repository::Repository;
use crate::state::AppState;

use super::limit_handler::persist_rollover;
use super::{load_owned_card, parse_field, retry_on_conflict, AuthorizationResult, AuthorizeSpendCommand};

/// Handler for `POST /cards/:card_id/authorizations`
pub struct AuthorizeSpendHandler {
    cards: Arc<dyn Repository<Card>>,
    audit: AuditLogService,
}

impl AuthorizeSpendHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            cards: state.cards.clone(),
            audit: state.audit.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: AuthorizeSpendCommand,
        context: &OperationContext,
    ) -> Result<AuthorizationResult, AppError> {
        let transaction_type: TransactionType = parse_field("transaction_type", &command.transaction_type)?;
        let amount: Amount = parse_field("amount", &command.amount)?;

        let command = &command;
        let amount = &amount;
        retry_on_conflict(move || self.try_execute(command, transaction_type, amount, context)).await
    }

    async fn try_execute(
        &self,
        command: &AuthorizeSpendCommand,
        transaction_type: TransactionType,
        amount: &Amount,
        context: &OperationContext,
    ) -> Result<AuthorizationResult, AppError> {
        let now = context.requested_at;
        let mut card = load_owned_card(self.cards.as_ref(), command.card_id, context).await?;

        if command.dry_run {
            card.ensure_active()?;
            card.ensure_channel_enabled(transaction_type)?;
            persist_rollover(self.cards.as_ref(), &self.audit, &mut card, context).await;

            let evaluation = card.evaluate_spend(transaction_type, amount, now);
            return Ok(AuthorizationResult {
                card_id: card.id,
                evaluation,
                committed: false,
                remaining_limits: card.remaining_limits(),
            });
        }

        // Roll over up front so a declined spend still persists fresh windows
        let rolled = card.roll_over_limits(now);

        match card.authorize_spend(transaction_type, amount, now) {
            Ok(evaluation) => {
                let card = self.cards.update(&card).await?;

                tracing::info!(
                    card_id = %card.id,
                    transaction_type = %transaction_type,
                    amount = %amount,
                    "Spend authorized"
                );
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::SpendAuthorized)
                            .resource("Card", card.id)
                            .after_state(&evaluation),
                        context,
                    )
                    .await;

                Ok(AuthorizationResult {
                    card_id: card.id,
                    evaluation,
                    committed: true,
                    remaining_limits: card.remaining_limits(),
                })
            }
            Err(err @ DomainError::LimitExceeded { .. }) => {
                if rolled > 0 {
                    // Windows are already rolled on `card`; store only that
                    match self.cards.update(&card).await {
                        Ok(_) => {}
                        Err(e) if e.is_version_conflict() => {}
                        Err(e) => tracing::warn!(card_id = %card.id, error = %e, "Failed to persist limit rollover"),
                    }
                }

                tracing::info!(
                    card_id = %card.id,
                    transaction_type = %transaction_type,
                    amount = %amount,
                    reason = %err,
                    "Spend declined"
                );
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::SpendDeclined)
                            .resource("Card", card.id)
                            .after_state(&serde_json::json!({
                                "transaction_type": transaction_type,
                                "amount": amount,
                                "reason": err.to_string(),
                            })),
                        context,
                    )
                    .await;

                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
