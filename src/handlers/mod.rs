//! Command Handlers module
//!
//! Handlers orchestrate business operations: load from the repositories,
//! apply domain rules, persist, and record the audit trail.

mod authorization_handler;
mod card_handler;
mod commands;
mod limit_handler;
mod user_handler;


use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Card, DomainError, OperationContext};
use crate::error::AppError;
use crate::repository::{Repository, RepositoryError};

pub use authorization_handler::AuthorizeSpendHandler;
pub use card_handler::{CardQueryHandler, ChangeCardStatusHandler, IssueCardHandler, UpdateCardSettingsHandler};
pub use commands::*;
pub use limit_handler::{CardLimitsHandler, SetCardLimitHandler};
pub use user_handler::{CreateUserHandler, GetUserHandler};

/// Attempts for read-modify-write operations that lose a version race
const MAX_RETRIES: u32 = 3;

/// Acting user from `X-Request-User-Id`
pub(crate) fn require_request_user(context: &OperationContext) -> Result<Uuid, AppError> {
    context
        .request_user_id
        .ok_or_else(|| AppError::MissingHeader("X-Request-User-Id".to_string()))
}

/// Load a card the acting user owns.
pub(crate) async fn load_owned_card(
    cards: &dyn Repository<Card>,
    card_id: Uuid,
    context: &OperationContext,
) -> Result<Card, AppError> {
    let user_id = require_request_user(context)?;

    let card = cards.get(card_id).await.map_err(|e| match e {
        RepositoryError::NotFound { .. } => AppError::Domain(DomainError::card_not_found(card_id)),
        other => AppError::Repository(other),
    })?;
    card.ensure_owned_by(user_id)?;

    Ok(card)
}

/// Parse a request field, reporting failures as validation errors
pub(crate) fn parse_field<T>(field: &str, value: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::Validation(format!("Invalid {}: {}", field, e)))
}

/// Re-run `attempt` when it loses an optimistic concurrency race.
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(AppError::Repository(e)) if e.is_version_conflict() && tries < MAX_RETRIES => {
                // Backoff before retry
                let delay = Duration::from_millis(50 * tries as u64);
                tracing::warn!(
                    error = %e,
                    "Concurrency conflict, retrying (attempt {}/{})",
                    tries,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
