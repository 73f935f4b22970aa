//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::card::CardStatus;
use super::limit::TransactionType;
use super::period::LimitPeriod;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Card does not exist
    #[error("Card not found: {0}")]
    CardNotFound(String),

    /// User does not exist or is inactive
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Requester does not own the resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Card must be active for this operation
    #[error("Card is {status}, operation requires an active card")]
    CardNotActive { status: CardStatus },

    /// Status change not allowed from the current status
    #[error("Cannot change card status from {from} to {to}")]
    InvalidStatusTransition { from: CardStatus, to: CardStatus },

    /// Card channel (contactless/online/international) switched off
    #[error("{0} transactions are disabled on this card")]
    ChannelDisabled(TransactionType),

    /// Spend would exceed a limit
    #[error("{transaction_type} {period} limit exceeded: requested {requested}, remaining {remaining}")]
    LimitExceeded {
        transaction_type: TransactionType,
        period: LimitPeriod,
        requested: rust_decimal::Decimal,
        remaining: rust_decimal::Decimal,
    },

    /// Business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// Invalid input (amount, period, type, names)
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn card_not_found(card_id: impl ToString) -> Self {
        Self::CardNotFound(card_id.to_string())
    }

    pub fn user_not_found(user_id: impl ToString) -> Self {
        Self::UserNotFound(user_id.to_string())
    }

    /// Check if this is a business rule error (HTTP 400)
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::CardNotActive { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::ChannelDisabled(_)
                | Self::LimitExceeded { .. }
                | Self::BusinessRuleViolation(_)
        )
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CardNotFound(_) | Self::UserNotFound(_))
    }
}
