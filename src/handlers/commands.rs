//! Command definitions
//!
//! Commands represent intentions to change the system state. Amounts and
//! enum values arrive as strings and are parsed by the handlers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Card, CardLimit, CardStatus, SpendEvaluation};

// =========================================================================
// CreateUserCommand
// =========================================================================

/// Command to register a card holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserCommand {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl CreateUserCommand {
    pub fn new(user_id: Uuid, username: String, email: String) -> Self {
        Self {
            user_id,
            username,
            email,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = Some(display_name);
        self
    }
}

// =========================================================================
// IssueCardCommand
// =========================================================================

/// Command to issue a card to the requesting user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCardCommand {
    pub account_id: Uuid,
    pub card_type: String,
    pub card_network: String,
    pub card_name: String,
    pub is_contactless_enabled: bool,
    pub is_online_enabled: bool,
    pub is_international_enabled: bool,
}

impl IssueCardCommand {
    /// Contactless and online on, international off
    pub fn new(account_id: Uuid, card_type: String, card_network: String, card_name: String) -> Self {
        Self {
            account_id,
            card_type,
            card_network,
            card_name,
            is_contactless_enabled: true,
            is_online_enabled: true,
            is_international_enabled: false,
        }
    }

    pub fn with_channels(mut self, contactless: bool, online: bool, international: bool) -> Self {
        self.is_contactless_enabled = contactless;
        self.is_online_enabled = online;
        self.is_international_enabled = international;
        self
    }
}

/// Filters for listing the requesting user's cards
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCardsQuery {
    pub card_type: Option<String>,
    pub status: Option<String>,
    pub account_id: Option<Uuid>,
}

// =========================================================================
// UpdateCardSettingsCommand / ChangeCardStatusCommand
// =========================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCardSettingsCommand {
    pub card_id: Uuid,
    pub card_name: Option<String>,
    pub is_contactless_enabled: Option<bool>,
    pub is_online_enabled: Option<bool>,
    pub is_international_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeCardStatusCommand {
    pub card_id: Uuid,
    pub status: CardStatus,
    pub reason: Option<String>,
}

impl ChangeCardStatusCommand {
    pub fn new(card_id: Uuid, status: CardStatus) -> Self {
        Self {
            card_id,
            status,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

// =========================================================================
// SetCardLimitCommand
// =========================================================================

/// Command to create or replace one spending limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCardLimitCommand {
    pub card_id: Uuid,
    pub transaction_type: String,
    pub period: String,
    /// Limit amount (as string for precise decimal)
    pub limit_amount: String,
    pub is_enabled: bool,
}

impl SetCardLimitCommand {
    pub fn new(card_id: Uuid, transaction_type: String, period: String, limit_amount: String) -> Self {
        Self {
            card_id,
            transaction_type,
            period,
            limit_amount,
            is_enabled: true,
        }
    }

    pub fn enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }
}

// =========================================================================
// AuthorizeSpendCommand
// =========================================================================

/// Command to check (and unless dry-run, record) a card spend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeSpendCommand {
    pub card_id: Uuid,
    pub transaction_type: String,
    /// Amount (as string for precise decimal)
    pub amount: String,
    pub dry_run: bool,
}

impl AuthorizeSpendCommand {
    pub fn new(card_id: Uuid, transaction_type: String, amount: String) -> Self {
        Self {
            card_id,
            transaction_type,
            amount,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of issuing a card
#[derive(Debug, Clone, Serialize)]
pub struct IssueCardResult {
    pub card: Card,
    pub delivery_estimate: String,
}

/// A card's limits after rollover, with the remaining amount per limit
#[derive(Debug, Clone, Serialize)]
pub struct CardLimitsResult {
    pub card_id: Uuid,
    pub limits: Vec<CardLimit>,
    pub remaining_limits: BTreeMap<String, Decimal>,
}

impl CardLimitsResult {
    pub fn from_card(card: &Card) -> Self {
        Self {
            card_id: card.id,
            limits: card.limits.clone(),
            remaining_limits: card.remaining_limits(),
        }
    }
}

/// Result of a spend authorization
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResult {
    pub card_id: Uuid,
    pub evaluation: SpendEvaluation,
    /// False for dry runs
    pub committed: bool,
    pub remaining_limits: BTreeMap<String, Decimal>,
}

/// Result of a status change
#[derive(Debug, Clone, Serialize)]
pub struct CardStatusResult {
    pub card_id: Uuid,
    pub previous_status: CardStatus,
    pub status: CardStatus,
}
