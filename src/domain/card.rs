//! Card aggregate
//!
//! A payment card owned by a user, carrying its spending limits. All
//! mutations go through methods that enforce the status rules; callers pass
//! the current instant so every rule is evaluated against one clock reading.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount::Amount;
use super::defaults::default_limits;
use super::error::DomainError;
use super::limit::{
    apply_spend, evaluate_spend, remaining_limits, roll_over_all, CardLimit, SpendEvaluation,
    TransactionType,
};
use super::period::{LimitPeriod, PeriodWindow};

/// PIN attempts granted on issue and after unblocking
pub const MAX_PIN_ATTEMPTS: i32 = 3;

/// Longest name that can be printed on a card
const MAX_CARD_NAME_LEN: usize = 100;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Debit,
    Credit,
    Prepaid,
}

string_enum!(CardType {
    Debit => "debit",
    Credit => "credit",
    Prepaid => "prepaid",
});

impl CardType {
    /// Expected delivery time for a newly issued card
    pub fn delivery_estimate(&self) -> &'static str {
        match self {
            CardType::Debit => "5-7 business days",
            CardType::Credit => "7-10 business days",
            CardType::Prepaid => "3-5 business days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Frozen,
    Blocked,
    Cancelled,
    Expired,
}

string_enum!(CardStatus {
    Active => "active",
    Frozen => "frozen",
    Blocked => "blocked",
    Cancelled => "cancelled",
    Expired => "expired",
});

impl CardStatus {
    pub fn can_transition_to(&self, next: CardStatus) -> bool {
        use CardStatus::*;
        matches!(
            (self, next),
            (Active, Frozen)
                | (Active, Blocked)
                | (Active, Cancelled)
                | (Frozen, Active)
                | (Frozen, Cancelled)
                | (Blocked, Active)
                | (Blocked, Cancelled)
                | (Expired, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Amex,
    Discover,
}

string_enum!(CardNetwork {
    Visa => "visa",
    Mastercard => "mastercard",
    Amex => "amex",
    Discover => "discover",
});

impl CardNetwork {
    /// Leading digit of card numbers on this network
    pub fn number_prefix(&self) -> char {
        match self {
            CardNetwork::Visa => '4',
            CardNetwork::Mastercard => '5',
            CardNetwork::Amex => '3',
            CardNetwork::Discover => '6',
        }
    }
}

/// Parameters for issuing a card
#[derive(Debug, Clone)]
pub struct NewCard {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_type: CardType,
    pub card_network: CardNetwork,
    pub card_name: String,
    pub is_contactless_enabled: bool,
    pub is_online_enabled: bool,
    pub is_international_enabled: bool,
}

/// Partial update of card preferences
#[derive(Debug, Clone, Default)]
pub struct CardSettings {
    pub card_name: Option<String>,
    pub is_contactless_enabled: Option<bool>,
    pub is_online_enabled: Option<bool>,
    pub is_international_enabled: Option<bool>,
}

/// Requested limit for one (transaction type, period) slot
#[derive(Debug, Clone)]
pub struct LimitSetting {
    pub transaction_type: TransactionType,
    pub period: LimitPeriod,
    pub limit_amount: Amount,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_type: CardType,
    pub card_network: CardNetwork,
    pub status: CardStatus,
    pub masked_number: String,
    pub card_name: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub limits: Vec<CardLimit>,
    pub is_contactless_enabled: bool,
    pub is_online_enabled: bool,
    pub is_international_enabled: bool,
    /// Informational only. No operation here verifies a PIN, so nothing
    /// decrements it; unblocking resets it to `MAX_PIN_ATTEMPTS`.
    pub pin_attempts_remaining: i32,
    /// Optimistic concurrency version, bumped by the store on every update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Issue a new active card with the default limits for its type.
    pub fn issue<R: Rng>(
        params: NewCard,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Self, DomainError> {
        validate_card_name(&params.card_name)?;

        let masked_number = format!(
            "{}*** **** **** {}",
            params.card_network.number_prefix(),
            rng.gen_range(1000..=9999)
        );

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            account_id: params.account_id,
            card_type: params.card_type,
            card_network: params.card_network,
            status: CardStatus::Active,
            masked_number,
            card_name: params.card_name,
            expiry_month: rng.gen_range(1..=12),
            expiry_year: now.year() + rng.gen_range(3..=7),
            limits: default_limits(params.card_type, now),
            is_contactless_enabled: params.is_contactless_enabled,
            is_online_enabled: params.is_online_enabled,
            is_international_enabled: params.is_international_enabled,
            pin_attempts_remaining: MAX_PIN_ATTEMPTS,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn ensure_owned_by(&self, user_id: Uuid) -> Result<(), DomainError> {
        if self.user_id != user_id {
            return Err(DomainError::Unauthorized(
                "You don't have access to this card".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != CardStatus::Active {
            return Err(DomainError::CardNotActive {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Past the last day of the expiry month
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now.year(), now.month()) > (self.expiry_year, self.expiry_month)
    }

    /// Flag a card whose expiry date has passed. Returns true if the status changed.
    pub fn mark_expired_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if matches!(self.status, CardStatus::Cancelled | CardStatus::Expired) || !self.is_expired(now) {
            return false;
        }
        self.status = CardStatus::Expired;
        self.updated_at = now;
        true
    }

    /// Roll over every elapsed limit window; returns how many were reset.
    pub fn roll_over_limits(&mut self, now: DateTime<Utc>) -> usize {
        roll_over_all(&mut self.limits, now)
    }

    pub fn remaining_limits(&self) -> BTreeMap<String, rust_decimal::Decimal> {
        remaining_limits(&self.limits)
    }

    pub fn limit(&self, transaction_type: TransactionType, period: LimitPeriod) -> Option<&CardLimit> {
        self.limits
            .iter()
            .find(|l| l.matches(transaction_type, period))
    }

    /// Create or replace the limit for `setting`'s (type, period) slot.
    ///
    /// Usage carries over only when the replaced limit's window is exactly
    /// the window containing `now`. Nothing changes on error.
    pub fn set_limit(&mut self, setting: LimitSetting, now: DateTime<Utc>) -> Result<&CardLimit, DomainError> {
        self.ensure_active()?;

        let mut limit = CardLimit::new(
            setting.transaction_type,
            setting.period,
            setting.limit_amount,
            setting.is_enabled,
            now,
        );
        let window = PeriodWindow::containing(now, setting.period);

        let index = match self
            .limits
            .iter()
            .position(|l| l.matches(setting.transaction_type, setting.period))
        {
            Some(index) => {
                let existing = &self.limits[index];
                if existing.window() == window {
                    limit.current_usage = existing.current_usage;
                }
                self.limits[index] = limit;
                index
            }
            None => {
                self.limits.push(limit);
                self.limits.len() - 1
            }
        };

        self.updated_at = now;
        Ok(&self.limits[index])
    }

    /// Check a spend against the (rolled over) limits without committing it.
    pub fn evaluate_spend(
        &mut self,
        transaction_type: TransactionType,
        amount: &Amount,
        now: DateTime<Utc>,
    ) -> SpendEvaluation {
        self.roll_over_limits(now);
        evaluate_spend(&self.limits, transaction_type, amount)
    }

    /// Authorize and record a spend.
    ///
    /// Limits are rolled over first; on rejection the rollover is the only
    /// change left on the card.
    pub fn authorize_spend(
        &mut self,
        transaction_type: TransactionType,
        amount: &Amount,
        now: DateTime<Utc>,
    ) -> Result<SpendEvaluation, DomainError> {
        self.ensure_active()?;
        self.ensure_channel_enabled(transaction_type)?;

        let evaluation = self.evaluate_spend(transaction_type, amount, now);
        if let Some(blocking) = &evaluation.blocking {
            return Err(DomainError::LimitExceeded {
                transaction_type: blocking.transaction_type,
                period: blocking.period,
                requested: amount.value(),
                remaining: blocking.remaining_before(),
            });
        }

        apply_spend(&mut self.limits, &evaluation);
        self.updated_at = now;
        Ok(evaluation)
    }

    pub fn ensure_channel_enabled(&self, transaction_type: TransactionType) -> Result<(), DomainError> {
        let enabled = match transaction_type {
            TransactionType::Contactless => self.is_contactless_enabled,
            TransactionType::OnlinePurchase => self.is_online_enabled,
            TransactionType::International => self.is_international_enabled,
            TransactionType::AtmWithdrawal | TransactionType::PosPurchase => true,
        };
        if !enabled {
            return Err(DomainError::ChannelDisabled(transaction_type));
        }
        Ok(())
    }

    /// Move to `next` status; returns the previous status.
    pub fn change_status(&mut self, next: CardStatus, now: DateTime<Utc>) -> Result<CardStatus, DomainError> {
        let previous = self.status;
        if !previous.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: previous,
                to: next,
            });
        }

        if previous == CardStatus::Blocked && next == CardStatus::Active {
            self.pin_attempts_remaining = MAX_PIN_ATTEMPTS;
        }
        self.status = next;
        self.updated_at = now;
        Ok(previous)
    }

    /// Apply a settings update; returns the names of the fields that changed.
    pub fn update_settings(&mut self, settings: CardSettings, now: DateTime<Utc>) -> Result<Vec<String>, DomainError> {
        if matches!(self.status, CardStatus::Cancelled | CardStatus::Expired) {
            return Err(DomainError::BusinessRuleViolation(
                "Cannot update cancelled or expired card".to_string(),
            ));
        }
        if let Some(name) = &settings.card_name {
            validate_card_name(name)?;
        }

        let mut changed = Vec::new();
        if let Some(name) = settings.card_name {
            if name != self.card_name {
                self.card_name = name;
                changed.push("card_name".to_string());
            }
        }
        let toggles = [
            (settings.is_contactless_enabled, &mut self.is_contactless_enabled, "is_contactless_enabled"),
            (settings.is_online_enabled, &mut self.is_online_enabled, "is_online_enabled"),
            (settings.is_international_enabled, &mut self.is_international_enabled, "is_international_enabled"),
        ];
        for (requested, current, field) in toggles {
            if let Some(value) = requested {
                if *current != value {
                    *current = value;
                    changed.push(field.to_string());
                }
            }
        }

        if !changed.is_empty() {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

fn validate_card_name(name: &str) -> Result<(), DomainError> {
    let length = name.trim().chars().count();
    if length == 0 || name.chars().count() > MAX_CARD_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "card_name must be between 1 and {} characters",
            MAX_CARD_NAME_LEN
        )));
    }
    Ok(())
}
