//! Card spending limits
//!
//! A `CardLimit` caps spending for one (transaction type, period) pair and
//! tracks the usage accumulated within its current window. Windows roll
//! over lazily: whenever limits are read or checked, an elapsed window is
//! replaced by the one containing "now" and usage drops back to zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::amount::{Amount, AmountError, Usage};
use super::period::{LimitPeriod, PeriodWindow};

/// Kinds of card transaction a limit can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    AtmWithdrawal,
    PosPurchase,
    OnlinePurchase,
    Contactless,
    International,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::AtmWithdrawal => "atm_withdrawal",
            TransactionType::PosPurchase => "pos_purchase",
            TransactionType::OnlinePurchase => "online_purchase",
            TransactionType::Contactless => "contactless",
            TransactionType::International => "international",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atm_withdrawal" => Ok(TransactionType::AtmWithdrawal),
            "pos_purchase" => Ok(TransactionType::PosPurchase),
            "online_purchase" => Ok(TransactionType::OnlinePurchase),
            "contactless" => Ok(TransactionType::Contactless),
            "international" => Ok(TransactionType::International),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Spending cap for one (transaction type, period) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLimit {
    pub transaction_type: TransactionType,
    pub period: LimitPeriod,
    pub limit_amount: Amount,
    pub current_usage: Usage,
    pub period_start: DateTime<Utc>,
    /// Exclusive end of the window
    pub period_end: DateTime<Utc>,
    pub is_enabled: bool,
}

impl CardLimit {
    /// Fresh limit anchored to the window containing `now`, with no usage.
    pub fn new(
        transaction_type: TransactionType,
        period: LimitPeriod,
        limit_amount: Amount,
        is_enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let window = PeriodWindow::containing(now, period);
        Self {
            transaction_type,
            period,
            limit_amount,
            current_usage: Usage::zero(),
            period_start: window.start,
            period_end: window.end,
            is_enabled,
        }
    }

    pub fn window(&self) -> PeriodWindow {
        PeriodWindow {
            start: self.period_start,
            end: self.period_end,
        }
    }

    /// Whether this limit governs the given (type, period) slot
    pub fn matches(&self, transaction_type: TransactionType, period: LimitPeriod) -> bool {
        self.transaction_type == transaction_type && self.period == period
    }

    /// Key used in the remaining-limits map, e.g. `atm_withdrawal_daily`
    pub fn key(&self) -> String {
        format!("{}_{}", self.transaction_type, self.period)
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.window().contains(now)
    }

    /// `max(limit_amount - current_usage, 0)`
    pub fn remaining(&self) -> Decimal {
        self.current_usage.remaining_under(&self.limit_amount)
    }

    /// Reset the window if it has elapsed.
    ///
    /// Returns true when the limit was rolled over. Calling it again within
    /// the new window is a no-op.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        if !self.window().has_elapsed(now) {
            return false;
        }

        let window = PeriodWindow::containing(now, self.period);
        self.period_start = window.start;
        self.period_end = window.end;
        self.current_usage = Usage::zero();
        true
    }

    /// Usage after adding `amount`, without mutating the limit.
    pub fn projected_usage(&self, amount: &Amount) -> Result<Usage, AmountError> {
        self.current_usage.add(amount)
    }
}

/// Roll over every elapsed limit; returns how many were reset.
pub fn roll_over_all(limits: &mut [CardLimit], now: DateTime<Utc>) -> usize {
    limits
        .iter_mut()
        .map(|limit| limit.roll_over(now))
        .filter(|reset| *reset)
        .count()
}

/// Remaining amount for every enabled limit, keyed by `{type}_{period}`.
pub fn remaining_limits(limits: &[CardLimit]) -> BTreeMap<String, Decimal> {
    limits
        .iter()
        .filter(|limit| limit.is_enabled)
        .map(|limit| (limit.key(), limit.remaining()))
        .collect()
}

/// One limit's usage before and after a prospective spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedUsage {
    pub transaction_type: TransactionType,
    pub period: LimitPeriod,
    pub limit_amount: Amount,
    pub usage_before: Usage,
    pub usage_after: Usage,
}

impl ProjectedUsage {
    pub fn exceeds_limit(&self) -> bool {
        self.usage_after.value() > self.limit_amount.value()
    }

    pub fn remaining_before(&self) -> Decimal {
        self.usage_before.remaining_under(&self.limit_amount)
    }
}

/// Outcome of checking a spend against a card's limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendEvaluation {
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub allowed: bool,
    /// Every enabled limit for the transaction type, in card order
    pub projected: Vec<ProjectedUsage>,
    /// First limit that would be exceeded
    pub blocking: Option<ProjectedUsage>,
}

/// Check `amount` against the enabled limits for `transaction_type`.
///
/// Limits are expected to be rolled over already. A transaction type with
/// no enabled limit is unrestricted.
pub fn evaluate_spend(
    limits: &[CardLimit],
    transaction_type: TransactionType,
    amount: &Amount,
) -> SpendEvaluation {
    let mut projected = Vec::new();
    let mut blocking = None;

    for limit in limits
        .iter()
        .filter(|l| l.is_enabled && l.transaction_type == transaction_type)
    {
        let usage_after = match limit.projected_usage(amount) {
            Ok(usage) => usage,
            // Overflowing the usage counter can only mean the cap is blown
            Err(_) => Usage::new(Decimal::MAX).unwrap_or_default(),
        };
        let projection = ProjectedUsage {
            transaction_type: limit.transaction_type,
            period: limit.period,
            limit_amount: limit.limit_amount,
            usage_before: limit.current_usage,
            usage_after,
        };
        if blocking.is_none() && projection.exceeds_limit() {
            blocking = Some(projection.clone());
        }
        projected.push(projection);
    }

    SpendEvaluation {
        transaction_type,
        amount: *amount,
        allowed: blocking.is_none(),
        projected,
        blocking,
    }
}

/// Commit an allowed evaluation: add the amount to every matching enabled limit.
pub fn apply_spend(limits: &mut [CardLimit], evaluation: &SpendEvaluation) {
    if !evaluation.allowed {
        return;
    }
    for limit in limits
        .iter_mut()
        .filter(|l| l.is_enabled && l.transaction_type == evaluation.transaction_type)
    {
        if let Some(projection) = evaluation.projected.iter().find(|p| p.period == limit.period) {
            limit.current_usage = projection.usage_after;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn amount(value: i64) -> Amount {
        Amount::from_integer(value).unwrap()
    }

    fn atm_daily(limit: i64, usage: Decimal, now: DateTime<Utc>) -> CardLimit {
        let mut l = CardLimit::new(
            TransactionType::AtmWithdrawal,
            LimitPeriod::Daily,
            amount(limit),
            true,
            now,
        );
        l.current_usage = Usage::new(usage).unwrap();
        l
    }

    #[test]
    fn test_remaining_and_daily_rollover_scenario() {
        let morning = at(2026, 3, 18, 9);
        let mut limit = atm_daily(1000, dec!(400), morning);
        assert_eq!(limit.remaining(), dec!(600));

        // Same day: nothing changes
        assert!(!limit.roll_over(at(2026, 3, 18, 23)));
        assert_eq!(limit.remaining(), dec!(600));

        // Next day: usage resets
        let tomorrow = at(2026, 3, 19, 8);
        assert!(limit.roll_over(tomorrow));
        assert!(limit.current_usage.is_zero());
        assert_eq!(limit.remaining(), dec!(1000));
        assert_eq!(limit.period_start, at(2026, 3, 19, 0));
        assert_eq!(limit.period_end, at(2026, 3, 20, 0));
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let mut limit = atm_daily(1000, dec!(250), at(2026, 3, 1, 12));
        let now = at(2026, 3, 5, 12);

        assert!(limit.roll_over(now));
        let once = limit.clone();
        assert!(!limit.roll_over(now));
        assert_eq!(limit, once);
    }

    #[test]
    fn test_rollover_window_contains_now_for_every_period() {
        let created = at(2026, 1, 15, 10);
        let now = at(2026, 4, 2, 17);
        for period in [LimitPeriod::Daily, LimitPeriod::Weekly, LimitPeriod::Monthly] {
            let mut limit = CardLimit::new(
                TransactionType::PosPurchase,
                period,
                amount(500),
                true,
                created,
            );
            limit.roll_over(now);
            assert!(limit.period_start <= now && now < limit.period_end);
        }
    }

    #[test]
    fn test_rollover_exactly_at_window_end() {
        let mut limit = atm_daily(1000, dec!(10), at(2026, 3, 18, 9));
        let boundary = limit.period_end;

        assert!(limit.roll_over(boundary));
        assert_eq!(limit.period_start, boundary);
        assert!(limit.current_usage.is_zero());
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let limit = atm_daily(100, dec!(180), at(2026, 3, 18, 9));
        assert_eq!(limit.remaining(), Decimal::ZERO);
    }

    #[test]
    fn test_remaining_limits_skip_disabled() {
        let now = at(2026, 3, 18, 9);
        let mut disabled = CardLimit::new(
            TransactionType::Contactless,
            LimitPeriod::Daily,
            amount(300),
            false,
            now,
        );
        disabled.current_usage = Usage::zero();
        let limits = vec![atm_daily(1000, dec!(400), now), disabled];

        let remaining = remaining_limits(&limits);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining["atm_withdrawal_daily"], dec!(600));
    }

    #[test]
    fn test_evaluate_spend_allowed_and_applied() {
        let now = at(2026, 3, 18, 9);
        let mut limits = vec![
            atm_daily(1000, dec!(400), now),
            CardLimit::new(
                TransactionType::AtmWithdrawal,
                LimitPeriod::Monthly,
                amount(5000),
                true,
                now,
            ),
            CardLimit::new(
                TransactionType::PosPurchase,
                LimitPeriod::Daily,
                amount(50),
                true,
                now,
            ),
        ];

        let evaluation = evaluate_spend(&limits, TransactionType::AtmWithdrawal, &amount(600));
        assert!(evaluation.allowed);
        assert_eq!(evaluation.projected.len(), 2);
        assert!(evaluation.blocking.is_none());

        apply_spend(&mut limits, &evaluation);
        assert_eq!(limits[0].current_usage.value(), dec!(1000));
        assert_eq!(limits[1].current_usage.value(), dec!(600));
        assert!(limits[2].current_usage.is_zero());
    }

    #[test]
    fn test_evaluate_spend_blocked_by_tightest_limit() {
        let now = at(2026, 3, 18, 9);
        let mut limits = vec![atm_daily(1000, dec!(400), now)];

        let evaluation = evaluate_spend(&limits, TransactionType::AtmWithdrawal, &amount(601));
        assert!(!evaluation.allowed);
        let blocking = evaluation.blocking.clone().unwrap();
        assert_eq!(blocking.period, LimitPeriod::Daily);
        assert_eq!(blocking.remaining_before(), dec!(600));

        // Applying a declined evaluation is a no-op
        apply_spend(&mut limits, &evaluation);
        assert_eq!(limits[0].current_usage.value(), dec!(400));
    }

    #[test]
    fn test_disabled_limit_never_blocks() {
        let now = at(2026, 3, 18, 9);
        let mut limit = atm_daily(10, Decimal::ZERO, now);
        limit.is_enabled = false;
        let limits = vec![limit];

        let evaluation = evaluate_spend(&limits, TransactionType::AtmWithdrawal, &amount(500));
        assert!(evaluation.allowed);
        assert!(evaluation.projected.is_empty());
    }

    #[test]
    fn test_projection_does_not_mutate() {
        let now = at(2026, 3, 18, 9);
        let limit = atm_daily(1000, dec!(400), now);
        let projected = limit.projected_usage(&amount(100)).unwrap();

        assert_eq!(projected.value(), dec!(500));
        assert_eq!(limit.current_usage.value(), dec!(400));
        assert!(limit.is_current(now + Duration::hours(1)));
    }

    #[test]
    fn test_transaction_type_round_trip_names() {
        for tx in [
            TransactionType::AtmWithdrawal,
            TransactionType::PosPurchase,
            TransactionType::OnlinePurchase,
            TransactionType::Contactless,
            TransactionType::International,
        ] {
            assert_eq!(tx.as_str().parse::<TransactionType>(), Ok(tx));
        }
        assert!("wire_transfer".parse::<TransactionType>().is_err());
    }
}
