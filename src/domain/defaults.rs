//! Default limit provisioning
//!
//! Limits a freshly issued card starts with, by card type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::amount::Amount;
use super::card::CardType;
use super::limit::{CardLimit, TransactionType};
use super::period::LimitPeriod;

type DefaultLimit = (CardType, TransactionType, LimitPeriod, i64);

const DEFAULT_LIMITS: &[DefaultLimit] = &[
    (CardType::Debit, TransactionType::AtmWithdrawal, LimitPeriod::Daily, 1_000),
    (CardType::Debit, TransactionType::PosPurchase, LimitPeriod::Daily, 5_000),
    (CardType::Debit, TransactionType::OnlinePurchase, LimitPeriod::Daily, 3_000),
    (CardType::Debit, TransactionType::Contactless, LimitPeriod::Daily, 500),
    (CardType::Debit, TransactionType::International, LimitPeriod::Monthly, 10_000),
    (CardType::Credit, TransactionType::PosPurchase, LimitPeriod::Monthly, 50_000),
    (CardType::Credit, TransactionType::OnlinePurchase, LimitPeriod::Monthly, 30_000),
    (CardType::Credit, TransactionType::Contactless, LimitPeriod::Daily, 1_000),
    (CardType::Credit, TransactionType::International, LimitPeriod::Monthly, 25_000),
    (CardType::Prepaid, TransactionType::AtmWithdrawal, LimitPeriod::Daily, 500),
    (CardType::Prepaid, TransactionType::PosPurchase, LimitPeriod::Daily, 2_000),
    (CardType::Prepaid, TransactionType::OnlinePurchase, LimitPeriod::Daily, 1_500),
    (CardType::Prepaid, TransactionType::Contactless, LimitPeriod::Daily, 300),
];

/// Enabled limits with zero usage, anchored to the windows containing `now`.
pub fn default_limits(card_type: CardType, now: DateTime<Utc>) -> Vec<CardLimit> {
    DEFAULT_LIMITS
        .iter()
        .filter(|(kind, ..)| *kind == card_type)
        .map(|&(_, transaction_type, period, amount)| {
            CardLimit::new(
                transaction_type,
                period,
                Amount::from_trusted(Decimal::from(amount)),
                true,
                now,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_debit_defaults() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap();
        let limits = default_limits(CardType::Debit, now);

        assert_eq!(limits.len(), 5);
        let atm = limits
            .iter()
            .find(|l| l.matches(TransactionType::AtmWithdrawal, LimitPeriod::Daily))
            .unwrap();
        assert_eq!(atm.limit_amount.value(), dec!(1000));
        assert!(atm.current_usage.is_zero());
        assert!(atm.is_enabled);
        assert!(atm.is_current(now));
    }

    #[test]
    fn test_credit_has_no_atm_limit() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap();
        let limits = default_limits(CardType::Credit, now);

        assert_eq!(limits.len(), 4);
        assert!(limits
            .iter()
            .all(|l| l.transaction_type != TransactionType::AtmWithdrawal));
        let pos = limits
            .iter()
            .find(|l| l.transaction_type == TransactionType::PosPurchase)
            .unwrap();
        assert_eq!(pos.period, LimitPeriod::Monthly);
        assert_eq!(pos.limit_amount.value(), dec!(50000));
    }

    #[test]
    fn test_prepaid_contactless_daily_cap() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap();
        let limits = default_limits(CardType::Prepaid, now);

        assert_eq!(limits.len(), 4);
        let contactless = limits
            .iter()
            .find(|l| l.matches(TransactionType::Contactless, LimitPeriod::Daily))
            .unwrap();
        assert_eq!(contactless.limit_amount.value(), dec!(300));
    }

    #[test]
    fn test_default_keys_are_unique() {
        let now = Utc::now();
        for card_type in [CardType::Debit, CardType::Credit, CardType::Prepaid] {
            let limits = default_limits(card_type, now);
            let mut keys: Vec<String> = limits.iter().map(CardLimit::key).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), limits.len());
        }
    }
}
