//! Domain module
//!
//! Core domain types and business logic: cards, their spending limits and
//! the period windows those limits accumulate over.

pub mod amount;
pub mod card;
pub mod context;
pub mod defaults;
pub mod error;
pub mod limit;
pub mod period;
pub mod user;

pub use amount::{Amount, AmountError, Usage};
pub use card::{Card, CardNetwork, CardSettings, CardStatus, CardType, LimitSetting, NewCard};
pub use context::OperationContext;
pub use defaults::default_limits;
pub use error::DomainError;
pub use limit::{CardLimit, ProjectedUsage, SpendEvaluation, TransactionType};
pub use period::{LimitPeriod, PeriodWindow};
pub use user::User;
