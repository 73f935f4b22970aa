//! Scheduled Jobs
//!
//! Background maintenance over stored cards. Reads always roll limit
//! windows over lazily, so these sweeps only keep stored state fresh.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::domain::Card;
use crate::repository::{ListFilter, Repository, RepositoryError};

/// Cards fetched per page during a sweep
const SWEEP_PAGE_SIZE: i64 = 200;

// =========================================================================
// Limit rollover sweep
// =========================================================================

/// Outcome of one pass over the card store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub cards_scanned: u64,
    pub cards_updated: u64,
    pub windows_rolled: u64,
    pub cards_expired: u64,
    /// Cards changed by a request while the sweep held a stale copy
    pub conflicts: u64,
}

/// Roll over elapsed limit windows and flag expired cards.
///
/// Version conflicts are counted and skipped; the request that won has
/// stored a card that rolls over the same way on its next read.
pub async fn sweep_card_limits(cards: &dyn Repository<Card>, now: DateTime<Utc>) -> Result<SweepResult, JobError> {
    let mut result = SweepResult::default();
    let mut offset = 0;

    loop {
        let page = cards.list(&ListFilter::page(SWEEP_PAGE_SIZE, offset)).await?;
        let fetched = page.len() as i64;

        for mut card in page {
            result.cards_scanned += 1;

            let rolled = card.roll_over_limits(now);
            let expired = card.mark_expired_if_due(now);
            if rolled == 0 && !expired {
                continue;
            }

            match cards.update(&card).await {
                Ok(_) => {
                    result.cards_updated += 1;
                    result.windows_rolled += rolled as u64;
                    if expired {
                        result.cards_expired += 1;
                        tracing::info!(card_id = %card.id, "Card marked expired");
                    }
                }
                Err(e) if e.is_version_conflict() => {
                    tracing::debug!(card_id = %card.id, "Card changed during sweep, skipping");
                    result.conflicts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if fetched < SWEEP_PAGE_SIZE {
            break;
        }
        offset += fetched;
    }

    if result.cards_updated > 0 {
        tracing::info!(
            cards_scanned = result.cards_scanned,
            cards_updated = result.cards_updated,
            windows_rolled = result.windows_rolled,
            cards_expired = result.cards_expired,
            "Card limit sweep completed"
        );
    }

    Ok(result)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the limit rollover sweep (default: 5 minutes)
    pub limit_sweep_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            limit_sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    cards: Arc<dyn Repository<Card>>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(cards: Arc<dyn Repository<Card>>) -> Self {
        Self {
            cards,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(cards: Arc<dyn Repository<Card>>, config: JobSchedulerConfig) -> Self {
        Self { cards, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            limit_sweep_interval_secs = self.config.limit_sweep_interval.as_secs(),
            "Job scheduler started"
        );

        let mut sweep_interval = interval(self.config.limit_sweep_interval);

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    if let Err(e) = sweep_card_limits(self.cards.as_ref(), Utc::now()).await {
                        tracing::error!(error = %e, "Card limit sweep failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        self.run_all_at(Utc::now()).await
    }

    pub(crate) async fn run_all_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match sweep_card_limits(self.cards.as_ref(), now).await {
            Ok(sweep) => report.limit_sweep = sweep,
            Err(e) => report.errors.push(format!("Card limit sweep: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub limit_sweep: SweepResult,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CardNetwork, CardStatus, CardType, LimitPeriod, LimitSetting, NewCard, TransactionType};
    use crate::repository::InMemoryRepository;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn new_card(now: DateTime<Utc>) -> Card {
        Card::issue(
            NewCard {
                user_id: uuid::Uuid::new_v4(),
                account_id: uuid::Uuid::new_v4(),
                card_type: CardType::Debit,
                card_network: CardNetwork::Visa,
                card_name: "SWEEP TEST".to_string(),
                is_contactless_enabled: true,
                is_online_enabled: true,
                is_international_enabled: false,
            },
            now,
            &mut rand::thread_rng(),
        )
        .unwrap()
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.limit_sweep_interval, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store() {
        let repo = InMemoryRepository::<Card>::new();
        let result = sweep_card_limits(&repo, Utc::now()).await.unwrap();
        assert_eq!(result, SweepResult::default());
    }

    #[tokio::test]
    async fn test_sweep_rolls_over_elapsed_windows() {
        let issued = at(2026, 6, 15, 9);
        let repo = InMemoryRepository::<Card>::new();

        let mut card = new_card(issued);
        card.set_limit(
            LimitSetting {
                transaction_type: TransactionType::AtmWithdrawal,
                period: LimitPeriod::Monthly,
                limit_amount: "20000".parse().unwrap(),
                is_enabled: true,
            },
            issued,
        )
        .unwrap();
        card.authorize_spend(TransactionType::AtmWithdrawal, &"400".parse().unwrap(), issued)
            .unwrap();
        let card = repo.create(&card).await.unwrap();

        // Same day: nothing to do
        let result = sweep_card_limits(&repo, at(2026, 6, 15, 20)).await.unwrap();
        assert_eq!(result.cards_scanned, 1);
        assert_eq!(result.cards_updated, 0);

        // Next day: the daily windows roll, the monthly ones do not
        let result = sweep_card_limits(&repo, at(2026, 6, 16, 9)).await.unwrap();
        assert_eq!(result.cards_updated, 1);
        assert!(result.windows_rolled >= 1);

        let stored = repo.get(card.id).await.unwrap();
        let daily = stored.limit(TransactionType::AtmWithdrawal, LimitPeriod::Daily).unwrap();
        assert_eq!(daily.current_usage.value(), dec!(0));
        assert_eq!(daily.period_start, at(2026, 6, 16, 0));

        let monthly = stored.limit(TransactionType::AtmWithdrawal, LimitPeriod::Monthly).unwrap();
        assert_eq!(monthly.current_usage.value(), dec!(400));

        // Idempotent
        let result = sweep_card_limits(&repo, at(2026, 6, 16, 10)).await.unwrap();
        assert_eq!(result.cards_updated, 0);
    }

    #[tokio::test]
    async fn test_sweep_marks_expired_cards() {
        let issued = at(2026, 6, 15, 9);
        let repo = InMemoryRepository::<Card>::new();
        let card = repo.create(&new_card(issued)).await.unwrap();

        let later = at(card.expiry_year + 1, 1, 2, 0);
        let result = sweep_card_limits(&repo, later).await.unwrap();
        assert_eq!(result.cards_expired, 1);
        assert_eq!(repo.get(card.id).await.unwrap().status, CardStatus::Expired);
    }

    #[tokio::test]
    async fn test_run_all_once_reports_sweep() {
        let issued = at(2026, 6, 15, 9);
        let repo = Arc::new(InMemoryRepository::<Card>::new());
        for _ in 0..3 {
            repo.create(&new_card(issued)).await.unwrap();
        }

        let scheduler = JobScheduler::new(repo.clone());
        let report = scheduler.run_all_at(at(2026, 7, 1, 0)).await;

        assert!(report.errors.is_empty());
        assert_eq!(report.limit_sweep.cards_scanned, 3);
        assert_eq!(report.limit_sweep.cards_updated, 3);
    }
}
