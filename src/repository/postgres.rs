//! PostgreSQL repositories
//!
//! Cards are stored in `cards` with their limits in `card_limits`, one row
//! per limit keyed by `(card_id, position)` so the card's limit order
//! survives a round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Amount, Card, CardLimit, Usage, User};

use super::{Entity, ListFilter, Repository, RepositoryError};

const CARD_COLUMNS: &str = r#"
    id, user_id, account_id, card_type, card_network, status, masked_number,
    card_name, expiry_month, expiry_year, is_contactless_enabled,
    is_online_enabled, is_international_enabled, pin_attempts_remaining,
    version, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct CardRow {
    id: Uuid,
    user_id: Uuid,
    account_id: Uuid,
    card_type: String,
    card_network: String,
    status: String,
    masked_number: String,
    card_name: String,
    expiry_month: i32,
    expiry_year: i32,
    is_contactless_enabled: bool,
    is_online_enabled: bool,
    is_international_enabled: bool,
    pin_attempts_remaining: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CardLimitRow {
    card_id: Uuid,
    transaction_type: String,
    period: String,
    limit_amount: Decimal,
    current_usage: Decimal,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    is_enabled: bool,
}

fn corrupt(id: Uuid, reason: impl ToString) -> RepositoryError {
    RepositoryError::Corrupt {
        kind: Card::KIND,
        id,
        reason: reason.to_string(),
    }
}

impl CardLimitRow {
    fn into_limit(self) -> Result<CardLimit, RepositoryError> {
        let id = self.card_id;
        Ok(CardLimit {
            transaction_type: self.transaction_type.parse().map_err(|e| corrupt(id, e))?,
            period: self.period.parse().map_err(|e| corrupt(id, e))?,
            limit_amount: Amount::new(self.limit_amount).map_err(|e| corrupt(id, e))?,
            current_usage: Usage::new(self.current_usage).map_err(|e| corrupt(id, e))?,
            period_start: self.period_start,
            period_end: self.period_end,
            is_enabled: self.is_enabled,
        })
    }
}

impl CardRow {
    fn into_card(self, limits: Vec<CardLimit>) -> Result<Card, RepositoryError> {
        let id = self.id;
        Ok(Card {
            id,
            user_id: self.user_id,
            account_id: self.account_id,
            card_type: parse_column(id, &self.card_type)?,
            card_network: parse_column(id, &self.card_network)?,
            status: parse_column(id, &self.status)?,
            masked_number: self.masked_number,
            card_name: self.card_name,
            expiry_month: u32::try_from(self.expiry_month).map_err(|e| corrupt(id, e))?,
            expiry_year: self.expiry_year,
            limits,
            is_contactless_enabled: self.is_contactless_enabled,
            is_online_enabled: self.is_online_enabled,
            is_international_enabled: self.is_international_enabled,
            pin_attempts_remaining: self.pin_attempts_remaining,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_column<T: FromStr<Err = String>>(id: Uuid, value: &str) -> Result<T, RepositoryError> {
    value.parse().map_err(|e: String| corrupt(id, e))
}

/// Card repository over PostgreSQL
#[derive(Debug, Clone)]
pub struct PgCardRepository {
    pool: PgPool,
}

impl PgCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_limits(&self, card_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<CardLimit>>, RepositoryError> {
        let rows = sqlx::query_as::<_, CardLimitRow>(
            r#"
            SELECT card_id, transaction_type, period, limit_amount, current_usage,
                   period_start, period_end, is_enabled
            FROM card_limits
            WHERE card_id = ANY($1)
            ORDER BY card_id, position ASC
            "#,
        )
        .bind(card_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_card: HashMap<Uuid, Vec<CardLimit>> = HashMap::new();
        for row in rows {
            let card_id = row.card_id;
            by_card.entry(card_id).or_default().push(row.into_limit()?);
        }
        Ok(by_card)
    }

    async fn write_limits(
        tx: &mut Transaction<'_, Postgres>,
        card: &Card,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM card_limits WHERE card_id = $1")
            .bind(card.id)
            .execute(&mut **tx)
            .await?;

        for (position, limit) in card.limits.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO card_limits (
                    card_id, position, transaction_type, period, limit_amount,
                    current_usage, period_start, period_end, is_enabled
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(card.id)
            .bind(position as i32)
            .bind(limit.transaction_type.as_str())
            .bind(limit.period.as_str())
            .bind(limit.limit_amount.value())
            .bind(limit.current_usage.value())
            .bind(limit.period_start)
            .bind(limit.period_end)
            .bind(limit.is_enabled)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Repository<Card> for PgCardRepository {
    async fn get(&self, id: Uuid) -> Result<Card, RepositoryError> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {} FROM cards WHERE id = $1",
            CARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound { kind: Card::KIND, id })?;

        let limits = self.load_limits(&[id]).await?.remove(&id).unwrap_or_default();
        row.into_card(limits)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Card>, RepositoryError> {
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            r#"
            SELECT {}
            FROM cards
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
            CARD_COLUMNS
        ))
        .bind(filter.owner_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut limits = self.load_limits(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let card_limits = limits.remove(&row.id).unwrap_or_default();
                row.into_card(card_limits)
            })
            .collect()
    }

    async fn create(&self, card: &Card) -> Result<Card, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cards (
                id, user_id, account_id, card_type, card_network, status, masked_number,
                card_name, expiry_month, expiry_year, is_contactless_enabled,
                is_online_enabled, is_international_enabled, pin_attempts_remaining,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, $15, $16)
            "#,
        )
        .bind(card.id)
        .bind(card.user_id)
        .bind(card.account_id)
        .bind(card.card_type.as_str())
        .bind(card.card_network.as_str())
        .bind(card.status.as_str())
        .bind(&card.masked_number)
        .bind(&card.card_name)
        .bind(card.expiry_month as i32)
        .bind(card.expiry_year)
        .bind(card.is_contactless_enabled)
        .bind(card.is_online_enabled)
        .bind(card.is_international_enabled)
        .bind(card.pin_attempts_remaining)
        .bind(card.created_at)
        .bind(card.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, Card::KIND, card.id.to_string()))?;

        Self::write_limits(&mut tx, card).await?;
        tx.commit().await?;

        let mut stored = card.clone();
        stored.version = 0;
        Ok(stored)
    }

    async fn update(&self, card: &Card) -> Result<Card, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Lock the row and verify the version read by the caller
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM cards WHERE id = $1 FOR UPDATE")
                .bind(card.id)
                .fetch_optional(&mut *tx)
                .await?;
        let (actual,) = current.ok_or(RepositoryError::NotFound {
            kind: Card::KIND,
            id: card.id,
        })?;
        if actual != card.version {
            return Err(RepositoryError::VersionConflict {
                kind: Card::KIND,
                id: card.id,
                expected: card.version,
                actual,
            });
        }

        sqlx::query(
            r#"
            UPDATE cards
            SET status = $2,
                card_name = $3,
                is_contactless_enabled = $4,
                is_online_enabled = $5,
                is_international_enabled = $6,
                pin_attempts_remaining = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(card.id)
        .bind(card.status.as_str())
        .bind(&card.card_name)
        .bind(card.is_contactless_enabled)
        .bind(card.is_online_enabled)
        .bind(card.is_international_enabled)
        .bind(card.pin_attempts_remaining)
        .bind(card.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::write_limits(&mut tx, card).await?;
        tx.commit().await?;

        let mut stored = card.clone();
        stored.version = actual + 1;
        Ok(stored)
    }
}

fn map_unique_violation(err: sqlx::Error, kind: &'static str, key: String) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return RepositoryError::AlreadyExists {
                kind,
                key: db_err.constraint().map(str::to_string).unwrap_or(key),
            };
        }
    }
    RepositoryError::Database(err)
}

type UserRow = (Uuid, String, String, Option<String>, bool, DateTime<Utc>, DateTime<Utc>);

fn user_from_row(
    (id, username, email, display_name, is_active, created_at, updated_at): UserRow,
) -> User {
    User {
        id,
        username,
        email,
        display_name,
        is_active,
        created_at,
        updated_at,
    }
}

/// User repository over PostgreSQL
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<User> for PgUserRepository {
    async fn get(&self, id: Uuid) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, email, display_name, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row)
            .ok_or(RepositoryError::NotFound { kind: User::KIND, id })
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, email, display_name, is_active, created_at, updated_at
            FROM users
            ORDER BY created_at ASC, id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn create(&self, user: &User) -> Result<User, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, display_name, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, User::KIND, user.username.clone()))?;

        Ok(user.clone())
    }

    async fn update(&self, user: &User) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = $2, email = $3, display_name = $4, is_active = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, User::KIND, user.username.clone()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                kind: User::KIND,
                id: user.id,
            });
        }
        Ok(user.clone())
    }
}
