//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::audit::{AuditLogEntry, ChainVerificationResult};
use crate::domain::{Card, CardLimit, CardStatus, OperationContext, User};
use crate::error::AppError;
use crate::handlers::{
    AuthorizationResult, AuthorizeSpendCommand, AuthorizeSpendHandler, CardLimitsHandler,
    CardLimitsResult, CardQueryHandler, CardStatusResult, ChangeCardStatusCommand,
    ChangeCardStatusHandler, CreateUserCommand, CreateUserHandler, GetUserHandler,
    IssueCardCommand, IssueCardHandler, ListCardsQuery, SetCardLimitCommand,
    SetCardLimitHandler, UpdateCardSettingsCommand, UpdateCardSettingsHandler,
};
use crate::state::AppState;

use super::middleware::AuthenticatedApiKey;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default = "Uuid::new_v4")]
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Monetary input accepted either as a JSON string or number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn into_string(self) -> String {
        match self {
            AmountInput::Text(s) => s,
            AmountInput::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueCardRequest {
    pub account_id: Uuid,
    pub card_type: String,
    pub card_network: String,
    pub card_name: String,
    #[serde(default)]
    pub is_contactless_enabled: Option<bool>,
    #[serde(default)]
    pub is_online_enabled: Option<bool>,
    #[serde(default)]
    pub is_international_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CardResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_type: String,
    pub card_network: String,
    pub status: CardStatus,
    pub masked_number: String,
    pub card_name: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub is_contactless_enabled: bool,
    pub is_online_enabled: bool,
    pub is_international_enabled: bool,
    pub pin_attempts_remaining: i32,
    pub limits: Vec<CardLimit>,
    pub remaining_limits: BTreeMap<String, Decimal>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Card> for CardResponse {
    fn from(card: Card) -> Self {
        Self {
            remaining_limits: card.remaining_limits(),
            id: card.id,
            user_id: card.user_id,
            account_id: card.account_id,
            card_type: card.card_type.to_string(),
            card_network: card.card_network.to_string(),
            status: card.status,
            masked_number: card.masked_number,
            card_name: card.card_name,
            expiry_month: card.expiry_month,
            expiry_year: card.expiry_year,
            is_contactless_enabled: card.is_contactless_enabled,
            is_online_enabled: card.is_online_enabled,
            is_international_enabled: card.is_international_enabled,
            pin_attempts_remaining: card.pin_attempts_remaining,
            limits: card.limits,
            version: card.version,
            created_at: card.created_at,
            updated_at: card.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueCardResponse {
    pub card: CardResponse,
    pub delivery_estimate: String,
}

#[derive(Debug, Serialize)]
pub struct CardListResponse {
    pub cards: Vec<CardResponse>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct CardListQuery {
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub is_contactless_enabled: Option<bool>,
    #[serde(default)]
    pub is_online_enabled: Option<bool>,
    #[serde(default)]
    pub is_international_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusChangeRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub transaction_type: String,
    pub period: String,
    pub limit_amount: AmountInput,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationRequest {
    pub transaction_type: String,
    pub amount: AmountInput,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub entries: Vec<AuditLogEntry>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Users
        .route("/users", post(create_user))
        .route("/users/:user_id", get(get_user))
        // Cards
        .route("/cards", get(list_cards).post(issue_card))
        .route(
            "/cards/:card_id",
            get(get_card).patch(update_card).delete(cancel_card),
        )
        .route("/cards/:card_id/freeze", post(freeze_card))
        .route("/cards/:card_id/unfreeze", post(unfreeze_card))
        .route("/cards/:card_id/block", post(block_card))
        // Limits
        .route("/cards/:card_id/limits", get(get_card_limits).post(set_card_limit))
        .route("/cards/:card_id/authorizations", post(authorize_spend))
        // Admin
        .route("/admin/audit", get(get_audit_log))
        .route("/admin/audit/verify", get(verify_audit_log))
}

// =========================================================================
// Users
// =========================================================================

/// POST /users
async fn create_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let command = CreateUserCommand::new(request.user_id, request.username, request.email);
    let command = match request.display_name {
        Some(display_name) => command.with_display_name(display_name),
        None => command,
    };

    let user = CreateUserHandler::new(&state).execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users/:user_id
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = GetUserHandler::new(&state).execute(user_id).await?;
    Ok(Json(user.into()))
}

// =========================================================================
// Cards
// =========================================================================

/// GET /cards
async fn list_cards(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<CardListQuery>,
) -> Result<Json<CardListResponse>, AppError> {
    let cards = CardQueryHandler::new(&state)
        .list(
            ListCardsQuery {
                card_type: query.card_type,
                status: query.status,
                account_id: query.account_id,
            },
            &context,
        )
        .await?;

    let cards: Vec<CardResponse> = cards.into_iter().map(CardResponse::from).collect();
    Ok(Json(CardListResponse {
        total: cards.len(),
        cards,
    }))
}

/// POST /cards
async fn issue_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<IssueCardRequest>,
) -> Result<(StatusCode, Json<IssueCardResponse>), AppError> {
    let command = IssueCardCommand::new(
        request.account_id,
        request.card_type,
        request.card_network,
        request.card_name,
    )
    .with_channels(
        request.is_contactless_enabled.unwrap_or(true),
        request.is_online_enabled.unwrap_or(true),
        request.is_international_enabled.unwrap_or(false),
    );

    let result = IssueCardHandler::new(&state).execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueCardResponse {
            card: result.card.into(),
            delivery_estimate: result.delivery_estimate,
        }),
    ))
}

/// GET /cards/:card_id
async fn get_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardResponse>, AppError> {
    let card = CardQueryHandler::new(&state).get(card_id, &context).await?;
    Ok(Json(card.into()))
}

/// PATCH /cards/:card_id
async fn update_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<UpdateCardRequest>,
) -> Result<Json<CardResponse>, AppError> {
    let command = UpdateCardSettingsCommand {
        card_id,
        card_name: request.card_name,
        is_contactless_enabled: request.is_contactless_enabled,
        is_online_enabled: request.is_online_enabled,
        is_international_enabled: request.is_international_enabled,
    };

    let card = UpdateCardSettingsHandler::new(&state)
        .execute(command, &context)
        .await?;
    Ok(Json(card.into()))
}

async fn change_status(
    state: &AppState,
    context: &OperationContext,
    card_id: Uuid,
    status: CardStatus,
    request: Option<Json<StatusChangeRequest>>,
) -> Result<Json<CardStatusResult>, AppError> {
    let reason = request.and_then(|Json(r)| r.reason);
    let command = ChangeCardStatusCommand::new(card_id, status).with_reason(reason);

    let result = ChangeCardStatusHandler::new(state)
        .execute(command, context)
        .await?;
    Ok(Json(result))
}

/// DELETE /cards/:card_id
async fn cancel_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardStatusResult>, AppError> {
    change_status(&state, &context, card_id, CardStatus::Cancelled, None).await
}

/// POST /cards/:card_id/freeze
async fn freeze_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    request: Option<Json<StatusChangeRequest>>,
) -> Result<Json<CardStatusResult>, AppError> {
    change_status(&state, &context, card_id, CardStatus::Frozen, request).await
}

/// POST /cards/:card_id/unfreeze
async fn unfreeze_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    request: Option<Json<StatusChangeRequest>>,
) -> Result<Json<CardStatusResult>, AppError> {
    change_status(&state, &context, card_id, CardStatus::Active, request).await
}

/// POST /cards/:card_id/block
async fn block_card(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    request: Option<Json<StatusChangeRequest>>,
) -> Result<Json<CardStatusResult>, AppError> {
    change_status(&state, &context, card_id, CardStatus::Blocked, request).await
}

// =========================================================================
// Limits
// =========================================================================

/// GET /cards/:card_id/limits
async fn get_card_limits(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardLimitsResult>, AppError> {
    let result = CardLimitsHandler::new(&state).execute(card_id, &context).await?;
    Ok(Json(result))
}

/// POST /cards/:card_id/limits
async fn set_card_limit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<SetLimitRequest>,
) -> Result<Json<CardLimitsResult>, AppError> {
    let command = SetCardLimitCommand::new(
        card_id,
        request.transaction_type,
        request.period,
        request.limit_amount.into_string(),
    )
    .enabled(request.is_enabled);

    let result = SetCardLimitHandler::new(&state).execute(command, &context).await?;
    Ok(Json(result))
}

/// POST /cards/:card_id/authorizations
async fn authorize_spend(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<AuthorizationRequest>,
) -> Result<Json<AuthorizationResult>, AppError> {
    let command = AuthorizeSpendCommand::new(
        card_id,
        request.transaction_type,
        request.amount.into_string(),
    )
    .dry_run(request.dry_run);

    let result = AuthorizeSpendHandler::new(&state)
        .execute(command, &context)
        .await?;
    Ok(Json(result))
}

// =========================================================================
// Admin
// =========================================================================

fn require_admin(api_key: &AuthenticatedApiKey) -> Result<(), AppError> {
    if !api_key.has_permission("admin") {
        tracing::warn!(api_key = %api_key.name, "Admin endpoint denied");
        return Err(AppError::PermissionDenied);
    }
    Ok(())
}

/// GET /admin/audit
async fn get_audit_log(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditListResponse>, AppError> {
    require_admin(&api_key)?;

    let limit = query.limit.clamp(1, 1000);
    let entries = match query.user_id {
        Some(user_id) => state.audit.get_by_user(user_id, limit).await?,
        None => state.audit.get_recent(limit).await?,
    };
    Ok(Json(AuditListResponse { entries }))
}

/// GET /admin/audit/verify
async fn verify_audit_log(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
) -> Result<Json<ChainVerificationResult>, AppError> {
    require_admin(&api_key)?;

    let result = state.audit.verify_hash_chain(None).await?;
    if !result.is_valid {
        tracing::error!(
            first_invalid_entry = ?result.first_invalid_entry,
            "Audit hash chain verification failed"
        );
    }
    Ok(Json(result))
}
