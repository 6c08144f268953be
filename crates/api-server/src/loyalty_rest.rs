//! Loyalty program REST API endpoints.

use crate::rest::{ApiResult, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dinepoints_core::account::{Account, AccountStatus, ChallengePeriod, RedeemedReward, StreakKind};
use dinepoints_core::events::{BookingCompleted, CheckinOccurred, ReferralConfirmed, ReviewSubmitted};
use dinepoints_loyalty::{
    ActiveChallenges, AwardReceipt, ClaimReceipt, EnrollRequest, HistoryPage, LeaderboardEntry,
    LeaderboardMetric, Occasion, RedeemReceipt, RedeemRequest, RewardView, StreakUpdate,
};
use serde::{Deserialize, Serialize};

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub metric: LeaderboardMetric,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AccountStatus,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub period: ChallengePeriod,
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub reward_id: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreakRequest {
    pub kind: StreakKind,
    #[serde(default = "default_increment")]
    pub increment: bool,
}

fn default_increment() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct OccasionRequest {
    pub occasion: Occasion,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignResponse {
    pub user_id: String,
    pub assigned: usize,
}

// ─── Accounts ───────────────────────────────────────────────────────────────

/// POST /v1/accounts
pub async fn handle_enroll(
    State(state): State<AppState>,
    Json(request): Json<EnrollRequest>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = state.engine.enroll(&request)?;
    metrics::counter!("loyalty.api.enrollments").increment(1);
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /v1/accounts/:user_id
pub async fn handle_get_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.engine.get_account(&user_id)?))
}

/// PUT /v1/accounts/:user_id/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.engine.set_status(&user_id, request.status)?))
}

/// GET /v1/accounts/:user_id/history?page=&limit=
pub async fn handle_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryPage>> {
    Ok(Json(state.engine.points_history(&user_id, query.page, query.limit)?))
}

/// POST /v1/accounts/:user_id/streaks
pub async fn handle_update_streak(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<StreakRequest>,
) -> ApiResult<Json<StreakUpdate>> {
    Ok(Json(state.engine.update_streak(&user_id, request.kind, request.increment)?))
}

/// POST /v1/accounts/:user_id/streaks/reset-lapsed
pub async fn handle_reset_lapsed_streaks(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<StreakUpdate>>> {
    Ok(Json(state.engine.reset_lapsed_streaks(&user_id, chrono::Utc::now())?))
}

/// POST /v1/accounts/:user_id/occasions
pub async fn handle_occasion_bonus(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<OccasionRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state
        .engine
        .grant_occasion_bonus(&user_id, request.occasion, chrono::Utc::now())?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

// ─── Challenges ─────────────────────────────────────────────────────────────

/// GET /v1/accounts/:user_id/challenges
pub async fn handle_active_challenges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ActiveChallenges>> {
    Ok(Json(state.engine.active_challenges(&user_id)?))
}

/// POST /v1/accounts/:user_id/challenges/assign
pub async fn handle_assign_challenges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AssignResponse>> {
    let assigned = state.engine.assign_challenges(&user_id)?;
    Ok(Json(AssignResponse { user_id, assigned }))
}

/// POST /v1/accounts/:user_id/challenges/:challenge_id/claim
pub async fn handle_claim(
    State(state): State<AppState>,
    Path((user_id, challenge_id)): Path<(String, String)>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimReceipt>> {
    let receipt = state
        .engine
        .claim_challenge(&user_id, &challenge_id, request.period)?;
    Ok(Json(receipt))
}

// ─── Rewards ────────────────────────────────────────────────────────────────

/// GET /v1/rewards
pub async fn handle_rewards(State(state): State<AppState>) -> ApiResult<Json<Vec<RewardView>>> {
    Ok(Json(state.engine.available_rewards()?))
}

/// POST /v1/accounts/:user_id/redeem
pub async fn handle_redeem(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<RedeemBody>,
) -> ApiResult<Json<RedeemReceipt>> {
    let receipt = state.engine.redeem(&RedeemRequest {
        user_id,
        reward_id: body.reward_id,
        idempotency_key: body.idempotency_key,
    })?;
    metrics::counter!("loyalty.api.redemptions").increment(1);
    Ok(Json(receipt))
}

/// POST /v1/accounts/:user_id/redemptions/:code/use
pub async fn handle_mark_used(
    State(state): State<AppState>,
    Path((user_id, code)): Path<(String, String)>,
) -> ApiResult<Json<RedeemedReward>> {
    Ok(Json(state.engine.mark_redemption_used(&user_id, &code)?))
}

/// GET /v1/leaderboard?metric=&limit=
pub async fn handle_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT);
    Ok(Json(state.engine.leaderboard(query.metric, limit)?))
}

// ─── Inbound events ─────────────────────────────────────────────────────────

/// POST /v1/events/booking-completed
pub async fn handle_booking_completed(
    State(state): State<AppState>,
    Json(event): Json<BookingCompleted>,
) -> ApiResult<Json<AwardReceipt>> {
    metrics::counter!("loyalty.api.events", "type" => "booking_completed").increment(1);
    Ok(Json(state.engine.on_booking_completed(&event)?))
}

/// POST /v1/events/review-submitted
pub async fn handle_review_submitted(
    State(state): State<AppState>,
    Json(event): Json<ReviewSubmitted>,
) -> ApiResult<Json<AwardReceipt>> {
    metrics::counter!("loyalty.api.events", "type" => "review_submitted").increment(1);
    Ok(Json(state.engine.on_review_submitted(&event)?))
}

/// POST /v1/events/checkin
pub async fn handle_checkin(
    State(state): State<AppState>,
    Json(event): Json<CheckinOccurred>,
) -> ApiResult<Json<AwardReceipt>> {
    metrics::counter!("loyalty.api.events", "type" => "checkin").increment(1);
    Ok(Json(state.engine.on_checkin(&event)?))
}

/// POST /v1/events/referral-confirmed
pub async fn handle_referral_confirmed(
    State(state): State<AppState>,
    Json(event): Json<ReferralConfirmed>,
) -> ApiResult<Json<AwardReceipt>> {
    metrics::counter!("loyalty.api.events", "type" => "referral_confirmed").increment(1);
    Ok(Json(state.engine.on_referral_confirmed(&event)?))
}
