//! HTTP surface: one canonical route per ledger operation.
//!
//! Handlers hold the store lock only across the synchronous store calls;
//! the engine's own transactions provide atomicity, the lock just keeps the
//! single connection single-writer.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::account;
use crate::allocator;
use crate::catalog::{self, Task};
use crate::config::Config;
use crate::daykey::{day_key, now_ts, seconds_until_reset};
use crate::errors::{ErrorKind, LedgerError};
use crate::ledger;
use crate::referral;
use crate::store::Store;
use crate::withdrawal;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Mutex<Store>>,
    pub cfg: Config,
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks/today/:user", get(tasks_today))
        .route("/api/tasks/complete", post(complete_task))
        .route("/api/tasks/history/:user", get(completion_history))
        .route("/api/withdrawals", post(request_withdrawal))
        .route("/api/withdrawals/history/:user", get(withdrawal_history))
        .route("/api/withdrawals/:id/paid", post(mark_paid))
        .route("/api/referrals/:user", get(referral_status))
        .route("/api/referrals/redeem", post(redeem_bonus))
        .route("/api/account/delete", post(request_deletion))
        .route("/api/account/restore", post(cancel_deletion))
        .route("/internal/users", post(register_user))
        .route("/internal/tasks", post(register_task))
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0.kind() {
            ErrorKind::Validation => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.0.reason(), "detail": self.0.to_string() }),
            ),
            ErrorKind::Conflict => (
                StatusCode::CONFLICT,
                json!({ "error": self.0.reason(), "detail": self.0.to_string() }),
            ),
            ErrorKind::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.0.reason(), "detail": self.0.to_string() }),
            ),
            // Store details stay out of responses; callers may retry safely.
            ErrorKind::Store => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.0.reason() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Request / response shapes
// =============================================================================

#[derive(Serialize)]
struct TaskView {
    id: String,
    category: String,
    reward: i64,
    completed: bool,
    answer: Option<String>,
}

#[derive(Serialize)]
struct TodayResponse {
    day_key: String,
    reset_in_secs: i64,
    remaining: i64,
    balance: i64,
    tasks: Vec<TaskView>,
}

#[derive(Deserialize)]
struct CompleteRequest {
    user: String,
    task_id: String,
    answer: String,
}

#[derive(Serialize)]
struct CompleteResponse {
    balance: i64,
    remaining: i64,
}

#[derive(Deserialize)]
struct WithdrawalRequestBody {
    user: String,
    amount: i64,
    phone: String,
    method: String,
}

#[derive(Serialize)]
struct WithdrawalCreatedResponse {
    withdrawal_id: i64,
    status: &'static str,
}

#[derive(Deserialize)]
struct MarkPaidRequest {
    receipt_ref: String,
}

#[derive(Serialize)]
struct ReferralStatusResponse {
    referral_count: i64,
    bonus_balance: i64,
}

#[derive(Deserialize)]
struct UserRequest {
    user: String,
}

#[derive(Serialize)]
struct RedeemResponse {
    balance: i64,
    bonus_balance: i64,
}

#[derive(Deserialize)]
struct RegisterUserRequest {
    id: String,
    referred_by: Option<String>,
}

#[derive(Deserialize)]
struct RegisterTaskRequest {
    id: String,
    category: String,
    reward: i64,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn tasks_today(
    State(st): State<ApiState>,
    Path(user): Path<String>,
) -> ApiResult<TodayResponse> {
    let now = now_ts();
    let key = day_key(now, st.cfg.utc_offset_hours);
    let mut store = st.store.lock().await;
    let conn = store.conn_mut();
    account::ensure_user(conn, &user, now)?;
    let mut rng = StdRng::from_entropy();
    let assignments = allocator::ensure_assignments(conn, &st.cfg, &mut rng, &user, &key, now)?;
    let balance = account::require_user(conn, &user)?.balance;
    let remaining = assignments.iter().filter(|a| a.completed_ts.is_none()).count() as i64;
    let tasks = assignments
        .into_iter()
        .map(|a| TaskView {
            id: a.task_id,
            category: a.category,
            reward: a.reward,
            completed: a.completed_ts.is_some(),
            answer: a.answer,
        })
        .collect();
    Ok(Json(TodayResponse {
        day_key: key,
        reset_in_secs: seconds_until_reset(now, st.cfg.utc_offset_hours),
        remaining,
        balance,
        tasks,
    }))
}

async fn complete_task(
    State(st): State<ApiState>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<CompleteResponse> {
    let now = now_ts();
    let key = day_key(now, st.cfg.utc_offset_hours);
    let mut store = st.store.lock().await;
    let conn = store.conn_mut();
    let balance = ledger::complete(conn, &st.cfg, &req.user, &req.task_id, &req.answer, now)?;
    let remaining = allocator::remaining_for_day(conn, &req.user, &key)?;
    Ok(Json(CompleteResponse { balance, remaining }))
}

async fn completion_history(
    State(st): State<ApiState>,
    Path(user): Path<String>,
) -> ApiResult<Vec<ledger::CompletionEntry>> {
    let store = st.store.lock().await;
    let entries = ledger::completion_history(store.conn(), &st.cfg, &user)?;
    Ok(Json(entries))
}

async fn request_withdrawal(
    State(st): State<ApiState>,
    Json(req): Json<WithdrawalRequestBody>,
) -> ApiResult<WithdrawalCreatedResponse> {
    let mut store = st.store.lock().await;
    let w = withdrawal::request_withdrawal(
        store.conn_mut(),
        &req.user,
        req.amount,
        &req.phone,
        &req.method,
        now_ts(),
    )?;
    Ok(Json(WithdrawalCreatedResponse {
        withdrawal_id: w.id,
        status: w.status.as_str(),
    }))
}

async fn withdrawal_history(
    State(st): State<ApiState>,
    Path(user): Path<String>,
) -> ApiResult<Vec<withdrawal::Withdrawal>> {
    let store = st.store.lock().await;
    let rows = withdrawal::withdrawal_history(store.conn(), &st.cfg, &user)?;
    Ok(Json(rows))
}

async fn mark_paid(
    State(st): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<MarkPaidRequest>,
) -> ApiResult<OkResponse> {
    let mut store = st.store.lock().await;
    withdrawal::mark_paid(store.conn_mut(), id, &req.receipt_ref)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn referral_status(
    State(st): State<ApiState>,
    Path(user): Path<String>,
) -> ApiResult<ReferralStatusResponse> {
    let store = st.store.lock().await;
    let (referral_count, bonus_balance) = referral::referral_status(store.conn(), &user)?;
    Ok(Json(ReferralStatusResponse {
        referral_count,
        bonus_balance,
    }))
}

async fn redeem_bonus(
    State(st): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<RedeemResponse> {
    let mut store = st.store.lock().await;
    let (balance, bonus_balance) = referral::redeem_bonus(store.conn_mut(), &st.cfg, &req.user)?;
    Ok(Json(RedeemResponse {
        balance,
        bonus_balance,
    }))
}

async fn request_deletion(
    State(st): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<serde_json::Value> {
    let store = st.store.lock().await;
    let effective = account::request_deletion(store.conn(), &st.cfg, &req.user, now_ts())?;
    Ok(Json(json!({ "delete_effective_ts": effective })))
}

async fn cancel_deletion(
    State(st): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<OkResponse> {
    let store = st.store.lock().await;
    account::cancel_deletion(store.conn(), &req.user)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn register_user(
    State(st): State<ApiState>,
    Json(req): Json<RegisterUserRequest>,
) -> ApiResult<OkResponse> {
    let store = st.store.lock().await;
    account::create_user(store.conn(), &req.id, req.referred_by.as_deref(), now_ts())?;
    Ok(Json(OkResponse { ok: true }))
}

async fn register_task(
    State(st): State<ApiState>,
    Json(req): Json<RegisterTaskRequest>,
) -> ApiResult<OkResponse> {
    if req.reward <= 0 {
        return Err(ApiError(LedgerError::InvalidAmount));
    }
    let store = st.store.lock().await;
    catalog::insert_task(
        store.conn(),
        &Task {
            id: req.id,
            category: req.category,
            reward: req.reward,
            active: true,
        },
    )?;
    Ok(Json(OkResponse { ok: true }))
}
