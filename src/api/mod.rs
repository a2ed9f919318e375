// HTTP API routes (ratings, score events, throttle checks, admin).

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::engine::{ReputationEngine, ScoreEvent, SpinRequest};
use crate::error::EngineError;
use crate::throttle::ThrottleOutcome;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ReactionEventRequest {
    pub actor_id: i64,
    pub target_id: i64,
    pub chat_id: i64,
    pub emoji: String,
    pub event_id: String,
}

#[derive(Deserialize)]
pub struct ReplyEventRequest {
    pub actor_id: i64,
    pub target_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub event_id: String,
}

#[derive(Deserialize)]
pub struct ThrottleCheckRequest {
    pub action: String,
    pub subject_id: i64,
    pub chat_id: i64,
}

#[derive(Deserialize)]
pub struct UsageRequest {
    pub user_id: i64,
    pub chat_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Deserialize)]
pub struct SetRatingRequest {
    pub user_id: i64,
    pub chat_id: i64,
    pub rating: i64,
}

#[derive(Deserialize)]
pub struct TopParams {
    pub n: Option<i64>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReputationEngine>,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn engine_error(e: EngineError) -> impl IntoResponse {
    match e {
        EngineError::StoreUnavailable(e) => {
            tracing::error!("Rating store error: {e}");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "Rating store unavailable")
        }
        EngineError::InvalidEvent(msg) => json_error(StatusCode::BAD_REQUEST, &msg),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(engine: Arc<ReputationEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        // Ratings
        .route("/api/ratings/{chat_id}/top", get(get_top_ratings))
        .route("/api/ratings/{chat_id}/{user_id}", get(get_rating))
        // Score events
        .route("/api/events/score", post(post_score_event))
        .route("/api/events/reaction", post(post_reaction_event))
        .route("/api/events/reply", post(post_reply_event))
        .route("/api/events/spin", post(post_spin))
        // Throttling
        .route("/api/throttle/check", post(post_throttle_check))
        // Token usage
        .route("/api/usage", post(post_usage))
        .route("/api/usage/{chat_id}/{user_id}", get(get_usage))
        // Admin
        .route("/api/admin/ratings/set", post(admin_set_rating))
        .route("/api/admin/chats/{chat_id}/wipe", post(admin_wipe_chat))
        .route("/api/admin/decay/run", post(admin_run_decay))
        .with_state(state)
}

// ── Rating handlers ───────────────────────────────────────────────────

async fn get_rating(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match state.engine.rating_with_rank(user_id, chat_id).await {
        Ok((rating, rank)) => (
            StatusCode::OK,
            Json(json!({
                "user_id": user_id,
                "chat_id": chat_id,
                "rating": rating,
                "rank": rank,
            })),
        )
            .into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn get_top_ratings(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<TopParams>,
) -> impl IntoResponse {
    let n = params.n.unwrap_or(10).clamp(1, 100);
    match state.engine.leaderboard(chat_id, n).await {
        Ok(entries) => (StatusCode::OK, Json(json!(entries))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

// ── Score event handlers ──────────────────────────────────────────────

async fn post_score_event(
    State(state): State<AppState>,
    Json(event): Json<ScoreEvent>,
) -> impl IntoResponse {
    match state.engine.apply_score_event(event).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn post_reaction_event(
    State(state): State<AppState>,
    Json(req): Json<ReactionEventRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .apply_reaction(
            req.actor_id,
            req.target_id,
            req.chat_id,
            &req.emoji,
            req.event_id,
        )
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn post_reply_event(
    State(state): State<AppState>,
    Json(req): Json<ReplyEventRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .apply_reply(
            req.actor_id,
            req.target_id,
            req.chat_id,
            &req.text,
            req.event_id,
        )
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn post_spin(
    State(state): State<AppState>,
    Json(req): Json<SpinRequest>,
) -> impl IntoResponse {
    match state.engine.spin(req).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

// ── Throttle handler ──────────────────────────────────────────────────

async fn post_throttle_check(
    State(state): State<AppState>,
    Json(req): Json<ThrottleCheckRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .check_throttle(&req.action, req.subject_id, req.chat_id)
        .await
    {
        Ok(ThrottleOutcome::Allowed) => {
            (StatusCode::OK, Json(json!({ "allowed": true }))).into_response()
        }
        Ok(ThrottleOutcome::Denied {
            retry_after_seconds,
        }) => (
            StatusCode::OK,
            Json(json!({
                "allowed": false,
                "retry_after_seconds": retry_after_seconds,
            })),
        )
            .into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

// ── Token usage handlers ──────────────────────────────────────────────

async fn post_usage(
    State(state): State<AppState>,
    Json(req): Json<UsageRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .record_usage(req.user_id, req.chat_id, req.input_tokens, req.output_tokens)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(json!(report))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn get_usage(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match state.engine.get_usage(user_id, chat_id).await {
        Ok(report) => (StatusCode::OK, Json(json!(report))).into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

// ── Admin handlers ────────────────────────────────────────────────────

async fn admin_set_rating(
    State(state): State<AppState>,
    Json(req): Json<SetRatingRequest>,
) -> impl IntoResponse {
    if let Err(e) = state
        .engine
        .set_rating(req.user_id, req.chat_id, req.rating)
        .await
    {
        return engine_error(e).into_response();
    }
    match state
        .engine
        .rating_with_rank(req.user_id, req.chat_id)
        .await
    {
        Ok((rating, rank)) => (
            StatusCode::OK,
            Json(json!({
                "user_id": req.user_id,
                "chat_id": req.chat_id,
                "rating": rating,
                "rank": rank,
            })),
        )
            .into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn admin_wipe_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.wipe_chat(chat_id).await {
        Ok(wiped) => (
            StatusCode::OK,
            Json(json!({ "chat_id": chat_id, "wiped": wiped })),
        )
            .into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}

async fn admin_run_decay(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.run_decay(Utc::now().timestamp()).await {
        Ok(adjustments) => (
            StatusCode::OK,
            Json(json!({
                "count": adjustments.len(),
                "adjustments": adjustments,
            })),
        )
            .into_response(),
        Err(e) => engine_error(e).into_response(),
    }
}
