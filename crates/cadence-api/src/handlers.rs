//! HTTP API handlers — exposes engine state as JSON.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{extract::State, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_services::{
    AnomalyFlag, QuotaSnapshot, RateController, RatesView, RewardEngine, RunwayTarget,
    SessionOutcome, SustainabilityBand,
};

use cadence_core::rates::RateConfig;
use cadence_core::types::{AccountId, Session};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RewardEngine>,
    pub controller: RateController,
}

// ── /pool ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PoolResponse {
    pub capacity: Decimal,
    pub remaining: Decimal,
    pub emitted_this_epoch: Decimal,
    pub epoch_start: chrono::NaiveDate,
    pub epoch_days: u32,
    pub day_index: u32,
    pub record_count: usize,
    pub last_sequence: u64,
    pub soft_capped: bool,
}

pub async fn handle_pool(State(state): State<ApiState>) -> Json<PoolResponse> {
    let snap = state.engine.pool_state();
    Json(PoolResponse {
        capacity: snap.pool.capacity,
        remaining: snap.pool.remaining,
        emitted_this_epoch: snap.emitted_this_epoch,
        epoch_start: snap.pool.epoch_start,
        epoch_days: snap.pool.epoch_days,
        day_index: snap.pool.day_index,
        record_count: snap.record_count,
        last_sequence: snap.last_sequence,
        soft_capped: snap.soft_capped,
    })
}

// ── /accounts/{id}/quota ──────────────────────────────────────────────────────

pub async fn handle_account_quota(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<QuotaSnapshot>, (StatusCode, String)> {
    let account_id = AccountId::new(id);
    state
        .engine
        .account_quota(&account_id, Utc::now())
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "unknown account".to_string()))
}

// ── /anomalies ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AnomaliesResponse {
    pub flags: Vec<AnomalyFlag>,
}

pub async fn handle_anomalies(State(state): State<ApiState>) -> Json<AnomaliesResponse> {
    Json(AnomaliesResponse {
        flags: state.engine.active_flags(),
    })
}

// ── /rates ────────────────────────────────────────────────────────────────────

pub async fn handle_rates(State(state): State<ApiState>) -> Json<RatesView> {
    Json(state.engine.current_rates())
}

// ── /projection ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProjectionResponse {
    pub velocity_per_day: Decimal,
    pub days_remaining: Option<Decimal>,
    pub projected_epoch_total: Decimal,
    pub band: SustainabilityBand,
}

pub async fn handle_projection(State(state): State<ApiState>) -> Json<ProjectionResponse> {
    let projection = state.engine.projection();
    Json(ProjectionResponse {
        velocity_per_day: state.engine.velocity(),
        days_remaining: projection.days_remaining,
        projected_epoch_total: projection.projected_epoch_total,
        band: projection.band,
    })
}

// ── /sessions ─────────────────────────────────────────────────────────────────

pub async fn handle_session_submit(
    State(state): State<ApiState>,
    Json(session): Json<Session>,
) -> Json<SessionOutcome> {
    Json(state.engine.handle_session(&session, Utc::now()))
}

// ── /rates/apply ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApplyResponse {
    pub staged_version: u32,
}

pub async fn handle_rates_apply(
    State(state): State<ApiState>,
    Json(proposal): Json<RateConfig>,
) -> Result<Json<ApplyResponse>, (StatusCode, String)> {
    let version = proposal.version;
    state
        .engine
        .apply_rate_config(proposal)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(Json(ApplyResponse {
        staged_version: version,
    }))
}

// ── /rates/propose ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ProposeRequest {
    pub target_runway_days: u32,
    pub total_listening_minutes_per_day: u64,
}

/// Dry-run controller output — nothing is staged.
#[derive(Serialize)]
pub struct ProposeResponse {
    pub proposed: RateConfig,
    pub total_rate: Decimal,
    /// Capacity that would sustain the *current* realized spend for the
    /// target runway, holding rates fixed. Absent when nothing has been
    /// emitted yet.
    pub proposed_capacity: Option<Decimal>,
}

pub async fn handle_rates_propose(
    State(state): State<ApiState>,
    Json(request): Json<ProposeRequest>,
) -> Result<Json<ProposeResponse>, (StatusCode, String)> {
    let current = state.engine.current_rates().active;
    let capacity = state.engine.pool_state().pool.capacity;
    let target = RunwayTarget {
        target_runway_days: request.target_runway_days,
        total_listening_minutes_per_day: request.total_listening_minutes_per_day,
    };

    let proposed = state
        .controller
        .propose_rates(&current, capacity, &target)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let proposed_capacity = state
        .controller
        .propose_capacity(state.engine.velocity(), request.target_runway_days)
        .ok();

    let total_rate = proposed.total_rate();
    Ok(Json(ProposeResponse {
        proposed,
        total_rate,
        proposed_capacity,
    }))
}
