//! HTTP surface: current/history/top-processes queries and the retention
//! sweep, plus the router wiring. Handlers are thin: validate the window,
//! call into the collector or store, serialize.

use crate::collector::run_cycle;
use crate::state::AppState;
use crate::store::StoreError;
use crate::ws::ws_handler;
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const DEFAULT_HISTORY_MINUTES: i64 = 60;
pub const DEFAULT_TOP_MINUTES: i64 = 5;
pub const DEFAULT_CLEANUP_DAYS: i64 = 7;
pub const MAX_HISTORY_ROWS: usize = 1000;
pub const MAX_PROCESS_ROWS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid time window: {0}")]
    InvalidWindow(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("collection cycle failed")]
    CycleFailed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::CycleFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

const MINUTE_SECS: i64 = 60;
const DAY_SECS: i64 = 86_400;

/// Turn a caller-supplied window into a cutoff instant. Negative windows
/// are rejected, and so are values big enough to overflow the duration or
/// leave the representable datetime range — all before anything touches
/// the store. A zero-width window is legal and matches nothing older than
/// `now`.
fn window_cutoff(
    now: OffsetDateTime,
    value: i64,
    unit_secs: i64,
) -> Result<OffsetDateTime, ApiError> {
    if value < 0 {
        return Err(ApiError::InvalidWindow(format!(
            "window must be non-negative, got {value}"
        )));
    }
    value
        .checked_mul(unit_secs)
        .map(time::Duration::seconds)
        .and_then(|window| now.checked_sub(window))
        .ok_or_else(|| ApiError::InvalidWindow(format!("window out of range: {value}")))
}

#[derive(Deserialize)]
pub struct WindowParams {
    minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct CleanupParams {
    days: Option<i64>,
}

#[derive(Serialize)]
struct CleanupResponse {
    deleted_metrics: u64,
    deleted_processes: u64,
    #[serde(with = "time::serde::rfc3339")]
    cutoff_date: OffsetDateTime,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "service": "sysmon_agent",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Always runs a fresh cycle — never a cached snapshot. The cycle runs as
/// its own task so a caller that gives up early cannot leave a half-done
/// fan-out behind.
async fn current_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let result = tokio::spawn(run_cycle(state))
        .await
        .map_err(|_| ApiError::CycleFailed)?;
    if let Some(e) = result.append_error {
        return Err(e.into());
    }
    Ok(Json(result.update.snapshot.as_ref()).into_response())
}

async fn metrics_history(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Response, ApiError> {
    let minutes = params.minutes.unwrap_or(DEFAULT_HISTORY_MINUTES);
    let cutoff = window_cutoff(OffsetDateTime::now_utc(), minutes, MINUTE_SECS)?;
    let rows = state.store.history_since(cutoff, MAX_HISTORY_ROWS).await?;
    Ok(Json(rows).into_response())
}

async fn top_processes_history(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Response, ApiError> {
    let minutes = params.minutes.unwrap_or(DEFAULT_TOP_MINUTES);
    let cutoff = window_cutoff(OffsetDateTime::now_utc(), minutes, MINUTE_SECS)?;
    let rows = state
        .store
        .top_processes_since(cutoff, MAX_PROCESS_ROWS)
        .await?;
    Ok(Json(rows).into_response())
}

async fn cleanup_old_metrics(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Response, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_CLEANUP_DAYS);
    let cutoff = window_cutoff(OffsetDateTime::now_utc(), days, DAY_SECS)?;
    let (deleted_metrics, deleted_processes) = state.store.delete_older_than(cutoff).await?;
    Ok(Json(CleanupResponse {
        deleted_metrics,
        deleted_processes,
        cutoff_date: cutoff,
    })
    .into_response())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/", get(root))
        .route("/api/metrics/current", get(current_metrics))
        .route("/api/metrics/history", get(metrics_history))
        .route("/api/processes/top", get(top_processes_history))
        .route("/api/metrics/cleanup", delete(cleanup_old_metrics))
        .route("/ws/metrics", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn negative_window_rejected() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert!(matches!(
            window_cutoff(now, -1, MINUTE_SECS),
            Err(ApiError::InvalidWindow(_))
        ));
        assert!(matches!(
            window_cutoff(now, -7, DAY_SECS),
            Err(ApiError::InvalidWindow(_))
        ));
    }

    #[test]
    fn zero_window_is_zero_width() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert_eq!(window_cutoff(now, 0, MINUTE_SECS).unwrap(), now);
    }

    #[test]
    fn oversized_window_rejected_not_panicking() {
        let now = datetime!(2025-06-01 12:00 UTC);
        // Big enough to leave the representable datetime range once
        // subtracted from now; must come back as a client error.
        assert!(matches!(
            window_cutoff(now, 20_000_000_000_000_000, MINUTE_SECS),
            Err(ApiError::InvalidWindow(_))
        ));
        // Big enough to overflow the duration seconds themselves.
        assert!(matches!(
            window_cutoff(now, i64::MAX, DAY_SECS),
            Err(ApiError::InvalidWindow(_))
        ));
    }

    #[test]
    fn default_windows_compute_expected_cutoffs() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert_eq!(
            window_cutoff(now, DEFAULT_HISTORY_MINUTES, MINUTE_SECS).unwrap(),
            datetime!(2025-06-01 11:00 UTC)
        );
        assert_eq!(
            window_cutoff(now, DEFAULT_CLEANUP_DAYS, DAY_SECS).unwrap(),
            datetime!(2025-05-25 12:00 UTC)
        );
    }
}
