use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::SystemTime;

use crate::error::ResilienceError;
use crate::middleware::ResilienceState;
use crate::pagination::{PageMeta, PageQuery, Paginator};
use crate::tracker::SlaReport;

static START_TIME: LazyLock<SystemTime> = LazyLock::new(SystemTime::now);

#[derive(Debug, Deserialize)]
pub struct EndpointQuery {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub tracked_endpoints: usize,
    pub cache_entries: usize,
    pub active_rate_windows: usize,
}

/// Full SLA report across every tracked endpoint
pub async fn sla_report(
    State(state): State<ResilienceState>,
) -> Result<Json<SlaReport>, ResilienceError> {
    let report = state.tracker.report()?;
    Ok(Json(report))
}

/// Stats for a single endpoint key, e.g. `?key=GET%20/api/bookings`
pub async fn endpoint_stats(
    State(state): State<ResilienceState>,
    Query(query): Query<EndpointQuery>,
) -> Result<impl IntoResponse, ResilienceError> {
    let stats = state
        .tracker
        .stats(&query.key)?
        .ok_or_else(|| ResilienceError::NoData(query.key.clone()))?;

    Ok(Json(serde_json::json!({
        "key": query.key,
        "stats": stats,
    })))
}

/// Health check with component gauges
pub async fn health_check(State(state): State<ResilienceState>) -> impl IntoResponse {
    let uptime = SystemTime::now()
        .duration_since(*START_TIME)
        .unwrap_or_default()
        .as_secs();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        tracked_endpoints: state.tracker.endpoint_count().unwrap_or(0),
        cache_entries: state.cache.len(),
        active_rate_windows: state.limiter.active_windows().unwrap_or(0),
    })
}

/// Operational cache flush, for use after bulk writes
pub async fn flush_cache(State(state): State<ResilienceState>) -> impl IntoResponse {
    let flushed = state.cache.len();
    state.cache.clear();
    tracing::info!(target: "resilience::cache", flushed, "cache flushed");

    Json(serde_json::json!({
        "status": "success",
        "flushed_entries": flushed,
    }))
}

// Demo routes below stand in for the wrapped application: enough surface
// for the middleware and paginator to be exercised end to end.

const DEMO_TOTAL: i64 = 95;

#[derive(Debug, Serialize)]
pub struct ItemPage {
    pub data: Vec<Item>,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

/// Paginated list over a synthetic dataset
pub async fn list_items(Query(query): Query<PageQuery>) -> impl IntoResponse {
    let params = Paginator::default().validate_query(query);
    let meta = PageMeta::build(DEMO_TOTAL, params.limit, params.offset);

    let start = params.offset.min(DEMO_TOTAL);
    let end = (params.offset + params.limit).min(DEMO_TOTAL);
    let data = (start..end)
        .map(|id| Item {
            id,
            name: format!("item-{}", id),
        })
        .collect();

    Json(ItemPage { data, meta })
}

pub async fn get_item(Path(id): Path<i64>) -> impl IntoResponse {
    if id < 0 || id >= DEMO_TOTAL {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "not_found"})),
        )
            .into_response();
    }

    Json(Item {
        id,
        name: format!("item-{}", id),
    })
    .into_response()
}
