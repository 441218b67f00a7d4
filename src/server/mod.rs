//! HTTP endpoints for health, metrics, and stored items
//!
//! Exposes read-only operational endpoints:
//! - `GET /health` - derived health with per-component detail
//! - `GET /metrics` - metrics snapshot plus item counts for a time range
//! - `GET /posts/latest` - most recently discovered items
//! - `GET /posts/unpublished` - items that have not been published

use crate::config::HealthConfig;
use crate::health::{HealthStatus, HealthTracker};
use crate::metrics::Metrics;
use crate::storage::{SqliteStore, Store};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<SqliteStore>>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthTracker>,
    pub health_config: HealthConfig,
    /// Hash of the loaded config file, surfaced for change detection
    pub config_hash: String,
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/posts/latest", get(latest_handler))
        .route("/posts/unpublished", get(unpublished_handler))
        .with_state(state)
}

/// Binds and serves until the process stops
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(state)).await
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let (store_ok, item_count) = {
        let store = state.store.lock().await;
        (store.ping(), store.count_items().unwrap_or(0))
    };

    let status = state.health.evaluate(store_ok, &state.health_config);

    let body = json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "components": {
            "store": {
                "status": if store_ok { "ok" } else { "unreachable" },
                "item_count": item_count,
            },
            "config": {
                "status": "ok",
                "hash": state.config_hash,
            },
        },
    });

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    range: Option<String>,
}

async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Response {
    let range = params.range.as_deref().unwrap_or("day");
    let window = match range {
        "hour" => Duration::hours(1),
        "day" => Duration::days(1),
        "week" => Duration::weeks(1),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Unknown range: {}", other) })),
            )
                .into_response()
        }
    };

    let since = (Utc::now() - window).to_rfc3339();
    let (total, added, published) = {
        let store = state.store.lock().await;
        (
            store.count_items().unwrap_or(0),
            store.count_added_since(&since).unwrap_or(0),
            store.count_published_since(&since).unwrap_or(0),
        )
    };

    let snapshot = state.metrics.snapshot();

    Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "range": range,
        "counters": snapshot.counters,
        "timers": snapshot.timers,
        "gauges": snapshot.gauges,
        "posts": {
            "total": total,
            "added_in_period": added,
            "published_in_period": published,
        },
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<u32>,
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(10).min(100)
}

async fn latest_handler(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Response {
    let limit = clamp_limit(params.limit);
    match state.store.lock().await.latest_items(limit) {
        Ok(items) => Json(json!({ "count": items.len(), "posts": items })).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn unpublished_handler(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Response {
    let limit = clamp_limit(params.limit);
    match state.store.lock().await.unpublished_items(limit) {
        Ok(items) => Json(json!({ "count": items.len(), "posts": items })).into_response(),
        Err(e) => storage_error(e),
    }
}

fn storage_error(e: crate::storage::StorageError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}
