//! Usage analytics HTTP handlers.
//!
//! Dashboard-facing read endpoints over the accumulated usage records:
//! - GET /api/v1/usage/stats/:project_id - Windowed summary for a project
//! - GET /api/v1/usage/keys/:key_id - Windowed summary for a single key
//! - GET /api/v1/usage/analytics/:project_id - Chart series for a project
//!
//! Every endpoint tolerates an empty window: zero matching records means
//! zero-valued structures and empty series, never an error.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::session::OwnerIdentity,
    services::usage_service::{
        self, DEFAULT_TOP_LIMIT, Period, UsageAnalytics, UsageScope, UsageSummary,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use super::{keys::load_owned_key, projects::load_owned_project};

/// Query parameters for the summary endpoints.
///
/// `period` is one of `1d`, `7d`, `30d`, `90d` (default `30d`; unknown
/// values fall back to the default). `limit` caps the top-endpoints list
/// (default 10).
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
    pub limit: Option<i64>,
}

/// Query parameters for the analytics endpoint.
///
/// `days` is clamped to 1..=90 (default 7).
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
}

/// Windowed usage summary for a project.
///
/// # Endpoint
///
/// `GET /api/v1/usage/stats/:project_id?period=30d&limit=10`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "period": "30d",
///   "total_calls": 42,
///   "calls_today": 3,
///   "error_rate": "7.14",
///   "avg_response_time_ms": 12,
///   "top_endpoints": [...],
///   "status_codes": [...],
///   "recent_requests": [...]
/// }
/// ```
pub async fn project_usage_stats(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<UsageSummary>, AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;

    let period = Period::parse(query.period.as_deref());
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, 50);

    let summary =
        usage_service::usage_summary(&pool, UsageScope::Project(project.id), period, limit).await?;

    Ok(Json(summary))
}

/// Windowed usage summary for a single key.
///
/// # Endpoint
///
/// `GET /api/v1/usage/keys/:key_id?period=30d&limit=10`
pub async fn key_usage_stats(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(key_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<UsageSummary>, AppError> {
    let key = load_owned_key(&pool, key_id, &owner).await?;

    let period = Period::parse(query.period.as_deref());
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, 50);

    let summary =
        usage_service::usage_summary(&pool, UsageScope::Key(key.id), period, limit).await?;

    Ok(Json(summary))
}

/// Day-bucketed chart series for a project.
///
/// # Endpoint
///
/// `GET /api/v1/usage/analytics/:project_id?days=7`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "days": 7,
///   "daily": [{"date": "2026-01-20", "calls": 10, "avg_response_time_ms": 9, "errors": 1}],
///   "hourly_today": [{"hour": 14, "calls": 3}],
///   "endpoint_timings": [...]
/// }
/// ```
pub async fn project_usage_analytics(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<UsageAnalytics>, AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;

    let days = usage_service::clamp_days(query.days);

    let analytics =
        usage_service::usage_analytics(&pool, UsageScope::Project(project.id), days).await?;

    Ok(Json(analytics))
}
