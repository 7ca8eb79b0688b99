//! Usage service - record persistence, analytics aggregation, retention.
//!
//! Everything here reads or writes the `usage_records` table. Writes come
//! from the usage middleware (fire-and-forget) and the retention sweep;
//! reads are the dashboard analytics queries. Every read is bounded to a
//! time window no wider than the retention period, so records past 90
//! days can never surface even before the sweep physically deletes them.

use crate::{
    db::DbPool,
    error::AppError,
    models::usage_record::{NewUsageRecord, UsageRecord},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Usage records older than this are expired.
pub const RETENTION_DAYS: i64 = 90;

/// How often the background sweep deletes expired records. The sweep
/// interval is the grace bound on retention: a record is gone from
/// queries at exactly 90 days and from disk within 90 days + one sweep.
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Rows returned in `recent_requests`.
const RECENT_REQUESTS_LIMIT: i64 = 10;

/// Endpoints returned in the per-endpoint timing breakdown.
const ENDPOINT_TIMING_LIMIT: i64 = 20;

/// Default for the `days` analytics parameter.
pub const DEFAULT_ANALYTICS_DAYS: i64 = 7;

/// Default for the top-endpoints `limit` parameter.
pub const DEFAULT_TOP_LIMIT: i64 = 10;

/// Analytics window selector.
///
/// Unknown values fall back to the 30-day default rather than erroring,
/// so a stale dashboard never breaks on a bad query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    OneDay,
    SevenDays,
    #[default]
    ThirtyDays,
    NinetyDays,
}

impl Period {
    /// Parse a query-string value, defaulting on absence or junk.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("1d") => Period::OneDay,
            Some("7d") => Period::SevenDays,
            Some("30d") => Period::ThirtyDays,
            Some("90d") => Period::NinetyDays,
            _ => Period::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::NinetyDays => "90d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Period::OneDay => Duration::days(1),
            Period::SevenDays => Duration::days(7),
            Period::ThirtyDays => Duration::days(30),
            Period::NinetyDays => Duration::days(RETENTION_DAYS),
        }
    }
}

/// Whether a query is scoped to one project or one key.
///
/// Both columns carry a composite `(id, recorded_at)` index, so the same
/// query shapes serve either scope.
#[derive(Debug, Clone, Copy)]
pub enum UsageScope {
    Project(Uuid),
    Key(Uuid),
}

impl UsageScope {
    fn column(&self) -> &'static str {
        match self {
            UsageScope::Project(_) => "project_id",
            UsageScope::Key(_) => "key_id",
        }
    }

    fn id(&self) -> Uuid {
        match self {
            UsageScope::Project(id) | UsageScope::Key(id) => *id,
        }
    }
}

/// Windowed usage summary for dashboards.
#[derive(Debug, Serialize)]
pub struct UsageSummary {
    /// Window the summary covers
    pub period: &'static str,

    /// Total completed keyed requests in the window
    pub total_calls: i64,

    /// Requests since UTC midnight
    pub calls_today: i64,

    /// Share of requests with status >= 400, as a percentage with two
    /// decimals (e.g. "33.33"); "0.00" for an empty window
    pub error_rate: String,

    /// Mean response time, rounded to the nearest millisecond
    pub avg_response_time_ms: i64,

    /// Busiest endpoints, descending by call count
    pub top_endpoints: Vec<EndpointStat>,

    /// Status-code histogram, ascending by code
    pub status_codes: Vec<StatusCodeCount>,

    /// Most recent records verbatim, newest first
    pub recent_requests: Vec<UsageRecord>,
}

/// Per-endpoint call statistics.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EndpointStat {
    pub endpoint: String,
    pub calls: i64,
    pub avg_response_time_ms: i64,
    pub errors: i64,
}

/// One bar of the status-code histogram.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCodeCount {
    pub status_code: i32,
    pub count: i64,
}

/// Day-bucketed chart series plus timing breakdown.
#[derive(Debug, Serialize)]
pub struct UsageAnalytics {
    /// Days of history covered by `daily`
    pub days: i64,

    /// One entry per calendar day (UTC) that had traffic
    pub daily: Vec<DailyUsage>,

    /// Hour-of-day counts for the current UTC day
    pub hourly_today: Vec<HourlyUsage>,

    /// Min/max/mean response time for the busiest endpoints
    pub endpoint_timings: Vec<EndpointTiming>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub calls: i64,
    pub avg_response_time_ms: i64,
    pub errors: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct HourlyUsage {
    pub hour: i32,
    pub calls: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EndpointTiming {
    pub endpoint: String,
    pub calls: i64,
    pub min_response_time_ms: i64,
    pub max_response_time_ms: i64,
    pub avg_response_time_ms: i64,
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total_calls: i64,
    calls_today: i64,
    error_calls: i64,
    avg_response_time_ms: i64,
}

/// Persist one usage record.
///
/// Called from a detached task; the usage middleware logs and swallows
/// any error this returns.
pub async fn record_usage(pool: &DbPool, record: NewUsageRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO usage_records (key_id, project_id, endpoint, method, status_code,
                                   response_time_ms, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.key_id)
    .bind(record.project_id)
    .bind(&record.endpoint)
    .bind(&record.method)
    .bind(record.status_code)
    .bind(record.response_time_ms)
    .bind(&record.metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Compute the windowed usage summary for a project or key.
///
/// All component queries tolerate an empty window and come back as
/// zero-valued structures, never an error.
pub async fn usage_summary(
    pool: &DbPool,
    scope: UsageScope,
    period: Period,
    top_limit: i64,
) -> Result<UsageSummary, AppError> {
    let now = Utc::now();
    let window_start = now - period.duration();
    let today_start = start_of_today(now);
    let column = scope.column();

    let totals = sqlx::query_as::<_, TotalsRow>(&format!(
        r#"
        SELECT COUNT(*) AS total_calls,
               COUNT(*) FILTER (WHERE recorded_at >= $4) AS calls_today,
               COUNT(*) FILTER (WHERE status_code >= 400) AS error_calls,
               CAST(COALESCE(ROUND(AVG(response_time_ms)), 0) AS BIGINT) AS avg_response_time_ms
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .bind(today_start)
    .fetch_one(pool)
    .await?;

    let top_endpoints = sqlx::query_as::<_, EndpointStat>(&format!(
        r#"
        SELECT endpoint,
               COUNT(*) AS calls,
               CAST(COALESCE(ROUND(AVG(response_time_ms)), 0) AS BIGINT) AS avg_response_time_ms,
               COUNT(*) FILTER (WHERE status_code >= 400) AS errors
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        GROUP BY endpoint
        ORDER BY calls DESC
        LIMIT $4
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .bind(top_limit)
    .fetch_all(pool)
    .await?;

    let status_codes = sqlx::query_as::<_, StatusCodeCount>(&format!(
        r#"
        SELECT status_code, COUNT(*) AS count
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        GROUP BY status_code
        ORDER BY status_code ASC
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .fetch_all(pool)
    .await?;

    let recent_requests = sqlx::query_as::<_, UsageRecord>(&format!(
        r#"
        SELECT id, key_id, project_id, endpoint, method, status_code,
               response_time_ms, metadata, recorded_at
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        ORDER BY recorded_at DESC
        LIMIT $4
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .bind(RECENT_REQUESTS_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(UsageSummary {
        period: period.as_str(),
        total_calls: totals.total_calls,
        calls_today: totals.calls_today,
        error_rate: format_error_rate(totals.error_calls, totals.total_calls),
        avg_response_time_ms: totals.avg_response_time_ms,
        top_endpoints,
        status_codes,
        recent_requests,
    })
}

/// Compute the day-bucketed chart series for a project or key.
///
/// `days` is the caller's `days` parameter already clamped to the
/// retention window. An empty window yields empty series, not an error.
pub async fn usage_analytics(
    pool: &DbPool,
    scope: UsageScope,
    days: i64,
) -> Result<UsageAnalytics, AppError> {
    let now = Utc::now();
    let window_start = now - Duration::days(days);
    let today_start = start_of_today(now);
    let column = scope.column();

    // Buckets follow the record's stored (UTC) timestamp.
    let daily = sqlx::query_as::<_, DailyUsage>(&format!(
        r#"
        SELECT CAST(recorded_at AT TIME ZONE 'UTC' AS DATE) AS date,
               COUNT(*) AS calls,
               CAST(COALESCE(ROUND(AVG(response_time_ms)), 0) AS BIGINT) AS avg_response_time_ms,
               COUNT(*) FILTER (WHERE status_code >= 400) AS errors
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        GROUP BY date
        ORDER BY date ASC
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .fetch_all(pool)
    .await?;

    let hourly_today = sqlx::query_as::<_, HourlyUsage>(&format!(
        r#"
        SELECT CAST(EXTRACT(HOUR FROM recorded_at AT TIME ZONE 'UTC') AS INT) AS hour,
               COUNT(*) AS calls
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        GROUP BY hour
        ORDER BY hour ASC
        "#
    ))
    .bind(scope.id())
    .bind(today_start)
    .bind(now)
    .fetch_all(pool)
    .await?;

    let endpoint_timings = sqlx::query_as::<_, EndpointTiming>(&format!(
        r#"
        SELECT endpoint,
               COUNT(*) AS calls,
               MIN(response_time_ms) AS min_response_time_ms,
               MAX(response_time_ms) AS max_response_time_ms,
               CAST(COALESCE(ROUND(AVG(response_time_ms)), 0) AS BIGINT) AS avg_response_time_ms
        FROM usage_records
        WHERE {column} = $1 AND recorded_at >= $2 AND recorded_at < $3
        GROUP BY endpoint
        ORDER BY calls DESC
        LIMIT $4
        "#
    ))
    .bind(scope.id())
    .bind(window_start)
    .bind(now)
    .bind(ENDPOINT_TIMING_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(UsageAnalytics {
        days,
        daily,
        hourly_today,
        endpoint_timings,
    })
}

/// Delete records past the retention window. Returns rows removed.
pub async fn purge_expired(pool: &DbPool) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);

    let result = sqlx::query("DELETE FROM usage_records WHERE recorded_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Start the background retention sweep.
///
/// Runs for the life of the process; a failed sweep is logged and retried
/// on the next tick.
pub fn spawn_retention_sweeper(pool: DbPool) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            match purge_expired(&pool).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!("retention sweep removed {} expired usage records", removed);
                }
                Err(err) => {
                    tracing::warn!("retention sweep failed: {:?}", err);
                }
            }
        }
    });
}

/// Format an error rate as a percentage with two decimals.
///
/// An empty window reports "0.00" rather than dividing by zero.
pub fn format_error_rate(error_calls: i64, total_calls: i64) -> String {
    if total_calls == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", error_calls as f64 * 100.0 / total_calls as f64)
}

/// Clamp the caller's `days` parameter into the retention window.
pub fn clamp_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_ANALYTICS_DAYS).clamp(1, RETENTION_DAYS)
}

fn start_of_today(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_known_values_and_defaults() {
        assert_eq!(Period::parse(Some("1d")), Period::OneDay);
        assert_eq!(Period::parse(Some("7d")), Period::SevenDays);
        assert_eq!(Period::parse(Some("30d")), Period::ThirtyDays);
        assert_eq!(Period::parse(Some("90d")), Period::NinetyDays);

        // absence and junk both fall back to the default window
        assert_eq!(Period::parse(None), Period::ThirtyDays);
        assert_eq!(Period::parse(Some("365d")), Period::ThirtyDays);
        assert_eq!(Period::parse(Some("")), Period::ThirtyDays);
    }

    #[test]
    fn period_durations_match_their_names() {
        assert_eq!(Period::OneDay.duration(), Duration::days(1));
        assert_eq!(Period::NinetyDays.duration(), Duration::days(90));
    }

    #[test]
    fn error_rate_rounds_to_two_decimals() {
        assert_eq!(format_error_rate(1, 3), "33.33");
        assert_eq!(format_error_rate(2, 3), "66.67");
        assert_eq!(format_error_rate(1, 1), "100.00");
        assert_eq!(format_error_rate(0, 5), "0.00");
    }

    #[test]
    fn error_rate_of_empty_window_is_zero() {
        assert_eq!(format_error_rate(0, 0), "0.00");
    }

    #[test]
    fn days_clamps_into_retention_window() {
        assert_eq!(clamp_days(None), DEFAULT_ANALYTICS_DAYS);
        assert_eq!(clamp_days(Some(30)), 30);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(-5)), 1);
        assert_eq!(clamp_days(Some(400)), RETENTION_DAYS);
    }

    #[test]
    fn scope_selects_the_right_column() {
        let id = Uuid::new_v4();
        assert_eq!(UsageScope::Project(id).column(), "project_id");
        assert_eq!(UsageScope::Key(id).column(), "key_id");
        assert_eq!(UsageScope::Key(id).id(), id);
    }

    #[test]
    fn start_of_today_is_utc_midnight() {
        let now = Utc::now();
        let midnight = start_of_today(now);
        assert_eq!(midnight.date_naive(), now.date_naive());
        assert_eq!(midnight.time(), chrono::NaiveTime::MIN);
    }
}
