//! Usage record model.
//!
//! One immutable record per completed request that carried a resolved API
//! key. Records are written fire-and-forget by the usage middleware, read
//! by the aggregation queries, and deleted by the retention sweep after
//! 90 days. Nothing ever updates them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a usage record from the database.
///
/// # Database Table
///
/// Maps to the `usage_records` table. `project_id` is denormalized from
/// the key so project-scoped analytics never need a join. Neither
/// reference is a foreign key: records outlive keys and projects and
/// expire on their own schedule.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UsageRecord {
    /// Unique identifier for this record
    pub id: Uuid,

    /// Key that authenticated the request
    pub key_id: Uuid,

    /// Project the key belonged to at request time
    pub project_id: Uuid,

    /// Request path, e.g. `/api/v1/database/query`
    pub endpoint: String,

    /// HTTP method
    pub method: String,

    /// Final response status
    pub status_code: i32,

    /// Elapsed wall-clock time from request start to response completion
    pub response_time_ms: i64,

    /// Metadata bag: user agent, client IP, byte sizes, error message for
    /// 4xx/5xx responses, plus any caller-supplied keys
    pub metadata: serde_json::Value,

    /// Record-creation time (not request-start time)
    pub recorded_at: DateTime<Utc>,
}

/// Payload for inserting a new usage record.
///
/// Built by the usage middleware once the response has been produced;
/// `recorded_at` and `id` are assigned by the database.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub key_id: Uuid,
    pub project_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i64,
    pub metadata: serde_json::Value,
}
