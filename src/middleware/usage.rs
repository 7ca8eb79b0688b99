//! Usage recording middleware.
//!
//! Wraps the keyed routes and emits one usage record per completed
//! request that carried a resolved key. Persistence is fire-and-forget:
//! the record insert runs in a detached task after the response is
//! already on its way out, and an insert failure is logged, never
//! surfaced to the client.

use crate::{
    db::DbPool,
    middleware::auth::AuthContext,
    models::usage_record::NewUsageRecord,
    services::usage_service,
};
use axum::{
    extract::{Request, State},
    http::header::{CONTENT_LENGTH, USER_AGENT},
    middleware::Next,
    response::Response,
};
use serde_json::{Value, json};
use std::time::Instant;

/// Caller-supplied metadata merged into the record's metadata bag.
///
/// Handlers opt in by returning `Extension(UsageMetadata(json!({...})))`
/// as part of their response; keys supplied here win over the recorder's
/// defaults on conflict.
#[derive(Debug, Clone)]
pub struct UsageMetadata(pub Value);

/// Record one usage entry for the wrapped request.
///
/// # Flow
///
/// 1. Capture a monotonic start time and the request-side fields
///    (endpoint, method, user agent, client IP, request size)
/// 2. Run the rest of the chain to completion
/// 3. If no key was resolved onto the request, return the response as-is:
///    unauthenticated traffic produces no records
/// 4. Otherwise build the record (status, elapsed ms, response size,
///    error message for 4xx/5xx, caller metadata merged last) and persist
///    it in a detached task
pub async fn track_usage(State(pool): State<DbPool>, request: Request, next: Next) -> Response {
    let started = Instant::now();

    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let user_agent = header_str(request.headers(), USER_AGENT.as_str());
    let client_ip = client_ip(request.headers());
    let request_bytes = content_length(request.headers());

    // The authentication gate runs before this middleware, so a resolved
    // key is already in the request extensions here.
    let auth = request.extensions().get::<AuthContext>().cloned();

    let response = next.run(request).await;

    let Some(auth) = auth else {
        return response;
    };

    let status = response.status();
    let response_time_ms = started.elapsed().as_millis() as i64;

    let mut metadata = json!({
        "user_agent": user_agent,
        "ip": client_ip,
        "request_bytes": request_bytes,
        "response_bytes": content_length(response.headers()),
    });

    if status.as_u16() >= 400 {
        metadata["error"] = json!(
            status
                .canonical_reason()
                .unwrap_or("request failed")
        );
    }

    if let Some(UsageMetadata(extra)) = response.extensions().get::<UsageMetadata>() {
        metadata = merge_metadata(metadata, extra);
    }

    let record = NewUsageRecord {
        key_id: auth.key.id,
        project_id: auth.project.id,
        endpoint,
        method,
        status_code: status.as_u16() as i32,
        response_time_ms,
        metadata,
    };

    // Detached on purpose: the client never waits on, or sees, the insert.
    tokio::spawn(async move {
        if let Err(err) = usage_service::record_usage(&pool, record).await {
            tracing::warn!("failed to persist usage record: {:?}", err);
        }
    });

    response
}

/// Merge caller-supplied metadata over the recorder's defaults.
///
/// Top-level keys from `extra` win on conflict. Non-object inputs leave
/// the base untouched.
pub fn merge_metadata(mut base: Value, extra: &Value) -> Value {
    if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
        for (key, value) in extra_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    base
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
}

/// Client IP from proxy headers, first hop wins.
fn client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .map(|v| v.split(',').next().unwrap_or(&v).trim().to_string())
        .or_else(|| header_str(headers, "x-real-ip"))
}

fn content_length(headers: &axum::http::HeaderMap) -> Option<i64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_metadata_wins_on_conflict() {
        let base = json!({"user_agent": "curl/8.0", "service": "default"});
        let extra = json!({"service": "database", "operation": "query"});

        let merged = merge_metadata(base, &extra);
        assert_eq!(merged["user_agent"], "curl/8.0");
        assert_eq!(merged["service"], "database");
        assert_eq!(merged["operation"], "query");
    }

    #[test]
    fn non_object_extra_leaves_base_untouched() {
        let base = json!({"ip": "10.0.0.1"});
        let merged = merge_metadata(base.clone(), &json!("not a map"));
        assert_eq!(merged, base);
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.9, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));
    }
}
