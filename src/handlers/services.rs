//! Simulated sub-API handlers (auth, database, storage).
//!
//! These endpoints exist to be reached or blocked by the key pipeline:
//! every response body is fabricated. Each handler tags its response
//! with `UsageMetadata` naming the service, which the usage recorder
//! merges into the persisted record.
//!
//! Also hosts the optional-mode status endpoint and the degraded legacy
//! key-shape validation endpoint.

use crate::middleware::{
    auth::{AuthContext, UnverifiedKeyShape},
    usage::UsageMetadata,
};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// Request body for the simulated token verification endpoint.
#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Request body for the simulated database query endpoint.
#[derive(Debug, Deserialize)]
pub struct DatabaseQueryRequest {
    pub collection: String,

    /// Opaque filter document, echoed back
    #[serde(default)]
    pub filter: Value,
}

/// Request body for the simulated upload endpoint.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,

    #[serde(default)]
    pub size_bytes: i64,
}

/// `GET /api/v1/auth/users` — fabricated user directory.
///
/// Requires the `auth` capability.
pub async fn auth_users() -> (Extension<UsageMetadata>, Json<Value>) {
    let users = json!({
        "users": [
            { "id": Uuid::new_v4(), "email": "ada@example.com", "verified": true },
            { "id": Uuid::new_v4(), "email": "grace@example.com", "verified": true },
            { "id": Uuid::new_v4(), "email": "linus@example.com", "verified": false },
        ],
        "total": 3,
    });

    (
        Extension(UsageMetadata(json!({ "service": "auth" }))),
        Json(users),
    )
}

/// `POST /api/v1/auth/verify` — fabricated token verification.
///
/// Requires the `auth` capability. Any non-empty token "verifies".
pub async fn auth_verify(
    Json(request): Json<VerifyTokenRequest>,
) -> (Extension<UsageMetadata>, Json<Value>) {
    let valid = !request.token.is_empty();

    let body = json!({
        "valid": valid,
        "user": valid.then(|| json!({
            "id": Uuid::new_v4(),
            "email": "ada@example.com",
        })),
        "checked_at": Utc::now(),
    });

    (
        Extension(UsageMetadata(json!({ "service": "auth", "operation": "verify" }))),
        Json(body),
    )
}

/// `GET /api/v1/database/collections` — fabricated collection listing.
///
/// Requires the `database` capability.
pub async fn database_collections() -> (Extension<UsageMetadata>, Json<Value>) {
    let body = json!({
        "collections": [
            { "name": "users", "documents": 1284 },
            { "name": "sessions", "documents": 90321 },
            { "name": "events", "documents": 448210 },
        ],
    });

    (
        Extension(UsageMetadata(json!({ "service": "database" }))),
        Json(body),
    )
}

/// `POST /api/v1/database/query` — fabricated query execution.
///
/// Requires the `database` capability. Echoes the request shape back
/// with made-up rows.
pub async fn database_query(
    Json(request): Json<DatabaseQueryRequest>,
) -> (Extension<UsageMetadata>, Json<Value>) {
    let body = json!({
        "collection": request.collection,
        "filter": request.filter,
        "rows": [
            { "id": Uuid::new_v4(), "created_at": Utc::now() },
            { "id": Uuid::new_v4(), "created_at": Utc::now() },
        ],
        "row_count": 2,
        "execution_ms": 4,
    });

    (
        Extension(UsageMetadata(json!({ "service": "database", "operation": "query" }))),
        Json(body),
    )
}

/// `GET /api/v1/storage/files` — fabricated file listing.
///
/// Requires the `storage` capability.
pub async fn storage_files() -> (Extension<UsageMetadata>, Json<Value>) {
    let body = json!({
        "files": [
            { "key": "avatars/ada.png", "size_bytes": 48213, "content_type": "image/png" },
            { "key": "exports/2026-01.csv", "size_bytes": 910224, "content_type": "text/csv" },
        ],
        "total": 2,
    });

    (
        Extension(UsageMetadata(json!({ "service": "storage" }))),
        Json(body),
    )
}

/// `POST /api/v1/storage/upload` — fabricated upload receipt.
///
/// Requires the `storage` capability. Nothing is stored.
pub async fn storage_upload(
    Json(request): Json<UploadRequest>,
) -> (Extension<UsageMetadata>, Json<Value>) {
    let body = json!({
        "key": format!("uploads/{}", request.file_name),
        "size_bytes": request.size_bytes,
        "content_type": request.content_type,
        "etag": Uuid::new_v4(),
        "uploaded_at": Utc::now(),
    });

    (
        Extension(UsageMetadata(json!({ "service": "storage", "operation": "upload" }))),
        Json(body),
    )
}

/// `GET /api/v1/status` — works with or without a key.
///
/// Sits behind the optional authentication gate: keyless callers get an
/// anonymous body, keyed callers get their project context (and a usage
/// record).
pub async fn service_status(auth: Option<Extension<AuthContext>>) -> Json<Value> {
    let body = match auth {
        Some(Extension(context)) => json!({
            "status": "operational",
            "authenticated": true,
            "project": {
                "id": context.project.id,
                "name": context.project.name,
            },
            "key": {
                "id": context.key.id,
                "display_name": context.key.display_name,
            },
            "timestamp": Utc::now(),
        }),
        None => json!({
            "status": "operational",
            "authenticated": false,
            "timestamp": Utc::now(),
        }),
    };

    Json(body)
}

/// `POST /api/v1/legacy/validate` — degraded shape-only validation.
///
/// Sits behind the format-only gate; reports what the headers look like
/// without any store confirmation that the key is live.
pub async fn legacy_validate(
    Extension(shape): Extension<UnverifiedKeyShape>,
) -> Json<Value> {
    Json(json!({
        "valid": true,
        "verified": false,
        "environment": shape.environment,
        "project_id": shape.project_id,
    }))
}
