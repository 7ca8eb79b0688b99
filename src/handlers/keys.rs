//! API key management HTTP handlers.
//!
//! This module implements the key-related dashboard endpoints:
//! - POST /api/v1/projects/:id/keys - Mint a new key (full secret, once)
//! - GET /api/v1/projects/:id/keys - List a project's keys (masked)
//! - GET /api/v1/keys/:id - Get key by ID (masked)
//! - PATCH /api/v1/keys/:id - Update name/description/capabilities/active
//! - DELETE /api/v1/keys/:id - Hard-delete the key record
//!
//! Ownership is always checked through the key's project: absent
//! resources are 404s, resources owned by someone else are 403s.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::session::OwnerIdentity,
    models::api_key::{
        ApiKey, ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse, UpdateApiKeyRequest,
        dedup_capabilities,
    },
    services::key_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::projects::load_owned_project;

/// Fetch a key and verify the caller owns its project.
///
/// A key whose project was deleted has no reachable owner anymore and is
/// reported as not found; it can only be retired through authentication
/// failures and retention expiry.
pub async fn load_owned_key(
    pool: &DbPool,
    key_id: Uuid,
    owner: &OwnerIdentity,
) -> Result<ApiKey, AppError> {
    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, project_id, secret, display_name, description, capabilities,
               is_active, last_used_at, created_at, updated_at
        FROM api_keys
        WHERE id = $1
        "#,
    )
    .bind(key_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::KeyNotFound)?;

    match load_owned_project(pool, key.project_id, owner).await {
        Ok(_) => Ok(key),
        Err(AppError::ProjectNotFound) => Err(AppError::KeyNotFound),
        Err(err) => Err(err),
    }
}

/// Mint a new API key for a project.
///
/// # Endpoint
///
/// `POST /api/v1/projects/:id/keys`
///
/// # Request Body
///
/// ```json
/// {
///   "display_name": "Production backend",
///   "capabilities": ["auth", "database"],
///   "environment": "live"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: The key, including `full_secret` — the
///   only response that ever carries the unmasked secret
/// - **Error (404/403)**: Project absent / not owned by caller
pub async fn create_key(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;

    let key = key_service::create_key(&pool, project.id, &request).await?;

    Ok((StatusCode::CREATED, Json(CreatedApiKeyResponse::new(key))))
}

/// List a project's keys, newest first, secrets masked.
///
/// # Endpoint
///
/// `GET /api/v1/projects/:id/keys`
pub async fn list_keys(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;

    let keys = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, project_id, secret, display_name, description, capabilities,
               is_active, last_used_at, created_at, updated_at
        FROM api_keys
        WHERE project_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(project.id)
    .fetch_all(&pool)
    .await?;

    let responses: Vec<ApiKeyResponse> = keys.into_iter().map(Into::into).collect();

    Ok(Json(responses))
}

/// Get a specific key by ID, secret masked.
///
/// # Endpoint
///
/// `GET /api/v1/keys/:id`
pub async fn get_key(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key = load_owned_key(&pool, key_id, &owner).await?;
    Ok(Json(key.into()))
}

/// Update a key's mutable fields.
///
/// # Endpoint
///
/// `PATCH /api/v1/keys/:id`
///
/// Omitted fields are left unchanged; the secret itself is immutable.
/// Setting `is_active` to false revokes the key without deleting its
/// record or its usage history.
pub async fn update_key(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(key_id): Path<Uuid>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key = load_owned_key(&pool, key_id, &owner).await?;

    let capabilities: Option<Vec<String>> = request
        .capabilities
        .as_deref()
        .map(dedup_capabilities);

    let updated = sqlx::query_as::<_, ApiKey>(
        r#"
        UPDATE api_keys
        SET display_name = COALESCE($2, display_name),
            description = COALESCE($3, description),
            capabilities = COALESCE($4, capabilities),
            is_active = COALESCE($5, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, project_id, secret, display_name, description, capabilities,
                  is_active, last_used_at, created_at, updated_at
        "#,
    )
    .bind(key.id)
    .bind(&request.display_name)
    .bind(&request.description)
    .bind(&capabilities)
    .bind(request.is_active)
    .fetch_one(&pool)
    .await?;

    Ok(Json(updated.into()))
}

/// Hard-delete a key.
///
/// # Endpoint
///
/// `DELETE /api/v1/keys/:id`
///
/// Only the key record goes away; its usage records keep their dangling
/// reference and expire independently.
pub async fn delete_key(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(key_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let key = load_owned_key(&pool, key_id, &owner).await?;

    sqlx::query("DELETE FROM api_keys WHERE id = $1")
        .bind(key.id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
