//! API key authentication gate.
//!
//! One gate, three route-facing configurations:
//! - `require_api_key`: store-backed, missing/invalid keys are 401s
//! - `optional_api_key`: store-backed, unresolved keys fall through with
//!   no context attached so handlers can branch on presence
//! - `require_key_format`: degraded legacy mode that checks header shape
//!   only and never consults the store
//!
//! On success the store-backed modes attach an `AuthContext` (key +
//! project) to the request, which downstream middleware and handlers
//! extract; the format-only mode attaches an `UnverifiedKeyShape`.

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        api_key::{ApiKey, EnvTag},
        project::Project,
    },
    services::key_service,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header carrying the bearer secret (header names are case-insensitive).
pub const API_KEY_HEADER: &str = "x-api-key";

/// Companion header for the format-only legacy mode.
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Authentication context attached to requests that resolved a key.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers and downstream middleware to know which
/// key and project the request runs on behalf of.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The resolved API key record
    pub key: ApiKey,

    /// The project the key belongs to
    pub project: Project,
}

/// Shape information attached by the format-only mode.
///
/// Nothing here has been checked against the store; callers of the
/// legacy surface accept that the key may not be live.
#[derive(Debug, Clone)]
pub struct UnverifiedKeyShape {
    pub environment: EnvTag,
    pub project_id: Uuid,
}

/// Whether an unresolved key fails the request or falls through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    Required,
    Optional,
}

/// How far the gate verifies a presented key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerificationLevel {
    /// Resolve against stored records (the normal path)
    Store,

    /// Check header shape only; the store is never consulted
    FormatOnly,
}

/// Strict store-backed gate for the keyed service routes.
pub async fn require_api_key(
    State(pool): State<DbPool>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    run_gate(&pool, AuthMode::Required, VerificationLevel::Store, request, next).await
}

/// Optional store-backed gate for routes that also serve keyless callers.
pub async fn optional_api_key(
    State(pool): State<DbPool>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    run_gate(&pool, AuthMode::Optional, VerificationLevel::Store, request, next).await
}

/// Degraded format-only gate for the legacy validation surface.
pub async fn require_key_format(
    State(pool): State<DbPool>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    run_gate(
        &pool,
        AuthMode::Required,
        VerificationLevel::FormatOnly,
        request,
        next,
    )
    .await
}

/// The gate itself, parameterized by mode and verification level.
///
/// # Flow
///
/// 1. Extract the secret from the `x-api-key` header
/// 2. Reject malformed secrets before any lookup
/// 3. `Store` level: resolve key and project, reject inactive/orphaned
///    keys, attach `AuthContext`, schedule the `last_used_at` touch
/// 4. `FormatOnly` level: validate the companion project-id header shape
///    and attach `UnverifiedKeyShape`
///
/// In `Optional` mode, steps that would reject instead fall through with
/// nothing attached. Store/infrastructure errors surface as 500s in both
/// modes.
async fn run_gate(
    pool: &DbPool,
    mode: AuthMode,
    level: VerificationLevel,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: extract the key header
    let secret = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    let Some(secret) = secret else {
        return match mode {
            AuthMode::Required => Err(AppError::MissingKey),
            AuthMode::Optional => Ok(next.run(request).await),
        };
    };

    // Step 2: cheap shape check before touching the store
    if !key_service::is_valid_secret_format(&secret) {
        return match mode {
            AuthMode::Required => Err(AppError::InvalidKey),
            AuthMode::Optional => Ok(next.run(request).await),
        };
    }

    match level {
        VerificationLevel::FormatOnly => {
            let shape = validate_key_shape(&request, &secret)?;
            request.extensions_mut().insert(shape);
            Ok(next.run(request).await)
        }
        VerificationLevel::Store => {
            match resolve_secret(pool, &secret).await? {
                Resolution::Resolved(context) => {
                    // Best-effort last-used stamp, off the request path.
                    let touch_pool = pool.clone();
                    let key_id = context.key.id;
                    tokio::spawn(async move {
                        if let Err(err) = key_service::touch_last_used(&touch_pool, key_id).await {
                            tracing::warn!(
                                "failed to update last_used_at for key {}: {:?}",
                                key_id,
                                err
                            );
                        }
                    });

                    request.extensions_mut().insert(context);
                    Ok(next.run(request).await)
                }
                Resolution::Rejected(err) => match mode {
                    AuthMode::Required => Err(err),
                    AuthMode::Optional => Ok(next.run(request).await),
                },
            }
        }
    }
}

/// Outcome of a store-backed resolution attempt.
///
/// `Rejected` carries the authentication error a strict gate would
/// return; infrastructure failures propagate separately as `Err`.
enum Resolution {
    Resolved(AuthContext),
    Rejected(AppError),
}

async fn resolve_secret(pool: &DbPool, secret: &str) -> Result<Resolution, AppError> {
    let Some(key) = key_service::find_by_secret(pool, secret).await? else {
        return Ok(Resolution::Rejected(AppError::InvalidKey));
    };

    // Deactivated keys keep their record but cannot authenticate.
    if !key.is_active {
        return Ok(Resolution::Rejected(AppError::InvalidKey));
    }

    let project = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, owner_id, name, description, created_at, updated_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(key.project_id)
    .fetch_optional(pool)
    .await?;

    // project_id has no FK, so a deleted project leaves the key dangling.
    let Some(project) = project else {
        return Ok(Resolution::Rejected(AppError::OrphanedKey));
    };

    Ok(Resolution::Resolved(AuthContext { key, project }))
}

fn validate_key_shape(request: &Request, secret: &str) -> Result<UnverifiedKeyShape, AppError> {
    let raw_project_id = request
        .headers()
        .get(PROJECT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            AppError::InvalidRequest(format!("{} header is required", PROJECT_ID_HEADER))
        })?;

    let project_id: Uuid = raw_project_id
        .parse()
        .map_err(|_| AppError::MalformedIdentifier(PROJECT_ID_HEADER.to_string()))?;

    let environment =
        key_service::extract_env_tag(secret).ok_or(AppError::InvalidKey)?;

    Ok(UnverifiedKeyShape {
        environment,
        project_id,
    })
}

#[cfg(test)]
mod tests {
    //! Gate behavior that never reaches the store: header extraction,
    //! format rejection, and the format-only level. Paths that resolve a
    //! key need a live database and are exercised against the SQL they
    //! ship instead.

    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::{get, post},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    /// Pool that parses a URL but never connects; every test below must
    /// finish before any query would run.
    fn lazy_pool() -> DbPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never_reached")
            .unwrap()
    }

    async fn ok_handler() -> &'static str {
        "ok"
    }

    async fn shape_handler(
        axum::Extension(shape): axum::Extension<UnverifiedKeyShape>,
    ) -> String {
        shape.environment.to_string()
    }

    fn strict_router() -> Router {
        Router::new()
            .route("/guarded", get(ok_handler))
            .layer(from_fn_with_state(lazy_pool(), require_api_key))
    }

    fn optional_router() -> Router {
        Router::new()
            .route("/guarded", get(ok_handler))
            .layer(from_fn_with_state(lazy_pool(), optional_api_key))
    }

    fn format_only_router() -> Router {
        Router::new()
            .route("/legacy", post(shape_handler))
            .layer(from_fn_with_state(lazy_pool(), require_key_format))
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn error_code(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        body["error"]["code"].as_str().unwrap_or_default().to_string()
    }

    fn well_formed_secret() -> String {
        key_service::generate_secret(EnvTag::Test, key_service::SECRET_BYTE_LENGTH)
    }

    #[tokio::test]
    async fn strict_gate_rejects_missing_header() {
        let response = strict_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/guarded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "missing_api_key");
    }

    #[tokio::test]
    async fn strict_gate_rejects_malformed_secret_before_lookup() {
        let response = strict_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/guarded")
                    .header(API_KEY_HEADER, "not-a-real-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "invalid_api_key");
    }

    #[tokio::test]
    async fn optional_gate_passes_keyless_requests_through() {
        let response = optional_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/guarded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn optional_gate_passes_malformed_secrets_through() {
        let response = optional_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/guarded")
                    .header(API_KEY_HEADER, "garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn format_only_gate_attaches_unverified_shape() {
        let secret = well_formed_secret();
        let project_id = Uuid::new_v4().to_string();
        let response = format_only_router()
            .oneshot(request(
                "/legacy",
                &[(API_KEY_HEADER, secret.as_str()), (PROJECT_ID_HEADER, project_id.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"test");
    }

    #[tokio::test]
    async fn format_only_gate_rejects_malformed_project_header() {
        let secret = well_formed_secret();
        let response = format_only_router()
            .oneshot(request(
                "/legacy",
                &[(API_KEY_HEADER, secret.as_str()), (PROJECT_ID_HEADER, "not-a-uuid")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "malformed_identifier");
    }

    #[tokio::test]
    async fn format_only_gate_requires_project_header() {
        let secret = well_formed_secret();
        let response = format_only_router()
            .oneshot(request("/legacy", &[(API_KEY_HEADER, secret.as_str())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "invalid_request");
    }
}
