//! Capability gate for the keyed service routes.
//!
//! Runs after the authentication gate. Each simulated sub-API wraps its
//! routes in a check for the capability it is gated on; the check reads
//! the `AuthContext` the authentication gate attached.

use crate::{error::AppError, middleware::auth::AuthContext, models::api_key::Capability};
use axum::{extract::Request, middleware::Next, response::Response};

/// Allow the request iff the attached key holds every required capability.
///
/// # Rules
///
/// - No `AuthContext` attached (degraded/testing mode): allow
/// - Empty requirement: allow
/// - Key holds all required capabilities: allow
/// - Otherwise: 403 echoing the `required` and `current` sets
///
/// Wired per route group in `main.rs` via a `from_fn` closure capturing
/// the required set.
pub async fn require_capabilities(
    required: &'static [Capability],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(auth) = request.extensions().get::<AuthContext>() else {
        return Ok(next.run(request).await);
    };

    if auth.key.has_capabilities(required) {
        Ok(next.run(request).await)
    } else {
        Err(AppError::InsufficientPermissions {
            required: required.to_vec(),
            current: auth.key.capabilities.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{api_key::ApiKey, project::Project};
    use axum::{
        Extension, Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn,
        routing::get,
    };
    use chrono::Utc;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn context_with(capabilities: &[&str]) -> AuthContext {
        let project_id = Uuid::new_v4();
        AuthContext {
            key: ApiKey {
                id: Uuid::new_v4(),
                project_id,
                secret: format!("live_{}", "a".repeat(64)),
                display_name: "test".to_string(),
                description: None,
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                is_active: true,
                last_used_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            project: Project {
                id: project_id,
                owner_id: Uuid::new_v4(),
                name: "test project".to_string(),
                description: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    async fn ok_handler() -> &'static str {
        "ok"
    }

    /// Router with the gate wired the way main.rs wires it; an optional
    /// Extension layer stands in for the authentication gate.
    fn guarded_router(required: &'static [Capability], context: Option<AuthContext>) -> Router {
        let router = Router::new()
            .route("/guarded", get(ok_handler))
            .route_layer(from_fn(move |request: Request, next: Next| {
                require_capabilities(required, request, next)
            }));
        match context {
            Some(context) => router.layer(Extension(context)),
            None => router,
        }
    }

    async fn send(router: Router) -> axum::response::Response {
        router
            .oneshot(
                HttpRequest::builder()
                    .uri("/guarded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn key_with_all_capabilities_passes() {
        let router = guarded_router(
            &[Capability::Auth, Capability::Database],
            Some(context_with(&["auth", "database", "storage"])),
        );
        assert_eq!(send(router).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_capability_is_denied_with_both_sets() {
        let router = guarded_router(
            &[Capability::Auth, Capability::Database],
            Some(context_with(&["auth"])),
        );
        let response = send(router).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["required"], json!(["auth", "database"]));
        assert_eq!(body["error"]["current"], json!(["auth"]));
    }

    #[tokio::test]
    async fn no_attached_key_is_allowed_through() {
        let router = guarded_router(&[Capability::Storage], None);
        assert_eq!(send(router).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_requirement_always_passes() {
        let router = guarded_router(&[], Some(context_with(&[])));
        assert_eq!(send(router).await.status(), StatusCode::OK);
    }
}
