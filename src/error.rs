//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use crate::models::api_key::Capability;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing, invalid, orphaned, or absent credentials
/// - **Authorization Errors**: Capability or ownership checks that fail
/// - **Resource Errors**: Requested resources not found
/// - **Validation Errors**: Malformed identifiers or invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No API key header was sent on a route that requires one.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("API key required")]
    MissingKey,

    /// API key was sent but is unknown, malformed, or deactivated.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidKey,

    /// API key resolved to a record whose project no longer exists.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("API key is not attached to a valid project")]
    OrphanedKey,

    /// The authenticated key lacks one or more required capabilities.
    ///
    /// Returns HTTP 403 Forbidden. The response body additionally carries
    /// the `required` and `current` capability sets so callers can see
    /// exactly what their key is missing.
    #[error("Insufficient permissions")]
    InsufficientPermissions {
        /// Capabilities the route demands
        required: Vec<Capability>,

        /// Capabilities the key actually holds
        current: Vec<String>,
    },

    /// Secret generation collided with an existing key twice in a row.
    ///
    /// Returns HTTP 500 Internal Server Error. With 32 random bytes per
    /// secret this is astronomically rare; surfacing it beats looping.
    #[error("Failed to generate a unique API key")]
    DuplicateSecret,

    /// A path or header identifier does not parse as a UUID.
    ///
    /// Returns HTTP 400 Bad Request. The String names the offending field,
    /// keeping "malformed id" distinct from "not found".
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Requested project does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Project not found")]
    ProjectNotFound,

    /// Requested API key does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("API key not found")]
    KeyNotFound,

    /// The resource exists but belongs to a different owner.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("You do not have access to this resource")]
    Forbidden,

    /// Dashboard routes were called without a trusted user identity.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Authentication required")]
    Unauthenticated,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers and middleware to return
/// `Result<T, AppError>` and have errors automatically converted to proper
/// HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Permission failures extend the object with the capability sets:
/// ```json
/// {
///   "error": {
///     "code": "insufficient_permissions",
///     "message": "Insufficient permissions",
///     "required": ["auth", "database"],
///     "current": ["auth"]
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Permission failures carry extra diagnostic fields, so they build
        // their body directly instead of going through the common path.
        if let AppError::InsufficientPermissions { required, current } = &self {
            let body = Json(json!({
                "error": {
                    "code": "insufficient_permissions",
                    "message": self.to_string(),
                    "required": required,
                    "current": current,
                }
            }));
            return (StatusCode::FORBIDDEN, body).into_response();
        }

        // Map each remaining error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::MissingKey => (StatusCode::UNAUTHORIZED, "missing_api_key", self.to_string()),
            AppError::InvalidKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", self.to_string()),
            AppError::OrphanedKey => (
                StatusCode::UNAUTHORIZED,
                "orphaned_api_key",
                self.to_string(),
            ),
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", self.to_string())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::ProjectNotFound => {
                (StatusCode::NOT_FOUND, "project_not_found", self.to_string())
            }
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "key_not_found", self.to_string()),
            AppError::MalformedIdentifier(ref field) => (
                StatusCode::BAD_REQUEST,
                "malformed_identifier",
                format!("Malformed identifier: {}", field),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::DuplicateSecret => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "duplicate_secret",
                self.to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
            AppError::InsufficientPermissions { .. } => unreachable!("handled above"),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_map_to_401() {
        for err in [
            AppError::MissingKey,
            AppError::InvalidKey,
            AppError::OrphanedKey,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn malformed_identifier_maps_to_400() {
        let resp = AppError::MalformedIdentifier("project_id".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_and_forbidden_stay_distinct() {
        assert_eq!(
            AppError::ProjectNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn permission_denial_echoes_capability_sets() {
        let err = AppError::InsufficientPermissions {
            required: vec![Capability::Auth, Capability::Database],
            current: vec!["auth".to_string()],
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["required"], json!(["auth", "database"]));
        assert_eq!(body["error"]["current"], json!(["auth"]));
    }
}
