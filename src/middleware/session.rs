//! Trusted dashboard identity seam.
//!
//! The dashboard session/JWT system lives in front of this service and
//! forwards the authenticated user's id in a header. This middleware
//! trusts that identity without re-validating it; its only job is to
//! make ownership checks possible on the key/project CRUD routes.

use crate::error::AppError;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

/// Header the upstream session layer forwards the user id in.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Owner identity attached to dashboard requests.
#[derive(Debug, Clone)]
pub struct OwnerIdentity {
    pub user_id: Uuid,
}

/// Require a forwarded user identity on dashboard routes.
///
/// Missing header is a 401; a header that does not parse as a UUID is a
/// 400 so misconfigured proxies are distinguishable from absent auth.
pub async fn require_session(mut request: Request, next: Next) -> Result<Response, AppError> {
    let raw = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;

    let user_id: Uuid = raw
        .parse()
        .map_err(|_| AppError::MalformedIdentifier(USER_ID_HEADER.to_string()))?;

    request.extensions_mut().insert(OwnerIdentity { user_id });

    Ok(next.run(request).await)
}
