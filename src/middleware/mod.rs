//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Enforce capability requirements
//! - Record usage after the response is produced
//! - Short-circuit requests (reject unauthorized)

/// API key authentication gate (strict / optional / format-only)
pub mod auth;

/// Capability enforcement for the keyed service routes
pub mod permissions;

/// Trusted dashboard identity seam
pub mod session;

/// Per-request usage recording
pub mod usage;
