//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic (database queries, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Service health endpoint
pub mod health;

/// API key management endpoints (dashboard)
pub mod keys;

/// Project management endpoints (dashboard)
pub mod projects;

/// Simulated sub-API endpoints (keyed)
pub mod services;

/// Usage analytics endpoints (dashboard)
pub mod usage;
