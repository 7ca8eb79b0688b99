//! Database entities and their API request/response types.
//!
//! Each model module pairs the sqlx row struct with the serde types used
//! on the wire, plus the `From` conversions between them.

/// Scoped API keys and the capability vocabulary
pub mod api_key;

/// Tenant projects (ownership root)
pub mod project;

/// Immutable per-request usage records
pub mod usage_record;
