//! Business logic services used by handlers and middleware.

/// API key generation, masking, and storage
pub mod key_service;

/// Usage recording, analytics aggregation, and retention
pub mod usage_service;
