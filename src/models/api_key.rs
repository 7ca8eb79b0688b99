//! API key data models and API request/response types.
//!
//! This module defines:
//! - `ApiKey`: Database entity representing a scoped API key
//! - `Capability` and `EnvTag`: the fixed vocabularies keys are built from
//! - Request types for creating and updating keys
//! - `ApiKeyResponse` / `CreatedApiKeyResponse`: response bodies (masked
//!   vs. one-time full secret)

use crate::services::key_service;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A permission tag an API key may hold.
///
/// Each simulated sub-API is gated on one capability. The set is closed:
/// anything outside these three is rejected at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Access to the simulated authentication service
    Auth,

    /// Access to the simulated database service
    Database,

    /// Access to the simulated storage service
    Storage,
}

impl Capability {
    /// Stable string form, matching both the wire format and the
    /// TEXT[] values stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Auth => "auth",
            Capability::Database => "database",
            Capability::Storage => "storage",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Capability::Auth),
            "database" => Ok(Capability::Database),
            "storage" => Ok(Capability::Storage),
            _ => Err(()),
        }
    }
}

/// Environment marker embedded in every secret.
///
/// `live` keys are production keys; `test` keys are sandbox keys. The tag
/// is purely informational: both authenticate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvTag {
    #[default]
    Live,
    Test,
}

impl EnvTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvTag::Live => "live",
            EnvTag::Test => "test",
        }
    }
}

impl fmt::Display for EnvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(EnvTag::Live),
            "test" => Ok(EnvTag::Test),
            _ => Err(()),
        }
    }
}

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. Each key:
/// - Belongs to one project (via `project_id`, which may dangle if the
///   project was deleted — authentication treats that as an orphaned key)
/// - Carries a capability set governing which sub-APIs it may call
/// - Stores the secret itself under a unique index, since authentication
///   is an exact-match lookup and listings must show a masked prefix
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// Project this key was minted against
    pub project_id: Uuid,

    /// The bearer secret, format `<env>_<64 hex chars>`
    ///
    /// Shown in full exactly once, in the creation response. Every other
    /// representation goes through `key_service::mask_secret`.
    pub secret: String,

    /// Human-readable name shown in the dashboard
    pub display_name: String,

    /// Optional free-text description
    pub description: Option<String>,

    /// Capability tags, stored as TEXT[] (values of `Capability::as_str`)
    pub capabilities: Vec<String>,

    /// Whether this key is currently usable for authentication
    ///
    /// Inactive keys are rejected during authentication. This provides a
    /// way to revoke access without deleting the record.
    pub is_active: bool,

    /// When this key last authenticated a request (best-effort)
    pub last_used_at: Option<DateTime<Utc>>,

    /// Timestamp when this key was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last owner-initiated update
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// True iff every required capability is in this key's granted set.
    ///
    /// An empty requirement always passes.
    pub fn has_capabilities(&self, required: &[Capability]) -> bool {
        required
            .iter()
            .all(|cap| self.capabilities.iter().any(|c| c == cap.as_str()))
    }
}

/// Collapse duplicate capabilities, preserving first-seen order, and
/// convert to the stored string form.
pub fn dedup_capabilities(capabilities: &[Capability]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(capabilities.len());
    for cap in capabilities {
        if !out.iter().any(|c| c == cap.as_str()) {
            out.push(cap.as_str().to_string());
        }
    }
    out
}

/// Request body for creating a new API key.
///
/// # JSON Example
///
/// ```json
/// {
///   "display_name": "Production backend",
///   "description": "Key used by the mobile app backend",
///   "capabilities": ["auth", "database"],
///   "environment": "live"
/// }
/// ```
///
/// # Validation
///
/// - `display_name`: Required
/// - `capabilities`: Optional, defaults to empty (key authenticates but
///   every capability-gated route denies it); unknown tags are rejected
/// - `environment`: Optional, defaults to "live"
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    /// Name for the new key
    pub display_name: String,

    /// Optional description
    pub description: Option<String>,

    /// Capability tags to grant (duplicates collapse)
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Environment tag baked into the secret (defaults to "live")
    #[serde(default)]
    pub environment: EnvTag,
}

/// Request body for updating an existing API key.
///
/// All fields are optional; omitted fields are left unchanged. The secret
/// itself is immutable and cannot appear here.
#[derive(Debug, Deserialize)]
pub struct UpdateApiKeyRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub capabilities: Option<Vec<Capability>>,
    pub is_active: Option<bool>,
}

/// Response body for key endpoints. The secret is always masked.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "project_id": "660e8400-e29b-41d4-a716-446655440001",
///   "secret": "live_a3f4...09bc",
///   "environment": "live",
///   "display_name": "Production backend",
///   "capabilities": ["auth", "database"],
///   "is_active": true,
///   "last_used_at": "2026-01-20T10:00:00Z",
///   "created_at": "2026-01-15T10:00:00Z",
///   "updated_at": "2026-01-15T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub project_id: Uuid,

    /// Masked secret, e.g. `live_a3f4...09bc`
    pub secret: String,

    /// Environment tag recovered from the secret
    pub environment: String,

    pub display_name: String,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database ApiKey to the masked API representation.
impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        let environment = key_service::extract_env_tag(&key.secret)
            .map(|tag| tag.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            id: key.id,
            project_id: key.project_id,
            secret: key_service::mask_secret(&key.secret),
            environment,
            display_name: key.display_name,
            description: key.description,
            capabilities: key.capabilities,
            is_active: key.is_active,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}

/// Response body returned once, at creation time, with the full secret.
///
/// This is the only place the unmasked secret ever leaves the server.
#[derive(Debug, Serialize)]
pub struct CreatedApiKeyResponse {
    #[serde(flatten)]
    pub key: ApiKeyResponse,

    /// The full bearer secret. Store it now; it is never shown again.
    pub full_secret: String,
}

impl CreatedApiKeyResponse {
    pub fn new(key: ApiKey) -> Self {
        let full_secret = key.secret.clone();
        Self {
            key: key.into(),
            full_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with(capabilities: &[&str]) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            secret: format!("live_{}", "a".repeat(64)),
            display_name: "test key".to_string(),
            description: None,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn has_capabilities_requires_full_subset() {
        let key = key_with(&["auth", "database"]);
        assert!(key.has_capabilities(&[Capability::Auth]));
        assert!(key.has_capabilities(&[Capability::Auth, Capability::Database]));
        assert!(!key.has_capabilities(&[Capability::Auth, Capability::Storage]));
    }

    #[test]
    fn empty_requirement_always_passes() {
        let key = key_with(&[]);
        assert!(key.has_capabilities(&[]));
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let deduped = dedup_capabilities(&[
            Capability::Database,
            Capability::Auth,
            Capability::Database,
            Capability::Auth,
        ]);
        assert_eq!(deduped, vec!["database".to_string(), "auth".to_string()]);
    }

    #[test]
    fn capability_round_trips_through_str() {
        for cap in [Capability::Auth, Capability::Database, Capability::Storage] {
            assert_eq!(cap.as_str().parse::<Capability>(), Ok(cap));
        }
        assert!("admin".parse::<Capability>().is_err());
    }

    #[test]
    fn masked_response_never_contains_full_secret() {
        let key = key_with(&["auth"]);
        let secret = key.secret.clone();
        let response: ApiKeyResponse = key.into();
        assert_ne!(response.secret, secret);
        assert_eq!(response.environment, "live");
    }
}
