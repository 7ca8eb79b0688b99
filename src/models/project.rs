//! Project data models and API request/response types.
//!
//! This module defines:
//! - `Project`: Database entity representing a tenant project
//! - `CreateProjectRequest`: Request body for creating projects
//! - `ProjectResponse`: Response body returned to clients
//!
//! Projects are the ownership root: every API key belongs to exactly one
//! project, and every authorization check on keys and usage data walks
//! key → project → owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a project record from the database.
///
/// # Database Table
///
/// Maps to the `projects` table. The `owner_id` comes from the trusted
/// dashboard session layer; this service never validates it beyond
/// equality checks.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Project {
    /// Unique identifier for this project
    pub id: Uuid,

    /// Dashboard user that owns this project
    pub owner_id: Uuid,

    /// Human-readable project name
    pub name: String,

    /// Optional free-text description
    pub description: Option<String>,

    /// Timestamp when project was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of last update
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a new project.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "My App",
///   "description": "Backend for the mobile app"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    /// Name for the new project
    pub name: String,

    /// Optional description
    pub description: Option<String>,
}

/// Response body for project endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "660e8400-e29b-41d4-a716-446655440001",
///   "name": "My App",
///   "description": "Backend for the mobile app",
///   "created_at": "2026-01-15T10:00:00Z",
///   "updated_at": "2026-01-15T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database Project to API ProjectResponse.
///
/// This removes the internal `owner_id` field.
impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            description: project.description,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}
