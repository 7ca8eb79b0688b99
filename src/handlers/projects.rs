//! Project management HTTP handlers.
//!
//! This module implements the project-related dashboard endpoints:
//! - POST /api/v1/projects - Create new project
//! - GET /api/v1/projects - List projects for the authenticated owner
//! - GET /api/v1/projects/:id - Get project by ID
//! - DELETE /api/v1/projects/:id - Delete a project
//!
//! All routes sit behind the session middleware, which attaches the
//! trusted `OwnerIdentity`.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::session::OwnerIdentity,
    models::project::{CreateProjectRequest, Project, ProjectResponse},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Fetch a project and verify the caller owns it.
///
/// Keeps the error distinction the API promises: absent project is 404,
/// someone else's project is 403. Shared by the key and usage handlers,
/// which authorize through the same project chain.
pub async fn load_owned_project(
    pool: &DbPool,
    project_id: Uuid,
    owner: &OwnerIdentity,
) -> Result<Project, AppError> {
    let project = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, owner_id, name, description, created_at, updated_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::ProjectNotFound)?;

    if project.owner_id != owner.user_id {
        return Err(AppError::Forbidden);
    }

    Ok(project)
}

/// Create a new project.
///
/// # Endpoint
///
/// `POST /api/v1/projects`
///
/// # Response
///
/// - **Success (201 Created)**: Returns the created project
/// - **Error (401)**: No forwarded session identity
pub async fn create_project(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), AppError> {
    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (owner_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, owner_id, name, description, created_at, updated_at
        "#,
    )
    .bind(owner.user_id)
    .bind(&request.name)
    .bind(&request.description)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(project.into())))
}

/// List all projects for the authenticated owner, newest first.
///
/// # Endpoint
///
/// `GET /api/v1/projects`
pub async fn list_projects(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
) -> Result<Json<Vec<ProjectResponse>>, AppError> {
    let projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, owner_id, name, description, created_at, updated_at
        FROM projects
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner.user_id)
    .fetch_all(&pool)
    .await?;

    let responses: Vec<ProjectResponse> = projects.into_iter().map(Into::into).collect();

    Ok(Json(responses))
}

/// Get a specific project by ID.
///
/// # Endpoint
///
/// `GET /api/v1/projects/:id`
///
/// # Response
///
/// - **Success (200 OK)**: Project details
/// - **Error (404)**: Project does not exist
/// - **Error (403)**: Project belongs to a different owner
pub async fn get_project(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;
    Ok(Json(project.into()))
}

/// Delete a project.
///
/// # Endpoint
///
/// `DELETE /api/v1/projects/:id`
///
/// Keys minted against the project are not cascaded: they keep their
/// dangling project reference and fail authentication as orphaned from
/// this point on. Usage records likewise expire on their own schedule.
pub async fn delete_project(
    State(pool): State<DbPool>,
    Extension(owner): Extension<OwnerIdentity>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let project = load_owned_project(&pool, project_id, &owner).await?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project.id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
