//! BaaS Platform Server - Main Application Entry Point
//!
//! This is a multi-tenant "Backend as a Service" façade. Dashboard users
//! create projects and mint scoped API keys; external callers present
//! those keys to reach simulated sub-APIs (auth, database, storage), and
//! every keyed call is recorded for analytics.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: opaque bearer API keys (`x-api-key` header),
//!   resolved against stored records per request
//! - **Format**: JSON requests/responses
//!
//! # Request pipeline (keyed routes)
//!
//! authentication gate → usage recorder → capability gate → handler;
//! the recorder persists one record per completed keyed request in a
//! detached task after the response is released.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Start the usage-record retention sweep
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use tracing_subscriber::EnvFilter;

use axum::{
    Router,
    extract::Request,
    middleware as axum_middleware,
    middleware::Next,
    routing::{delete, get, patch, post},
};
use models::api_key::Capability;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Expire usage records past the retention window in the background
    services::usage_service::spawn_retention_sweeper(pool.clone());

    // Dashboard routes: project/key CRUD and usage analytics, authorized
    // by the trusted session identity forwarded in x-user-id
    let dashboard_routes = Router::new()
        // Project management routes
        .route("/api/v1/projects", post(handlers::projects::create_project))
        .route("/api/v1/projects", get(handlers::projects::list_projects))
        .route("/api/v1/projects/{id}", get(handlers::projects::get_project))
        .route(
            "/api/v1/projects/{id}",
            delete(handlers::projects::delete_project),
        )
        // Key management routes
        .route(
            "/api/v1/projects/{id}/keys",
            post(handlers::keys::create_key),
        )
        .route("/api/v1/projects/{id}/keys", get(handlers::keys::list_keys))
        .route("/api/v1/keys/{id}", get(handlers::keys::get_key))
        .route("/api/v1/keys/{id}", patch(handlers::keys::update_key))
        .route("/api/v1/keys/{id}", delete(handlers::keys::delete_key))
        // Usage analytics routes
        .route(
            "/api/v1/usage/stats/{project_id}",
            get(handlers::usage::project_usage_stats),
        )
        .route(
            "/api/v1/usage/keys/{key_id}",
            get(handlers::usage::key_usage_stats),
        )
        .route(
            "/api/v1/usage/analytics/{project_id}",
            get(handlers::usage::project_usage_analytics),
        )
        // Apply the session middleware to all routes in this group
        .route_layer(axum_middleware::from_fn(
            middleware::session::require_session,
        ));

    // Simulated sub-APIs, each gated on its capability
    let auth_api = Router::new()
        .route("/api/v1/auth/users", get(handlers::services::auth_users))
        .route("/api/v1/auth/verify", post(handlers::services::auth_verify))
        .route_layer(axum_middleware::from_fn(|request: Request, next: Next| {
            middleware::permissions::require_capabilities(&[Capability::Auth], request, next)
        }));

    let database_api = Router::new()
        .route(
            "/api/v1/database/collections",
            get(handlers::services::database_collections),
        )
        .route(
            "/api/v1/database/query",
            post(handlers::services::database_query),
        )
        .route_layer(axum_middleware::from_fn(|request: Request, next: Next| {
            middleware::permissions::require_capabilities(&[Capability::Database], request, next)
        }));

    let storage_api = Router::new()
        .route(
            "/api/v1/storage/files",
            get(handlers::services::storage_files),
        )
        .route(
            "/api/v1/storage/upload",
            post(handlers::services::storage_upload),
        )
        .route_layer(axum_middleware::from_fn(|request: Request, next: Next| {
            middleware::permissions::require_capabilities(&[Capability::Storage], request, next)
        }));

    // Keyed service routes: strict gate, then the usage recorder, then
    // the per-service capability gates above (last layer added runs first)
    let service_routes = Router::new()
        .merge(auth_api)
        .merge(database_api)
        .merge(storage_api)
        .layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::usage::track_usage,
        ))
        .layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::require_api_key,
        ));

    // Status works keyless or keyed; keyed calls are recorded
    let status_routes = Router::new()
        .route("/api/v1/status", get(handlers::services::service_status))
        .layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::usage::track_usage,
        ))
        .layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::optional_api_key,
        ));

    // Legacy surface: header shape only, no store lookup
    let legacy_routes = Router::new()
        .route(
            "/api/v1/legacy/validate",
            post(handlers::services::legacy_validate),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::require_key_format,
        ));

    // Combine route groups with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .merge(dashboard_routes)
        .merge(service_routes)
        .merge(status_routes)
        .merge(legacy_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share database pool with all handlers via State extraction
        .with_state(pool);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
