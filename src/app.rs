// app.rs - shared state and router assembly

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::Storage;
use crate::handlers::{protected, public};
use crate::middleware::require_auth;

/// Application state, built once at startup and injected into every
/// handler. Tests construct it with an in-memory storage gateway.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, config: AppConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
        }
    }
}

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{analytics, collaborators, projects, tags, tasks, users};

    Router::new()
        // Account
        .route("/api/user", get(users::current_user))
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", get(users::get_user))
        .route("/api/users/:id/plan", patch(users::update_user_plan))
        .route("/api/update-subscription", post(users::update_subscription))
        // Projects
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        // Tasks
        .route(
            "/api/projects/:id/tasks",
            get(tasks::list_project_tasks).post(tasks::create_task),
        )
        .route(
            "/api/tasks/:id",
            patch(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/api/my-tasks", get(tasks::my_tasks))
        // Collaborators
        .route(
            "/api/projects/:id/collaborators",
            get(collaborators::list_collaborators).post(collaborators::add_collaborator),
        )
        .route(
            "/api/projects/:id/collaborators/:user_id",
            delete(collaborators::remove_collaborator),
        )
        // Tags
        .route("/api/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/api/projects/:id/tags", post(tags::add_project_tag))
        // Analytics
        .route("/api/user-stats", get(analytics::user_stats))
        .route("/api/analytics", get(analytics::analytics))
        .route("/api/admin/analytics", get(analytics::admin_analytics))
        .route_layer(from_fn_with_state(state, require_auth))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "SaaSPro API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "timestamp": now,
                "database": e.to_string()
            })),
        ),
    }
}
