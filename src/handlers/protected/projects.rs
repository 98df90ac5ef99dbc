// handlers/protected/projects.rs - project CRUD

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;
use serde_json::Value;

use crate::api::AppJson;
use crate::app::AppState;
use crate::database::models::{NewProject, Project, ProjectPatch};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, ResourceFacts};

use super::utils::{collaborators_for_check, load_project};

/// GET /api/projects - owned projects followed by collaborated projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state.storage.projects_visible_to(caller.id).await?;
    Ok(Json(projects))
}

/// POST /api/projects - create a project, subject to the plan limit
///
/// The limit denial fires before body validation, counting only projects
/// the caller owns. The storage gateway repeats the check inside the
/// insert transaction, so a racing request cannot sneak past this one.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    AppJson(body): AppJson<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let owned = state
        .storage
        .projects_visible_to(caller.id)
        .await?
        .iter()
        .filter(|p| p.user_id == caller.id)
        .count() as i64;

    let limit = caller.plan.project_limit();
    if owned >= limit {
        return Err(ApiError::project_limit(caller.plan, limit));
    }

    if let Err(field_errors) = body.validate() {
        return Err(ApiError::validation(
            "Invalid project data",
            Some(field_errors),
        ));
    }

    let project = state.storage.create_project(caller.id, &body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/:id - a project with its tag list
pub async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::VIEW_PROJECT, &caller, Some(&facts))?;

    let tags = state.storage.project_tags(project.id).await?;

    let mut body = serde_json::to_value(&project)?;
    if let Value::Object(map) = &mut body {
        map.insert("tags".to_string(), serde_json::to_value(&tags)?);
    }
    Ok(Json(body))
}

/// PATCH /api/projects/:id - owner or editor collaborator
///
/// The patch shape has no owner field; ownership never moves through
/// this endpoint.
pub async fn update_project(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<ProjectPatch>,
) -> Result<Json<Project>, ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::UPDATE_PROJECT, &caller, Some(&facts))?;

    let updated = state.storage.update_project(id, &body).await?;
    Ok(Json(updated))
}

/// DELETE /api/projects/:id - owner only
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let project = load_project(&state, id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &[],
        task: None,
    };
    policy::evaluate(&rules::DELETE_PROJECT, &caller, Some(&facts))?;

    state.storage.delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
