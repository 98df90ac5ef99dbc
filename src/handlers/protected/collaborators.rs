// handlers/protected/collaborators.rs - project membership management

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;

use crate::api::AppJson;
use crate::app::AppState;
use crate::database::models::{CollaboratorInfo, NewCollaborator, ProjectCollaborator};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, ResourceFacts};

use super::utils::load_project;

/// GET /api/projects/:id/collaborators - owner or any collaborator
pub async fn list_collaborators(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<CollaboratorInfo>>, ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = state.storage.project_collaborators(project.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::VIEW_COLLABORATORS, &caller, Some(&facts))?;

    Ok(Json(collaborators))
}

/// POST /api/projects/:id/collaborators - owner adds a member, pro plan up
///
/// The plan gate runs before the project lookup: a free-plan caller gets
/// the upgrade denial even when the project does not exist.
pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<NewCollaborator>,
) -> Result<(StatusCode, Json<ProjectCollaborator>), ApiError> {
    policy::evaluate(&rules::ADD_COLLABORATOR, &caller, None)?;

    let project = load_project(&state, id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &[],
        task: None,
    };
    policy::evaluate(&rules::ADD_COLLABORATOR, &caller, Some(&facts))?;

    let collaborator_id = body
        .collaborator_id
        .ok_or_else(|| ApiError::bad_request("Collaborator ID is required"))?;

    let collaborator = state
        .storage
        .user_by_id(collaborator_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let role = body.role.as_deref().unwrap_or("member");
    let collaboration = state
        .storage
        .add_collaborator(project.id, collaborator.id, role)
        .await?;

    Ok((StatusCode::CREATED, Json(collaboration)))
}

/// DELETE /api/projects/:id/collaborators/:user_id - owner only
pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path((project_id, user_id)): Path<(i32, i32)>,
) -> Result<StatusCode, ApiError> {
    let project = load_project(&state, project_id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &[],
        task: None,
    };
    policy::evaluate(&rules::REMOVE_COLLABORATOR, &caller, Some(&facts))?;

    state
        .storage
        .remove_collaborator(project.id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
