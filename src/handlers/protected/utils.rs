// handlers/protected/utils.rs - shared resource lookups

use crate::app::AppState;
use crate::database::models::{CollaboratorInfo, Project};
use crate::error::ApiError;

/// Fetch a project or answer 404.
pub async fn load_project(state: &AppState, id: i32) -> Result<Project, ApiError> {
    state
        .storage
        .project_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Collaborator rows for a relation check. The fetch is skipped when the
/// caller owns the project, since ownership satisfies every relation on
/// its own.
pub async fn collaborators_for_check(
    state: &AppState,
    project: &Project,
    caller_id: i32,
) -> Result<Vec<CollaboratorInfo>, ApiError> {
    if project.user_id == caller_id {
        return Ok(Vec::new());
    }
    Ok(state.storage.project_collaborators(project.id).await?)
}
