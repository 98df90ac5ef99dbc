// handlers/protected/tasks.rs - task CRUD and assignment listing

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;

use crate::api::AppJson;
use crate::app::AppState;
use crate::database::models::{NewTask, Task, TaskPatch};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, ResourceFacts};

use super::utils::{collaborators_for_check, load_project};

/// GET /api/projects/:id/tasks - newest first
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::VIEW_PROJECT_TASKS, &caller, Some(&facts))?;

    let tasks = state.storage.project_tasks(project.id).await?;
    Ok(Json(tasks))
}

/// POST /api/projects/:id/tasks - owner or any collaborator
pub async fn create_task(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::CREATE_TASK, &caller, Some(&facts))?;

    if let Err(field_errors) = body.validate() {
        return Err(ApiError::validation("Invalid task data", Some(field_errors)));
    }

    let task = state.storage.create_task(project.id, caller.id, &body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/tasks/:id - owner, collaborator, creator, or assignee
pub async fn update_task(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .storage
        .task_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    let project = load_project(&state, task.project_id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: Some(&task),
    };
    policy::evaluate(&rules::UPDATE_TASK, &caller, Some(&facts))?;

    let updated = state.storage.update_task(id, &body).await?;
    Ok(Json(updated))
}

/// DELETE /api/tasks/:id - project owner only
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let task = state
        .storage
        .task_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    let project = load_project(&state, task.project_id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &[],
        task: Some(&task),
    };
    policy::evaluate(&rules::DELETE_TASK, &caller, Some(&facts))?;

    state.storage.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/my-tasks - tasks assigned to the caller, newest first
pub async fn my_tasks(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.storage.tasks_assigned_to(caller.id).await?;
    Ok(Json(tasks))
}
