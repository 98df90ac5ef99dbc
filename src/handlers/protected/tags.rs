// handlers/protected/tags.rs - tag catalog and project tagging

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;

use crate::api::AppJson;
use crate::app::AppState;
use crate::database::models::{NewTag, Tag, TagAssignment};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, ResourceFacts};

use super::utils::{collaborators_for_check, load_project};

/// GET /api/tags - the whole catalog
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    let tags = state.storage.list_tags().await?;
    Ok(Json(tags))
}

/// POST /api/tags - create a tag with a unique name
pub async fn create_tag(
    State(state): State<AppState>,
    AppJson(body): AppJson<NewTag>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    if let Err(field_errors) = body.validate() {
        return Err(ApiError::validation("Invalid tag data", Some(field_errors)));
    }

    let name = body.name.as_deref().unwrap_or_default();
    let tag = state.storage.create_tag(name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// POST /api/projects/:id/tags - attach a tag by id or by name
///
/// Answers with the project's full tag list after the attach. Re-attaching
/// an already-assigned tag is a no-op.
pub async fn add_project_tag(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<TagAssignment>,
) -> Result<(StatusCode, Json<Vec<Tag>>), ApiError> {
    let project = load_project(&state, id).await?;
    let collaborators = collaborators_for_check(&state, &project, caller.id).await?;
    let facts = ResourceFacts {
        project: &project,
        collaborators: &collaborators,
        task: None,
    };
    policy::evaluate(&rules::ADD_PROJECT_TAG, &caller, Some(&facts))?;

    let tag = match (body.tag_id, body.tag_name.as_deref()) {
        (Some(tag_id), _) => state
            .storage
            .tag_by_id(tag_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Tag not found"))?,
        (None, Some(name)) if !name.is_empty() => state.storage.get_or_create_tag(name).await?,
        _ => return Err(ApiError::bad_request("Either tagId or tagName is required")),
    };

    state.storage.assign_tag(project.id, tag.id).await?;

    let tags = state.storage.project_tags(project.id).await?;
    Ok((StatusCode::CREATED, Json(tags)))
}
