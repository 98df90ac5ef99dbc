// handlers/protected/users.rs - user listing and plan management

use axum::extract::{Path, State};
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;

use crate::api::AppJson;
use crate::app::AppState;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, Plan};

#[derive(Debug, Deserialize)]
pub struct PlanChange {
    pub plan: Option<String>,
}

impl PlanChange {
    fn parsed(&self) -> Result<Plan, ApiError> {
        self.plan
            .as_deref()
            .and_then(Plan::parse)
            .ok_or_else(|| ApiError::bad_request("Invalid subscription plan"))
    }
}

/// GET /api/user - the authenticated caller
pub async fn current_user(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

/// GET /api/users - every account (admin)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    policy::evaluate(&rules::LIST_USERS, &caller, None)?;

    let users = state.storage.list_users().await?;
    Ok(Json(users))
}

/// GET /api/users/:id - single account (admin)
pub async fn get_user(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<User>, ApiError> {
    policy::evaluate(&rules::VIEW_USER, &caller, None)?;

    let user = state
        .storage
        .user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// PATCH /api/users/:id/plan - move an account to another tier (admin)
pub async fn update_user_plan(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    AppJson(body): AppJson<PlanChange>,
) -> Result<Json<User>, ApiError> {
    policy::evaluate(&rules::UPDATE_USER_PLAN, &caller, None)?;

    let plan = body.parsed()?;
    let user = state.storage.update_user_plan(id, plan).await?;
    Ok(Json(user))
}

/// POST /api/update-subscription - change the caller's own plan
///
/// Takes effect on the caller's next request, since authorization reads
/// the user row fresh each time.
pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    AppJson(body): AppJson<PlanChange>,
) -> Result<Json<User>, ApiError> {
    let plan = body.parsed()?;
    let user = state.storage.update_user_plan(caller.id, plan).await?;
    Ok(Json(user))
}
