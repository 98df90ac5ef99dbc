// handlers/public/auth.rs - registration and login

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};

use crate::api::AppJson;
use crate::app::AppState;
use crate::auth::{self, Claims};
use crate::database::models::{Credentials, NewUser};
use crate::error::ApiError;

fn issue_token(state: &AppState, user_id: i32, username: &str) -> Result<String, ApiError> {
    let claims = Claims::new(
        user_id,
        username.to_string(),
        state.config.security.jwt_expiry_hours,
    );
    let token = auth::generate_jwt(&claims, &state.config.security.jwt_secret)?;
    Ok(token)
}

/// POST /api/register - create an account and sign the caller in
///
/// The requested role is ignored; every registration lands as a plain
/// user on the plan given in the body (free when absent).
pub async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<NewUser>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Err(field_errors) = body.validate() {
        return Err(ApiError::validation("Invalid user data", Some(field_errors)));
    }

    let password = body.password.as_deref().unwrap_or_default();
    let hash = auth::hash_password(password)?;

    let user = state.storage.create_user(&body, &hash).await?;
    let token = issue_token(&state, user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user, "token": token })),
    ))
}

/// POST /api/login - exchange credentials for a token
pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<Credentials>,
) -> Result<Json<Value>, ApiError> {
    if let Err(field_errors) = body.validate() {
        return Err(ApiError::validation(
            "Invalid login data",
            Some(field_errors),
        ));
    }

    let username = body.username.as_deref().unwrap_or_default();
    let password = body.password.as_deref().unwrap_or_default();

    let user = state
        .storage
        .user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    if !auth::verify_password(password, &user.password)? {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    let token = issue_token(&state, user.id, &user.username)?;

    Ok(Json(json!({ "user": user, "token": token })))
}
