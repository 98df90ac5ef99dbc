use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::app::AppState;
use crate::auth;
use crate::database::models::User;
use crate::error::ApiError;

/// Authenticated caller context, attached to the request once the token
/// checks out.
///
/// The token only identifies the caller. Role and plan always come from
/// the user row read on this request, so a plan upgrade or role change is
/// effective on the caller's very next request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// JWT authentication middleware for the protected route tier.
///
/// Every failure mode answers with the same 401 body; the specific reason
/// only goes to the logs.
pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(msg) => {
            tracing::debug!("Authentication failed: {}", msg);
            return Err(ApiError::unauthorized("Unauthorized"));
        }
    };

    let claims = match auth::verify_jwt(&token, &state.config.security.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Authentication failed: {}", e);
            return Err(ApiError::unauthorized("Unauthorized"));
        }
    };

    let user = state
        .storage
        .user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
