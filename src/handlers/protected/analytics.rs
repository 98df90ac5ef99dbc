// handlers/protected/analytics.rs - dashboard figures

use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::storage::UserStats;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::policy::{self, rules, Plan};

/// GET /api/user-stats - owned-project figures for the caller
pub async fn user_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<UserStats>, ApiError> {
    let stats = state.storage.user_stats(caller.id).await?;
    Ok(Json(stats))
}

/// GET /api/analytics - the stats plus the caller's five newest activities
pub async fn analytics(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.storage.user_stats(caller.id).await?;
    let activities = state.storage.recent_activities(caller.id, 5).await?;

    let mut body = serde_json::to_value(&stats)?;
    if let Value::Object(map) = &mut body {
        map.insert(
            "recentActivities".to_string(),
            serde_json::to_value(&activities)?,
        );
    }
    Ok(Json(body))
}

/// GET /api/admin/analytics - system-wide overview (admin)
///
/// Monthly revenue comes from the static price table, not from billing
/// records.
pub async fn admin_analytics(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    policy::evaluate(&rules::ADMIN_ANALYTICS, &caller, None)?;

    let overview = state.storage.admin_overview().await?;
    let monthly_revenue = overview.users.pro * Plan::Pro.monthly_price_usd()
        + overview.users.enterprise * Plan::Enterprise.monthly_price_usd();

    let mut body = serde_json::to_value(&overview)?;
    if let Value::Object(map) = &mut body {
        map.insert("monthlyRevenue".to_string(), json!(monthly_revenue));
    }
    Ok(Json(body))
}
