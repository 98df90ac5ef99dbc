use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Raw junction row between a project and a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCollaborator {
    pub project_id: i32,
    pub user_id: i32,
    /// Free-form role string; "editor" is the only value with meaning to
    /// the access rules.
    pub role: String,
    pub added_at: DateTime<Utc>,
}

/// Collaborator listing joined with the user's profile fields.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInfo {
    pub user_id: i32,
    pub role: String,
    pub added_at: DateTime<Utc>,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollaborator {
    pub collaborator_id: Option<i32>,
    pub role: Option<String>,
}
