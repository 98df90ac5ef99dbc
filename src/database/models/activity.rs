use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only audit record. Rows survive deletion of the entity they
/// reference; a dangling entity_id is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub user_id: i32,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub user_id: i32,
    pub metadata: Option<String>,
}

impl NewActivity {
    pub fn new(action: &str, entity_type: &str, entity_id: i32, user_id: i32) -> Self {
        Self {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            user_id,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}
