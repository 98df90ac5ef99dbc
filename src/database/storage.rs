// Storage gateway: single point of truth for reads and writes.
//
// The trait is object-safe so the server carries an `Arc<dyn Storage>`
// built once at startup; tests substitute an in-memory implementation.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::{
    ActivityLog, CollaboratorInfo, NewProject, NewTask, NewUser, Project, ProjectCollaborator,
    ProjectPatch, Tag, Task, TaskPatch, User,
};
use crate::policy::{Plan, Role};

/// Errors from the storage gateway
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Tag already exists")]
    DuplicateTag,

    #[error("Project limit reached: plan {current_plan} allows {limit} projects")]
    ProjectLimitReached { current_plan: Plan, limit: i64 },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_projects: i64,
    pub active_tasks_count: i64,
    pub completion_rate: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlanCounts {
    pub total: i64,
    pub free: i64,
    pub pro: i64,
    pub enterprise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatusCounts {
    pub total: i64,
    pub planning: i64,
    pub in_progress: i64,
    pub review: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub blocked: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub users: PlanCounts,
    pub projects: ProjectStatusCounts,
    pub tasks: TaskStatusCounts,
    pub recent_signups: Vec<User>,
}

/// Percentage of tasks carrying a completion stamp, rounded to the nearest
/// integer. Zero when there are no tasks.
pub fn completion_rate(completed: i64, total: i64) -> i32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i32
}

#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StorageError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    /// Inserts a user with role forced to `user`; `plan` defaults to free.
    /// Fails with `UsernameTaken` on a duplicate username.
    async fn create_user(&self, new: &NewUser, password_hash: &str) -> Result<User, StorageError>;
    async fn list_users(&self) -> Result<Vec<User>, StorageError>;
    async fn update_user_plan(&self, id: i32, plan: Plan) -> Result<User, StorageError>;
    async fn update_user_role(&self, id: i32, role: Role) -> Result<User, StorageError>;

    // Projects
    /// Owned projects followed by collaborated projects. Not de-duplicated:
    /// a user who is both owner and collaborator of one project sees it
    /// twice, matching the listing's documented contract.
    async fn projects_visible_to(&self, user_id: i32) -> Result<Vec<Project>, StorageError>;
    async fn project_by_id(&self, id: i32) -> Result<Option<Project>, StorageError>;
    /// Inserts a project and its tag list atomically with the owned-project
    /// limit check; the loser of a creation race gets
    /// `ProjectLimitReached` instead of an over-limit row.
    async fn create_project(&self, owner_id: i32, new: &NewProject)
        -> Result<Project, StorageError>;
    async fn update_project(&self, id: i32, patch: &ProjectPatch)
        -> Result<Project, StorageError>;
    /// Returns false when the project does not exist. Cascades to tasks,
    /// tag associations, and collaborator rows; activity logs remain.
    async fn delete_project(&self, id: i32) -> Result<bool, StorageError>;

    // Collaborators
    async fn project_collaborators(
        &self,
        project_id: i32,
    ) -> Result<Vec<CollaboratorInfo>, StorageError>;
    async fn add_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
        role: &str,
    ) -> Result<ProjectCollaborator, StorageError>;
    /// Unconditional: removing an absent collaborator still reports true.
    async fn remove_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
    ) -> Result<bool, StorageError>;

    // Tags
    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError>;
    async fn tag_by_id(&self, id: i32) -> Result<Option<Tag>, StorageError>;
    async fn create_tag(&self, name: &str) -> Result<Tag, StorageError>;
    /// Safe to call concurrently with identical names; the unique index
    /// decides the winner and everyone gets the same row back.
    async fn get_or_create_tag(&self, name: &str) -> Result<Tag, StorageError>;
    async fn project_tags(&self, project_id: i32) -> Result<Vec<Tag>, StorageError>;
    /// Idempotent: re-adding an existing association is a no-op.
    async fn assign_tag(&self, project_id: i32, tag_id: i32) -> Result<(), StorageError>;

    // Tasks
    async fn project_tasks(&self, project_id: i32) -> Result<Vec<Task>, StorageError>;
    async fn task_by_id(&self, id: i32) -> Result<Option<Task>, StorageError>;
    async fn create_task(
        &self,
        project_id: i32,
        created_by: i32,
        new: &NewTask,
    ) -> Result<Task, StorageError>;
    /// Applies the patch; when it moves status to Completed and no
    /// completion stamp exists, `completed_at` is set in the same update.
    /// The stamp is never cleared.
    async fn update_task(&self, id: i32, patch: &TaskPatch) -> Result<Task, StorageError>;
    async fn delete_task(&self, id: i32) -> Result<bool, StorageError>;
    async fn tasks_assigned_to(&self, user_id: i32) -> Result<Vec<Task>, StorageError>;

    // Activity and analytics
    async fn recent_activities(
        &self,
        user_id: i32,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, StorageError>;
    async fn user_stats(&self, user_id: i32) -> Result<UserStats, StorageError>;
    async fn admin_overview(&self) -> Result<AdminOverview, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}
