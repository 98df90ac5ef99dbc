use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::models::{
    ActivityLog, CollaboratorInfo, NewActivity, NewProject, NewTask, NewUser, Project,
    ProjectCollaborator, ProjectPatch, ProjectStatus, Tag, Task, TaskPatch, TaskStatus, User,
};
use crate::database::storage::{
    completion_rate, AdminOverview, PlanCounts, ProjectStatusCounts, Storage, StorageError,
    TaskStatusCounts, UserStats,
};
use crate::policy::{Plan, Role};

/// Postgres-backed storage gateway
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an activity row. Failures are logged and swallowed so the
    /// triggering mutation still succeeds.
    async fn log_activity(&self, activity: NewActivity) {
        let result = sqlx::query(
            "INSERT INTO activity_logs (action, entity_type, entity_id, user_id, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&activity.action)
        .bind(&activity.entity_type)
        .bind(activity.entity_id)
        .bind(activity.user_id)
        .bind(&activity.metadata)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record activity '{}': {}", activity.action, e);
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Insert-or-fetch a tag by name inside a transaction. The unique index on
/// `tags.name` decides races; the loser falls through to the select.
async fn upsert_tag(tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<Tag, StorageError> {
    let inserted = sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (name)
         VALUES ($1)
         ON CONFLICT (name) DO NOTHING
         RETURNING id, name",
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(tag) = inserted {
        return Ok(tag);
    }

    let tag = sqlx::query_as::<_, Tag>(
        "SELECT id, name
         FROM tags
         WHERE name = $1",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;

    Ok(tag)
}

#[async_trait]
impl Storage for PgStorage {
    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StorageError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at
             FROM users
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at
             FROM users
             WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new: &NewUser, password_hash: &str) -> Result<User, StorageError> {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password, email, first_name, last_name, plan)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at",
        )
        .bind(new.username.as_deref())
        .bind(password_hash)
        .bind(new.email.as_deref())
        .bind(new.first_name.as_deref())
        .bind(new.last_name.as_deref())
        .bind(new.plan.unwrap_or(Plan::Free))
        .fetch_one(&self.pool)
        .await;

        let user = match result {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => return Err(StorageError::UsernameTaken),
            Err(e) => return Err(e.into()),
        };

        self.log_activity(NewActivity::new("User registered", "user", user.id, user.id))
            .await;

        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at
             FROM users
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn update_user_plan(&self, id: i32, plan: Plan) -> Result<User, StorageError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET plan = $2
             WHERE id = $1
             RETURNING id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at",
        )
        .bind(id)
        .bind(plan)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;

        self.log_activity(
            NewActivity::new("Plan updated", "user", user.id, user.id)
                .with_metadata(plan.as_str()),
        )
        .await;

        Ok(user)
    }

    async fn update_user_role(&self, id: i32, role: Role) -> Result<User, StorageError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET role = $2
             WHERE id = $1
             RETURNING id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at",
        )
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;

        self.log_activity(NewActivity::new("Role updated", "user", user.id, user.id))
            .await;

        Ok(user)
    }

    async fn projects_visible_to(&self, user_id: i32) -> Result<Vec<Project>, StorageError> {
        let mut projects = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, status, progress, created_at, user_id
             FROM projects
             WHERE user_id = $1
             ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let collaborated = sqlx::query_as::<_, Project>(
            "SELECT p.id, p.name, p.description, p.status, p.progress, p.created_at, p.user_id
             FROM projects p
             JOIN project_collaborators pc ON pc.project_id = p.id
             WHERE pc.user_id = $1
             ORDER BY p.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        projects.extend(collaborated);
        Ok(projects)
    }

    async fn project_by_id(&self, id: i32) -> Result<Option<Project>, StorageError> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, status, progress, created_at, user_id
             FROM projects
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    async fn create_project(
        &self,
        owner_id: i32,
        new: &NewProject,
    ) -> Result<Project, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Lock the owner row so concurrent creates serialize on the limit
        // check instead of both passing it.
        let owner = sqlx::query_as::<_, User>(
            "SELECT id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at
             FROM users
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;

        let (owned,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM projects
             WHERE user_id = $1",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        let limit = owner.plan.project_limit();
        if owned >= limit {
            return Err(StorageError::ProjectLimitReached {
                current_plan: owner.plan,
                limit,
            });
        }

        let project = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name, description, status, user_id)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, description, status, progress, created_at, user_id",
        )
        .bind(new.name.as_deref())
        .bind(new.description.as_deref())
        .bind(new.status.unwrap_or(ProjectStatus::Planning))
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        for name in new.tags.iter().flatten() {
            let tag = upsert_tag(&mut tx, name).await?;
            sqlx::query(
                "INSERT INTO project_tags (project_id, tag_id)
                 VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(project.id)
            .bind(tag.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.log_activity(NewActivity::new(
            "Project created",
            "project",
            project.id,
            owner_id,
        ))
        .await;

        Ok(project)
    }

    async fn update_project(&self, id: i32, patch: &ProjectPatch) -> Result<Project, StorageError> {
        let project = sqlx::query_as::<_, Project>(
            "UPDATE projects
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 status = COALESCE($4, status),
                 progress = COALESCE($5, progress)
             WHERE id = $1
             RETURNING id, name, description, status, progress, created_at, user_id",
        )
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.status)
        .bind(patch.progress)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound("Project not found".to_string()))?;

        self.log_activity(NewActivity::new(
            "Project updated",
            "project",
            project.id,
            project.user_id,
        ))
        .await;

        Ok(project)
    }

    async fn delete_project(&self, id: i32) -> Result<bool, StorageError> {
        let project = match self.project_by_id(id).await? {
            Some(project) => project,
            None => return Ok(false),
        };

        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        // Logged after the fact with the id the row used to have.
        self.log_activity(NewActivity::new(
            "Project deleted",
            "project",
            project.id,
            project.user_id,
        ))
        .await;

        Ok(true)
    }

    async fn project_collaborators(
        &self,
        project_id: i32,
    ) -> Result<Vec<CollaboratorInfo>, StorageError> {
        let collaborators = sqlx::query_as::<_, CollaboratorInfo>(
            "SELECT pc.user_id, pc.role, pc.added_at, u.username, u.email, u.first_name,
             u.last_name
             FROM project_collaborators pc
             JOIN users u ON u.id = pc.user_id
             WHERE pc.project_id = $1
             ORDER BY pc.added_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(collaborators)
    }

    async fn add_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
        role: &str,
    ) -> Result<ProjectCollaborator, StorageError> {
        let collaboration = sqlx::query_as::<_, ProjectCollaborator>(
            "INSERT INTO project_collaborators (project_id, user_id, role)
             VALUES ($1, $2, $3)
             RETURNING project_id, user_id, role, added_at",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        // Attributed to the collaborator, not the acting owner.
        self.log_activity(NewActivity::new(
            "Collaborator added",
            "project",
            project_id,
            user_id,
        ))
        .await;

        Ok(collaboration)
    }

    async fn remove_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
    ) -> Result<bool, StorageError> {
        sqlx::query(
            "DELETE FROM project_collaborators
             WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.log_activity(NewActivity::new(
            "Collaborator removed",
            "project",
            project_id,
            user_id,
        ))
        .await;

        Ok(true)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name
             FROM tags
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    async fn tag_by_id(&self, id: i32) -> Result<Option<Tag>, StorageError> {
        let tag = sqlx::query_as::<_, Tag>(
            "SELECT id, name
             FROM tags
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tag)
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, StorageError> {
        let result = sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (name)
             VALUES ($1)
             RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(tag) => Ok(tag),
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateTag),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_or_create_tag(&self, name: &str) -> Result<Tag, StorageError> {
        let mut tx = self.pool.begin().await?;
        let tag = upsert_tag(&mut tx, name).await?;
        tx.commit().await?;
        Ok(tag)
    }

    async fn project_tags(&self, project_id: i32) -> Result<Vec<Tag>, StorageError> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT t.id, t.name
             FROM tags t
             JOIN project_tags pt ON pt.tag_id = t.id
             WHERE pt.project_id = $1
             ORDER BY t.id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    async fn assign_tag(&self, project_id: i32, tag_id: i32) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO project_tags (project_id, tag_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(project_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn project_tasks(&self, project_id: i32) -> Result<Vec<Task>, StorageError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT id, title, description, status, due_date, created_at, completed_at,
             project_id, assigned_to_id, created_by_id
             FROM tasks
             WHERE project_id = $1
             ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn task_by_id(&self, id: i32) -> Result<Option<Task>, StorageError> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, title, description, status, due_date, created_at, completed_at,
             project_id, assigned_to_id, created_by_id
             FROM tasks
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn create_task(
        &self,
        project_id: i32,
        created_by: i32,
        new: &NewTask,
    ) -> Result<Task, StorageError> {
        let task = sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (title, description, status, due_date, project_id,
             assigned_to_id, created_by_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, title, description, status, due_date, created_at, completed_at,
             project_id, assigned_to_id, created_by_id",
        )
        .bind(new.title.as_deref())
        .bind(new.description.as_deref())
        .bind(new.status.unwrap_or(TaskStatus::Pending))
        .bind(new.due_date)
        .bind(project_id)
        .bind(new.assigned_to_id)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        self.log_activity(NewActivity::new("Task created", "task", task.id, created_by))
            .await;

        Ok(task)
    }

    async fn update_task(&self, id: i32, patch: &TaskPatch) -> Result<Task, StorageError> {
        // completed_at is stamped once, on the first transition into
        // Completed, and survives later status changes.
        let task = sqlx::query_as::<_, Task>(
            "UPDATE tasks
             SET title = COALESCE($2, title),
                 description = COALESCE($3, description),
                 status = COALESCE($4, status),
                 due_date = COALESCE($5, due_date),
                 assigned_to_id = COALESCE($6, assigned_to_id),
                 completed_at = CASE
                     WHEN $4 = 'Completed' AND completed_at IS NULL THEN now()
                     ELSE completed_at
                 END
             WHERE id = $1
             RETURNING id, title, description, status, due_date, created_at, completed_at,
             project_id, assigned_to_id, created_by_id",
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.status)
        .bind(patch.due_date)
        .bind(patch.assigned_to_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound("Task not found".to_string()))?;

        self.log_activity(NewActivity::new(
            "Task updated",
            "task",
            task.id,
            task.created_by_id,
        ))
        .await;

        Ok(task)
    }

    async fn delete_task(&self, id: i32) -> Result<bool, StorageError> {
        let task = match self.task_by_id(id).await? {
            Some(task) => task,
            None => return Ok(false),
        };

        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.log_activity(NewActivity::new(
            "Task deleted",
            "task",
            task.id,
            task.created_by_id,
        ))
        .await;

        Ok(true)
    }

    async fn tasks_assigned_to(&self, user_id: i32) -> Result<Vec<Task>, StorageError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT id, title, description, status, due_date, created_at, completed_at,
             project_id, assigned_to_id, created_by_id
             FROM tasks
             WHERE assigned_to_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn recent_activities(
        &self,
        user_id: i32,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, StorageError> {
        let activities = sqlx::query_as::<_, ActivityLog>(
            "SELECT id, action, entity_type, entity_id, user_id, \"timestamp\", metadata
             FROM activity_logs
             WHERE user_id = $1
             ORDER BY \"timestamp\" DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    async fn user_stats(&self, user_id: i32) -> Result<UserStats, StorageError> {
        let (total_projects,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM projects
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        // Task figures cover tasks in projects the user owns.
        let (active, completed, total): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE t.status <> 'Completed'),
                    COUNT(t.completed_at),
                    COUNT(*)
             FROM tasks t
             JOIN projects p ON p.id = t.project_id
             WHERE p.user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            total_projects,
            active_tasks_count: active,
            completion_rate: completion_rate(completed, total),
        })
    }

    async fn admin_overview(&self) -> Result<AdminOverview, StorageError> {
        let users = sqlx::query_as::<_, PlanCounts>(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE plan = 'free') AS free,
                    COUNT(*) FILTER (WHERE plan = 'pro') AS pro,
                    COUNT(*) FILTER (WHERE plan = 'enterprise') AS enterprise
             FROM users",
        )
        .fetch_one(&self.pool)
        .await?;

        let projects = sqlx::query_as::<_, ProjectStatusCounts>(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status = 'Planning') AS planning,
                    COUNT(*) FILTER (WHERE status = 'In Progress') AS in_progress,
                    COUNT(*) FILTER (WHERE status = 'Review') AS review,
                    COUNT(*) FILTER (WHERE status = 'Completed') AS completed
             FROM projects",
        )
        .fetch_one(&self.pool)
        .await?;

        let tasks = sqlx::query_as::<_, TaskStatusCounts>(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status = 'Pending') AS pending,
                    COUNT(*) FILTER (WHERE status = 'In Progress') AS in_progress,
                    COUNT(*) FILTER (WHERE status = 'Completed') AS completed,
                    COUNT(*) FILTER (WHERE status = 'Blocked') AS blocked
             FROM tasks",
        )
        .fetch_one(&self.pool)
        .await?;

        let recent_signups = sqlx::query_as::<_, User>(
            "SELECT id, username, password, email, first_name, last_name, role, plan,
             stripe_customer_id, stripe_subscription_id, created_at
             FROM users
             ORDER BY created_at DESC
             LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminOverview {
            users,
            projects,
            tasks,
            recent_signups,
        })
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
