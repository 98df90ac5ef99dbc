// tests/common - in-memory storage fake and request plumbing
//
// Integration tests drive the real router through `tower::ServiceExt`
// with `MemStorage` substituted for Postgres, so they run without a
// database. The fake mirrors the gateway contract: cascades, the
// owned-project limit, the one-way completion stamp, and activity rows
// that survive entity deletion.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use saaspro_api::app::{app, AppState};
use saaspro_api::config::{AppConfig, DatabaseConfig, Environment, SecurityConfig, ServerConfig};
use saaspro_api::database::models::{
    ActivityLog, CollaboratorInfo, NewProject, NewTask, NewUser, Project, ProjectCollaborator,
    ProjectPatch, ProjectStatus, Tag, Task, TaskPatch, TaskStatus, User,
};
use saaspro_api::database::storage::{
    completion_rate, AdminOverview, PlanCounts, ProjectStatusCounts, Storage, StorageError,
    TaskStatusCounts, UserStats,
};
use saaspro_api::policy::{Plan, Role};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    tags: Vec<Tag>,
    project_tags: Vec<(i32, i32)>,
    collaborators: Vec<ProjectCollaborator>,
    activities: Vec<ActivityLog>,
    next_id: i32,
}

impl Inner {
    fn alloc(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn log(&mut self, action: &str, entity_type: &str, entity_id: i32, user_id: i32) {
        let id = self.alloc();
        self.activities.push(ActivityLog {
            id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            user_id,
            timestamp: Utc::now(),
            metadata: None,
        });
    }

    fn get_or_create_tag(&mut self, name: &str) -> Tag {
        if let Some(tag) = self.tags.iter().find(|t| t.name == name) {
            return tag.clone();
        }
        let tag = Tag {
            id: self.alloc(),
            name: name.to_string(),
        };
        self.tags.push(tag.clone());
        tag
    }
}

pub struct MemStorage(Mutex<Inner>);

impl MemStorage {
    pub fn new() -> Self {
        Self(Mutex::new(Inner::default()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.0.lock().unwrap()
    }

    /// Every activity row ever written, oldest first.
    pub fn activity_log(&self) -> Vec<ActivityLog> {
        self.lock().activities.clone()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StorageError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, new: &NewUser, password_hash: &str) -> Result<User, StorageError> {
        let mut inner = self.lock();
        let username = new.username.clone().unwrap_or_default();
        if inner.users.iter().any(|u| u.username == username) {
            return Err(StorageError::UsernameTaken);
        }
        let user = User {
            id: inner.alloc(),
            username,
            password: password_hash.to_string(),
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            role: Role::User,
            plan: new.plan.unwrap_or(Plan::Free),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: Utc::now(),
        };
        inner.users.push(user.clone());
        inner.log("User registered", "user", user.id, user.id);
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let mut users = self.lock().users.clone();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_user_plan(&self, id: i32, plan: Plan) -> Result<User, StorageError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;
        user.plan = plan;
        let user = user.clone();
        inner.log("Plan updated", "user", user.id, user.id);
        Ok(user)
    }

    async fn update_user_role(&self, id: i32, role: Role) -> Result<User, StorageError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;
        user.role = role;
        let user = user.clone();
        inner.log("Role updated", "user", user.id, user.id);
        Ok(user)
    }

    async fn projects_visible_to(&self, user_id: i32) -> Result<Vec<Project>, StorageError> {
        let inner = self.lock();
        let mut owned: Vec<Project> = inner
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.id);

        let mut collaborated: Vec<Project> = inner
            .projects
            .iter()
            .filter(|p| {
                inner
                    .collaborators
                    .iter()
                    .any(|c| c.project_id == p.id && c.user_id == user_id)
            })
            .cloned()
            .collect();
        collaborated.sort_by_key(|p| p.id);

        owned.extend(collaborated);
        Ok(owned)
    }

    async fn project_by_id(&self, id: i32) -> Result<Option<Project>, StorageError> {
        Ok(self.lock().projects.iter().find(|p| p.id == id).cloned())
    }

    async fn create_project(
        &self,
        owner_id: i32,
        new: &NewProject,
    ) -> Result<Project, StorageError> {
        let mut inner = self.lock();
        let owner = inner
            .users
            .iter()
            .find(|u| u.id == owner_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;

        let owned = inner
            .projects
            .iter()
            .filter(|p| p.user_id == owner_id)
            .count() as i64;
        let limit = owner.plan.project_limit();
        if owned >= limit {
            return Err(StorageError::ProjectLimitReached {
                current_plan: owner.plan,
                limit,
            });
        }

        let project = Project {
            id: inner.alloc(),
            name: new.name.clone().unwrap_or_default(),
            description: new.description.clone(),
            status: new.status.unwrap_or(ProjectStatus::Planning),
            progress: 0,
            created_at: Utc::now(),
            user_id: owner_id,
        };
        inner.projects.push(project.clone());

        for name in new.tags.iter().flatten() {
            let tag = inner.get_or_create_tag(name);
            if !inner.project_tags.contains(&(project.id, tag.id)) {
                inner.project_tags.push((project.id, tag.id));
            }
        }

        inner.log("Project created", "project", project.id, owner_id);
        Ok(project)
    }

    async fn update_project(
        &self,
        id: i32,
        patch: &ProjectPatch,
    ) -> Result<Project, StorageError> {
        let mut inner = self.lock();
        let project = inner
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StorageError::NotFound("Project not found".to_string()))?;
        if let Some(name) = &patch.name {
            project.name = name.clone();
        }
        if let Some(description) = &patch.description {
            project.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(progress) = patch.progress {
            project.progress = progress;
        }
        let project = project.clone();
        inner.log("Project updated", "project", project.id, project.user_id);
        Ok(project)
    }

    async fn delete_project(&self, id: i32) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        let Some(project) = inner.projects.iter().find(|p| p.id == id).cloned() else {
            return Ok(false);
        };
        inner.projects.retain(|p| p.id != id);
        inner.tasks.retain(|t| t.project_id != id);
        inner.project_tags.retain(|(pid, _)| *pid != id);
        inner.collaborators.retain(|c| c.project_id != id);
        inner.log("Project deleted", "project", project.id, project.user_id);
        Ok(true)
    }

    async fn project_collaborators(
        &self,
        project_id: i32,
    ) -> Result<Vec<CollaboratorInfo>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .collaborators
            .iter()
            .filter(|c| c.project_id == project_id)
            .filter_map(|c| {
                let user = inner.users.iter().find(|u| u.id == c.user_id)?;
                Some(CollaboratorInfo {
                    user_id: c.user_id,
                    role: c.role.clone(),
                    added_at: c.added_at,
                    username: user.username.clone(),
                    email: user.email.clone(),
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                })
            })
            .collect())
    }

    async fn add_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
        role: &str,
    ) -> Result<ProjectCollaborator, StorageError> {
        let mut inner = self.lock();
        let row = ProjectCollaborator {
            project_id,
            user_id,
            role: role.to_string(),
            added_at: Utc::now(),
        };
        inner.collaborators.push(row.clone());
        inner.log("Collaborator added", "project", project_id, user_id);
        Ok(row)
    }

    async fn remove_collaborator(
        &self,
        project_id: i32,
        user_id: i32,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        inner
            .collaborators
            .retain(|c| !(c.project_id == project_id && c.user_id == user_id));
        inner.log("Collaborator removed", "project", project_id, user_id);
        Ok(true)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError> {
        let mut tags = self.lock().tags.clone();
        tags.sort_by_key(|t| t.id);
        Ok(tags)
    }

    async fn tag_by_id(&self, id: i32) -> Result<Option<Tag>, StorageError> {
        Ok(self.lock().tags.iter().find(|t| t.id == id).cloned())
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, StorageError> {
        let mut inner = self.lock();
        if inner.tags.iter().any(|t| t.name == name) {
            return Err(StorageError::DuplicateTag);
        }
        let tag = Tag {
            id: inner.alloc(),
            name: name.to_string(),
        };
        inner.tags.push(tag.clone());
        Ok(tag)
    }

    async fn get_or_create_tag(&self, name: &str) -> Result<Tag, StorageError> {
        Ok(self.lock().get_or_create_tag(name))
    }

    async fn project_tags(&self, project_id: i32) -> Result<Vec<Tag>, StorageError> {
        let inner = self.lock();
        let mut tags: Vec<Tag> = inner
            .tags
            .iter()
            .filter(|t| inner.project_tags.contains(&(project_id, t.id)))
            .cloned()
            .collect();
        tags.sort_by_key(|t| t.id);
        Ok(tags)
    }

    async fn assign_tag(&self, project_id: i32, tag_id: i32) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if !inner.project_tags.contains(&(project_id, tag_id)) {
            inner.project_tags.push((project_id, tag_id));
        }
        Ok(())
    }

    async fn project_tasks(&self, project_id: i32) -> Result<Vec<Task>, StorageError> {
        let mut tasks: Vec<Task> = self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| std::cmp::Reverse((t.created_at, t.id)));
        Ok(tasks)
    }

    async fn task_by_id(&self, id: i32) -> Result<Option<Task>, StorageError> {
        Ok(self.lock().tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn create_task(
        &self,
        project_id: i32,
        created_by: i32,
        new: &NewTask,
    ) -> Result<Task, StorageError> {
        let mut inner = self.lock();
        let task = Task {
            id: inner.alloc(),
            title: new.title.clone().unwrap_or_default(),
            description: new.description.clone(),
            status: new.status.unwrap_or(TaskStatus::Pending),
            due_date: new.due_date,
            created_at: Utc::now(),
            completed_at: None,
            project_id,
            assigned_to_id: new.assigned_to_id,
            created_by_id: created_by,
        };
        inner.tasks.push(task.clone());
        inner.log("Task created", "task", task.id, created_by);
        Ok(task)
    }

    async fn update_task(&self, id: i32, patch: &TaskPatch) -> Result<Task, StorageError> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StorageError::NotFound("Task not found".to_string()))?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(description) = &patch.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            if status == TaskStatus::Completed && task.completed_at.is_none() {
                task.completed_at = Some(Utc::now());
            }
            task.status = status;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(assigned_to_id) = patch.assigned_to_id {
            task.assigned_to_id = Some(assigned_to_id);
        }
        let task = task.clone();
        inner.log("Task updated", "task", task.id, task.created_by_id);
        Ok(task)
    }

    async fn delete_task(&self, id: i32) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.iter().find(|t| t.id == id).cloned() else {
            return Ok(false);
        };
        inner.tasks.retain(|t| t.id != id);
        inner.log("Task deleted", "task", task.id, task.created_by_id);
        Ok(true)
    }

    async fn tasks_assigned_to(&self, user_id: i32) -> Result<Vec<Task>, StorageError> {
        let mut tasks: Vec<Task> = self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.assigned_to_id == Some(user_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| std::cmp::Reverse((t.created_at, t.id)));
        Ok(tasks)
    }

    async fn recent_activities(
        &self,
        user_id: i32,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, StorageError> {
        let mut activities: Vec<ActivityLog> = self
            .lock()
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        activities.sort_by_key(|a| std::cmp::Reverse((a.timestamp, a.id)));
        activities.truncate(limit as usize);
        Ok(activities)
    }

    async fn user_stats(&self, user_id: i32) -> Result<UserStats, StorageError> {
        let inner = self.lock();
        let total_projects = inner
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .count() as i64;

        let tasks: Vec<&Task> = inner
            .tasks
            .iter()
            .filter(|t| {
                inner
                    .projects
                    .iter()
                    .any(|p| p.id == t.project_id && p.user_id == user_id)
            })
            .collect();
        let total = tasks.len() as i64;
        let active = tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .count() as i64;
        let completed = tasks.iter().filter(|t| t.completed_at.is_some()).count() as i64;

        Ok(UserStats {
            total_projects,
            active_tasks_count: active,
            completion_rate: completion_rate(completed, total),
        })
    }

    async fn admin_overview(&self) -> Result<AdminOverview, StorageError> {
        let inner = self.lock();
        let plan_count = |plan: Plan| inner.users.iter().filter(|u| u.plan == plan).count() as i64;
        let project_count = |status: ProjectStatus| {
            inner.projects.iter().filter(|p| p.status == status).count() as i64
        };
        let task_count =
            |status: TaskStatus| inner.tasks.iter().filter(|t| t.status == status).count() as i64;

        let mut recent_signups = inner.users.clone();
        recent_signups.sort_by_key(|u| std::cmp::Reverse((u.created_at, u.id)));
        recent_signups.truncate(5);

        Ok(AdminOverview {
            users: PlanCounts {
                total: inner.users.len() as i64,
                free: plan_count(Plan::Free),
                pro: plan_count(Plan::Pro),
                enterprise: plan_count(Plan::Enterprise),
            },
            projects: ProjectStatusCounts {
                total: inner.projects.len() as i64,
                planning: project_count(ProjectStatus::Planning),
                in_progress: project_count(ProjectStatus::InProgress),
                review: project_count(ProjectStatus::Review),
                completed: project_count(ProjectStatus::Completed),
            },
            tasks: TaskStatusCounts {
                total: inner.tasks.len() as i64,
                pending: task_count(TaskStatus::Pending),
                in_progress: task_count(TaskStatus::InProgress),
                completed: task_count(TaskStatus::Completed),
                blocked: task_count(TaskStatus::Blocked),
            },
            recent_signups,
        })
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub storage: Arc<MemStorage>,
}

pub fn test_app() -> TestApp {
    let storage = Arc::new(MemStorage::new());
    let config = AppConfig {
        environment: Environment::Development,
        server: ServerConfig { port: 0 },
        database: DatabaseConfig {
            max_connections: 1,
            connect_timeout_secs: 1,
        },
        security: SecurityConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 1,
        },
    };
    let state = AppState::new(storage.clone(), config);
    TestApp {
        router: app(state),
        storage,
    }
}

/// Fire one request at the router and decode the JSON body (Null for an
/// empty body such as a 204).
pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

/// Register a fresh account and return its id and token.
pub async fn signup(app: &TestApp, username: &str) -> Result<(i32, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/api/register",
        None,
        Some(json!({ "username": username, "password": "password123" })),
    )
    .await?;
    ensure!(
        status == StatusCode::CREATED,
        "signup failed: {} {}",
        status,
        body
    );
    let id = body["user"]["id"].as_i64().context("user id")? as i32;
    let token = body["token"].as_str().context("token")?.to_string();
    Ok((id, token))
}

pub async fn set_plan(app: &TestApp, user_id: i32, plan: &str) -> Result<()> {
    let plan = Plan::parse(plan).with_context(|| format!("unknown plan {plan:?}"))?;
    app.storage.update_user_plan(user_id, plan).await?;
    Ok(())
}

pub async fn make_admin(app: &TestApp, user_id: i32) -> Result<()> {
    app.storage.update_user_role(user_id, Role::Admin).await?;
    Ok(())
}

/// Create a project through the API and return its id.
pub async fn create_project(app: &TestApp, token: &str, name: &str) -> Result<i32> {
    let (status, body) = send(
        app,
        "POST",
        "/api/projects",
        Some(token),
        Some(json!({ "name": name })),
    )
    .await?;
    ensure!(
        status == StatusCode::CREATED,
        "project create failed: {} {}",
        status,
        body
    );
    Ok(body["id"].as_i64().context("project id")? as i32)
}

/// Attach `user_id` to the project as a collaborator, bypassing the plan
/// gate the API applies to the owner.
pub async fn add_collaborator(
    app: &TestApp,
    project_id: i32,
    user_id: i32,
    role: &str,
) -> Result<()> {
    app.storage
        .add_collaborator(project_id, user_id, role)
        .await?;
    Ok(())
}
