// Access-control policy: roles, plan tiers, and the per-endpoint rule table.
//
// Every protected endpoint is described by one `AccessPolicy` value in
// `rules`, evaluated by `evaluate()` against the authenticated user and the
// rows the request addresses. Handlers contain no inline authorization
// conditionals.
use serde::{Deserialize, Serialize};

use crate::database::models::{CollaboratorInfo, Project, Task, User};
use crate::error::ApiError;

/// Account role stored on the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Subscription tier. Declaration order is the plan lattice:
/// free < pro < enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Maximum number of owned projects for the tier. Enterprise uses a
    /// large sentinel rather than true infinity.
    pub fn project_limit(self) -> i64 {
        match self {
            Plan::Free => 3,
            Plan::Pro => 10,
            Plan::Enterprise => 999,
        }
    }

    /// Static price table used for the admin revenue figure.
    pub fn monthly_price_usd(self) -> i64 {
        match self {
            Plan::Free => 0,
            Plan::Pro => 29,
            Plan::Enterprise => 99,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship the caller must hold to the addressed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// No resource relationship required.
    None,
    /// Project owner or any collaborator.
    ProjectView,
    /// Project owner or a collaborator whose role string is exactly
    /// "editor". Other collaborator roles ("member", "admin", "owner") do
    /// not qualify; tests pin this literal check.
    ProjectEdit,
    /// Project owner only.
    ProjectOwner,
    /// Project owner, task creator, task assignee, or any collaborator.
    TaskUpdate,
}

/// Declarative access requirements for one endpoint.
///
/// Checks run in order (role, plan, relation) and the first failure
/// short-circuits with its own error shape.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub min_role: Role,
    pub min_plan: Plan,
    pub relation: Relation,
    /// 403 message when the relation check fails.
    pub denial: &'static str,
}

/// Rows the relationship check runs against, pre-fetched by the handler.
pub struct ResourceFacts<'a> {
    pub project: &'a Project,
    pub collaborators: &'a [CollaboratorInfo],
    pub task: Option<&'a Task>,
}

/// Evaluate a policy for `user`.
///
/// Passing `None` for `facts` checks only the role and plan gates; callers
/// do this before resolving the resource so that, where required, a plan
/// denial precedes the existence check.
pub fn evaluate(
    policy: &AccessPolicy,
    user: &User,
    facts: Option<&ResourceFacts<'_>>,
) -> Result<(), ApiError> {
    if user.role < policy.min_role {
        return Err(ApiError::forbidden("Forbidden"));
    }
    if user.plan < policy.min_plan {
        return Err(ApiError::upgrade_required(policy.min_plan));
    }
    if let Some(facts) = facts {
        if !relation_holds(policy.relation, user.id, facts) {
            return Err(ApiError::forbidden(policy.denial));
        }
    }
    Ok(())
}

fn relation_holds(relation: Relation, user_id: i32, facts: &ResourceFacts<'_>) -> bool {
    let is_owner = facts.project.user_id == user_id;
    let collaborator_role = facts
        .collaborators
        .iter()
        .find(|c| c.user_id == user_id)
        .map(|c| c.role.as_str());

    match relation {
        Relation::None => true,
        Relation::ProjectView => is_owner || collaborator_role.is_some(),
        Relation::ProjectEdit => is_owner || collaborator_role == Some("editor"),
        Relation::ProjectOwner => is_owner,
        Relation::TaskUpdate => {
            is_owner
                || collaborator_role.is_some()
                || facts.task.is_some_and(|t| {
                    t.created_by_id == user_id || t.assigned_to_id == Some(user_id)
                })
        }
    }
}

/// One policy constant per protected endpoint.
pub mod rules {
    use super::{AccessPolicy, Plan, Relation, Role};

    const fn authenticated(relation: Relation, denial: &'static str) -> AccessPolicy {
        AccessPolicy {
            min_role: Role::User,
            min_plan: Plan::Free,
            relation,
            denial,
        }
    }

    const fn admin_only() -> AccessPolicy {
        AccessPolicy {
            min_role: Role::Admin,
            min_plan: Plan::Free,
            relation: Relation::None,
            denial: "Forbidden",
        }
    }

    pub const LIST_USERS: AccessPolicy = admin_only();
    pub const VIEW_USER: AccessPolicy = admin_only();
    pub const UPDATE_USER_PLAN: AccessPolicy = admin_only();
    pub const ADMIN_ANALYTICS: AccessPolicy = admin_only();

    pub const VIEW_PROJECT: AccessPolicy =
        authenticated(Relation::ProjectView, "Unauthorized access to project");
    pub const UPDATE_PROJECT: AccessPolicy =
        authenticated(Relation::ProjectEdit, "Unauthorized to update this project");
    pub const DELETE_PROJECT: AccessPolicy =
        authenticated(Relation::ProjectOwner, "Only the project owner can delete it");

    pub const VIEW_PROJECT_TASKS: AccessPolicy =
        authenticated(Relation::ProjectView, "Unauthorized access to project tasks");
    pub const CREATE_TASK: AccessPolicy =
        authenticated(Relation::ProjectView, "Unauthorized to add tasks to this project");
    pub const UPDATE_TASK: AccessPolicy =
        authenticated(Relation::TaskUpdate, "Unauthorized to update this task");
    pub const DELETE_TASK: AccessPolicy =
        authenticated(Relation::ProjectOwner, "Unauthorized to delete this task");

    pub const VIEW_COLLABORATORS: AccessPolicy = authenticated(
        Relation::ProjectView,
        "Unauthorized access to project collaborators",
    );
    pub const ADD_COLLABORATOR: AccessPolicy = AccessPolicy {
        min_role: Role::User,
        min_plan: Plan::Pro,
        relation: Relation::ProjectOwner,
        denial: "Only the project owner can add collaborators",
    };
    pub const REMOVE_COLLABORATOR: AccessPolicy = authenticated(
        Relation::ProjectOwner,
        "Only the project owner can remove collaborators",
    );

    pub const ADD_PROJECT_TAG: AccessPolicy =
        authenticated(Relation::ProjectEdit, "Unauthorized to add tags to this project");
}
