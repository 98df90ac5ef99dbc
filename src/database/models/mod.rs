pub mod activity;
pub mod collaborator;
pub mod project;
pub mod tag;
pub mod task;
pub mod user;

pub use activity::{ActivityLog, NewActivity};
pub use collaborator::{CollaboratorInfo, NewCollaborator, ProjectCollaborator};
pub use project::{NewProject, Project, ProjectPatch, ProjectStatus};
pub use tag::{NewTag, Tag, TagAssignment};
pub use task::{NewTask, Task, TaskPatch, TaskStatus};
pub use user::{Credentials, NewUser, User};
