use crate::database::models::{NewUser, User};
use crate::database::storage::{Storage, StorageError};
use crate::policy::{Plan, Role};

/// Create the bootstrap admin account if it does not exist yet.
///
/// Seeding is an explicit operational step (`saaspro-api seed`), never a
/// side effect of opening the storage gateway. Re-running it is safe.
pub async fn seed_admin(
    storage: &dyn Storage,
    username: &str,
    password_hash: &str,
) -> Result<User, StorageError> {
    if let Some(existing) = storage.user_by_username(username).await? {
        tracing::info!("Admin user '{}' already present, skipping seed", username);
        return Ok(existing);
    }

    let new = NewUser {
        username: Some(username.to_string()),
        password: None,
        email: Some("admin@saaspro.com".to_string()),
        first_name: Some("Admin".to_string()),
        last_name: Some("User".to_string()),
        plan: Some(Plan::Enterprise),
    };

    let user = storage.create_user(&new, password_hash).await?;
    let admin = storage.update_user_role(user.id, Role::Admin).await?;

    tracing::info!("Seeded admin user '{}' (id {})", admin.username, admin.id);
    Ok(admin)
}
