use sqlx::PgPool;

use crate::database::storage::StorageError;

/// Schema statements, applied in order. Every statement is idempotent so
/// `run` can execute on each startup.
const SCHEMA_DDL: &[&str] = &[
    "DO $$ BEGIN
         CREATE TYPE project_status AS ENUM ('Planning', 'In Progress', 'Review', 'Completed');
     EXCEPTION
         WHEN duplicate_object THEN NULL;
     END $$",
    "DO $$ BEGIN
         CREATE TYPE task_status AS ENUM ('Pending', 'In Progress', 'Completed', 'Blocked');
     EXCEPTION
         WHEN duplicate_object THEN NULL;
     END $$",
    "CREATE TABLE IF NOT EXISTS users (
         id SERIAL PRIMARY KEY,
         username TEXT NOT NULL UNIQUE,
         password TEXT NOT NULL,
         email TEXT,
         first_name TEXT,
         last_name TEXT,
         role TEXT NOT NULL DEFAULT 'user',
         plan TEXT NOT NULL DEFAULT 'free',
         stripe_customer_id TEXT,
         stripe_subscription_id TEXT,
         created_at TIMESTAMPTZ NOT NULL DEFAULT now()
     )",
    "CREATE TABLE IF NOT EXISTS projects (
         id SERIAL PRIMARY KEY,
         name TEXT NOT NULL,
         description TEXT,
         status project_status NOT NULL DEFAULT 'Planning',
         progress INTEGER NOT NULL DEFAULT 0,
         created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
         user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
     )",
    "CREATE TABLE IF NOT EXISTS tags (
         id SERIAL PRIMARY KEY,
         name TEXT NOT NULL UNIQUE
     )",
    "CREATE TABLE IF NOT EXISTS project_tags (
         project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
         tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
         PRIMARY KEY (project_id, tag_id)
     )",
    "CREATE TABLE IF NOT EXISTS tasks (
         id SERIAL PRIMARY KEY,
         title TEXT NOT NULL,
         description TEXT,
         status task_status NOT NULL DEFAULT 'Pending',
         due_date TIMESTAMPTZ,
         created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
         completed_at TIMESTAMPTZ,
         project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
         assigned_to_id INTEGER REFERENCES users(id),
         created_by_id INTEGER NOT NULL REFERENCES users(id)
     )",
    "CREATE TABLE IF NOT EXISTS project_collaborators (
         project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
         user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
         role TEXT NOT NULL DEFAULT 'member',
         added_at TIMESTAMPTZ NOT NULL DEFAULT now(),
         PRIMARY KEY (project_id, user_id)
     )",
    // No cascade from projects or tasks: activity rows outlive the
    // entities they describe.
    "CREATE TABLE IF NOT EXISTS activity_logs (
         id SERIAL PRIMARY KEY,
         action TEXT NOT NULL,
         entity_type TEXT NOT NULL,
         entity_id INTEGER NOT NULL,
         user_id INTEGER NOT NULL REFERENCES users(id),
         \"timestamp\" TIMESTAMPTZ NOT NULL DEFAULT now(),
         metadata TEXT
     )",
    "CREATE INDEX IF NOT EXISTS idx_projects_user_id ON projects(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to_id ON tasks(assigned_to_id)",
    "CREATE INDEX IF NOT EXISTS idx_activity_logs_user_id ON activity_logs(user_id)",
];

/// Apply the schema to the connected database.
pub async fn run(pool: &PgPool) -> Result<(), StorageError> {
    for ddl in SCHEMA_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database schema is up to date");
    Ok(())
}
