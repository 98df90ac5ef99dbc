// handlers/protected/mod.rs - JWT-authenticated endpoints
pub mod analytics;
pub mod collaborators;
pub mod projects;
pub mod tags;
pub mod tasks;
pub mod users;

mod utils;
