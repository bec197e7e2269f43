pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod names;
pub mod openapi;
pub mod policy;
pub mod repo;
pub mod routes;
pub mod security;
pub mod visibility;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config as route_config, AppState};
pub use security::SecurityHeaders;
