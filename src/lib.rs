pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod likes;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod policy;
pub mod render;
pub mod replies;
pub mod reports;
pub mod repo;
pub mod resources;
pub mod retry;
pub mod routes;
pub mod storage;
pub mod threads;
pub mod users;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
