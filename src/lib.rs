//! Gym Tracker - API backend for a gym-management web application
//!
//! Accounts, trainer-assigned plans, scheduling and progress tracking on top
//! of a hosted identity and data provider. Authentication is delegated to the
//! provider; roles are read from the application's own profile table.

pub mod app;
pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod security_logger;
pub mod services;
pub mod storage;

// Re-export main components
pub use app::AppState;
pub use config::ServerConfig;
pub use error::{GymTrackerError, Result};
