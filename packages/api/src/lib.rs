//! HTTP surface of the book enrichment pipeline.
//!
//! This crate contains:
//! - The live results stream (SSE) fed by the notification hub
//! - The producer path that stores a book and enqueues its metadata fetch
//! - Configuration and startup wiring for the whole pipeline

mod auth;
mod config;
mod error;
mod init;
mod routes;
mod state;

pub use auth::{StaticTokenValidator, TokenValidator};
pub use config::{AppConfig, ConfigError, MEMORY_BROKER_URL};
pub use error::{ApiError, ErrorResponse};
pub use init::{AppRuntime, InitError, init_app};
pub use routes::router;
pub use state::AppState;
