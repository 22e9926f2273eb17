//! HTTP server receiving Firefox Accounts security events for Kitsune.
//!
//! Routes:
//! - `POST /fxa/events` (configurable): the security-event webhook
//! - `GET /`, `/healthz`, `/readyz`: service info and health checks
//! - `GET /metrics`: Prometheus exposition, when enabled

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod webhook;

pub use config::{
    AppConfig, LoggingConfig, MetricsConfig, ServerConfig, StorageBackend, StorageConfig,
};
pub use observability::init_tracing;
pub use server::{AppState, KitsuneServer, ServerBuilder, build_app, build_router};
pub use webhook::WebhookError;
