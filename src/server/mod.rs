//! HTTP server for the build hook.
//!
//! This module implements the HTTP server that:
//! - Accepts GitHub push webhooks, validates signatures and starts build jobs
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /` and `POST /webhook` - Accept push deliveries (returns 200 OK)
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tokio_util::task::TaskTracker;

use crate::build::BuildContext;
use crate::config::Config;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. Build jobs
/// are spawned on the tracker so shutdown can wait for them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    build: BuildContext,
    jobs: TaskTracker,
}

impl AppState {
    pub fn new(build: BuildContext, jobs: TaskTracker) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { build, jobs }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.build.config
    }

    /// Dependencies handed to every job.
    pub fn build_context(&self) -> &BuildContext {
        &self.inner.build
    }

    /// Tracker owning every running build job.
    pub fn jobs(&self) -> &TaskTracker {
        &self.inner.jobs
    }
}

/// Largest delivery GitHub sends; bigger payloads are dropped on their side.
pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", post(webhook_handler))
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::SystemRunner;
    use crate::notify::LogNotifier;

    fn context() -> BuildContext {
        BuildContext::new(
            Arc::new(Config::default()),
            Arc::new(SystemRunner),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn app_state_is_clone() {
        let state = AppState::new(context(), TaskTracker::new());
        let cloned = state.clone();

        assert_eq!(state.config().port, cloned.config().port);
        assert!(Arc::ptr_eq(&state.inner, &cloned.inner));
    }

    #[test]
    fn new_state_has_no_jobs() {
        let state = AppState::new(context(), TaskTracker::new());
        assert!(state.jobs().is_empty());
    }
}
