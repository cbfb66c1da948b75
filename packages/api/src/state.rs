//! Shared request state.

use std::sync::Arc;

use broker::JobQueue;
use db::BookStore;
use realtime::NotificationHub;

use crate::auth::TokenValidator;

/// Collaborators every route handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<NotificationHub>,
    pub store: Arc<dyn BookStore>,
    pub jobs: JobQueue,
    pub tokens: Arc<dyn TokenValidator>,
}

impl AppState {
    pub fn new(
        hub: Arc<NotificationHub>,
        store: Arc<dyn BookStore>,
        jobs: JobQueue,
        tokens: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            hub,
            store,
            jobs,
            tokens,
        }
    }
}
