use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::{EventRepository, UserRepository};

/// Shared, read-only handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventRepository>,
    pub users: Arc<dyn UserRepository>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            events,
            users,
            auth: Arc::new(auth),
        }
    }
}
