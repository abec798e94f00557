use axum::extract::FromRef;
use std::sync::Arc;

use crate::bot::Bot;
use crate::logging::ActivityLogger;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    pub activity: ActivityLogger,
}

impl FromRef<AppState> for Arc<Bot> {
    fn from_ref(state: &AppState) -> Self {
        state.bot.clone()
    }
}

impl FromRef<AppState> for ActivityLogger {
    fn from_ref(state: &AppState) -> Self {
        state.activity.clone()
    }
}
