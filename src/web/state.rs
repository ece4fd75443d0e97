//! Shared application state type.

use std::sync::Arc;

use crate::core::config;
use crate::core::utils::expand_path;
use crate::download::registry::TaskRegistry;
use crate::history::HistoryLog;
use crate::web::events::ProgressNotifier;

/// State shared across all handlers: the task registry, the progress
/// broadcaster, and the history log. Created once at startup and never torn
/// down while serving.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub notifier: ProgressNotifier,
    pub history: Arc<HistoryLog>,
}

impl AppState {
    /// State wired to the configured history file.
    pub fn new() -> Self {
        Self::with_history(HistoryLog::new(expand_path(&config::HISTORY_FILE)))
    }

    /// State with a custom history log (used by tests).
    pub fn with_history(history: HistoryLog) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            notifier: ProgressNotifier::default(),
            history: Arc::new(history),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
