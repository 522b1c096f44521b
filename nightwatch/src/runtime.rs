//! The `Runtime` struct: the single dependency-injection root that
//! replaces the source's module-level singletons (spec.md §9 "Global
//! singletons"). Constructed once in `main` and handed both to the
//! background task lifecycle and to the Control API's `AppState`.

use std::sync::Arc;

use shared::{RuntimeConfig, TaskManager};

pub struct Runtime {
    pub config: RuntimeConfig,
    pub task_manager: Arc<TaskManager>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        let task_manager = TaskManager::new(
            config.config.tasks_location.clone(),
            config.config.providers_location.clone(),
            config.config.actions_location.clone(),
        );
        Arc::new(Self { config, task_manager })
    }
}
