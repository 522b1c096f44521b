//! Task lifecycle engine for the night-watch monitoring daemon.
//!
//! This crate implements the task state machine, its interaction with a
//! periodic scheduler, dynamic period updates, hot-reload of the task
//! set, and the provider/action extension contract. It has no knowledge
//! of HTTP or the process entry point — those live in the `nightwatch`
//! binary crate.

pub mod action;
pub mod actions;
pub mod condition;
pub mod duration;
pub mod provider;
pub mod providers;
pub mod runtime_config;
pub mod scheduler;
pub mod task;
pub mod task_config;
pub mod task_loader;
pub mod task_manager;
pub mod utils;

pub use action::{Action, ActionRegistry};
pub use condition::Condition;
pub use duration::parse_duration;
pub use provider::{Provider, ProviderRegistry, Value};
pub use runtime_config::RuntimeConfig;
pub use task::{Task, TaskState};
pub use task_config::TaskConfig;
pub use task_loader::TaskLoader;
pub use task_manager::TaskManager;

/// Result type alias used throughout the engine. Provider and action
/// errors are accepted as opaque `anyhow::Error`s; lifecycle operations
/// wrap a `NightWatchError` with `.context()` chains.
pub type Result<T> = anyhow::Result<T>;

/// Error taxonomy for the task lifecycle engine.
///
/// Provider and action runtime errors deliberately have no variant here:
/// both are always recovered locally inside `Task::run` (logged, turned
/// into an observation or skipped), never propagated as a `Result::Err`
/// a caller has to handle.
#[derive(Debug, thiserror::Error)]
pub enum NightWatchError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("task file I/O error: {0}")]
    TaskFileIOError(String),

    #[error("task file invalid: {0}")]
    TaskFileInvalid(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task config invalid: {0}")]
    TaskConfigInvalid(String),

    #[error("provider config invalid: {0}")]
    ProviderConfigInvalid(String),

    #[error("action config invalid: {0}")]
    ActionConfigInvalid(String),

    #[error("scheduler error: {0}")]
    SchedulerError(String),
}
