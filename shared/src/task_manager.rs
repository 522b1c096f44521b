//! Orchestrates the whole task lifecycle: loading from disk, scheduling,
//! hot add/update/delete, pause/resume, and reload-from-disk. Every
//! public method here is what the Control API calls into directly.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::action::ActionRegistry;
use crate::condition::Condition;
use crate::duration::parse_duration;
use crate::provider::ProviderRegistry;
use crate::scheduler::Scheduler;
use crate::task::{ActionSpec, PeriodController, ProviderSpec, Task, TaskStatus};
use crate::task_config::TaskConfig;
use crate::task_loader::TaskLoader;
use crate::utils::sanitize_filename;
use crate::NightWatchError;

/// Adapts the scheduler's narrow `reschedule` operation to the
/// `PeriodController` capability a `Task` holds, so a task never needs
/// a reference back to its owning `TaskManager`.
struct SchedulerPeriodController {
    scheduler: Arc<Scheduler>,
}

#[async_trait::async_trait]
impl PeriodController for SchedulerPeriodController {
    async fn request_period_change(&self, task_name: &str, new_period: Duration) -> crate::Result<()> {
        self.scheduler.reschedule(task_name, new_period).await
    }
}

pub struct TaskManager {
    tasks: RwLock<HashMap<String, Arc<Mutex<Task>>>>,
    task_loader: TaskLoader,
    provider_registry: ProviderRegistry,
    action_registry: ActionRegistry,
    scheduler: Arc<Scheduler>,
    period_controller: Arc<dyn PeriodController>,
    started: AtomicBool,
    reloading: AtomicBool,
}

impl TaskManager {
    pub fn new(
        tasks_location: impl Into<std::path::PathBuf>,
        providers_location: impl Into<std::path::PathBuf>,
        actions_location: impl Into<std::path::PathBuf>,
    ) -> Arc<Self> {
        let scheduler = Scheduler::new();
        let period_controller: Arc<dyn PeriodController> = Arc::new(SchedulerPeriodController {
            scheduler: scheduler.clone(),
        });
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            task_loader: TaskLoader::new(tasks_location),
            provider_registry: ProviderRegistry::new(providers_location),
            action_registry: ActionRegistry::new(actions_location),
            scheduler,
            period_controller,
            started: AtomicBool::new(false),
            reloading: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::SeqCst)
    }

    /// Loads every task file from disk, schedules them, and starts the
    /// scheduler's worker loop. Errors if already running.
    pub async fn start(self: &Arc<Self>) -> crate::Result<()> {
        if self.is_running() {
            return Err(NightWatchError::SchedulerError(
                "task manager is already running".to_string(),
            )
            .into());
        }

        self.load_all_from_disk().await?;
        self.scheduler.start().await;
        self.started.store(true, Ordering::SeqCst);
        tracing::info!("task manager started");
        Ok(())
    }

    async fn load_all_from_disk(self: &Arc<Self>) -> crate::Result<()> {
        let files = self.task_loader.load_all_tasks()?;
        let mut tasks = self.tasks.write().await;
        for (filename, file_tasks) in files {
            for (name, config) in file_tasks {
                if tasks.contains_key(&name) {
                    tracing::warn!(task = %name, "a task with this name was already loaded, keeping the first one");
                    continue;
                }
                let task = self.instantiate_task(name.clone(), config, filename.clone())?;
                let handle = Arc::new(Mutex::new(task));
                self.schedule_locked(&name, handle.clone()).await?;
                tasks.insert(name, handle);
            }
        }
        Ok(())
    }

    fn instantiate_task(self: &Arc<Self>, name: String, config: TaskConfig, from_filename: String) -> crate::Result<Task> {
        config.validate(&name)?;

        let period_success = parse_duration(&config.period_success)?;
        let period_failed = parse_duration(&config.period_failed)?;
        let period_retry = config
            .period_retry
            .as_deref()
            .map(parse_duration)
            .transpose()?;

        let mut providers = Vec::new();
        for provider_map in &config.providers {
            for (provider_name, entry) in provider_map {
                let provider = self
                    .provider_registry
                    .instantiate(provider_name, &entry.provider_options)?;
                let condition = Condition::parse(&entry.condition).ok_or_else(|| {
                    NightWatchError::TaskConfigInvalid(format!(
                        "task \"{name}\": provider \"{provider_name}\": unrecognised condition \"{}\"",
                        entry.condition
                    ))
                })?;
                providers.push(ProviderSpec {
                    name: provider_name.clone(),
                    provider,
                    condition,
                    threshold: entry.threshold.clone(),
                });
            }
        }

        let actions_failed = self.instantiate_actions(&config.actions_failed)?;
        let actions_success = self.instantiate_actions(&config.actions_success)?;
        let retries = config.retries;

        Ok(Task::new(
            name,
            config,
            from_filename,
            period_success,
            period_retry,
            period_failed,
            retries,
            providers,
            actions_failed,
            actions_success,
            self.period_controller.clone(),
        ))
    }

    fn instantiate_actions(
        self: &Arc<Self>,
        configs: &BTreeMap<String, BTreeMap<String, crate::condition::Value>>,
    ) -> crate::Result<Vec<ActionSpec>> {
        let mut actions = Vec::new();
        for (action_name, options) in configs {
            let action = self.action_registry.instantiate(action_name, options)?;
            actions.push(ActionSpec {
                name: action_name.clone(),
                action,
            });
        }
        Ok(actions)
    }

    async fn schedule_locked(self: &Arc<Self>, name: &str, handle: Arc<Mutex<Task>>) -> crate::Result<()> {
        let period = handle.lock().await.period();
        let job_handle = handle.clone();
        self.scheduler
            .add_job(
                name.to_string(),
                period,
                Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    let handle = job_handle.clone();
                    Box::pin(async move {
                        handle.lock().await.run().await;
                    })
                }),
            )
            .await
    }

    /// Reloads the whole task set from disk: clears all scheduled jobs,
    /// every in-memory task, and the provider/action default-config
    /// caches, then re-runs the normal startup sequence. Errors if not
    /// running or already reloading.
    pub async fn reload(self: &Arc<Self>) -> crate::Result<()> {
        if !self.is_running() {
            return Err(
                NightWatchError::SchedulerError("task manager is not running, can't reload".to_string()).into(),
            );
        }
        if self.is_reloading() {
            return Err(NightWatchError::SchedulerError(
                "task manager is already reloading".to_string(),
            )
            .into());
        }

        self.reloading.store(true, Ordering::SeqCst);
        let result = async {
            self.scheduler.remove_all().await;
            self.tasks.write().await.clear();
            self.provider_registry.clear();
            self.action_registry.clear();
            self.load_all_from_disk().await
        }
        .await;
        self.reloading.store(false, Ordering::SeqCst);

        match &result {
            Ok(()) => tracing::info!("task manager reloaded"),
            Err(e) => tracing::error!(error = %e, "task manager failed to reload"),
        }
        result
    }

    /// Stops the scheduler. `wait` bounds how long to wait for in-flight
    /// ticks to finish.
    pub async fn stop(&self, wait: Option<Duration>) -> crate::Result<()> {
        if !self.is_running() {
            return Err(NightWatchError::SchedulerError("task manager is already stopped".to_string()).into());
        }
        if self.is_reloading() {
            return Err(NightWatchError::SchedulerError(
                "task manager is reloading, can't stop".to_string(),
            )
            .into());
        }
        self.scheduler.stop(wait).await;
        self.started.store(false, Ordering::SeqCst);
        tracing::info!("task manager stopped");
        Ok(())
    }

    pub async fn get_task_status(&self, name: &str) -> crate::Result<TaskStatus> {
        let tasks = self.tasks.read().await;
        let handle = tasks
            .get(name)
            .ok_or_else(|| NightWatchError::TaskNotFound(name.to_string()))?;
        Ok(handle.lock().await.to_dict())
    }

    pub async fn list_task_statuses(&self) -> Vec<TaskStatus> {
        let tasks = self.tasks.read().await;
        let mut statuses = Vec::with_capacity(tasks.len());
        for handle in tasks.values() {
            statuses.push(handle.lock().await.to_dict());
        }
        statuses
    }

    /// `getSuccessfulTasks` in spec.md §4.6: every task currently
    /// conforming (`isSuccess()`, i.e. not `failed`).
    pub async fn get_successful_tasks(&self) -> Vec<TaskStatus> {
        let tasks = self.tasks.read().await;
        let mut statuses = Vec::new();
        for handle in tasks.values() {
            let task = handle.lock().await;
            if task.is_success() {
                statuses.push(task.to_dict());
            }
        }
        statuses
    }

    /// `getEnabledTasks` in spec.md §4.6: every task whose `enabled` flag
    /// is set (scheduler ticks are not paused).
    pub async fn get_enabled_tasks(&self) -> Vec<TaskStatus> {
        let tasks = self.tasks.read().await;
        let mut statuses = Vec::new();
        for handle in tasks.values() {
            let task = handle.lock().await;
            if task.is_enabled() {
                statuses.push(task.to_dict());
            }
        }
        statuses
    }

    /// Adds tasks from a config map into `filename` (a new random name
    /// when not given). A name that already exists is routed to
    /// `update_tasks` instead of double-scheduling it, matching how a
    /// bulk `POST` is expected to behave when it overlaps live tasks.
    pub async fn add_tasks(
        self: &Arc<Self>,
        tasks_config: BTreeMap<String, TaskConfig>,
        filename: Option<String>,
    ) -> crate::Result<Vec<TaskStatus>> {
        let filename = match filename {
            Some(f) => {
                sanitize_filename(&f)?;
                f
            }
            None => format!("{}.yml", uuid::Uuid::new_v4()),
        };

        let mut to_add = Vec::new();
        let mut to_update = BTreeMap::new();
        {
            let tasks = self.tasks.read().await;
            for (name, config) in tasks_config {
                if tasks.contains_key(&name) {
                    tracing::warn!(task = %name, "task already exists, will be overwritten via update");
                    to_update.insert(name, config);
                } else {
                    to_add.push((name, config));
                }
            }
        }

        for (name, config) in &to_add {
            let task = self.instantiate_task(name.clone(), config.clone(), filename.clone())?;
            let handle = Arc::new(Mutex::new(task));
            self.schedule_locked(name, handle.clone()).await?;
            self.tasks.write().await.insert(name.clone(), handle);
        }
        if !to_add.is_empty() {
            for (name, config) in &to_add {
                self.task_loader.put_task_in_file(&filename, name, config)?;
            }
        }
        if !to_update.is_empty() {
            self.update_tasks(to_update).await?;
        }

        let mut statuses = Vec::new();
        for (name, _) in &to_add {
            statuses.push(self.get_task_status(name).await?);
        }
        Ok(statuses)
    }

    /// Replaces the config of one or more existing tasks. Validates
    /// every entry before applying any of them — a config problem in
    /// one task aborts the whole batch, leaving every task untouched.
    pub async fn update_tasks(self: &Arc<Self>, tasks_config: BTreeMap<String, TaskConfig>) -> crate::Result<()> {
        let mut rebuilt = Vec::with_capacity(tasks_config.len());
        {
            let tasks = self.tasks.read().await;
            for (name, config) in &tasks_config {
                let existing = tasks
                    .get(name)
                    .ok_or_else(|| NightWatchError::TaskNotFound(name.clone()))?;
                let from_filename = existing.lock().await.from_filename.clone();
                let task = self.instantiate_task(name.clone(), config.clone(), from_filename)?;
                rebuilt.push(task);
            }
        }

        for task in rebuilt {
            let name = task.name().to_string();
            self.scheduler.remove(&name).await;
            let handle = Arc::new(Mutex::new(task));
            self.schedule_locked(&name, handle.clone()).await?;
            self.tasks.write().await.insert(name, handle);
        }

        for (name, config) in &tasks_config {
            let from_filename = {
                let tasks = self.tasks.read().await;
                tasks.get(name).unwrap().lock().await.from_filename.clone()
            };
            self.task_loader.put_task_in_file(&from_filename, name, config)?;
        }
        Ok(())
    }

    /// Deletes a set of tasks by name, unscheduling and removing each
    /// one that exists; names that don't exist are logged and skipped.
    pub async fn delete_tasks(&self, names: &[String]) -> crate::Result<()> {
        let mut removed = Vec::new();
        {
            let mut tasks = self.tasks.write().await;
            for name in names {
                match tasks.remove(name) {
                    Some(handle) => {
                        self.scheduler.remove(name).await;
                        let from_filename = handle.lock().await.from_filename.clone();
                        removed.push((name.clone(), from_filename));
                    }
                    None => tracing::warn!(task = %name, "not able to delete task, task is not found"),
                }
            }
        }
        for (name, from_filename) in removed {
            self.task_loader.remove_task_from_file(&from_filename, &name)?;
        }
        Ok(())
    }

    /// Reloads a single task's config from the file it was last loaded
    /// from (or last written to), re-instantiating and rescheduling it.
    pub async fn reload_task(self: &Arc<Self>, name: &str) -> crate::Result<()> {
        let from_filename = {
            let tasks = self.tasks.read().await;
            let handle = tasks
                .get(name)
                .ok_or_else(|| NightWatchError::TaskNotFound(name.to_string()))?;
            handle.lock().await.from_filename.clone()
        };
        let config = self.task_loader.load_task_from_file(&from_filename, name)?;
        let task = self.instantiate_task(name.to_string(), config, from_filename)?;

        self.scheduler.remove(name).await;
        let handle = Arc::new(Mutex::new(task));
        self.schedule_locked(name, handle.clone()).await?;
        self.tasks.write().await.insert(name.to_string(), handle);
        Ok(())
    }

    pub async fn pause_task(&self, name: &str) -> crate::Result<()> {
        let tasks = self.tasks.read().await;
        let handle = tasks
            .get(name)
            .ok_or_else(|| NightWatchError::TaskNotFound(name.to_string()))?;
        if handle.lock().await.disable() {
            self.scheduler.pause(name).await?;
        }
        Ok(())
    }

    pub async fn resume_task(&self, name: &str) -> crate::Result<()> {
        let tasks = self.tasks.read().await;
        let handle = tasks
            .get(name)
            .ok_or_else(|| NightWatchError::TaskNotFound(name.to_string()))?;
        if handle.lock().await.enable() {
            self.scheduler.resume(name).await?;
        }
        Ok(())
    }

    /// Bulk pause/resume over every currently loaded task.
    pub async fn pause_all(&self) -> crate::Result<()> {
        let names: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        for name in names {
            self.pause_task(&name).await?;
        }
        Ok(())
    }

    pub async fn resume_all(&self) -> crate::Result<()> {
        let names: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        for name in names {
            self.resume_task(&name).await?;
        }
        Ok(())
    }
}
