//! The per-task state machine. Each tick iterates the task's providers
//! in declared order, reduces their conformance to a single task-level
//! violation flag, and walks the NORMAL / RETRYING(k) / FAILED
//! transition table, firing the configured actions on state edges.
//!
//! A provider that raises an error is treated the same as one that
//! returns a non-conforming value: the call is recorded as a failed
//! observation (`ok=false`, `value=null`) and counts toward the
//! violation tally.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::action::Action;
use crate::condition::{Condition, Value};
use crate::provider::Provider;
use crate::task_config::TaskConfig;

/// Fixed capacity of the per-provider observation ring buffer.
const OBSERVATION_CAPACITY: usize = 5;

/// One recorded provider call: `{timestamp, value_or_null, ok}`.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub timestamp: u64,
    pub value: Option<Value>,
    pub ok: bool,
}

/// Fixed-capacity circular buffer; iteration is reverse chronological
/// (most recent first), as the Control API's status snapshot wants.
#[derive(Debug, Clone, Default)]
struct RingBuffer<T> {
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    fn push(&mut self, item: T) {
        if self.items.len() == OBSERVATION_CAPACITY {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    fn recent_first(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }
}

/// The task's externally-observable macro-state. Derived from
/// `failed`/`remaining_retries`/`retries` rather than stored directly,
/// so the invariant `failed ⇒ remaining_retries == 0` can never drift
/// out of sync with the reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "retries_consumed")]
pub enum TaskState {
    Normal,
    Retrying(u32),
    Failed,
}

/// The narrow capability a Task uses to request a period change without
/// holding a reference back to its owning manager. Implemented by
/// `task_manager::SchedulerPeriodController`.
#[async_trait::async_trait]
pub trait PeriodController: Send + Sync {
    async fn request_period_change(&self, task_name: &str, new_period: Duration) -> crate::Result<()>;
}

struct ProviderSlot {
    name: String,
    provider: Arc<dyn Provider>,
    condition: Condition,
    threshold: Value,
    observations: RingBuffer<Observation>,
    last_value: Option<Value>,
}

struct ActionSlot {
    name: String,
    action: Arc<dyn Action>,
}

/// One instance per configured monitoring rule.
pub struct Task {
    name: String,
    period_success: Duration,
    period_retry: Option<Duration>,
    period_failed: Duration,
    retries: u32,
    remaining_retries: u32,
    period: Duration,
    enabled: bool,
    failed: bool,
    providers: Vec<ProviderSlot>,
    actions_failed: Vec<ActionSlot>,
    actions_success: Vec<ActionSlot>,
    period_controller: Arc<dyn PeriodController>,
    /// The file this task was loaded from (or will be persisted to).
    pub from_filename: String,
    /// The original config entry, kept for `toDict()`/persistence.
    pub original_config: TaskConfig,
}

/// Status snapshot returned by `toDict()`.
#[derive(Debug, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub enabled: bool,
    pub period_seconds: u64,
    pub retries: u32,
    pub remaining_retries: u32,
    pub failed: bool,
    pub state: TaskState,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub observations: Vec<Observation>,
}

pub struct ProviderSpec {
    pub name: String,
    pub provider: Arc<dyn Provider>,
    pub condition: Condition,
    pub threshold: Value,
}

pub struct ActionSpec {
    pub name: String,
    pub action: Arc<dyn Action>,
}

impl Task {
    /// Constructs a Task from validated configuration and already
    /// instantiated providers/actions (instantiation — which can fail
    /// with `ProviderConfigInvalid`/`ActionConfigInvalid` — happens one
    /// layer up, in `TaskManager`, which owns the registries).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        config: TaskConfig,
        from_filename: String,
        period_success: Duration,
        period_retry: Option<Duration>,
        period_failed: Duration,
        retries: u32,
        providers: Vec<ProviderSpec>,
        actions_failed: Vec<ActionSpec>,
        actions_success: Vec<ActionSpec>,
        period_controller: Arc<dyn PeriodController>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| ProviderSlot {
                name: p.name,
                provider: p.provider,
                condition: p.condition,
                threshold: p.threshold,
                observations: RingBuffer::default(),
                last_value: None,
            })
            .collect();
        let actions_failed = actions_failed
            .into_iter()
            .map(|a| ActionSlot {
                name: a.name,
                action: a.action,
            })
            .collect();
        let actions_success = actions_success
            .into_iter()
            .map(|a| ActionSlot {
                name: a.name,
                action: a.action,
            })
            .collect();

        Task {
            name,
            period_success,
            period_retry,
            period_failed,
            remaining_retries: retries,
            retries,
            period: period_success,
            enabled: true,
            failed: false,
            providers,
            actions_failed,
            actions_success,
            period_controller,
            from_filename,
            original_config: config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `isSuccess()` in spec.md §4.2: `= ¬failed`.
    pub fn is_success(&self) -> bool {
        !self.failed
    }

    pub fn state(&self) -> TaskState {
        if self.failed {
            TaskState::Failed
        } else if self.remaining_retries == self.retries {
            TaskState::Normal
        } else {
            TaskState::Retrying(self.retries - 1 - self.remaining_retries)
        }
    }

    /// Idempotent; returns whether it caused a change.
    pub fn disable(&mut self) -> bool {
        if self.enabled {
            self.enabled = false;
            true
        } else {
            false
        }
    }

    /// Idempotent; returns whether it caused a change.
    pub fn enable(&mut self) -> bool {
        if !self.enabled {
            self.enabled = true;
            true
        } else {
            false
        }
    }

    /// Idempotent; returns whether the period actually changed. Does
    /// not talk to the scheduler itself — the caller (TaskManager, or
    /// this Task's own tick via `period_controller`) is responsible for
    /// rescheduling the job to match.
    pub fn update_period(&mut self, new_period: Duration) -> bool {
        if self.period != new_period {
            self.period = new_period;
            true
        } else {
            false
        }
    }

    pub fn to_dict(&self) -> TaskStatus {
        TaskStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            period_seconds: self.period.as_secs(),
            retries: self.retries,
            remaining_retries: self.remaining_retries,
            failed: self.failed,
            state: self.state(),
            providers: self
                .providers
                .iter()
                .map(|p| ProviderStatus {
                    name: p.name.clone(),
                    observations: p.observations.recent_first().cloned().collect(),
                })
                .collect(),
        }
    }

    /// Invoked by the scheduler once per tick. Iterates providers in
    /// declared order, reduces to the task-level violation flag (every
    /// provider must violate for the task itself to be considered
    /// violating), applies the state transition table, and fires actions
    /// synchronously.
    pub async fn run(&mut self) {
        let now = current_timestamp();
        let mut violating_count = 0usize;

        for slot in self.providers.iter_mut() {
            match slot.provider.process().await {
                Err(e) => {
                    tracing::error!(
                        task = %self.name,
                        provider = %slot.name,
                        error = %e,
                        "provider raised an error while collecting value"
                    );
                    slot.observations.push(Observation {
                        timestamp: now,
                        value: None,
                        ok: false,
                    });
                    slot.last_value = None;
                    violating_count += 1;
                }
                Ok(value) => {
                    let conforms = slot.condition.conforms(&value, &slot.threshold);
                    tracing::debug!(
                        task = %self.name,
                        provider = %slot.name,
                        ?value,
                        conforms,
                        "provider returned a value"
                    );
                    slot.observations.push(Observation {
                        timestamp: now,
                        value: Some(value.clone()),
                        ok: true,
                    });
                    slot.last_value = Some(value);
                    if !conforms {
                        violating_count += 1;
                    }
                }
            }
        }

        let violated = !self.providers.is_empty() && violating_count == self.providers.len();
        self.apply_transition(violated).await;
    }

    async fn apply_transition(&mut self, violated: bool) {
        if violated {
            if self.failed {
                tracing::debug!(task = %self.name, "still failing, actions already processed");
                return;
            }
            if self.remaining_retries > 0 {
                if self.remaining_retries == self.retries {
                    // First transition into the retry window.
                    if let Some(period_retry) = self.period_retry {
                        self.request_period(period_retry).await;
                    }
                }
                tracing::info!(
                    task = %self.name,
                    remaining_retries = self.remaining_retries - 1,
                    "task violated, retrying before firing actions"
                );
                self.remaining_retries -= 1;
            } else {
                self.failed = true;
                self.request_period(self.period_failed).await;
                tracing::warn!(task = %self.name, "task failed, firing failure actions");
                self.fire_actions(false).await;
            }
        } else if self.remaining_retries != self.retries {
            tracing::debug!(
                task = %self.name,
                "conforms again, resetting remaining retries"
            );
            self.remaining_retries = self.retries;
            self.request_period(self.period_success).await;
        } else if self.failed {
            self.failed = false;
            self.request_period(self.period_success).await;
            tracing::info!(task = %self.name, "task back to normal, firing success actions");
            self.fire_actions(true).await;
        } else {
            tracing::debug!(task = %self.name, "still normal");
        }
    }

    async fn request_period(&mut self, new_period: Duration) {
        if self.update_period(new_period) {
            if let Err(e) = self
                .period_controller
                .request_period_change(&self.name, new_period)
                .await
            {
                tracing::warn!(task = %self.name, error = %e, "failed to reschedule after period change");
            }
        }
    }

    async fn fire_actions(&self, success: bool) {
        let actions = if success {
            &self.actions_success
        } else {
            &self.actions_failed
        };
        if actions.is_empty() {
            tracing::warn!(task = %self.name, success, "no action is defined for this edge");
            return;
        }

        let conditions: Vec<Condition> = self.providers.iter().map(|p| p.condition).collect();
        let thresholds: Vec<Value> = self.providers.iter().map(|p| p.threshold.clone()).collect();
        let values: Vec<Option<Value>> = self.providers.iter().map(|p| p.last_value.clone()).collect();

        for slot in actions {
            if let Err(e) = slot
                .action
                .process(success, &conditions, &thresholds, &values)
                .await
            {
                tracing::error!(
                    task = %self.name,
                    action = %slot.name,
                    error = %e,
                    "action raised an error while processing"
                );
            }
        }
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    struct ScriptedProvider {
        values: StdMutex<VecDeque<crate::Result<Value>>>,
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn process(&self) -> crate::Result<Value> {
            self.values
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Value::Number(0.0)))
        }
    }

    struct RecordingAction {
        fired: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Action for RecordingAction {
        async fn process(
            &self,
            _success: bool,
            _conditions: &[Condition],
            _thresholds: &[Value],
            _values: &[Option<Value>],
        ) -> crate::Result<()> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RecordingPeriodController {
        requests: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl PeriodController for RecordingPeriodController {
        async fn request_period_change(&self, _task_name: &str, new_period: Duration) -> crate::Result<()> {
            self.requests.lock().await.push(new_period);
            Ok(())
        }
    }

    fn test_task(
        values: Vec<crate::Result<Value>>,
        retries: u32,
        threshold: f64,
        fired_failed: Arc<AtomicUsize>,
        fired_success: Arc<AtomicUsize>,
    ) -> Task {
        let provider = Arc::new(ScriptedProvider {
            values: StdMutex::new(values.into_iter().collect()),
        });
        let period_controller = Arc::new(RecordingPeriodController {
            requests: Mutex::new(Vec::new()),
        });
        Task::new(
            "t".to_string(),
            dummy_config(),
            "tasks.yml".to_string(),
            Duration::from_secs(60),
            Some(Duration::from_secs(10)),
            Duration::from_secs(300),
            retries,
            vec![ProviderSpec {
                name: "p".to_string(),
                provider,
                condition: Condition::Lt,
                threshold: Value::Number(threshold),
            }],
            vec![ActionSpec {
                name: "fail".to_string(),
                action: Arc::new(RecordingAction { fired: fired_failed }),
            }],
            vec![ActionSpec {
                name: "ok".to_string(),
                action: Arc::new(RecordingAction { fired: fired_success }),
            }],
            period_controller,
        )
    }

    fn dummy_config() -> TaskConfig {
        use crate::task_config::ProviderEntry;
        use std::collections::BTreeMap;
        let mut providers = BTreeMap::new();
        providers.insert(
            "p".to_string(),
            ProviderEntry {
                condition: "<".to_string(),
                threshold: Value::Number(3.0),
                provider_options: BTreeMap::new(),
            },
        );
        TaskConfig {
            period_success: "60s".to_string(),
            period_retry: Some("10s".to_string()),
            period_failed: "300s".to_string(),
            retries: 2,
            providers: vec![providers],
            actions_failed: BTreeMap::new(),
            actions_success: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn retries_exhaust_then_fail() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(
            vec![Ok(Value::Number(5.0)); 4],
            2,
            3.0,
            fired_failed.clone(),
            fired_success.clone(),
        );

        task.run().await;
        assert_eq!(task.state(), TaskState::Retrying(0));
        assert_eq!(task.remaining_retries, 1);
        assert_eq!(task.period(), Duration::from_secs(10));
        assert_eq!(fired_failed.load(Ordering::SeqCst), 0);

        task.run().await;
        assert_eq!(task.state(), TaskState::Retrying(1));
        assert_eq!(task.remaining_retries, 0);
        assert_eq!(fired_failed.load(Ordering::SeqCst), 0);

        task.run().await;
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.period(), Duration::from_secs(300));
        assert_eq!(fired_failed.load(Ordering::SeqCst), 1);

        task.run().await;
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(fired_failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_from_failed_back_to_normal() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(
            vec![
                Ok(Value::Number(5.0)),
                Ok(Value::Number(5.0)),
                Ok(Value::Number(5.0)),
                Ok(Value::Number(1.0)),
            ],
            2,
            3.0,
            fired_failed.clone(),
            fired_success.clone(),
        );
        for _ in 0..3 {
            task.run().await;
        }
        assert_eq!(task.state(), TaskState::Failed);

        task.run().await;
        assert_eq!(task.state(), TaskState::Normal);
        assert_eq!(task.period(), Duration::from_secs(60));
        assert_eq!(fired_success.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_cancelled_by_recovery_fires_no_actions() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(
            vec![Ok(Value::Number(5.0)), Ok(Value::Number(1.0))],
            3,
            3.0,
            fired_failed.clone(),
            fired_success.clone(),
        );

        task.run().await;
        assert_eq!(task.state(), TaskState::Retrying(0));
        assert_eq!(task.remaining_retries, 2);

        task.run().await;
        assert_eq!(task.state(), TaskState::Normal);
        assert_eq!(task.remaining_retries, 3);
        assert_eq!(task.period(), Duration::from_secs(60));
        assert_eq!(fired_failed.load(Ordering::SeqCst), 0);
        assert_eq!(fired_success.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_error_counts_as_violation_and_is_recorded() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(
            vec![Err(anyhow::anyhow!("boom"))],
            0,
            3.0,
            fired_failed.clone(),
            fired_success.clone(),
        );

        task.run().await;
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(fired_failed.load(Ordering::SeqCst), 1);

        let status = task.to_dict();
        let obs = &status.providers[0].observations;
        assert_eq!(obs.len(), 1);
        assert!(!obs[0].ok);
        assert!(obs[0].value.is_none());
    }

    #[test]
    fn disable_enable_are_idempotent() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(vec![], 0, 3.0, fired_failed, fired_success);
        assert!(task.disable());
        assert!(!task.disable());
        assert!(task.enable());
        assert!(!task.enable());
    }

    #[test]
    fn update_period_reports_whether_it_changed() {
        let fired_failed = Arc::new(AtomicUsize::new(0));
        let fired_success = Arc::new(AtomicUsize::new(0));
        let mut task = test_task(vec![], 0, 3.0, fired_failed, fired_success);
        assert!(!task.update_period(Duration::from_secs(60)));
        assert!(task.update_period(Duration::from_secs(10)));
    }
}
