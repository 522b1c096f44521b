//! A generic interval scheduler: runs an arbitrary set of named async
//! jobs, each on its own period, with an overrun guard so a slow job
//! never overlaps itself. `TaskManager` is the only caller; it supplies
//! one job per task name, each wrapping that task's own `run()`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use crate::NightWatchError;

pub type Job = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct JobEntry {
    job: Job,
    period: Duration,
    paused: bool,
    is_running: Arc<AtomicBool>,
    ticker: tokio::task::JoinHandle<()>,
}

/// Schedules and runs named jobs on independent tickers.
///
/// Distinct jobs execute concurrently; a single job's executions are
/// serialised by an `is_running` flag — if a tick fires while the
/// previous run of that same job is still in flight, the tick is
/// dropped rather than queued (the next one will find it idle again).
pub struct Scheduler {
    jobs: RwLock<HashMap<String, JobEntry>>,
    ready_tx: mpsc::Sender<String>,
    ready_rx: tokio::sync::Mutex<Option<mpsc::Receiver<String>>>,
    worker: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        let (ready_tx, ready_rx) = mpsc::channel(1024);
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(Some(ready_rx)),
            worker: tokio::sync::Mutex::new(None),
        })
    }

    /// Starts the worker loop that drains ready-notifications and
    /// dispatches jobs. Idempotent; a second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        let mut rx = match self.ready_rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };
        let this = Arc::clone(self);
        *worker = Some(tokio::spawn(async move {
            while let Some(name) = rx.recv().await {
                this.dispatch(&name).await;
            }
        }));
    }

    async fn dispatch(&self, name: &str) {
        let (job, is_running) = {
            let jobs = self.jobs.read().await;
            match jobs.get(name) {
                Some(entry) if !entry.paused => (entry.job.clone(), entry.is_running.clone()),
                _ => return,
            }
        };

        if is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(job = name, "skipping tick, previous run still in flight");
            return;
        }

        let fut = job();
        tokio::spawn(async move {
            fut.await;
            is_running.store(false, Ordering::SeqCst);
        });
    }

    /// Registers a new job under `name`, spawning its ticker
    /// immediately. Fails if a job with this name already exists.
    pub async fn add_job(self: &Arc<Self>, name: String, period: Duration, job: Job) -> crate::Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&name) {
            return Err(NightWatchError::SchedulerError(format!(
                "job \"{name}\" is already scheduled"
            ))
            .into());
        }
        let ticker = self.spawn_ticker(name.clone(), period);
        jobs.insert(
            name,
            JobEntry {
                job,
                period,
                paused: false,
                is_running: Arc::new(AtomicBool::new(false)),
                ticker,
            },
        );
        Ok(())
    }

    fn spawn_ticker(self: &Arc<Self>, name: String, period: Duration) -> tokio::task::JoinHandle<()> {
        let tx = self.ready_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(name.clone()).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Changes a job's period, replacing its ticker. The job's paused
    /// state and overrun guard are preserved.
    pub async fn reschedule(self: &Arc<Self>, name: &str, new_period: Duration) -> crate::Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(name)
            .ok_or_else(|| NightWatchError::SchedulerError(format!("job \"{name}\" is not scheduled")))?;
        if entry.period == new_period {
            return Ok(());
        }
        entry.ticker.abort();
        entry.ticker = self.spawn_ticker(name.to_string(), new_period);
        entry.period = new_period;
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> crate::Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(name)
            .ok_or_else(|| NightWatchError::SchedulerError(format!("job \"{name}\" is not scheduled")))?;
        entry.paused = true;
        Ok(())
    }

    pub async fn resume(&self, name: &str) -> crate::Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(name)
            .ok_or_else(|| NightWatchError::SchedulerError(format!("job \"{name}\" is not scheduled")))?;
        entry.paused = false;
        Ok(())
    }

    /// Removes a job, aborting its ticker. A run already dispatched to
    /// `tokio::spawn` is left to finish on its own.
    pub async fn remove(&self, name: &str) {
        if let Some(entry) = self.jobs.write().await.remove(name) {
            entry.ticker.abort();
        }
    }

    pub async fn remove_all(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, entry) in jobs.drain() {
            entry.ticker.abort();
        }
    }

    /// Stops the worker loop and aborts every ticker. If `wait` is
    /// `Some(timeout)`, blocks (up to that timeout) for any in-flight
    /// job executions to finish before returning.
    pub async fn stop(&self, wait: Option<Duration>) {
        self.remove_all().await;
        if let Some(worker) = self.worker.lock().await.take() {
            worker.abort();
        }

        if let Some(timeout) = wait {
            let deadline = Instant::now() + timeout;
            loop {
                if Instant::now() >= deadline {
                    tracing::warn!("scheduler stop timed out waiting for in-flight jobs");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    pub async fn is_scheduled(&self, name: &str) -> bool {
        self.jobs.read().await.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn job_fires_on_its_period() {
        let scheduler = Scheduler::new();
        scheduler.start().await;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        scheduler
            .add_job(
                "tick".to_string(),
                Duration::from_millis(20),
                Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    let count = count_clone.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        scheduler.stop(None).await;
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn paused_job_does_not_fire() {
        let scheduler = Scheduler::new();
        scheduler.start().await;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        scheduler
            .add_job(
                "tick".to_string(),
                Duration::from_millis(10),
                Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    let count = count_clone.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();
        scheduler.pause("tick").await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let observed = count.load(Ordering::SeqCst);
        scheduler.stop(None).await;
        assert_eq!(observed, 0);
    }

    /// Mirrors spec.md §8 scenario E: a job whose body sleeps longer than
    /// its own period must never overlap itself — slow ticks are
    /// coalesced (dropped), not queued.
    #[tokio::test]
    async fn slow_job_never_overlaps_itself() {
        let scheduler = Scheduler::new();
        scheduler.start().await;

        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let concurrent_clone = concurrent.clone();
        let max_clone = max_concurrent.clone();
        let calls_clone = calls.clone();

        scheduler
            .add_job(
                "slow".to_string(),
                Duration::from_millis(30),
                Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    let concurrent = concurrent_clone.clone();
                    let max_concurrent = max_clone.clone();
                    let calls = calls_clone.clone();
                    Box::pin(async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_concurrent.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(90)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop(Some(Duration::from_millis(200))).await;

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn duplicate_job_name_is_rejected() {
        let scheduler = Scheduler::new();
        let job: Job = Arc::new(|| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(async {}) });
        scheduler
            .add_job("a".to_string(), Duration::from_secs(60), job.clone())
            .await
            .unwrap();
        assert!(scheduler
            .add_job("a".to_string(), Duration::from_secs(60), job)
            .await
            .is_err());
    }
}
