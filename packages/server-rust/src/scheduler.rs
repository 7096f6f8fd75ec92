//! Cron-style periodic jobs shared by every module.
//!
//! Modules add jobs from [`Module::register_schedules`](crate::module::Module::register_schedules);
//! the application lifespan starts the scheduler and stops it on shutdown.
//! Without the `scheduler` feature the scheduler is a no-op.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised while configuring or starting the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}' for job '{name}': {reason}")]
    InvalidExpression {
        name: String,
        expr: String,
        reason: String,
    },
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),
    #[error("scheduler must be started from within a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Stopped,
}

impl SchedulerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// A periodic unit of work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Job for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self)().await
    }
}

#[cfg_attr(not(feature = "scheduler"), allow(dead_code))]
struct ScheduledJob {
    name: String,
    #[cfg(feature = "scheduler")]
    schedule: cron::Schedule,
    job: Arc<dyn Job>,
}

struct Inner {
    state: SchedulerState,
    jobs: Vec<ScheduledJob>,
    tasks: Vec<JoinHandle<()>>,
    runtime: Option<Handle>,
}

/// Background scheduler for cron jobs.
pub struct Scheduler {
    inner: Mutex<Inner>,
    shutdown: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        #[cfg(not(feature = "scheduler"))]
        warn!("built without the `scheduler` feature; scheduled jobs will not run");

        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                state: SchedulerState::Created,
                jobs: Vec::new(),
                tasks: Vec::new(),
                runtime: None,
            }),
            shutdown,
        }
    }

    /// Adds a job running on the crontab `expr`. Five-field expressions are
    /// accepted and run at second zero. Jobs added while the scheduler is
    /// running start immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidExpression`] or
    /// [`SchedulerError::DuplicateJob`].
    pub fn add_cron<J: Job>(&self, name: &str, expr: &str, job: J) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock();
        if inner.jobs.iter().any(|existing| existing.name == name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        #[cfg(feature = "scheduler")]
        {
            let schedule =
                parse_schedule(expr).map_err(|reason| SchedulerError::InvalidExpression {
                    name: name.to_string(),
                    expr: expr.to_string(),
                    reason,
                })?;
            let scheduled = ScheduledJob {
                name: name.to_string(),
                schedule,
                job: Arc::new(job),
            };
            if inner.state == SchedulerState::Running {
                if let Some(runtime) = inner.runtime.clone() {
                    let task = spawn_job(&runtime, &scheduled, self.shutdown.subscribe());
                    inner.tasks.push(task);
                }
            }
            info!(job = name, cron = expr, "scheduled job added");
            inner.jobs.push(scheduled);
        }

        #[cfg(not(feature = "scheduler"))]
        {
            let _ = (expr, job, &mut inner);
            debug!(job = name, "scheduler disabled, job skipped");
        }

        Ok(())
    }

    /// Starts every registered job on the current runtime. Starting twice is
    /// a no-op; a stopped scheduler is not restarted.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let mut inner = self.inner.lock();
        match inner.state {
            SchedulerState::Running => return Ok(()),
            SchedulerState::Stopped => {
                warn!("scheduler already stopped, not restarting");
                return Ok(());
            }
            SchedulerState::Created => {}
        }

        #[cfg(feature = "scheduler")]
        {
            let tasks: Vec<JoinHandle<()>> = inner
                .jobs
                .iter()
                .map(|job| spawn_job(&runtime, job, self.shutdown.subscribe()))
                .collect();
            inner.tasks.extend(tasks);
        }

        inner.runtime = Some(runtime);
        inner.state = SchedulerState::Running;
        info!(jobs = inner.jobs.len(), "scheduler started");
        Ok(())
    }

    /// Stops all jobs. Safe before `start` and when called repeatedly.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SchedulerState::Stopped {
            return;
        }
        let was_running = inner.state == SchedulerState::Running;
        inner.state = SchedulerState::Stopped;
        self.shutdown.send_replace(true);
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        inner.runtime = None;
        if was_running {
            info!("scheduler stopped");
        } else {
            debug!("scheduler stopped before start");
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        self.inner.lock().jobs.iter().map(|job| job.name.clone()).collect()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Scheduler")
            .field("state", &inner.state)
            .field("jobs", &inner.jobs.len())
            .finish()
    }
}

#[cfg(feature = "scheduler")]
fn parse_schedule(expr: &str) -> Result<cron::Schedule, String> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    normalized.parse().map_err(|e: cron::error::Error| e.to_string())
}

#[cfg(feature = "scheduler")]
fn spawn_job(
    runtime: &Handle,
    scheduled: &ScheduledJob,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let name = scheduled.name.clone();
    let schedule = scheduled.schedule.clone();
    let job = Arc::clone(&scheduled.job);

    runtime.spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(chrono::Utc).next() else {
                debug!(job = %name, "no upcoming occurrence, job finished");
                return;
            };
            let delay = (next - chrono::Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }

            debug!(job = %name, "running scheduled job");
            if let Err(err) = job.run().await {
                tracing::error!(job = %name, error = %format!("{err:#}"), "scheduled job failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Job {
        || async { Ok::<(), anyhow::Error>(()) }
    }

    #[test]
    fn shutdown_before_start_is_safe() {
        let scheduler = Scheduler::new();
        scheduler.shutdown();
        scheduler.shutdown();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn start_outside_runtime_fails() {
        assert_eq!(Scheduler::new().start(), Err(SchedulerError::NoRuntime));
    }

    #[tokio::test]
    async fn state_transitions() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.state(), SchedulerState::Created);
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.shutdown();
        assert_eq!(scheduler.state().as_str(), "stopped");
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[cfg(feature = "scheduler")]
    mod cron_jobs {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        use tokio::sync::Notify;

        use super::*;

        #[test]
        fn five_field_expressions_are_accepted() {
            let scheduler = Scheduler::new();
            scheduler.add_cron("nightly", "0 3 * * *", noop()).unwrap();
            scheduler.add_cron("every-second", "* * * * * *", noop()).unwrap();
            assert_eq!(scheduler.job_names(), vec!["nightly", "every-second"]);
        }

        #[test]
        fn invalid_expression_is_rejected() {
            let err = Scheduler::new().add_cron("bad", "not a cron", noop()).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidExpression { ref name, .. } if name == "bad"));
        }

        #[test]
        fn duplicate_job_names_are_rejected() {
            let scheduler = Scheduler::new();
            scheduler.add_cron("job", "0 * * * *", noop()).unwrap();
            assert_eq!(
                scheduler.add_cron("job", "0 * * * *", noop()),
                Err(SchedulerError::DuplicateJob("job".to_string()))
            );
        }

        #[tokio::test(start_paused = true)]
        async fn jobs_run_once_started() {
            let runs = Arc::new(AtomicUsize::new(0));
            let notify = Arc::new(Notify::new());
            let scheduler = Scheduler::new();
            {
                let runs = Arc::clone(&runs);
                let notify = Arc::clone(&notify);
                scheduler
                    .add_cron("tick", "* * * * * *", move || {
                        let runs = Arc::clone(&runs);
                        let notify = Arc::clone(&notify);
                        async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            notify.notify_one();
                            Ok::<(), anyhow::Error>(())
                        }
                    })
                    .unwrap();
            }
            scheduler.start().unwrap();
            tokio::time::timeout(Duration::from_secs(5), notify.notified())
                .await
                .unwrap();
            scheduler.shutdown();
            assert!(runs.load(Ordering::SeqCst) >= 1);
        }
    }

    #[cfg(not(feature = "scheduler"))]
    #[test]
    fn disabled_scheduler_skips_jobs() {
        let scheduler = Scheduler::new();
        scheduler.add_cron("job", "garbage", noop()).unwrap();
        assert!(scheduler.job_names().is_empty());
    }
}
