//! Serving lifecycle of a Coman application.
//!
//! [`Lifecycle`] tracks the serving phase and the number of requests being
//! handled, and derives the readiness report from the phase, the scheduler
//! state and the outcome of module discovery. Both counters live in `watch`
//! channels so the drain can await the last request instead of polling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::registry::Core;
use crate::scheduler::SchedulerState;

/// Serving phase: Starting -> Serving -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl Phase {
    /// True once the server no longer accepts new requests.
    #[must_use]
    pub fn is_closing(self) -> bool {
        matches!(self, Self::Draining | Self::Stopped)
    }
}

/// Body of the readiness endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub phase: Phase,
    /// `"detached"` when no scheduler is attached to the core.
    pub scheduler: &'static str,
    pub modules: Vec<String>,
    /// Packages the loader skipped, by package name.
    pub skipped: Vec<String>,
    /// Modules whose schedule registration failed; they are still mounted.
    pub unscheduled: Vec<String>,
    pub in_flight: usize,
}

pub struct Lifecycle {
    core: Arc<Core>,
    unscheduled: Vec<String>,
    phase: watch::Sender<Phase>,
    requests: Arc<watch::Sender<usize>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(core: Arc<Core>, unscheduled: Vec<String>) -> Self {
        Self {
            core,
            unscheduled,
            phase: watch::Sender::new(Phase::Starting),
            requests: Arc::new(watch::Sender::new(0)),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Marks the listener as accepting requests. Ignored once closing.
    pub fn begin_serving(&self) {
        self.phase.send_if_modified(|phase| {
            let starting = *phase == Phase::Starting;
            if starting {
                *phase = Phase::Serving;
            }
            starting
        });
    }

    /// Stops admitting requests; [`Lifecycle::drain`] finishes the shutdown.
    pub fn close(&self) {
        self.phase.send_if_modified(|phase| {
            let open = !phase.is_closing();
            if open {
                *phase = Phase::Draining;
            }
            open
        });
    }

    /// Resolves once [`Lifecycle::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.phase.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|phase| phase.is_closing()).await;
    }

    /// Admits a request, or returns `None` when the server is closing. The
    /// request counts as in flight until the ticket is dropped.
    #[must_use]
    pub fn admit(&self) -> Option<RequestTicket> {
        if self.phase().is_closing() {
            return None;
        }
        self.requests.send_modify(|n| *n += 1);
        Some(RequestTicket {
            requests: Arc::clone(&self.requests),
        })
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.requests.borrow()
    }

    /// Closes the lifecycle and waits up to `timeout` for admitted requests
    /// to finish. Returns `true` and moves to `Stopped` when they did; the
    /// phase stays `Draining` otherwise.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.close();
        let mut rx = self.requests.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .is_ok_and(|waited| waited.is_ok());
        if drained {
            self.phase.send_replace(Phase::Stopped);
        }
        drained
    }

    /// Ready means serving with the scheduler running. Skipped packages and
    /// failed schedule registrations are reported but do not block
    /// readiness.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        let phase = self.phase();
        let scheduler = self.core.scheduler().map(|s| s.state());
        Readiness {
            ready: phase == Phase::Serving && scheduler == Some(SchedulerState::Running),
            phase,
            scheduler: scheduler.map_or("detached", SchedulerState::as_str),
            modules: self.core.module_names(),
            skipped: self
                .core
                .skipped_packages()
                .iter()
                .map(|s| s.package.clone())
                .collect(),
            unscheduled: self.unscheduled.clone(),
            in_flight: self.in_flight(),
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// An admitted request.
#[derive(Debug)]
pub struct RequestTicket {
    requests: Arc<watch::Sender<usize>>,
}

impl Drop for RequestTicket {
    fn drop(&mut self) {
        self.requests.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::registry::{load_modules_from, ModulePackage};
    use crate::scheduler::Scheduler;

    fn lifecycle() -> Lifecycle {
        let mut core = Core::new(Settings::default());
        load_modules_from(&mut core, &[ModulePackage::without_entry("vendored")]);
        Lifecycle::new(Arc::new(core), vec!["cron".to_string()])
    }

    #[test]
    fn phases_only_move_forward() {
        let lifecycle = lifecycle();
        assert_eq!(lifecycle.phase(), Phase::Starting);
        lifecycle.begin_serving();
        assert_eq!(lifecycle.phase(), Phase::Serving);
        lifecycle.close();
        lifecycle.begin_serving();
        assert_eq!(lifecycle.phase(), Phase::Draining);
    }

    #[test]
    fn closing_refuses_new_requests() {
        let lifecycle = lifecycle();
        let first = lifecycle.admit().unwrap();
        let second = lifecycle.admit().unwrap();
        assert_eq!(lifecycle.in_flight(), 2);
        lifecycle.close();
        assert!(lifecycle.admit().is_none());
        drop(first);
        drop(second);
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let lifecycle = Arc::new(lifecycle());
        let waiter = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.closed().await }
        });
        lifecycle.close();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_the_last_ticket() {
        let lifecycle = lifecycle();
        let ticket = lifecycle.admit().unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(ticket);
        });
        assert!(lifecycle.drain(Duration::from_secs(2)).await);
        assert_eq!(lifecycle.phase(), Phase::Stopped);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_gives_up_with_a_held_ticket() {
        let lifecycle = lifecycle();
        let _ticket = lifecycle.admit().unwrap();
        assert!(!lifecycle.drain(Duration::from_millis(50)).await);
        assert_eq!(lifecycle.phase(), Phase::Draining);
    }

    #[tokio::test]
    async fn readiness_requires_serving_and_a_running_scheduler() {
        let lifecycle = lifecycle();
        let report = lifecycle.readiness();
        assert!(!report.ready);
        assert_eq!(report.scheduler, "detached");
        assert_eq!(report.skipped, ["vendored"]);
        assert_eq!(report.unscheduled, ["cron"]);

        let scheduler = Arc::new(Scheduler::new());
        lifecycle.core.attach_scheduler(Arc::clone(&scheduler));
        lifecycle.begin_serving();
        assert!(!lifecycle.readiness().ready);

        scheduler.start().unwrap();
        let report = lifecycle.readiness();
        assert!(report.ready);
        assert_eq!(report.scheduler, "running");

        lifecycle.close();
        let report = lifecycle.readiness();
        assert!(!report.ready);
        assert_eq!(serde_json::to_value(&report).unwrap()["phase"], "draining");
        scheduler.shutdown();
    }
}
