use crate::dispatch::Dispatcher;
use conductor_core::TaskStatus;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a tick did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoAgents,
    DirectoryUnavailable,
    AtCapacity,
}

/// Summary of one scheduling tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub skipped: Option<SkipReason>,
    pub eligible: usize,
    pub dispatched: Vec<Uuid>,
    pub completed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl TickReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Periodic coordinator that feeds dependency-satisfied pending tasks to
/// the dispatcher without exceeding the concurrency ceiling.
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    wake: Option<Arc<Notify>>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            wake: None,
        }
    }

    /// Run a tick early whenever `wake` is notified.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one scheduling pass.
    ///
    /// Eligible tasks are dispatched one at a time in queue order; each
    /// dispatch resolves before the next starts. A dispatch error is logged
    /// and the pass moves on.
    pub async fn tick(&self) -> TickReport {
        let agents = match self.dispatcher.directory().available_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "Scheduler: agent directory unavailable");
                return TickReport::skipped(SkipReason::DirectoryUnavailable);
            }
        };
        if agents.is_empty() {
            debug!("Scheduler: no available agents");
            return TickReport::skipped(SkipReason::NoAgents);
        }

        let in_flight = self.dispatcher.in_flight();
        if in_flight.len() >= self.dispatcher.ceiling() {
            debug!(in_flight = in_flight.len(), "Scheduler: at capacity");
            return TickReport::skipped(SkipReason::AtCapacity);
        }

        let eligible: Vec<Uuid> = {
            let store = self.dispatcher.store().read();
            store.eligible().iter().map(|t| t.id).collect()
        };
        let mut report = TickReport {
            eligible: eligible.len(),
            ..Default::default()
        };

        for task_id in eligible {
            if in_flight.len() >= self.dispatcher.ceiling() {
                break;
            }
            report.dispatched.push(task_id);
            match self.dispatcher.dispatch(task_id).await {
                Ok(outcome) if outcome.status == TaskStatus::Completed => report.completed += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Scheduler: dispatch failed");
                    report.errors += 1;
                }
            }
        }

        debug!(
            eligible = report.eligible,
            dispatched = report.dispatched.len(),
            completed = report.completed,
            failed = report.failed,
            errors = report.errors,
            "Scheduler: tick done"
        );
        report
    }

    /// Spawn the periodic loop. The first tick fires immediately.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        info!(interval_ms = self.interval.as_millis() as u64, "Scheduler: starting");

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                    _ = wait_for_wake(self.wake.as_deref()) => {}
                }
                self.tick().await;
            }
            info!("Scheduler: stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn wait_for_wake(wake: Option<&Notify>) {
    match wake {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

/// Controls a running scheduling loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop after any tick in progress finishes.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
