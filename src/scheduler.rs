//! Scheduler — component H. A single process-wide tick loop that calls
//! `Executor::execute_due` once a minute, with start/stop/status/trigger
//! controls exposed over HTTP.

use crate::executor::{Executor, SweepSummary};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const TICK_SECONDS: u64 = 60;

struct Inner {
    running: AtomicBool,
    ticking: AtomicBool,
    started_at: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    last_tick: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<Executor>,
    inner: Arc<Inner>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_tick: Option<chrono::DateTime<chrono::Utc>>,
}

impl Scheduler {
    pub fn new(executor: Arc<Executor>) -> Scheduler {
        Scheduler {
            executor,
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                ticking: AtomicBool::new(false),
                started_at: Mutex::new(None),
                last_tick: Mutex::new(None),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Spawn the tick loop if it isn't already running. Idempotent.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.inner.started_at.lock().await = Some(chrono::Utc::now());

        let executor = self.executor.clone();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_SECONDS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                // Skip-on-overlap: a slow sweep must not pile up concurrent sweeps.
                if inner.ticking.swap(true, Ordering::SeqCst) {
                    continue;
                }
                let now = chrono::Utc::now();
                let summary = executor.execute_due(now).await;
                *inner.last_tick.lock().await = Some(now);
                inner.ticking.store(false, Ordering::SeqCst);
                if summary.total > 0 {
                    eprintln!("⏱ Scheduler: swept {} due monitors ({} ok, {} failed, {} skipped)", summary.total, summary.successful, summary.failed, summary.skipped);
                }
            }
        });
        *self.inner.handle.lock().await = Some(handle);
    }

    /// Stop the tick loop. The in-flight sweep (if any) is allowed to
    /// finish; only the next scheduled tick is suppressed.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.handle.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.inner.running.load(Ordering::SeqCst),
            started_at: *self.inner.started_at.lock().await,
            last_tick: *self.inner.last_tick.lock().await,
        }
    }

    /// Run one sweep immediately, independent of the tick loop's cadence.
    pub async fn trigger(&self, all: bool) -> SweepSummary {
        let now = chrono::Utc::now();
        if all {
            self.executor.execute_all(now).await
        } else {
            self.executor.execute_due(now).await
        }
    }
}
