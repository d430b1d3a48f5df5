//! Executor — component G. Runs the full per-monitor pipeline
//! (maintenance check → Checker → Observation writer → State Manager →
//! Alert Manager) and fans the sweep out across many monitors under a
//! bounded concurrency budget.

use crate::checker::{self, Registry};
use crate::db::Db;
use crate::models::{CheckResult, Monitor, Observation, Status};
use crate::notify::SmtpConfig;
use crate::{alert, state, store};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct Executor {
    db: Arc<Db>,
    registry: Arc<Registry>,
    smtp: Option<SmtpConfig>,
    semaphore: Arc<Semaphore>,
}

/// Outcome of one monitor's pipeline run, folded into the sweep summary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MonitorRunResult {
    pub monitor_id: String,
    pub monitor_name: String,
    pub status: Status,
    pub skipped: bool,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct SweepSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<MonitorRunResult>,
}

fn executor_concurrency() -> usize {
    std::env::var("EXECUTOR_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(10)
}

impl Executor {
    pub fn new(db: Arc<Db>, registry: Arc<Registry>) -> Executor {
        Executor { db, registry, smtp: SmtpConfig::from_env(), semaphore: Arc::new(Semaphore::new(executor_concurrency())) }
    }

    fn in_maintenance(monitor: &Monitor, now: chrono::DateTime<chrono::Utc>) -> bool {
        monitor.maintenance_windows.iter().any(|w| w.start <= now && now <= w.end)
    }

    /// Run the full pipeline for one monitor. Never returns an `Err` —
    /// per §7, persistence/internal failures are logged and swallowed so
    /// the sweep stays live; only the returned summary reflects them.
    async fn run_one(&self, monitor: Monitor) -> MonitorRunResult {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let now = chrono::Utc::now();

        if Self::in_maintenance(&monitor, now) {
            return MonitorRunResult {
                monitor_id: monitor.id,
                monitor_name: monitor.name,
                status: Status::Ok,
                skipped: true,
                message: "in maintenance".to_string(),
            };
        }

        let result = self.probe(&monitor).await;

        let applied = {
            let conn = self.db.conn();
            self.write_observation(&conn, &monitor, &result);
            state::apply(&conn, &monitor, &result)
        };

        match applied {
            Ok((state, signal)) => {
                if let Err(e) = alert::process(&self.db, self.smtp.as_ref(), &monitor, &result, &state, signal).await {
                    eprintln!("🔔 Alert: failed to process lifecycle for {}: {e}", monitor.name);
                }
            }
            Err(e) => eprintln!("📋 State: failed to update state for {}: {e}", monitor.name),
        }

        MonitorRunResult {
            monitor_id: monitor.id,
            monitor_name: monitor.name,
            status: result.status,
            skipped: false,
            message: result.message,
        }
    }

    /// Look up the checker, validate, and run it bounded by the
    /// monitor's timeout. Unknown types and validation failures are
    /// turned into synthetic `error` results rather than panicking.
    async fn probe(&self, monitor: &Monitor) -> CheckResult {
        let Some(checker) = self.registry.lookup(monitor.config.type_name()) else {
            return CheckResult::error(format!("no checker registered for type {}", monitor.config.type_name()));
        };

        if let Err(e) = checker.validate(monitor) {
            return CheckResult::error(format!("validation failed: {e}"));
        }

        checker::check_with_timeout(checker, monitor).await
    }

    fn write_observation(&self, conn: &rusqlite::Connection, monitor: &Monitor, result: &CheckResult) {
        let observation = Observation {
            monitor_id: monitor.id.clone(),
            timestamp: result.timestamp,
            value: result.value,
            status: result.status,
            response_time_ms: result.response_time_ms,
            status_code: result.status_code,
            error: if matches!(result.status, Status::Error) { Some(result.message.clone()) } else { None },
            metadata: result.metadata.clone(),
        };
        if let Err(e) = store::insert_observation(conn, &observation) {
            eprintln!("📝 Observations: failed to write for {}: {e}", monitor.name);
        }
    }

    /// `executeAll` — every `active ∧ running` monitor, regardless of
    /// when it last ran.
    pub async fn execute_all(&self, now: chrono::DateTime<chrono::Utc>) -> SweepSummary {
        let monitors = {
            let conn = self.db.conn();
            store::list_schedulable_monitors(&conn).unwrap_or_default()
        };
        self.run_sweep(monitors, now).await
    }

    /// `executeDue` — only monitors whose `last_check_time` is absent or
    /// at least `period_minutes` old.
    pub async fn execute_due(&self, now: chrono::DateTime<chrono::Utc>) -> SweepSummary {
        let monitors = {
            let conn = self.db.conn();
            store::list_schedulable_monitors(&conn).unwrap_or_default()
        };

        let due: Vec<Monitor> = {
            let conn = self.db.conn();
            monitors
                .into_iter()
                .filter(|m| {
                    let last = store::load_state(&conn, &m.id).ok().flatten().and_then(|s| s.last_check_time);
                    match last {
                        None => true,
                        Some(last) => (now - last).num_seconds() >= (m.period_minutes as i64) * 60,
                    }
                })
                .collect()
        };

        self.run_sweep(due, now).await
    }

    async fn run_sweep(&self, monitors: Vec<Monitor>, _now: chrono::DateTime<chrono::Utc>) -> SweepSummary {
        let futures = monitors.into_iter().map(|m| self.run_one(m));
        let results: Vec<MonitorRunResult> = futures::future::join_all(futures).await;

        let mut summary = SweepSummary { total: results.len(), ..Default::default() };
        for r in &results {
            if r.skipped {
                summary.skipped += 1;
            } else if matches!(r.status, Status::Ok | Status::Warning) {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary.results = results;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MaintenanceWindow, MonitorTypeConfig, TcpConfig, Thresholds};

    fn monitor_with_windows(windows: Vec<MaintenanceWindow>) -> Monitor {
        let now = chrono::Utc::now();
        Monitor {
            id: uuid::Uuid::new_v4().to_string(),
            name: "maintenance-test".into(),
            target: "h:80".into(),
            config: MonitorTypeConfig::Tcp(TcpConfig { host: "h".into(), port: 80 }),
            thresholds: Thresholds::default(),
            consecutive_warning: 1,
            consecutive_alarm: 1,
            reset_after_m_ok: 1,
            period_minutes: 5,
            timeout_seconds: 10,
            contacts: vec![],
            dependencies: vec![],
            active: true,
            running: true,
            maintenance_windows: windows,
            alert_settings: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn inside_a_maintenance_window_is_bypassed() {
        let now = chrono::Utc::now();
        let m = monitor_with_windows(vec![MaintenanceWindow {
            start: now - chrono::Duration::minutes(5),
            end: now + chrono::Duration::minutes(5),
        }]);
        assert!(Executor::in_maintenance(&m, now));
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let now = chrono::Utc::now();
        let m = monitor_with_windows(vec![MaintenanceWindow { start: now, end: now }]);
        assert!(Executor::in_maintenance(&m, now));
    }

    #[test]
    fn outside_every_window_is_not_bypassed() {
        let now = chrono::Utc::now();
        let m = monitor_with_windows(vec![MaintenanceWindow {
            start: now - chrono::Duration::hours(2),
            end: now - chrono::Duration::hours(1),
        }]);
        assert!(!Executor::in_maintenance(&m, now));
    }

    #[test]
    fn no_windows_is_never_bypassed() {
        let now = chrono::Utc::now();
        let m = monitor_with_windows(vec![]);
        assert!(!Executor::in_maintenance(&m, now));
    }
}
