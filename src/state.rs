//! State Manager — component E. Folds one `(monitor, result)` pair into
//! the monitor's hysteresis counters and decides which lifecycle signal,
//! if any, the Alert Manager should act on. Pure with respect to alerts:
//! this module never touches the `alerts` table, only `monitor_states`.

use crate::models::{CheckResult, Monitor, MonitorState, Severity, Status};
use crate::store;
use rusqlite::Connection;

/// What the Alert Manager should do after a state update. At most one
/// signal is produced per `(monitor, result)` pair.
#[derive(Debug, Clone)]
pub enum Signal {
    None,
    Open(Severity),
    Upgrade,
    Recover,
}

/// `Status::Error` has no numeric value but is worse than a classified
/// alarm — an unreachable target is worse than a slow one. It walks the
/// same warn/alarm ladder as `Status::Alarm` for hysteresis purposes.
fn is_alarm_like(status: Status) -> bool {
    matches!(status, Status::Alarm | Status::Error)
}

/// Apply distilled spec §4.E steps 1-8. Returns the persisted state and
/// the lifecycle signal the caller (the Executor) should hand to the
/// Alert Manager.
pub fn apply(conn: &Connection, monitor: &Monitor, result: &CheckResult) -> rusqlite::Result<(MonitorState, Signal)> {
    let mut state = store::load_state(conn, &monitor.id)?.unwrap_or_else(|| MonitorState::new(monitor.id.clone()));

    state.last_check_time = Some(result.timestamp);
    state.last_value = result.value;
    state.last_error = if matches!(result.status, Status::Error) { Some(result.message.clone()) } else { None };

    let mut signal = Signal::None;

    if matches!(result.status, Status::Ok) && result.success {
        state.consecutive_successes += 1;
        state.consecutive_failures = 0;
        if state.active_alert_id.is_some() && state.consecutive_successes >= monitor.reset_after_m_ok {
            signal = Signal::Recover;
            state.active_alert_id = None;
            state.active_alert_severity = None;
            state.recovery_in_progress = false;
            state.recovery_attempt_count = 0;
        }
    } else {
        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
    }

    state.current_status = result.status;

    if matches!(signal, Signal::None) {
        if matches!(result.status, Status::Warning) && state.consecutive_failures >= monitor.consecutive_warning && state.active_alert_id.is_none() {
            signal = Signal::Open(Severity::Warning);
        } else if is_alarm_like(result.status) && state.consecutive_failures >= monitor.consecutive_alarm {
            // Only the warning→alarm transition escalates. An alert that's
            // already at alarm severity stays put — every alarm-classified
            // tick after the first would otherwise re-emit `Upgrade` and
            // spam a fresh notification for the whole life of the outage.
            signal = match state.active_alert_severity {
                Some(Severity::Warning) => Signal::Upgrade,
                Some(Severity::Alarm) => Signal::None,
                None => Signal::Open(Severity::Alarm),
            };
        }
    }

    match &signal {
        Signal::Open(severity) => state.active_alert_severity = Some(*severity),
        Signal::Upgrade => state.active_alert_severity = Some(Severity::Alarm),
        Signal::None | Signal::Recover => {}
    }

    store::save_state(conn, &state)?;
    Ok((state, signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::models::{CreateMonitor, MonitorTypeConfig, TcpConfig, Thresholds};
    use crate::store;

    fn db() -> Db {
        Db::in_memory().unwrap()
    }

    fn monitor(conn: &Connection) -> Monitor {
        let now = chrono::Utc::now();
        let m = Monitor {
            id: uuid::Uuid::new_v4().to_string(),
            name: "flap-test".into(),
            target: "h:80".into(),
            config: MonitorTypeConfig::Tcp(TcpConfig { host: "h".into(), port: 80 }),
            thresholds: Thresholds { low_warning: None, high_warning: None, low_alarm: None, high_alarm: Some(2000.0) },
            consecutive_warning: 2,
            consecutive_alarm: 3,
            reset_after_m_ok: 2,
            period_minutes: 5,
            timeout_seconds: 10,
            contacts: vec![],
            dependencies: vec![],
            active: true,
            running: true,
            maintenance_windows: vec![],
            alert_settings: Default::default(),
            created_at: now,
            updated_at: now,
        };
        store::insert_monitor(conn, &m).unwrap();
        m
    }

    fn result(status: Status, success: bool) -> CheckResult {
        CheckResult {
            success,
            value: Some(if matches!(status, Status::Alarm) { 2500.0 } else { 100.0 }),
            status,
            message: "x".into(),
            response_time_ms: None,
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn hysteresis_symmetry_opens_after_exactly_n_alarms() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        let (_, s1) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        assert!(matches!(s1, Signal::None));
        let (_, s2) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        assert!(matches!(s2, Signal::None));
        let (state3, s3) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        assert!(matches!(s3, Signal::Open(Severity::Alarm)));
        assert_eq!(state3.consecutive_failures, 3);
    }

    #[test]
    fn single_ok_resets_the_failure_counter() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        let (state, signal) = apply(&conn, &m, &result(Status::Ok, true)).unwrap();
        assert!(matches!(signal, Signal::None));
        assert_eq!(state.consecutive_failures, 0);

        // Two more alarms after the reset still only count to 2, not 5.
        apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        let (state, signal) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        assert!(matches!(signal, Signal::None));
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn recovery_is_idempotent_after_reset_after_m_ok() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        for _ in 0..3 {
            apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        }
        store::save_state(
            &conn,
            &MonitorState { active_alert_id: Some("alert-1".into()), ..store::load_state(&conn, &m.id).unwrap().unwrap() },
        )
        .unwrap();

        let (_, s1) = apply(&conn, &m, &result(Status::Ok, true)).unwrap();
        assert!(matches!(s1, Signal::None));
        let (state2, s2) = apply(&conn, &m, &result(Status::Ok, true)).unwrap();
        assert!(matches!(s2, Signal::Recover));
        assert!(state2.active_alert_id.is_none());

        // A third ok produces no further signal — recovery already happened.
        let (_, s3) = apply(&conn, &m, &result(Status::Ok, true)).unwrap();
        assert!(matches!(s3, Signal::None));
    }

    #[test]
    fn error_status_escalates_like_alarm() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        for _ in 0..2 {
            apply(&conn, &m, &result(Status::Error, false)).unwrap();
        }
        let (_, signal) = apply(&conn, &m, &result(Status::Error, false)).unwrap();
        assert!(matches!(signal, Signal::Open(Severity::Alarm)));
    }

    #[test]
    fn upgrade_fires_once_on_warning_to_alarm_transition_then_goes_quiet() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        // Reach the warning tier first (consecutive_warning = 2).
        apply(&conn, &m, &result(Status::Warning, true)).unwrap();
        let (_, s) = apply(&conn, &m, &result(Status::Warning, true)).unwrap();
        assert!(matches!(s, Signal::Open(Severity::Warning)));

        // The next tick crosses consecutive_alarm (3, counting the two
        // warning ticks already folded into consecutive_failures) with a
        // Warning alert already open: exactly one Upgrade.
        let (state, s) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
        assert!(matches!(s, Signal::Upgrade));
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.active_alert_severity, Some(Severity::Alarm));

        // Every further alarm tick — well past consecutive_alarm — must
        // stay quiet instead of re-emitting Upgrade on every probe.
        for _ in 0..6 {
            let (state, signal) = apply(&conn, &m, &result(Status::Alarm, false)).unwrap();
            assert!(matches!(signal, Signal::None));
            assert_eq!(state.active_alert_severity, Some(Severity::Alarm));
        }
    }

    #[test]
    fn warning_opens_at_its_own_consecutive_threshold() {
        let db = db();
        let conn = db.conn();
        let m = monitor(&conn);

        let (_, s1) = apply(&conn, &m, &result(Status::Warning, true)).unwrap();
        assert!(matches!(s1, Signal::None));
        let (_, s2) = apply(&conn, &m, &result(Status::Warning, true)).unwrap();
        assert!(matches!(s2, Signal::Open(Severity::Warning)));
    }
}
