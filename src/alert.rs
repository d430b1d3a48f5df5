//! Alert Manager — component F. Reacts to the `state::Signal` produced
//! for a `(monitor, result)` pair: opens, upgrades, or recovers the
//! monitor's alert, and drives the daily-reminder gate independently of
//! probe frequency.
//!
//! Every function here takes `&Db` rather than a held `&Connection` —
//! each synchronous step re-locks briefly and drops the guard before
//! awaiting the SMTP send, since `MutexGuard` can't cross an await point.

use crate::db::Db;
use crate::models::{Alert, AlertStatus, CheckResult, Monitor, MonitorState, Severity};
use crate::notify::{self, SmtpConfig};
use crate::state::Signal;
use crate::store;

fn threshold_for(monitor: &Monitor, severity: Severity) -> Option<f64> {
    match severity {
        Severity::Alarm => monitor.thresholds.high_alarm.or(monitor.thresholds.low_alarm),
        Severity::Warning => monitor.thresholds.high_warning.or(monitor.thresholds.low_warning),
    }
}

/// `d h m s` duration formatting for a recovery notification, per §4.F.
fn format_duration(span: chrono::Duration) -> String {
    let total_secs = span.num_seconds().max(0);
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

/// Dispatch the lifecycle signal the State Manager produced. Mutates
/// `monitor_states.active_alert_id` when a new alert is opened (the
/// State Manager already cleared it on recovery, per §4.E step 3) —
/// this is the two-phase commit the data model's "at most one open
/// alert per monitor" invariant relies on (§9).
pub async fn process(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor, result: &CheckResult, state: &MonitorState, signal: Signal) -> rusqlite::Result<()> {
    match signal {
        Signal::None => {}
        Signal::Open(severity) => open(db, smtp, monitor, result, state, severity).await?,
        Signal::Upgrade => upgrade(db, smtp, monitor, result).await?,
        Signal::Recover => recover(db, smtp, monitor, state).await?,
    }
    maybe_send_daily_reminder(db, smtp, monitor).await?;
    Ok(())
}

async fn open(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor, result: &CheckResult, state: &MonitorState, severity: Severity) -> rusqlite::Result<()> {
    // Invariant: never open a second alert while one is already open.
    {
        let conn = db.conn();
        if store::get_open_alert(&conn, &monitor.id)?.is_some() {
            return Ok(());
        }
    }

    let now = chrono::Utc::now();
    let mut alert = Alert {
        id: uuid::Uuid::new_v4().to_string(),
        monitor_id: monitor.id.clone(),
        monitor_name: monitor.name.clone(),
        severity,
        status: AlertStatus::Active,
        triggered_at: now,
        recovered_at: None,
        current_value: result.value,
        threshold_value: threshold_for(monitor, severity),
        consecutive_failures: state.consecutive_failures,
        notifications_sent: vec![],
        last_notification_at: Some(now),
        message: result.message.clone(),
        metadata: result.metadata.clone(),
    };

    let logs = notify::send_to_contacts(smtp, &alert, &monitor.contacts, Some(severity), None).await;
    alert.notifications_sent = logs;

    let conn = db.conn();
    store::insert_alert(&conn, &alert)?;
    for log in &alert.notifications_sent {
        store::enqueue_notification(&conn, &alert.id, &monitor.id, log)?;
    }

    let mut state = state.clone();
    state.active_alert_id = Some(alert.id);
    store::save_state(&conn, &state)?;
    Ok(())
}

async fn upgrade(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor, result: &CheckResult) -> rusqlite::Result<()> {
    let Some(mut alert) = (
        {
            let conn = db.conn();
            store::get_open_alert(&conn, &monitor.id)?
        }
    ) else {
        return Ok(());
    };

    // Idempotency guard: the State Manager should only ever hand us this
    // signal on the warning→alarm transition, but an alert already at
    // alarm severity must not re-notify every contact again regardless.
    if matches!(alert.severity, Severity::Alarm) {
        return Ok(());
    }

    alert.severity = Severity::Alarm;
    alert.current_value = result.value;
    alert.threshold_value = threshold_for(monitor, Severity::Alarm);
    alert.message = format!("{} (escalated to alarm)", result.message);
    alert.last_notification_at = Some(chrono::Utc::now());

    let logs = notify::send_to_contacts(smtp, &alert, &monitor.contacts, Some(Severity::Alarm), None).await;

    let conn = db.conn();
    for log in &logs {
        store::enqueue_notification(&conn, &alert.id, &monitor.id, log)?;
    }
    alert.notifications_sent.extend(logs);
    store::update_alert(&conn, &alert)?;
    Ok(())
}

async fn recover(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor, _state: &MonitorState) -> rusqlite::Result<()> {
    // The State Manager already cleared `active_alert_id` (spec §4.E step 3)
    // before handing us this signal, so the open alert is found by monitor
    // id rather than by the id it used to carry.
    let Some(alert) = (
        {
            let conn = db.conn();
            store::get_open_alert(&conn, &monitor.id)?
        }
    ) else {
        return Ok(());
    };
    finish_recovery(db, smtp, monitor, alert).await
}

async fn finish_recovery(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor, mut alert: Alert) -> rusqlite::Result<()> {
    if !alert.status.is_open() {
        return Ok(());
    }
    let now = chrono::Utc::now();
    alert.status = AlertStatus::Recovered;
    alert.recovered_at = Some(now);
    let duration = format_duration(now - alert.triggered_at);

    let logs = notify::send_to_contacts(smtp, &alert, &monitor.contacts, None, Some(duration)).await;
    alert.last_notification_at = Some(now);

    let conn = db.conn();
    for log in &logs {
        store::enqueue_notification(&conn, &alert.id, &monitor.id, log)?;
    }
    alert.notifications_sent.extend(logs);
    store::update_alert(&conn, &alert)?;
    Ok(())
}

/// §4.F daily reminder: unrelated to probe cadence, checked on every
/// Executor pass for the monitor.
async fn maybe_send_daily_reminder(db: &Db, smtp: Option<&SmtpConfig>, monitor: &Monitor) -> rusqlite::Result<()> {
    if !monitor.alert_settings.send_daily_reminder {
        return Ok(());
    }

    let alert = {
        let conn = db.conn();
        let Some(alert) = store::get_open_alert(&conn, &monitor.id)? else { return Ok(()) };
        if !matches!(alert.severity, Severity::Alarm) {
            return Ok(());
        }
        let last = alert.last_notification_at.unwrap_or(alert.triggered_at);
        if chrono::Utc::now() - last < chrono::Duration::hours(20) {
            return Ok(());
        }
        alert
    };

    let mut alert = alert;
    let now = chrono::Utc::now();
    let logs = notify::send_to_contacts(smtp, &alert, &monitor.contacts, Some(Severity::Alarm), None).await;
    alert.last_notification_at = Some(now);

    let conn = db.conn();
    for log in &logs {
        store::enqueue_notification(&conn, &alert.id, &monitor.id, log)?;
    }
    alert.notifications_sent.extend(logs);
    store::update_alert(&conn, &alert)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, ContactPrefs, MonitorTypeConfig, TcpConfig, Thresholds};
    use crate::state;
    use rusqlite::params;

    fn monitor() -> Monitor {
        let now = chrono::Utc::now();
        Monitor {
            id: uuid::Uuid::new_v4().to_string(),
            name: "alert-test".into(),
            target: "h:80".into(),
            config: MonitorTypeConfig::Tcp(TcpConfig { host: "h".into(), port: 80 }),
            thresholds: Thresholds { low_warning: None, high_warning: None, low_alarm: None, high_alarm: Some(2000.0) },
            consecutive_warning: 2,
            consecutive_alarm: 3,
            reset_after_m_ok: 2,
            period_minutes: 5,
            timeout_seconds: 10,
            contacts: vec![Contact { name: "Ada".into(), email: "ada@example.com".into(), mobile: None, role: None, prefs: ContactPrefs { email: true } }],
            dependencies: vec![],
            active: true,
            running: true,
            maintenance_windows: vec![],
            alert_settings: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn result(status: crate::models::Status) -> CheckResult {
        CheckResult {
            success: matches!(status, crate::models::Status::Ok | crate::models::Status::Warning),
            value: Some(2500.0),
            status,
            message: "boom".into(),
            response_time_ms: None,
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn opens_exactly_one_alert_and_sends_one_notification_per_contact() {
        let db = Db::in_memory().unwrap();
        let m = monitor();
        {
            let conn = db.conn();
            store::insert_monitor(&conn, &m).unwrap();
        }

        for _ in 0..3 {
            let (state, signal) = {
                let conn = db.conn();
                state::apply(&conn, &m, &result(crate::models::Status::Alarm)).unwrap()
            };
            process(&db, None, &m, &result(crate::models::Status::Alarm), &state, signal).await.unwrap();
        }

        let conn = db.conn();
        let alerts = store::list_alerts_for_monitor(&conn, &m.id).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].notifications_sent.len(), 1);
        assert_eq!(alerts[0].status.as_str(), "active");
    }

    #[tokio::test]
    async fn upgrade_does_not_renotify_on_every_tick_once_alarm_is_already_open() {
        let db = Db::in_memory().unwrap();
        let m = monitor();
        {
            let conn = db.conn();
            store::insert_monitor(&conn, &m).unwrap();
        }

        // consecutive_alarm is 3: the first 3 ticks open the alert at
        // alarm severity directly (this monitor's warning tier never
        // triggers because every tick here is already Status::Alarm).
        // Six more ticks follow — well past consecutive_alarm — to prove
        // none of them re-fire an upgrade notification.
        for _ in 0..9 {
            let (state, signal) = {
                let conn = db.conn();
                state::apply(&conn, &m, &result(crate::models::Status::Alarm)).unwrap()
            };
            process(&db, None, &m, &result(crate::models::Status::Alarm), &state, signal).await.unwrap();
        }

        let conn = db.conn();
        let alerts = store::list_alerts_for_monitor(&conn, &m.id).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity.as_str(), "alarm");
        assert_eq!(alerts[0].notifications_sent.len(), 1, "only the opening tick should have notified");

        let queued: i64 = conn.query_row("SELECT COUNT(*) FROM notification_queue WHERE alert_id = ?1", params![alerts[0].id], |r| r.get(0)).unwrap();
        assert_eq!(queued, 1);
    }

    #[tokio::test]
    async fn recovery_closes_the_alert_and_records_duration() {
        let db = Db::in_memory().unwrap();
        let m = monitor();
        {
            let conn = db.conn();
            store::insert_monitor(&conn, &m).unwrap();
        }

        for _ in 0..3 {
            let (state, signal) = {
                let conn = db.conn();
                state::apply(&conn, &m, &result(crate::models::Status::Alarm)).unwrap()
            };
            process(&db, None, &m, &result(crate::models::Status::Alarm), &state, signal).await.unwrap();
        }
        for _ in 0..2 {
            let ok = CheckResult {
                success: true,
                value: Some(50.0),
                status: crate::models::Status::Ok,
                message: "ok".into(),
                response_time_ms: None,
                status_code: None,
                timestamp: chrono::Utc::now(),
                metadata: None,
            };
            let (state, signal) = {
                let conn = db.conn();
                state::apply(&conn, &m, &ok).unwrap()
            };
            process(&db, None, &m, &ok, &state, signal).await.unwrap();
        }

        let conn = db.conn();
        let alerts = store::list_alerts_for_monitor(&conn, &m.id).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].status.as_str(), "recovered");
        assert!(alerts[0].recovered_at.is_some());
        assert!(store::get_open_alert(&conn, &m.id).unwrap().is_none());
    }
}
