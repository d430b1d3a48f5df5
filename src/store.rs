//! Row <-> model mapping and CRUD helpers shared by the Executor, State
//! Manager, Alert Manager and the HTTP boundary. Mirrors the teacher's
//! `routes::row_to_monitor` / `get_monitor_from_db` pattern, generalized
//! to the richer data model.

use crate::models::{
    Alert, AlertSettings, AlertStatus, Contact, MaintenanceWindow, Monitor, MonitorState,
    MonitorTypeConfig, NotificationLog, Observation, Severity, Status, Thresholds,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn parse_dt(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn fmt_dt(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339()
}

// ─── Monitors ────────────────────────────────────────────────────────────

pub fn row_to_monitor(row: &Row) -> rusqlite::Result<Monitor> {
    let config_json: String = row.get("config_json")?;
    let config: MonitorTypeConfig =
        serde_json::from_str(&config_json).unwrap_or_else(|_| MonitorTypeConfig::Tcp(crate::models::TcpConfig { host: String::new(), port: 0 }));
    let thresholds_json: String = row.get("thresholds_json")?;
    let thresholds: Thresholds = serde_json::from_str(&thresholds_json).unwrap_or_default();
    let contacts_json: String = row.get("contacts_json")?;
    let contacts: Vec<Contact> = serde_json::from_str(&contacts_json).unwrap_or_default();
    let dependencies_json: String = row.get("dependencies_json")?;
    let dependencies: Vec<String> = serde_json::from_str(&dependencies_json).unwrap_or_default();
    let maintenance_json: String = row.get("maintenance_windows_json")?;
    let maintenance_windows: Vec<MaintenanceWindow> = serde_json::from_str(&maintenance_json).unwrap_or_default();
    let alert_settings_json: String = row.get("alert_settings_json")?;
    let alert_settings: AlertSettings = serde_json::from_str(&alert_settings_json).unwrap_or_default();

    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Monitor {
        id: row.get("id")?,
        name: row.get("name")?,
        target: row.get("target")?,
        config,
        thresholds,
        consecutive_warning: row.get("consecutive_warning")?,
        consecutive_alarm: row.get("consecutive_alarm")?,
        reset_after_m_ok: row.get("reset_after_m_ok")?,
        period_minutes: row.get("period_minutes")?,
        timeout_seconds: row.get("timeout_seconds")?,
        contacts,
        dependencies,
        active: row.get::<_, i64>("active")? != 0,
        running: row.get::<_, i64>("running")? != 0,
        maintenance_windows,
        alert_settings,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

pub fn insert_monitor(conn: &Connection, m: &Monitor) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO monitors (
            id, name, target, monitor_type, config_json, thresholds_json,
            consecutive_warning, consecutive_alarm, reset_after_m_ok,
            period_minutes, timeout_seconds, contacts_json, dependencies_json,
            active, running, maintenance_windows_json, alert_settings_json,
            created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        params![
            m.id,
            m.name,
            m.target,
            m.config.type_name(),
            serde_json::to_string(&m.config).unwrap(),
            serde_json::to_string(&m.thresholds).unwrap(),
            m.consecutive_warning,
            m.consecutive_alarm,
            m.reset_after_m_ok,
            m.period_minutes,
            m.timeout_seconds,
            serde_json::to_string(&m.contacts).unwrap(),
            serde_json::to_string(&m.dependencies).unwrap(),
            m.active as i64,
            m.running as i64,
            serde_json::to_string(&m.maintenance_windows).unwrap(),
            serde_json::to_string(&m.alert_settings).unwrap(),
            fmt_dt(&m.created_at),
            fmt_dt(&m.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_monitor(conn: &Connection, m: &Monitor) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE monitors SET
            name = ?1, target = ?2, monitor_type = ?3, config_json = ?4, thresholds_json = ?5,
            consecutive_warning = ?6, consecutive_alarm = ?7, reset_after_m_ok = ?8,
            period_minutes = ?9, timeout_seconds = ?10, contacts_json = ?11,
            dependencies_json = ?12, active = ?13, running = ?14,
            maintenance_windows_json = ?15, alert_settings_json = ?16, updated_at = ?17
         WHERE id = ?18",
        params![
            m.name,
            m.target,
            m.config.type_name(),
            serde_json::to_string(&m.config).unwrap(),
            serde_json::to_string(&m.thresholds).unwrap(),
            m.consecutive_warning,
            m.consecutive_alarm,
            m.reset_after_m_ok,
            m.period_minutes,
            m.timeout_seconds,
            serde_json::to_string(&m.contacts).unwrap(),
            serde_json::to_string(&m.dependencies).unwrap(),
            m.active as i64,
            m.running as i64,
            serde_json::to_string(&m.maintenance_windows).unwrap(),
            serde_json::to_string(&m.alert_settings).unwrap(),
            fmt_dt(&m.updated_at),
            m.id,
        ],
    )
}

pub fn delete_monitor(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])
}

pub fn get_monitor(conn: &Connection, id: &str) -> rusqlite::Result<Option<Monitor>> {
    conn.query_row("SELECT * FROM monitors WHERE id = ?1", params![id], row_to_monitor).optional()
}

pub fn get_monitor_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Monitor>> {
    conn.query_row("SELECT * FROM monitors WHERE name = ?1", params![name], row_to_monitor).optional()
}

pub fn list_monitors(conn: &Connection) -> rusqlite::Result<Vec<Monitor>> {
    let mut stmt = conn.prepare("SELECT * FROM monitors ORDER BY created_at DESC")?;
    let rows = stmt.query_map([], row_to_monitor)?;
    rows.collect()
}

/// Monitors eligible for scheduling: `active ∧ running`.
pub fn list_schedulable_monitors(conn: &Connection) -> rusqlite::Result<Vec<Monitor>> {
    let mut stmt = conn.prepare("SELECT * FROM monitors WHERE active = 1 AND running = 1 ORDER BY created_at ASC")?;
    let rows = stmt.query_map([], row_to_monitor)?;
    rows.collect()
}

// ─── Monitor state ──────────────────────────────────────────────────────

fn row_to_state(row: &Row) -> rusqlite::Result<MonitorState> {
    let last_check: Option<String> = row.get("last_check_time")?;
    Ok(MonitorState {
        monitor_id: row.get("monitor_id")?,
        current_status: Status::parse(&row.get::<_, String>("current_status")?),
        consecutive_failures: row.get("consecutive_failures")?,
        consecutive_successes: row.get("consecutive_successes")?,
        last_check_time: last_check.map(|s| parse_dt(&s)),
        last_value: row.get("last_value")?,
        last_error: row.get("last_error")?,
        active_alert_id: row.get("active_alert_id")?,
        active_alert_severity: row.get::<_, Option<String>>("active_alert_severity")?.map(|s| crate::models::Severity::parse(&s)),
        recovery_in_progress: row.get::<_, i64>("recovery_in_progress")? != 0,
        recovery_attempt_count: row.get("recovery_attempt_count")?,
    })
}

pub fn load_state(conn: &Connection, monitor_id: &str) -> rusqlite::Result<Option<MonitorState>> {
    conn.query_row("SELECT * FROM monitor_states WHERE monitor_id = ?1", params![monitor_id], row_to_state).optional()
}

/// Insert-or-replace the state row. Persistence is atomic because SQLite
/// serializes writers; this is the "persist the updated state atomically"
/// step the State Manager spec calls for.
pub fn save_state(conn: &Connection, s: &MonitorState) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO monitor_states (
            monitor_id, current_status, consecutive_failures, consecutive_successes,
            last_check_time, last_value, last_error, active_alert_id, active_alert_severity,
            recovery_in_progress, recovery_attempt_count, updated_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,datetime('now'))
         ON CONFLICT(monitor_id) DO UPDATE SET
            current_status = excluded.current_status,
            consecutive_failures = excluded.consecutive_failures,
            consecutive_successes = excluded.consecutive_successes,
            last_check_time = excluded.last_check_time,
            last_value = excluded.last_value,
            last_error = excluded.last_error,
            active_alert_id = excluded.active_alert_id,
            active_alert_severity = excluded.active_alert_severity,
            recovery_in_progress = excluded.recovery_in_progress,
            recovery_attempt_count = excluded.recovery_attempt_count,
            updated_at = datetime('now')",
        params![
            s.monitor_id,
            s.current_status.as_str(),
            s.consecutive_failures,
            s.consecutive_successes,
            s.last_check_time.as_ref().map(fmt_dt),
            s.last_value,
            s.last_error,
            s.active_alert_id,
            s.active_alert_severity.map(|sev| sev.as_str()),
            s.recovery_in_progress as i64,
            s.recovery_attempt_count,
        ],
    )?;
    Ok(())
}

/// Write-only audit trail of every notification attempt, mirroring the
/// distilled spec's `notification_queue` collection. Sends are dispatched
/// synchronously by the Alert Manager (§4.F), so nothing ever reads this
/// table back to decide what to send next — it exists purely so "what did
/// we try to notify, and when" survives independently of an alert's own
/// `notifications_sent_json` snapshot.
pub fn enqueue_notification(conn: &Connection, alert_id: &str, monitor_id: &str, log: &crate::models::NotificationLog) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notification_queue (id, alert_id, monitor_id, channel, recipient, status, scheduled_at, sent_at, error)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            uuid::Uuid::new_v4().to_string(),
            alert_id,
            monitor_id,
            log.channel,
            log.recipient,
            match log.status {
                crate::models::NotificationStatus::Sent => "sent",
                crate::models::NotificationStatus::Failed => "failed",
            },
            fmt_dt(&log.sent_at),
            fmt_dt(&log.sent_at),
            log.error,
        ],
    )?;
    Ok(())
}

// ─── Observations ───────────────────────────────────────────────────────

pub fn insert_observation(conn: &Connection, o: &Observation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO observations (id, monitor_id, timestamp, value, status, response_time_ms, status_code, error, metadata_json)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            uuid::Uuid::new_v4().to_string(),
            o.monitor_id,
            fmt_dt(&o.timestamp),
            o.value,
            o.status.as_str(),
            o.response_time_ms,
            o.status_code,
            o.error,
            o.metadata.as_ref().map(|v| v.to_string()),
        ],
    )?;
    Ok(())
}

/// Enforce the 90-day (configurable) retention window. Returns rows deleted.
pub fn prune_observations(conn: &Connection, days: u32) -> usize {
    conn.execute(
        "DELETE FROM observations WHERE timestamp < datetime('now', ?1)",
        params![format!("-{} days", days)],
    )
    .unwrap_or(0)
}

// ─── Alerts ─────────────────────────────────────────────────────────────

fn row_to_alert(row: &Row) -> rusqlite::Result<Alert> {
    let recovered_at: Option<String> = row.get("recovered_at")?;
    let last_notification_at: Option<String> = row.get("last_notification_at")?;
    let notifications_json: String = row.get("notifications_sent_json")?;
    let notifications_sent: Vec<NotificationLog> = serde_json::from_str(&notifications_json).unwrap_or_default();
    let metadata_json: Option<String> = row.get("metadata_json")?;
    Ok(Alert {
        id: row.get("id")?,
        monitor_id: row.get("monitor_id")?,
        monitor_name: row.get("monitor_name")?,
        severity: Severity::parse(&row.get::<_, String>("severity")?),
        status: AlertStatus::parse(&row.get::<_, String>("status")?),
        triggered_at: parse_dt(&row.get::<_, String>("triggered_at")?),
        recovered_at: recovered_at.map(|s| parse_dt(&s)),
        current_value: row.get("current_value")?,
        threshold_value: row.get("threshold_value")?,
        consecutive_failures: row.get("consecutive_failures")?,
        notifications_sent,
        last_notification_at: last_notification_at.map(|s| parse_dt(&s)),
        message: row.get("message")?,
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub fn insert_alert(conn: &Connection, a: &Alert) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO alerts (
            id, monitor_id, monitor_name, severity, status, triggered_at, recovered_at,
            current_value, threshold_value, consecutive_failures, notifications_sent_json,
            last_notification_at, message, metadata_json
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            a.id,
            a.monitor_id,
            a.monitor_name,
            a.severity.as_str(),
            a.status.as_str(),
            fmt_dt(&a.triggered_at),
            a.recovered_at.as_ref().map(fmt_dt),
            a.current_value,
            a.threshold_value,
            a.consecutive_failures,
            serde_json::to_string(&a.notifications_sent).unwrap(),
            a.last_notification_at.as_ref().map(fmt_dt),
            a.message,
            a.metadata.as_ref().map(|v| v.to_string()),
        ],
    )?;
    Ok(())
}

pub fn update_alert(conn: &Connection, a: &Alert) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE alerts SET
            severity = ?1, status = ?2, recovered_at = ?3, current_value = ?4,
            threshold_value = ?5, consecutive_failures = ?6, notifications_sent_json = ?7,
            last_notification_at = ?8, message = ?9, metadata_json = ?10
         WHERE id = ?11",
        params![
            a.severity.as_str(),
            a.status.as_str(),
            a.recovered_at.as_ref().map(fmt_dt),
            a.current_value,
            a.threshold_value,
            a.consecutive_failures,
            serde_json::to_string(&a.notifications_sent).unwrap(),
            a.last_notification_at.as_ref().map(fmt_dt),
            a.message,
            a.metadata.as_ref().map(|v| v.to_string()),
            a.id,
        ],
    )
}

pub fn get_alert(conn: &Connection, id: &str) -> rusqlite::Result<Option<Alert>> {
    conn.query_row("SELECT * FROM alerts WHERE id = ?1", params![id], row_to_alert).optional()
}

/// The one alert (if any) for a monitor whose status is still "open" —
/// active, acknowledged, or in_recovery. The data model's invariant
/// guarantees at most one such row exists.
pub fn get_open_alert(conn: &Connection, monitor_id: &str) -> rusqlite::Result<Option<Alert>> {
    conn.query_row(
        "SELECT * FROM alerts WHERE monitor_id = ?1 AND status != 'recovered' ORDER BY triggered_at DESC LIMIT 1",
        params![monitor_id],
        row_to_alert,
    )
    .optional()
}

pub fn list_alerts_for_monitor(conn: &Connection, monitor_id: &str) -> rusqlite::Result<Vec<Alert>> {
    let mut stmt = conn.prepare("SELECT * FROM alerts WHERE monitor_id = ?1 ORDER BY triggered_at DESC")?;
    let rows = stmt.query_map(params![monitor_id], row_to_alert)?;
    rows.collect()
}
