use rusqlite::{Connection, Result, params};
use std::sync::{Mutex, MutexGuard};

/// Thin wrapper around a single SQLite connection, standing in for the
/// spec's document-store collections (`monitors`, `observations`,
/// `alerts`, `monitor_states`). One connection behind a mutex, WAL mode —
/// same shape as the teacher's `Db`.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                target TEXT NOT NULL,
                monitor_type TEXT NOT NULL,
                config_json TEXT NOT NULL,
                thresholds_json TEXT NOT NULL DEFAULT '{}',
                consecutive_warning INTEGER NOT NULL DEFAULT 2,
                consecutive_alarm INTEGER NOT NULL DEFAULT 3,
                reset_after_m_ok INTEGER NOT NULL DEFAULT 2,
                period_minutes INTEGER NOT NULL DEFAULT 5,
                timeout_seconds INTEGER NOT NULL DEFAULT 10,
                contacts_json TEXT NOT NULL DEFAULT '[]',
                dependencies_json TEXT NOT NULL DEFAULT '[]',
                active INTEGER NOT NULL DEFAULT 1,
                running INTEGER NOT NULL DEFAULT 1,
                maintenance_windows_json TEXT NOT NULL DEFAULT '[]',
                alert_settings_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_monitors_type ON monitors(monitor_type);
            CREATE INDEX IF NOT EXISTS idx_monitors_active ON monitors(active);
            CREATE INDEX IF NOT EXISTS idx_monitors_running ON monitors(running);
            CREATE INDEX IF NOT EXISTS idx_monitors_created ON monitors(created_at DESC);

            CREATE TABLE IF NOT EXISTS monitor_states (
                monitor_id TEXT PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
                current_status TEXT NOT NULL DEFAULT 'ok',
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_successes INTEGER NOT NULL DEFAULT 0,
                last_check_time TEXT,
                last_value REAL,
                last_error TEXT,
                active_alert_id TEXT,
                active_alert_severity TEXT,
                recovery_in_progress INTEGER NOT NULL DEFAULT 0,
                recovery_attempt_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_states_status ON monitor_states(current_status);
            CREATE INDEX IF NOT EXISTS idx_states_updated ON monitor_states(updated_at DESC);

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                monitor_name TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                triggered_at TEXT NOT NULL,
                recovered_at TEXT,
                current_value REAL,
                threshold_value REAL,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                notifications_sent_json TEXT NOT NULL DEFAULT '[]',
                last_notification_at TEXT,
                message TEXT NOT NULL,
                metadata_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_monitor ON alerts(monitor_id, triggered_at DESC);
            CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);
            CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity);
            CREATE INDEX IF NOT EXISTS idx_alerts_triggered ON alerts(triggered_at DESC);

            CREATE TABLE IF NOT EXISTS observations (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL,
                value REAL,
                status TEXT NOT NULL,
                response_time_ms INTEGER,
                status_code INTEGER,
                error TEXT,
                metadata_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_observations_monitor ON observations(monitor_id, timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_observations_timestamp ON observations(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_observations_status ON observations(status);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS notification_queue (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                channel TEXT NOT NULL,
                recipient TEXT NOT NULL,
                status TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                sent_at TEXT,
                error TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_notification_queue_status ON notification_queue(status);
            CREATE INDEX IF NOT EXISTS idx_notification_queue_scheduled ON notification_queue(scheduled_at);
            CREATE INDEX IF NOT EXISTS idx_notification_queue_created ON notification_queue(created_at DESC);
        ",
        )?;

        // Auto-generate an admin key for the (minimal) HTTP boundary, same
        // pattern the teacher uses for its manage keys.
        let has_admin_key: bool = conn
            .query_row("SELECT COUNT(*) FROM settings WHERE key = 'admin_key_hash'", [], |r| r.get::<_, i64>(0))
            .map(|c| c > 0)
            .unwrap_or(false);
        if !has_admin_key {
            let admin_key = crate::auth::generate_key();
            let admin_key_hash = crate::auth::hash_key(&admin_key);
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES ('admin_key_hash', ?1, datetime('now'))",
                params![admin_key_hash],
            )
            .ok();
            println!("🔑 Admin key (save this — shown once): {}", admin_key);
        }

        Ok(())
    }
}
