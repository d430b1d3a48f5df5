//! HTTP boundary — trimmed to the monitors CRUD surface and the
//! Scheduler controls. No status pages, badges, SLA reports, or
//! dashboard views: this service has no UI of its own.

mod monitors;
mod scheduler;

pub use monitors::{create_monitor, delete_monitor, get_monitor, list_monitors, update_monitor};
pub use scheduler::{scheduler_execute, scheduler_start, scheduler_status, scheduler_stop};

use rocket::http::Status;
use rocket::serde::json::Json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

pub type ApiError = (Status, Json<serde_json::Value>);

fn err(status: Status, message: impl Into<String>, code: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into(), "code": code })))
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    err(Status::BadRequest, message, "VALIDATION_ERROR")
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiError {
    err(Status::NotFound, message, "NOT_FOUND")
}

pub(crate) fn internal(e: impl std::fmt::Display) -> ApiError {
    err(Status::InternalServerError, e.to_string(), "INTERNAL_ERROR")
}

pub(crate) fn rate_limited() -> ApiError {
    err(Status::TooManyRequests, "Rate limit exceeded", "RATE_LIMIT_EXCEEDED")
}

/// Per-IP sliding-window rate limiter, same shape as the teacher's.
pub struct RateLimiter {
    pub windows: Mutex<HashMap<String, (Instant, u32)>>,
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        RateLimiter { windows: Mutex::new(HashMap::new()), limit, window_secs }
    }

    pub fn check(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0).as_secs() >= self.window_secs {
            *entry = (now, 1);
            true
        } else if entry.1 < self.limit {
            entry.1 += 1;
            true
        } else {
            false
        }
    }
}

/// Verify a presented key against the single admin key stamped into
/// `settings` on first boot (§ db.rs). There is no per-monitor manage
/// key in this model — monitors are a shared operational resource, not
/// individually owned the way the teacher's public status pages were.
pub(crate) fn verify_admin(conn: &rusqlite::Connection, token: &str) -> Result<(), ApiError> {
    let stored_hash: String = conn
        .query_row("SELECT value FROM settings WHERE key = 'admin_key_hash'", [], |row| row.get(0))
        .map_err(internal)?;
    if crate::auth::hash_key(token) != stored_hash {
        return Err(err(Status::Forbidden, "Invalid admin key", "FORBIDDEN"));
    }
    Ok(())
}
