use super::{bad_request, internal, not_found, rate_limited, verify_admin, ApiError, RateLimiter};
use crate::auth::{ClientIp, ManageToken};
use crate::checker::Registry;
use crate::db::Db;
use crate::models::{validate_monitor, CreateMonitor, Monitor, UpdateMonitor};
use crate::store;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use std::sync::Arc;

#[post("/monitors", format = "json", data = "<input>")]
pub fn create_monitor(
    input: Json<CreateMonitor>,
    token: ManageToken,
    client_ip: ClientIp,
    db: &State<Arc<Db>>,
    registry: &State<Arc<Registry>>,
    rate_limiter: &State<RateLimiter>,
) -> Result<Json<Monitor>, ApiError> {
    if !rate_limiter.check(&client_ip.0) {
        return Err(rate_limited());
    }

    let conn = db.conn();
    verify_admin(&conn, &token.0)?;

    let data = input.into_inner();
    let consecutive_warning = data.consecutive_warning.unwrap_or(2);
    let consecutive_alarm = data.consecutive_alarm.unwrap_or(3);
    let reset_after_m_ok = data.reset_after_m_ok.unwrap_or(2);
    let period_minutes = data.period_minutes.unwrap_or(5);
    let timeout_seconds = data.timeout_seconds.unwrap_or(10);

    validate_monitor(&data.name, &data.thresholds, period_minutes, timeout_seconds).map_err(bad_request)?;

    let now = chrono::Utc::now();
    let monitor = Monitor {
        id: uuid::Uuid::new_v4().to_string(),
        name: data.name,
        target: data.target,
        config: data.config,
        thresholds: data.thresholds,
        consecutive_warning,
        consecutive_alarm,
        reset_after_m_ok,
        period_minutes,
        timeout_seconds,
        contacts: data.contacts,
        dependencies: data.dependencies,
        active: true,
        running: true,
        maintenance_windows: data.maintenance_windows,
        alert_settings: data.alert_settings,
        created_at: now,
        updated_at: now,
    };

    let checker = registry.lookup(monitor.config.type_name()).ok_or_else(|| bad_request(format!("unknown monitor type {}", monitor.config.type_name())))?;
    checker.validate(&monitor).map_err(bad_request)?;

    store::insert_monitor(&conn, &monitor).map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            bad_request("a monitor with that name already exists")
        } else {
            internal(e)
        }
    })?;

    Ok(Json(monitor))
}

#[get("/monitors")]
pub fn list_monitors(db: &State<Arc<Db>>) -> Result<Json<Vec<Monitor>>, ApiError> {
    let conn = db.conn();
    store::list_monitors(&conn).map(Json).map_err(internal)
}

#[get("/monitors/<id>")]
pub fn get_monitor(id: &str, db: &State<Arc<Db>>) -> Result<Json<Monitor>, ApiError> {
    let conn = db.conn();
    store::get_monitor(&conn, id).map_err(internal)?.map(Json).ok_or_else(|| not_found("monitor not found"))
}

#[put("/monitors/<id>", format = "json", data = "<input>")]
pub fn update_monitor(id: &str, input: Json<UpdateMonitor>, token: ManageToken, db: &State<Arc<Db>>, registry: &State<Arc<Registry>>) -> Result<Json<Monitor>, ApiError> {
    let conn = db.conn();
    verify_admin(&conn, &token.0)?;

    let mut monitor = store::get_monitor(&conn, id).map_err(internal)?.ok_or_else(|| not_found("monitor not found"))?;
    let data = input.into_inner();

    if let Some(name) = data.name {
        monitor.name = name;
    }
    if let Some(target) = data.target {
        monitor.target = target;
    }
    if let Some(config) = data.config {
        monitor.config = config;
    }
    if let Some(thresholds) = data.thresholds {
        monitor.thresholds = thresholds;
    }
    if let Some(v) = data.consecutive_warning {
        monitor.consecutive_warning = v;
    }
    if let Some(v) = data.consecutive_alarm {
        monitor.consecutive_alarm = v;
    }
    if let Some(v) = data.reset_after_m_ok {
        monitor.reset_after_m_ok = v;
    }
    if let Some(v) = data.period_minutes {
        monitor.period_minutes = v;
    }
    if let Some(v) = data.timeout_seconds {
        monitor.timeout_seconds = v;
    }
    if let Some(v) = data.contacts {
        monitor.contacts = v;
    }
    if let Some(v) = data.dependencies {
        monitor.dependencies = v;
    }
    if let Some(v) = data.active {
        monitor.active = v;
    }
    if let Some(v) = data.running {
        monitor.running = v;
    }
    if let Some(v) = data.maintenance_windows {
        monitor.maintenance_windows = v;
    }
    if let Some(v) = data.alert_settings {
        monitor.alert_settings = v;
    }
    monitor.updated_at = chrono::Utc::now();

    validate_monitor(&monitor.name, &monitor.thresholds, monitor.period_minutes, monitor.timeout_seconds).map_err(bad_request)?;
    let checker = registry.lookup(monitor.config.type_name()).ok_or_else(|| bad_request(format!("unknown monitor type {}", monitor.config.type_name())))?;
    checker.validate(&monitor).map_err(bad_request)?;

    store::update_monitor(&conn, &monitor).map_err(internal)?;
    Ok(Json(monitor))
}

#[delete("/monitors/<id>")]
pub fn delete_monitor(id: &str, token: ManageToken, db: &State<Arc<Db>>) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = db.conn();
    verify_admin(&conn, &token.0)?;

    let deleted = store::delete_monitor(&conn, id).map_err(internal)?;
    if deleted == 0 {
        return Err(not_found("monitor not found"));
    }
    Ok(Json(serde_json::json!({ "message": "monitor deleted" })))
}
