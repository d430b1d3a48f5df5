use super::{verify_admin, ApiError};
use crate::auth::ManageToken;
use crate::db::Db;
use crate::scheduler::Scheduler;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use std::sync::Arc;

#[get("/scheduler/status")]
pub async fn scheduler_status(scheduler: &State<Scheduler>) -> Json<crate::scheduler::SchedulerStatus> {
    Json(scheduler.status().await)
}

#[post("/scheduler/start")]
pub async fn scheduler_start(token: ManageToken, db: &State<Arc<Db>>, scheduler: &State<Scheduler>) -> Result<Json<serde_json::Value>, ApiError> {
    {
        let conn = db.conn();
        verify_admin(&conn, &token.0)?;
    }
    scheduler.start().await;
    Ok(Json(serde_json::json!({ "message": "scheduler started" })))
}

#[post("/scheduler/stop")]
pub async fn scheduler_stop(token: ManageToken, db: &State<Arc<Db>>, scheduler: &State<Scheduler>) -> Result<Json<serde_json::Value>, ApiError> {
    {
        let conn = db.conn();
        verify_admin(&conn, &token.0)?;
    }
    scheduler.stop().await;
    Ok(Json(serde_json::json!({ "message": "scheduler stopped" })))
}

/// `GET /api/monitors/execute?period=due|all` — trigger one sweep
/// outside the tick loop's cadence.
#[get("/monitors/execute?<period>")]
pub async fn scheduler_execute(period: Option<&str>, token: ManageToken, db: &State<Arc<Db>>, scheduler: &State<Scheduler>) -> Result<Json<crate::executor::SweepSummary>, ApiError> {
    {
        let conn = db.conn();
        verify_admin(&conn, &token.0)?;
    }
    let all = matches!(period, Some("all"));
    Ok(Json(scheduler.trigger(all).await))
}
