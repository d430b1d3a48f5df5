#[macro_use]
extern crate rocket;

pub mod alert;
pub mod auth;
pub mod catchers;
pub mod checker;
pub mod classify;
pub mod db;
pub mod executor;
pub mod models;
pub mod notify;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;

use checker::Registry;
use db::Db;
use executor::Executor;
use scheduler::Scheduler;
use std::sync::Arc;

/// Assemble the Rocket instance. Shared by the binary entrypoint and
/// integration tests, which build their own `Db` pointed at a temp file
/// and pass it in here instead of reading `DATABASE_PATH`.
pub fn build_rocket(database: Arc<Db>) -> rocket::Rocket<rocket::Build> {
    let rate_limit = std::env::var("MONITOR_RATE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(10u32);
    let rate_limiter = routes::RateLimiter::new(rate_limit, 3600);

    let registry = Arc::new(Registry::new());
    let executor = Arc::new(Executor::new(database.clone(), registry.clone()));
    let scheduler = Scheduler::new(executor);

    let auto_start = std::env::var("AUTO_START_SCHEDULER").map(|v| v == "true").unwrap_or(false);
    let boot_scheduler = scheduler.clone();
    let retention_db = database.clone();

    rocket::build()
        .manage(database)
        .manage(registry)
        .manage(scheduler)
        .manage(rate_limiter)
        .register("/", catchers![
            catchers::bad_request,
            catchers::unauthorized,
            catchers::forbidden,
            catchers::not_found,
            catchers::unprocessable_entity,
            catchers::too_many_requests,
            catchers::internal_error,
        ])
        .mount("/api", routes![
            routes::create_monitor,
            routes::list_monitors,
            routes::get_monitor,
            routes::update_monitor,
            routes::delete_monitor,
            routes::scheduler_status,
            routes::scheduler_start,
            routes::scheduler_stop,
            routes::scheduler_execute,
        ])
        .attach(rocket::fairing::AdHoc::on_liftoff("Scheduler auto-start", move |_rocket| {
            Box::pin(async move {
                if auto_start {
                    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                    boot_scheduler.start().await;
                }
            })
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Observation retention sweep", move |_rocket| {
            Box::pin(async move {
                tokio::spawn(retention_loop(retention_db));
            })
        }))
}

/// Hourly retention sweep over `observations`, per SPEC_FULL.md §3's
/// 90-day (configurable) window — the teacher runs this same sweep
/// inline in its checker loop; here it's a standalone background task
/// so it keeps running independent of whether the Scheduler is started.
async fn retention_loop(db: Arc<Db>) {
    let days = std::env::var("HEARTBEAT_RETENTION_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(90u32);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        interval.tick().await;
        let deleted = {
            let conn = db.conn();
            store::prune_observations(&conn, days)
        };
        if deleted > 0 {
            eprintln!("🗑️ Retention: pruned {deleted} observations older than {days} days");
        }
    }
}
