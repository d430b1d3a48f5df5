use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use rusqlite::params;
use sentrygrid::db::Db;
use std::net::TcpListener;
use std::sync::Arc;

const ADMIN_KEY: &str = "test-admin-key";

fn test_client() -> Client {
    let db_path = format!("/tmp/sentrygrid_test_{}.db", uuid::Uuid::new_v4());
    let database = Arc::new(Db::new(&db_path).expect("db init failed"));
    {
        let conn = database.conn();
        conn.execute(
            "UPDATE settings SET value = ?1 WHERE key = 'admin_key_hash'",
            params![sentrygrid::auth::hash_key(ADMIN_KEY)],
        )
        .unwrap();
    }
    let rocket = sentrygrid::build_rocket(database);
    Client::tracked(rocket).expect("valid rocket instance")
}

fn tcp_monitor_body(target: &str) -> serde_json::Value {
    let mut parts = target.rsplitn(2, ':');
    let port: u16 = parts.next().unwrap().parse().unwrap();
    let host = parts.next().unwrap();
    serde_json::json!({
        "name": format!("tcp-{target}"),
        "target": target,
        "config": { "type": "tcp", "host": host, "port": port },
        "consecutive_warning": 2,
        "consecutive_alarm": 2,
        "reset_after_m_ok": 1,
        "period_minutes": 1,
        "timeout_seconds": 5
    })
}

#[test]
fn create_monitor_requires_admin_key() {
    let client = test_client();
    let response = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .body(tcp_monitor_body("127.0.0.1:1").to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn create_then_get_then_list_then_delete_monitor() {
    let client = test_client();

    let create = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(tcp_monitor_body("127.0.0.1:9").to_string())
        .dispatch();
    assert_eq!(create.status(), Status::Ok);
    let created: serde_json::Value = serde_json::from_str(&create.into_string().unwrap()).unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "tcp-127.0.0.1:9");

    let get = client.get(format!("/api/monitors/{id}")).dispatch();
    assert_eq!(get.status(), Status::Ok);

    let list = client.get("/api/monitors").dispatch();
    assert_eq!(list.status(), Status::Ok);
    let monitors: Vec<serde_json::Value> = serde_json::from_str(&list.into_string().unwrap()).unwrap();
    assert_eq!(monitors.len(), 1);

    let delete = client.delete(format!("/api/monitors/{id}")).header(rocket::http::Header::new("X-API-Key", ADMIN_KEY)).dispatch();
    assert_eq!(delete.status(), Status::Ok);

    let missing = client.get(format!("/api/monitors/{id}")).dispatch();
    assert_eq!(missing.status(), Status::NotFound);
}

#[test]
fn rejects_a_monitor_whose_timeout_exceeds_its_period() {
    let client = test_client();
    let mut body = tcp_monitor_body("127.0.0.1:9");
    body["period_minutes"] = serde_json::json!(1);
    body["timeout_seconds"] = serde_json::json!(120);

    let response = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(body.to_string())
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn update_monitor_requires_admin_key_and_persists_changes() {
    let client = test_client();
    let create = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(tcp_monitor_body("127.0.0.1:9").to_string())
        .dispatch();
    let created: serde_json::Value = serde_json::from_str(&create.into_string().unwrap()).unwrap();
    let id = created["id"].as_str().unwrap();

    let unauthorized = client
        .put(format!("/api/monitors/{id}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "active": false }).to_string())
        .dispatch();
    assert_eq!(unauthorized.status(), Status::Unauthorized);

    let update = client
        .put(format!("/api/monitors/{id}"))
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(serde_json::json!({ "active": false }).to_string())
        .dispatch();
    assert_eq!(update.status(), Status::Ok);
    let updated: serde_json::Value = serde_json::from_str(&update.into_string().unwrap()).unwrap();
    assert_eq!(updated["active"], false);
}

#[test]
fn scheduler_status_reports_stopped_until_started() {
    let client = test_client();

    let status = client.get("/api/scheduler/status").dispatch();
    assert_eq!(status.status(), Status::Ok);
    let body: serde_json::Value = serde_json::from_str(&status.into_string().unwrap()).unwrap();
    assert_eq!(body["running"], false);

    let start_unauthorized = client.post("/api/scheduler/start").dispatch();
    assert_eq!(start_unauthorized.status(), Status::Unauthorized);

    let start = client.post("/api/scheduler/start").header(rocket::http::Header::new("X-API-Key", ADMIN_KEY)).dispatch();
    assert_eq!(start.status(), Status::Ok);

    let status = client.get("/api/scheduler/status").dispatch();
    let body: serde_json::Value = serde_json::from_str(&status.into_string().unwrap()).unwrap();
    assert_eq!(body["running"], true);

    let stop = client.post("/api/scheduler/stop").header(rocket::http::Header::new("X-API-Key", ADMIN_KEY)).dispatch();
    assert_eq!(stop.status(), Status::Ok);
}

/// End-to-end: a monitor pointed at a live local TCP listener comes up
/// `ok` after one execute sweep; pointed at a closed port, it counts as
/// a failure in the sweep summary.
#[test]
fn execute_all_drives_a_tcp_monitor_to_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });

    let client = test_client();
    let create = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(tcp_monitor_body(&addr.to_string()).to_string())
        .dispatch();
    assert_eq!(create.status(), Status::Ok);

    let execute = client
        .get("/api/monitors/execute?period=all")
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .dispatch();
    assert_eq!(execute.status(), Status::Ok);
    let summary: serde_json::Value = serde_json::from_str(&execute.into_string().unwrap()).unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["successful"], 1);
}

#[test]
fn execute_all_counts_a_closed_port_monitor_as_failed() {
    // bind then drop immediately to get a port nothing is listening on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = test_client();
    let mut body = tcp_monitor_body(&format!("127.0.0.1:{port}"));
    body["timeout_seconds"] = serde_json::json!(5);
    let create = client
        .post("/api/monitors")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .body(body.to_string())
        .dispatch();
    assert_eq!(create.status(), Status::Ok);

    let execute = client
        .get("/api/monitors/execute?period=all")
        .header(rocket::http::Header::new("X-API-Key", ADMIN_KEY))
        .dispatch();
    assert_eq!(execute.status(), Status::Ok);
    let summary: serde_json::Value = serde_json::from_str(&execute.into_string().unwrap()).unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["failed"], 1);
}
