use super::Checker;
use crate::classify::classify;
use crate::models::{CheckResult, Monitor, MonitorTypeConfig, Status, TcpConfig};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

pub struct TcpChecker;

fn config(monitor: &Monitor) -> Result<&TcpConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Tcp(c) => Ok(c),
        other => Err(format!("expected tcp config, got {}", other.type_name())),
    }
}

#[rocket::async_trait]
impl Checker for TcpChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if cfg.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c,
            Err(e) => return CheckResult::error(e),
        };

        let addr = format!("{}:{}", cfg.host, cfg.port);
        let start = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(monitor.timeout_seconds as u64),
            TcpStream::connect(&addr),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        match result {
            Ok(Ok(_stream)) => {
                let status = classify(elapsed_ms as f64, &monitor.thresholds);
                CheckResult {
                    success: matches!(status, Status::Ok | Status::Warning),
                    value: Some(elapsed_ms as f64),
                    status,
                    message: format!("connected in {elapsed_ms}ms"),
                    response_time_ms: Some(elapsed_ms),
                    status_code: None,
                    timestamp: chrono::Utc::now(),
                    metadata: None,
                }
            }
            Ok(Err(e)) => {
                let msg = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    "Connection refused".to_string()
                } else {
                    format!("TCP connect failed: {e}")
                };
                CheckResult::error(msg)
            }
            Err(_) => CheckResult::error("TCP connect timed out"),
        }
    }
}
