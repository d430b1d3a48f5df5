use super::Checker;
use crate::classify::classify;
use crate::models::{ApiPostConfig, CheckResult, Monitor, MonitorTypeConfig, Status};
use std::time::{Duration, Instant};

pub struct ApiPostChecker;

fn config(monitor: &Monitor) -> Result<&ApiPostConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::ApiPost(c) => Ok(c),
        other => Err(format!("expected api_post config, got {}", other.type_name())),
    }
}

#[rocket::async_trait]
impl Checker for ApiPostChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        let target = monitor.target.trim().to_lowercase();
        if !target.starts_with("http://") && !target.starts_with("https://") {
            return Err("target must start with http:// or https://".to_string());
        }
        if !cfg.post_body.is_object() && !cfg.post_body.is_array() {
            return Err("post_body must be a JSON object or array".to_string());
        }
        if cfg.status_codes.is_empty() {
            return Err("status_codes must not be empty".to_string());
        }
        super::validate_status_codes(&cfg.status_codes)?;
        if let Some(ref p) = cfg.positive_pattern {
            super::case_insensitive_regex(p).map_err(|e| format!("invalid positive_pattern: {e}"))?;
        }
        if let Some(ref p) = cfg.negative_pattern {
            super::case_insensitive_regex(p).map_err(|e| format!("invalid negative_pattern: {e}"))?;
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c,
            Err(e) => return CheckResult::error(e),
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(monitor.timeout_seconds as u64))
            .build()
        {
            Ok(c) => c,
            Err(e) => return CheckResult::error(format!("failed to build http client: {e}")),
        };

        let start = Instant::now();
        let result = client
            .post(&monitor.target)
            .header("User-Agent", "MonitoringSystem/1.0")
            .json(&cfg.post_body)
            .send()
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                let msg = if e.is_timeout() {
                    "Request timed out".to_string()
                } else if e.is_connect() {
                    "Connection refused".to_string()
                } else {
                    format!("Request failed: {e}")
                };
                return CheckResult::error(msg);
            }
        };

        let status_code = resp.status().as_u16();
        if !cfg.status_codes.contains(&status_code) {
            return CheckResult {
                success: false,
                value: Some(elapsed_ms as f64),
                status: Status::Error,
                message: format!("unexpected status code {status_code}"),
                response_time_ms: Some(elapsed_ms),
                status_code: Some(status_code),
                timestamp: chrono::Utc::now(),
                metadata: None,
            };
        }

        if cfg.positive_pattern.is_some() || cfg.negative_pattern.is_some() {
            let body = match resp.text().await {
                Ok(b) => b,
                Err(e) => return CheckResult::error(format!("failed reading body: {e}")),
            };
            if let Some(ref pattern) = cfg.positive_pattern {
                let re = super::case_insensitive_regex(pattern).expect("validated at monitor creation");
                if !re.is_match(&body) {
                    return CheckResult::error("positive_pattern did not match body");
                }
            }
            if let Some(ref pattern) = cfg.negative_pattern {
                let re = super::case_insensitive_regex(pattern).expect("validated at monitor creation");
                if re.is_match(&body) {
                    return CheckResult::error("negative_pattern matched body");
                }
            }
        }

        let status = classify(elapsed_ms as f64, &monitor.thresholds);
        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(elapsed_ms as f64),
            status,
            message: format!("{status_code} in {elapsed_ms}ms"),
            response_time_ms: Some(elapsed_ms),
            status_code: Some(status_code),
            timestamp: chrono::Utc::now(),
            metadata: None,
        }
    }
}
