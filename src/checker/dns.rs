use super::Checker;
use crate::classify::classify;
use crate::models::{CheckResult, DnsConfig, Monitor, MonitorTypeConfig, Status};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::time::{Duration, Instant};

pub struct DnsChecker;

fn config(monitor: &Monitor) -> Result<&DnsConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Dns(c) => Ok(c),
        other => Err(format!("expected dns config, got {}", other.type_name())),
    }
}

async fn resolve(resolver: &TokioAsyncResolver, hostname: &str, record_type: &str) -> Result<Vec<String>, String> {
    use hickory_resolver::proto::rr::RecordType;
    use hickory_resolver::Name;

    let name = Name::from_ascii(hostname).map_err(|e| format!("invalid hostname: {e}"))?;

    match record_type {
        "A" => {
            let response = resolver.ipv4_lookup(name.clone()).await.map_err(|e| e.to_string())?;
            Ok(response.iter().map(|ip| ip.to_string()).collect())
        }
        "AAAA" => {
            let response = resolver.ipv6_lookup(name.clone()).await.map_err(|e| e.to_string())?;
            Ok(response.iter().map(|ip| ip.to_string()).collect())
        }
        "MX" => {
            let response = resolver.mx_lookup(name.clone()).await.map_err(|e| e.to_string())?;
            Ok(response.iter().map(|mx| format!("{} {}", mx.preference(), mx.exchange())).collect())
        }
        "TXT" => {
            let response = resolver.txt_lookup(name.clone()).await.map_err(|e| e.to_string())?;
            Ok(response.iter().map(|txt| txt.to_string()).collect())
        }
        "NS" => {
            let response = resolver.ns_lookup(name.clone()).await.map_err(|e| e.to_string())?;
            Ok(response.iter().map(|ns| ns.to_string()).collect())
        }
        "CNAME" => {
            let response = resolver
                .lookup(name.clone(), RecordType::CNAME)
                .await
                .map_err(|e| e.to_string())?;
            Ok(response.record_iter().map(|r| r.data().to_string()).collect())
        }
        other => Err(format!("unsupported record type {other}")),
    }
}

#[rocket::async_trait]
impl Checker for DnsChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if cfg.hostname.trim().is_empty() {
            return Err("hostname must not be empty".to_string());
        }
        let rt = cfg.record_type.to_uppercase();
        if !matches!(rt.as_str(), "A" | "AAAA" | "MX" | "TXT" | "NS" | "CNAME") {
            return Err(format!("unsupported record_type {:?}", cfg.record_type));
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c.clone(),
            Err(e) => return CheckResult::error(e),
        };

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let record_type = cfg.record_type.to_uppercase();

        let start = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(monitor.timeout_seconds as u64),
            resolve(&resolver, &cfg.hostname, &record_type),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let values = match result {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return CheckResult::error(format!("DNS lookup failed: {e}")),
            Err(_) => return CheckResult::error("DNS lookup timed out"),
        };

        if values.is_empty() {
            return CheckResult::error(format!("no {record_type} records found for {}", cfg.hostname));
        }

        if let Some(ref expected) = cfg.expected {
            let expected_lower = expected.to_lowercase();
            let matched = values.iter().any(|v| {
                let v_lower = v.to_lowercase();
                v_lower == expected_lower || v_lower.trim_end_matches('.') == expected_lower.trim_end_matches('.')
            });
            if !matched {
                return CheckResult::error(format!("expected {:?}, got: {}", expected, values.join(", ")));
            }
        }

        let status = classify(elapsed_ms as f64, &monitor.thresholds);
        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(elapsed_ms as f64),
            status,
            message: format!("resolved in {elapsed_ms}ms: {}", values.join(", ")),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({ "record_type": record_type, "resolved_values": values })),
        }
    }
}
