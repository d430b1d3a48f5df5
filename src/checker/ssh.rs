use super::Checker;
use crate::classify::classify;
use crate::models::{CheckResult, Monitor, MonitorTypeConfig, SshConfig, Status};
use std::io::Read;
use std::net::TcpStream;
use std::time::{Duration, Instant};

pub struct SshChecker;

fn config(monitor: &Monitor) -> Result<&SshConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Ssh(c) => Ok(c),
        other => Err(format!("expected ssh config, got {}", other.type_name())),
    }
}

struct SshOutput {
    exit_status: i32,
    stdout: String,
    stderr: String,
}

/// Blocking SSH exec, run on a blocking-pool thread via `spawn_blocking` —
/// ssh2 has no async API, so this is the "OS threads with blocking I/O"
/// option the concurrency model explicitly allows (spec §5).
fn run_ssh_command(cfg: SshConfig, timeout: Duration) -> Result<SshOutput, String> {
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let tcp = TcpStream::connect(&addr).map_err(|e| format!("Connection refused: {e}"))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = ssh2::Session::new().map_err(|e| format!("ssh session init failed: {e}"))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis() as u32);
    session.handshake().map_err(|e| format!("ssh handshake failed: {e}"))?;

    if let Some(ref private_key) = cfg.private_key {
        let passphrase = cfg.passphrase.as_deref();
        session
            .userauth_pubkey_memory(&cfg.username, None, private_key, passphrase)
            .map_err(|e| format!("ssh key auth failed: {e}"))?;
    } else if let Some(ref password) = cfg.password {
        session
            .userauth_password(&cfg.username, password)
            .map_err(|e| format!("ssh password auth failed: {e}"))?;
    } else {
        return Err("ssh config requires either password or private_key".to_string());
    }

    let mut channel = session.channel_session().map_err(|e| format!("ssh channel open failed: {e}"))?;
    channel.exec(&cfg.command).map_err(|e| format!("ssh exec failed: {e}"))?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).map_err(|e| format!("ssh stdout read failed: {e}"))?;
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr).map_err(|e| format!("ssh stderr read failed: {e}"))?;

    channel.wait_close().ok();
    let exit_status = channel.exit_status().unwrap_or(-1);

    Ok(SshOutput { exit_status, stdout, stderr })
}

fn parse_metric(stdout: &str, label: &str) -> Option<f64> {
    let pattern = format!(r"(?i){label}[:\s=]+([\d.]+)%?");
    let re = regex::Regex::new(&pattern).ok()?;
    re.captures(stdout)?.get(1)?.as_str().parse().ok()
}

pub struct ParsedMetrics {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
}

fn parse_metrics(stdout: &str) -> ParsedMetrics {
    ParsedMetrics {
        cpu: parse_metric(stdout, "CPU"),
        memory: parse_metric(stdout, r"mem(?:ory)?"),
        disk: parse_metric(stdout, "disk"),
    }
}

#[rocket::async_trait]
impl Checker for SshChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if cfg.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if cfg.username.trim().is_empty() {
            return Err("username must not be empty".to_string());
        }
        if cfg.password.is_none() && cfg.private_key.is_none() {
            return Err("ssh config requires either password or private_key".to_string());
        }
        if cfg.command.trim().is_empty() {
            return Err("command must not be empty".to_string());
        }
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
            Ok(c) => c.clone(),
            Err(e) => return CheckResult::error(e),
        };
        let timeout = Duration::from_secs(monitor.timeout_seconds as u64);
        let positive_pattern = cfg.positive_pattern.clone();
        let negative_pattern = cfg.negative_pattern.clone();

        let start = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || run_ssh_command(cfg, timeout)).await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let output = match outcome {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return CheckResult::error(e),
            Err(e) => return CheckResult::error(format!("ssh task panicked: {e}")),
        };

        if output.exit_status != 0 {
            let tail: String = output.stderr.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n");
            return CheckResult::error(format!("command exited {}: {}", output.exit_status, tail));
        }

        if let Some(ref pattern) = positive_pattern {
            let re = super::case_insensitive_regex(pattern).expect("validated at monitor creation");
            if !re.is_match(&output.stdout) {
                return CheckResult::error("positive_pattern did not match stdout");
            }
        }
        if let Some(ref pattern) = negative_pattern {
            let re = super::case_insensitive_regex(pattern).expect("validated at monitor creation");
            if re.is_match(&output.stdout) {
                return CheckResult::error("negative_pattern matched stdout");
            }
        }

        let metrics = parse_metrics(&output.stdout);
        let primary_value = metrics.cpu.or(metrics.memory).or(metrics.disk).unwrap_or(elapsed_ms as f64);
        let status = classify(primary_value, &monitor.thresholds);

        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(primary_value),
            status,
            message: format!("command ok in {elapsed_ms}ms"),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({
                "cpu": metrics.cpu,
                "memory": metrics.memory,
                "disk": metrics.disk,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_metrics_reads_labelled_percentages_case_insensitively() {
        let m = parse_metrics("CPU: 42.5%\nMemory: 88%\ndisk: 12.0%\n");
        assert_eq!(m.cpu, Some(42.5));
        assert_eq!(m.memory, Some(88.0));
        assert_eq!(m.disk, Some(12.0));
    }

    #[test]
    fn parse_metrics_tolerates_missing_fields() {
        let m = parse_metrics("uptime: 10 days\nload average: 0.5\n");
        assert_eq!(m.cpu, None);
        assert_eq!(m.memory, None);
        assert_eq!(m.disk, None);
    }

    #[test]
    fn parse_metric_handles_equals_sign_form() {
        assert_eq!(parse_metric("cpu=97.1", "CPU"), Some(97.1));
    }
}
