use super::Checker;
use crate::models::{CheckResult, LogConfig, LogPattern, Monitor, MonitorTypeConfig, SshTarget, Status};
use std::io::{Read, Seek, SeekFrom};
use std::net::TcpStream;
use std::time::{Duration, Instant};

pub struct LogChecker;

const SLIDING_WINDOW_BYTES: u64 = 5 * 1024 * 1024;

fn config(monitor: &Monitor) -> Result<&LogConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Log(c) => Ok(c),
        other => Err(format!("expected log config, got {}", other.type_name())),
    }
}

/// Built-in catalogue of common failure signatures, one entry per
/// category named in §4.C. User-supplied `extra_patterns` are appended
/// and checked in the same pass, so a custom pattern overrides nothing
/// but simply adds more hits.
fn builtin_patterns() -> Vec<LogPattern> {
    vec![
        LogPattern {
            pattern: r"(?i)out of memory|oom[-_ ]?killer|java\.lang\.OutOfMemoryError".to_string(),
            category: "Memory".to_string(),
            severity: "critical".to_string(),
            remediation: "Investigate memory usage and consider raising limits".to_string(),
        },
        LogPattern {
            pattern: r"(?i)disk full|no space left on device|enospc".to_string(),
            category: "Disk".to_string(),
            severity: "critical".to_string(),
            remediation: "Free disk space or expand the volume".to_string(),
        },
        LogPattern {
            pattern: r"(?i)deadlock detected|deadlock found".to_string(),
            category: "Deadlock".to_string(),
            severity: "critical".to_string(),
            remediation: "Review lock ordering in the affected transactions".to_string(),
        },
        LogPattern {
            pattern: r"(?i)connection refused|connection reset|connection timed? ?out|broken pipe".to_string(),
            category: "Connectivity".to_string(),
            severity: "high".to_string(),
            remediation: "Check upstream/downstream service availability".to_string(),
        },
        LogPattern {
            pattern: r"(?i)permission denied|access denied|eacces".to_string(),
            category: "Permission".to_string(),
            severity: "high".to_string(),
            remediation: "Check file/service permissions and the running user".to_string(),
        },
        LogPattern {
            pattern: r"(?i)database error|sql error|deadlock victim|connection pool exhausted".to_string(),
            category: "Database".to_string(),
            severity: "high".to_string(),
            remediation: "Inspect the database server and connection pool health".to_string(),
        },
        LogPattern {
            pattern: r"(?i)\b(5\d\d)\b.*(error|internal server)|internal server error".to_string(),
            category: "5xx".to_string(),
            severity: "high".to_string(),
            remediation: "Check the upstream service's error logs".to_string(),
        },
        LogPattern {
            pattern: r"(?i)certificate (expired|verify failed|has expired)|ssl handshake failed|x509".to_string(),
            category: "Certificate".to_string(),
            severity: "high".to_string(),
            remediation: "Check certificate validity and the TLS chain".to_string(),
        },
        LogPattern {
            pattern: r"(?i)not found|404".to_string(),
            category: "NotFound".to_string(),
            severity: "medium".to_string(),
            remediation: "Confirm the requested resource or route still exists".to_string(),
        },
        LogPattern {
            pattern: r"(?i)\berror\b".to_string(),
            category: "General".to_string(),
            severity: "medium".to_string(),
            remediation: "Review the surrounding log context".to_string(),
        },
    ]
}

fn read_local_tail(path: &str, tail_lines: u32) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| format!("failed to open {path}: {e}"))?;
    let len = file.metadata().map_err(|e| format!("failed to stat {path}: {e}"))?.len();

    let start = if len > SLIDING_WINDOW_BYTES { len - SLIDING_WINDOW_BYTES } else { 0 };
    file.seek(SeekFrom::Start(start)).map_err(|e| format!("seek failed: {e}"))?;

    let mut buf = String::new();
    file.read_to_string(&mut buf).map_err(|e| format!("read failed: {e}"))?;

    let tail: Vec<&str> = buf.lines().rev().take(tail_lines as usize).collect();
    Ok(tail.into_iter().rev().collect::<Vec<_>>().join("\n"))
}

fn read_remote_tail(target: SshTarget, path: String, tail_lines: u32, timeout: Duration) -> Result<String, String> {
    let addr = format!("{}:{}", target.host, target.port);
    let tcp = TcpStream::connect(&addr).map_err(|e| format!("Connection refused: {e}"))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = ssh2::Session::new().map_err(|e| format!("ssh session init failed: {e}"))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis() as u32);
    session.handshake().map_err(|e| format!("ssh handshake failed: {e}"))?;

    if let Some(ref private_key) = target.private_key {
        session
            .userauth_pubkey_memory(&target.username, None, private_key, None)
            .map_err(|e| format!("ssh key auth failed: {e}"))?;
    } else if let Some(ref password) = target.password {
        session
            .userauth_password(&target.username, password)
            .map_err(|e| format!("ssh password auth failed: {e}"))?;
    } else {
        return Err("ssh target requires either password or private_key".to_string());
    }

    let mut channel = session.channel_session().map_err(|e| format!("ssh channel open failed: {e}"))?;
    let command = format!("tail -n {tail_lines} {path}");
    channel.exec(&command).map_err(|e| format!("ssh exec failed: {e}"))?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).map_err(|e| format!("ssh stdout read failed: {e}"))?;
    channel.wait_close().ok();

    Ok(stdout)
}

#[rocket::async_trait]
impl Checker for LogChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if cfg.path.trim().is_empty() {
            return Err("path must not be empty".to_string());
        }
        if let Some(ref ssh) = cfg.ssh {
            if ssh.host.trim().is_empty() || ssh.username.trim().is_empty() {
                return Err("ssh target requires host and username".to_string());
            }
            if ssh.password.is_none() && ssh.private_key.is_none() {
                return Err("ssh target requires either password or private_key".to_string());
            }
        }
        for p in &cfg.extra_patterns {
            regex::Regex::new(&p.pattern).map_err(|e| format!("invalid pattern {:?}: {e}", p.pattern))?;
            if !matches!(p.severity.as_str(), "critical" | "high" | "medium") {
                return Err(format!("pattern severity must be critical/high/medium, got {:?}", p.severity));
            }
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c.clone(),
            Err(e) => return CheckResult::error(e),
        };
        let timeout = Duration::from_secs(monitor.timeout_seconds as u64);

        let start = Instant::now();
        let text_result = if let Some(ssh) = cfg.ssh.clone() {
            let path = cfg.path.clone();
            let tail_lines = cfg.tail_lines;
            tokio::task::spawn_blocking(move || read_remote_tail(ssh, path, tail_lines, timeout))
                .await
                .unwrap_or_else(|e| Err(format!("log task panicked: {e}")))
        } else {
            let path = cfg.path.clone();
            let tail_lines = cfg.tail_lines;
            tokio::task::spawn_blocking(move || read_local_tail(&path, tail_lines))
                .await
                .unwrap_or_else(|e| Err(format!("log task panicked: {e}")))
        };
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let text = match text_result {
            Ok(t) => t,
            Err(e) => return CheckResult::error(e),
        };

        let mut patterns = builtin_patterns();
        patterns.extend(cfg.extra_patterns.clone());

        let mut critical_count = 0u32;
        let mut high_count = 0u32;
        let mut medium_count = 0u32;
        let mut hits: Vec<serde_json::Value> = Vec::new();

        for pattern in &patterns {
            let re = match super::case_insensitive_regex(&pattern.pattern) {
                Ok(re) => re,
                Err(_) => continue,
            };
            let count = re.find_iter(&text).count();
            if count == 0 {
                continue;
            }
            match pattern.severity.as_str() {
                "critical" => critical_count += count as u32,
                "high" => high_count += count as u32,
                "medium" => medium_count += count as u32,
                _ => {}
            }
            hits.push(serde_json::json!({
                "category": pattern.category,
                "severity": pattern.severity,
                "count": count,
                "remediation": pattern.remediation,
            }));
        }

        let status = if critical_count > 0 {
            Status::Alarm
        } else if high_count > 0 || medium_count > 0 {
            Status::Warning
        } else {
            Status::Ok
        };
        let primary_value = (critical_count + high_count) as f64;

        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(primary_value),
            status,
            message: format!(
                "{critical_count} critical, {high_count} high, {medium_count} medium matches in last {} lines",
                cfg.tail_lines
            ),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({ "hits": hits })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits_for(text: &str) -> Vec<(String, String)> {
        builtin_patterns()
            .into_iter()
            .filter_map(|p| {
                let re = super::super::case_insensitive_regex(&p.pattern).ok()?;
                if re.is_match(text) {
                    Some((p.category, p.severity))
                } else {
                    None
                }
            })
            .collect()
    }

    #[test]
    fn out_of_memory_line_hits_the_memory_critical_pattern() {
        let hits = hits_for("2026-07-29T00:00:00 worker-3 java.lang.OutOfMemoryError: Java heap space");
        assert!(hits.iter().any(|(cat, sev)| cat == "Memory" && sev == "critical"));
    }

    #[test]
    fn plain_error_word_only_hits_the_general_medium_pattern() {
        let hits = hits_for("2026-07-29T00:00:00 request failed: error processing payload");
        assert!(hits.iter().any(|(cat, sev)| cat == "General" && sev == "medium"));
        assert!(!hits.iter().any(|(cat, _)| cat == "Memory"));
    }

    #[test]
    fn connection_refused_hits_connectivity_high() {
        let hits = hits_for("upstream dial failed: connection refused");
        assert!(hits.iter().any(|(cat, sev)| cat == "Connectivity" && sev == "high"));
    }

    #[test]
    fn certificate_expired_hits_certificate_high() {
        let hits = hits_for("TLS handshake error: certificate has expired");
        assert!(hits.iter().any(|(cat, sev)| cat == "Certificate" && sev == "high"));
    }
}
