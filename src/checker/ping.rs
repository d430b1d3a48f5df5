use super::Checker;
use crate::classify::classify;
use crate::models::{CheckResult, Monitor, MonitorTypeConfig, PingConfig, Status};
use std::time::Instant;
use tokio::process::Command;

pub struct PingChecker;

fn config(monitor: &Monitor) -> Result<&PingConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Ping(c) => Ok(c),
        other => Err(format!("expected ping config, got {}", other.type_name())),
    }
}

struct PingSummary {
    transmitted: u32,
    received: u32,
    avg_rtt_ms: Option<f64>,
}

/// Parses the output of the OS-native `ping` binary. Both the POSIX
/// (iputils/BSD) and Windows phrasing are covered; anything else falls
/// back to treating every reply line as one received packet.
fn parse_ping_output(stdout: &str, requested_count: u32) -> PingSummary {
    let mut transmitted = None;
    let mut received = None;
    let mut avg_rtt_ms = None;

    for line in stdout.lines() {
        let lower = line.to_lowercase();
        if lower.contains("packets transmitted") {
            // "4 packets transmitted, 4 received, 0% packet loss"
            let nums: Vec<u32> = line
                .split(|c: char| !c.is_ascii_digit())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            if let Some(&t) = nums.first() {
                transmitted = Some(t);
            }
            if lower.contains("received") {
                if let Some(&r) = nums.get(1) {
                    received = Some(r);
                }
            }
        } else if lower.contains("sent =") && lower.contains("received =") {
            // Windows: "Packets: Sent = 4, Received = 4, Lost = 0 (0% loss)"
            let nums: Vec<u32> = line
                .split(|c: char| !c.is_ascii_digit())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            if let Some(&s) = nums.first() {
                transmitted = Some(s);
            }
            if let Some(&r) = nums.get(1) {
                received = Some(r);
            }
        } else if lower.contains("min/avg/max") || lower.contains("minimum/maximum/average") {
            // POSIX: "rtt min/avg/max/mdev = 0.032/0.045/0.061/0.010 ms"
            if let Some(eq_pos) = line.find('=') {
                let rest = &line[eq_pos + 1..];
                let parts: Vec<&str> = rest.trim().split('/').collect();
                if parts.len() >= 2 {
                    avg_rtt_ms = parts[1].trim().split_whitespace().next().and_then(|s| s.parse().ok());
                }
            }
        } else if lower.contains("average =") {
            // Windows: "Minimum = 0ms, Maximum = 0ms, Average = 0ms"
            if let Some(idx) = lower.find("average =") {
                let rest = line[idx + "average =".len()..].trim_start();
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
                avg_rtt_ms = digits.trim().parse().ok();
            }
        }
    }

    PingSummary {
        transmitted: transmitted.unwrap_or(requested_count),
        received: received.unwrap_or(0),
        avg_rtt_ms,
    }
}

#[rocket::async_trait]
impl Checker for PingChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if monitor.target.trim().is_empty() {
            return Err("target must not be empty".to_string());
        }
        if cfg.count == 0 {
            return Err("count must be >= 1".to_string());
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c,
            Err(e) => return CheckResult::error(e),
        };

        let start = Instant::now();
        #[cfg(target_os = "windows")]
        let output = Command::new("ping")
            .arg("-n")
            .arg(cfg.count.to_string())
            .arg("-w")
            .arg(cfg.timeout_ms.to_string())
            .arg(&monitor.target)
            .output()
            .await;
        #[cfg(not(target_os = "windows"))]
        let output = Command::new("ping")
            .arg("-c")
            .arg(cfg.count.to_string())
            .arg("-W")
            .arg((cfg.timeout_ms / 1000).max(1).to_string())
            .arg(&monitor.target)
            .output()
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let output = match output {
            Ok(o) => o,
            Err(e) => return CheckResult::error(format!("failed to spawn ping: {e}")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let summary = parse_ping_output(&stdout, cfg.count);

        if summary.transmitted == 0 {
            return CheckResult::error("ping produced no transmitted packets");
        }

        result_from_summary(&summary, elapsed_ms, &monitor.thresholds)
    }
}

/// Builds the `CheckResult` from a parsed packet summary. `value` is
/// always the avg RTT — never the loss percentage — even when packet
/// loss is severe enough to force an alarm regardless of the RTT itself
/// (per the boundary rule: `received_fraction < 0.5` always alarms no
/// matter how fast the packets that did arrive were).
fn result_from_summary(summary: &PingSummary, elapsed_ms: u32, thresholds: &crate::models::Thresholds) -> CheckResult {
    let received_fraction = summary.received as f64 / summary.transmitted as f64;
    let avg_rtt = summary.avg_rtt_ms.unwrap_or(elapsed_ms as f64);

    if received_fraction < 0.5 {
        return CheckResult {
            success: false,
            value: Some(avg_rtt),
            status: Status::Alarm,
            message: format!(
                "{}/{} packets received ({:.0}% loss)",
                summary.received,
                summary.transmitted,
                (1.0 - received_fraction) * 100.0
            ),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({
                "transmitted": summary.transmitted,
                "received": summary.received,
            })),
        };
    }

    let status = classify(avg_rtt, thresholds);

    CheckResult {
        success: matches!(status, Status::Ok | Status::Warning),
        value: Some(avg_rtt),
        status,
        message: format!(
            "{}/{} packets received, avg rtt {:.1}ms",
            summary.received, summary.transmitted, avg_rtt
        ),
        response_time_ms: Some(elapsed_ms),
        status_code: None,
        timestamp: chrono::Utc::now(),
        metadata: Some(serde_json::json!({
            "transmitted": summary.transmitted,
            "received": summary.received,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_posix_packet_summary_and_rtt() {
        let out = "PING example.com (1.2.3.4): 56 data bytes\n\
                    --- example.com ping statistics ---\n\
                    4 packets transmitted, 4 packets received, 0% packet loss\n\
                    round-trip min/avg/max/stddev = 10.123/12.456/15.789/1.234 ms\n";
        let s = parse_ping_output(out, 4);
        assert_eq!(s.transmitted, 4);
        assert_eq!(s.received, 4);
        assert_eq!(s.avg_rtt_ms, Some(12.456));
    }

    #[test]
    fn parses_windows_packet_summary_and_rtt() {
        let out = "Packets: Sent = 4, Received = 1, Lost = 3 (75% loss),\n\
                    Minimum = 10ms, Maximum = 40ms, Average = 22ms\n";
        let s = parse_ping_output(out, 4);
        assert_eq!(s.transmitted, 4);
        assert_eq!(s.received, 1);
        assert_eq!(s.avg_rtt_ms, Some(22.0));
    }

    #[test]
    fn seventy_five_percent_loss_is_below_the_alarm_floor() {
        let out = "4 packets transmitted, 1 packets received, 75% packet loss\n";
        let s = parse_ping_output(out, 4);
        let received_fraction = s.received as f64 / s.transmitted as f64;
        assert!(received_fraction < 0.5, "75% loss must fall below the 50% ok/alarm line");
    }

    #[test]
    fn exactly_fifty_percent_loss_is_not_below_the_alarm_floor() {
        // Per the boundary rule, packet loss of exactly 50% is ok, not alarm —
        // the check site only alarms when received_fraction < 0.5.
        let out = "2 packets transmitted, 1 packets received, 50% packet loss\n";
        let s = parse_ping_output(out, 2);
        let received_fraction = s.received as f64 / s.transmitted as f64;
        assert!(!(received_fraction < 0.5));
    }

    #[test]
    fn forced_alarm_from_packet_loss_still_reports_avg_rtt_as_value() {
        // 4 sent, 1 received, avg=10ms: result is status=alarm, value=10 —
        // not the 75% loss figure.
        let out = "4 packets transmitted, 1 packets received, 75% packet loss\n\
                    round-trip min/avg/max/stddev = 9.000/10.000/11.000/1.000 ms\n";
        let summary = parse_ping_output(out, 4);
        let result = result_from_summary(&summary, 10, &crate::models::Thresholds::default());
        assert_eq!(result.status, Status::Alarm);
        assert_eq!(result.value, Some(10.0));
        assert!(!result.success);
    }
}
