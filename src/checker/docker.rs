use super::Checker;
use crate::models::{CheckResult, DockerConfig, DockerConnection, Monitor, MonitorTypeConfig, SshTarget, Status};
use bollard::container::{ListContainersOptions, StatsOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;
use std::time::{Duration, Instant};

pub struct DockerChecker;

fn config(monitor: &Monitor) -> Result<&DockerConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Docker(c) => Ok(c),
        other => Err(format!("expected docker config, got {}", other.type_name())),
    }
}

#[derive(Debug, Default, Clone)]
struct ContainerSample {
    name: String,
    state: String,
    health: Option<String>,
    restart_count: u32,
    cpu_pct: f64,
    memory_pct: f64,
}

fn matches_filters(name: &str, id: &str, image: &str, cfg: &DockerConfig) -> bool {
    cfg.name_filter.as_ref().map(|f| name.contains(f.as_str())).unwrap_or(true)
        && cfg.id_filter.as_ref().map(|f| id.starts_with(f.as_str())).unwrap_or(true)
        && cfg.image_filter.as_ref().map(|f| image.contains(f.as_str())).unwrap_or(true)
}

async fn sample_via_bollard(docker: Docker, cfg: &DockerConfig) -> Result<Vec<ContainerSample>, String> {
    let containers = docker
        .list_containers(Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        }))
        .await
        .map_err(|e| format!("failed to list containers: {e}"))?;

    let mut samples = Vec::new();
    for c in containers {
        let id = c.id.clone().unwrap_or_default();
        let name = c
            .names
            .as_ref()
            .and_then(|n| n.first())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.clone());
        let image = c.image.clone().unwrap_or_default();
        if !matches_filters(&name, &id, &image, cfg) {
            continue;
        }

        let inspect = docker
            .inspect_container(&id, None)
            .await
            .map_err(|e| format!("failed to inspect {name}: {e}"))?;
        let state = inspect.state.as_ref();
        let status_str = state
            .and_then(|s| s.status)
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let health = state
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(|s| format!("{s:?}").to_lowercase());
        let restart_count = state.and_then(|s| s.restart_count).unwrap_or(0).max(0) as u32;

        let mut cpu_pct = 0.0;
        let mut memory_pct = 0.0;
        let mut stream = docker.stats(
            &id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );
        if let Some(Ok(stats)) = stream.next().await {
            let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
                - stats.precpu_stats.cpu_usage.total_usage as f64;
            let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
                - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
            let online_cpus = stats
                .cpu_stats
                .online_cpus
                .or_else(|| stats.cpu_stats.cpu_usage.percpu_usage.as_ref().map(|v| v.len() as u64))
                .unwrap_or(1) as f64;
            if system_delta > 0.0 && cpu_delta > 0.0 {
                cpu_pct = (cpu_delta / system_delta) * online_cpus * 100.0;
            }
            if let Some(limit) = stats.memory_stats.limit {
                if limit > 0 {
                    memory_pct = stats.memory_stats.usage.unwrap_or(0) as f64 / limit as f64 * 100.0;
                }
            }
        }

        samples.push(ContainerSample {
            name,
            state: status_str,
            health,
            restart_count,
            cpu_pct,
            memory_pct,
        });
    }
    Ok(samples)
}

fn sample_via_ssh(target: SshTarget, cfg: DockerConfig, timeout: Duration) -> Result<Vec<ContainerSample>, String> {
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
    channel
        .exec(r#"docker ps -a --format "{{.ID}}|{{.Names}}|{{.Image}}|{{.Status}}""#)
        .map_err(|e| format!("ssh exec failed: {e}"))?;
    let mut ps_out = String::new();
    channel.read_to_string(&mut ps_out).map_err(|e| format!("ssh read failed: {e}"))?;
    channel.wait_close().ok();

    let mut stats_by_name: HashMap<String, (f64, f64)> = HashMap::new();
    let mut stats_channel = session.channel_session().map_err(|e| format!("ssh channel open failed: {e}"))?;
    stats_channel
        .exec(r#"docker stats --no-stream --format "{{.Name}}|{{.CPUPerc}}|{{.MemPerc}}""#)
        .map_err(|e| format!("ssh exec failed: {e}"))?;
    let mut stats_out = String::new();
    stats_channel
        .read_to_string(&mut stats_out)
        .map_err(|e| format!("ssh read failed: {e}"))?;
    stats_channel.wait_close().ok();

    for line in stats_out.lines() {
        let parts: Vec<&str> = line.splitn(3, '|').collect();
        if parts.len() == 3 {
            let cpu = parts[1].trim_end_matches('%').parse().unwrap_or(0.0);
            let mem = parts[2].trim_end_matches('%').parse().unwrap_or(0.0);
            stats_by_name.insert(parts[0].to_string(), (cpu, mem));
        }
    }

    let mut samples = Vec::new();
    for line in ps_out.lines() {
        let parts: Vec<&str> = line.splitn(4, '|').collect();
        if parts.len() != 4 {
            continue;
        }
        let (id, name, image, status_line) = (parts[0], parts[1], parts[2], parts[3]);
        if !matches_filters(name, id, image, &cfg) {
            continue;
        }
        let (cpu_pct, memory_pct) = stats_by_name.get(name).copied().unwrap_or((0.0, 0.0));
        samples.push(ContainerSample {
            name: name.to_string(),
            state: status_line.to_lowercase(),
            health: None,
            restart_count: 0,
            cpu_pct,
            memory_pct,
        });
    }
    Ok(samples)
}

#[rocket::async_trait]
impl Checker for DockerChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if let DockerConnection::RemoteTcp { host, .. } = &cfg.connection {
            if host.trim().is_empty() {
                return Err("remote_tcp connection requires host".to_string());
            }
        }
        if let DockerConnection::Ssh(target) = &cfg.connection {
            if target.host.trim().is_empty() || target.username.trim().is_empty() {
                return Err("ssh connection requires host and username".to_string());
            }
            if target.password.is_none() && target.private_key.is_none() {
                return Err("ssh connection requires either password or private_key".to_string());
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
        let samples = match cfg.connection.clone() {
            DockerConnection::LocalSocket { path } => {
                let docker = match path {
                    Some(p) => Docker::connect_with_socket(&p, 120, bollard::API_DEFAULT_VERSION),
                    None => Docker::connect_with_socket_defaults(),
                };
                match docker {
                    Ok(d) => sample_via_bollard(d, &cfg).await,
                    Err(e) => Err(format!("failed to connect to docker socket: {e}")),
                }
            }
            DockerConnection::RemoteTcp { host, port } => {
                let addr = format!("tcp://{host}:{port}");
                match Docker::connect_with_http(&addr, 120, bollard::API_DEFAULT_VERSION) {
                    Ok(d) => sample_via_bollard(d, &cfg).await,
                    Err(e) => Err(format!("failed to connect to docker daemon: {e}")),
                }
            }
            DockerConnection::Ssh(target) => {
                let cfg_clone = cfg.clone();
                tokio::task::spawn_blocking(move || sample_via_ssh(target, cfg_clone, timeout))
                    .await
                    .unwrap_or_else(|e| Err(format!("docker ssh task panicked: {e}")))
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let samples = match samples {
            Ok(s) => s,
            Err(e) => return CheckResult::error(e),
        };

        if samples.is_empty() {
            return CheckResult::error("no containers matched the configured filters");
        }

        aggregate(&samples, &cfg, elapsed_ms)
    }
}

/// Folds every sampled container's state/health/restart-count/resource
/// usage into one status per §4.C: not-running or unhealthy or
/// over-critical-usage → alarm; over-warning-usage, `health=starting`, or
/// restart-count over the limit → warning. Alarm always wins — once a
/// worse condition sets alarm, a later warning-tier condition for a
/// different container must not downgrade it back to warning.
fn aggregate(samples: &[ContainerSample], cfg: &DockerConfig, elapsed_ms: u32) -> CheckResult {
    let mut status = Status::Ok;
    let mut reasons = Vec::new();
    let mut worst_value = 0.0f64;

    for s in samples {
        if !s.state.contains("up") && !s.state.contains("running") {
            status = Status::Alarm;
            reasons.push(format!("{} is {}", s.name, s.state));
            continue;
        }
        if let Some(ref h) = s.health {
            if h == "unhealthy" {
                status = Status::Alarm;
                reasons.push(format!("{} is unhealthy", s.name));
            } else if h == "starting" && status != Status::Alarm {
                status = Status::Warning;
                reasons.push(format!("{} health check is starting", s.name));
            }
        }
        if s.restart_count >= cfg.restart_count_limit && status != Status::Alarm {
            status = Status::Warning;
            reasons.push(format!("{} restarted {} times", s.name, s.restart_count));
        }
        if s.cpu_pct >= cfg.cpu_alarm_pct || s.memory_pct >= cfg.memory_alarm_pct {
            status = Status::Alarm;
            reasons.push(format!("{} cpu={:.1}% mem={:.1}%", s.name, s.cpu_pct, s.memory_pct));
        } else if (s.cpu_pct >= cfg.cpu_warning_pct || s.memory_pct >= cfg.memory_warning_pct)
            && status != Status::Alarm
        {
            status = Status::Warning;
            reasons.push(format!("{} cpu={:.1}% mem={:.1}%", s.name, s.cpu_pct, s.memory_pct));
        }
        worst_value = worst_value.max(s.cpu_pct).max(s.memory_pct);
    }

    CheckResult {
        success: matches!(status, Status::Ok | Status::Warning),
        value: Some(worst_value),
        status,
        message: if reasons.is_empty() {
            format!("{} containers healthy", samples.len())
        } else {
            reasons.join("; ")
        },
        response_time_ms: Some(elapsed_ms),
        status_code: None,
        timestamp: chrono::Utc::now(),
        metadata: Some(serde_json::json!({
            "containers": samples.iter().map(|s| serde_json::json!({
                "name": s.name,
                "state": s.state,
                "health": s.health,
                "restart_count": s.restart_count,
                "cpu_pct": s.cpu_pct,
                "memory_pct": s.memory_pct,
            })).collect::<Vec<_>>(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DockerConfig {
        DockerConfig {
            connection: DockerConnection::LocalSocket { path: None },
            name_filter: None,
            id_filter: None,
            image_filter: None,
            cpu_warning_pct: 70.0,
            cpu_alarm_pct: 90.0,
            memory_warning_pct: 70.0,
            memory_alarm_pct: 90.0,
            restart_count_limit: 3,
        }
    }

    fn sample(name: &str) -> ContainerSample {
        ContainerSample { name: name.into(), state: "running".into(), health: None, restart_count: 0, cpu_pct: 10.0, memory_pct: 10.0 }
    }

    #[test]
    fn restart_count_over_limit_is_warning_not_alarm() {
        let s = ContainerSample { restart_count: 5, ..sample("flaky") };
        let result = aggregate(&[s], &cfg(), 10);
        assert_eq!(result.status, Status::Warning);
        assert!(result.success);
    }

    #[test]
    fn restart_count_over_limit_does_not_downgrade_an_existing_alarm() {
        let dead = ContainerSample { state: "exited".into(), ..sample("dead") };
        let flaky = ContainerSample { restart_count: 5, ..sample("flaky") };
        let result = aggregate(&[dead, flaky], &cfg(), 10);
        assert_eq!(result.status, Status::Alarm);
    }

    #[test]
    fn not_running_container_is_alarm() {
        let s = ContainerSample { state: "exited".into(), ..sample("down") };
        let result = aggregate(&[s], &cfg(), 10);
        assert_eq!(result.status, Status::Alarm);
        assert!(!result.success);
    }
}
