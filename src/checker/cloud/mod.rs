//! Cloud metric checkers — aws/gcp/azure. Rather than pull in the
//! official (and heavy) SDK for each provider, these checkers speak the
//! providers' plain REST metric APIs directly: CloudWatch's
//! `GetMetricData`, Cloud Monitoring's `timeSeries.list`, and Azure
//! Monitor's `metrics` endpoint, each reached with a signed/authenticated
//! `reqwest` call. See DESIGN.md for why.

use super::Checker;
use crate::classify::classify;
use crate::models::{CheckResult, CloudConfig, Monitor, MonitorTypeConfig, Status};
use std::time::{Duration, Instant};

mod aws;
mod azure;
mod gcp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Aws,
    Gcp,
    Azure,
}

pub struct CloudChecker {
    provider: Provider,
}

impl CloudChecker {
    pub fn aws() -> CloudChecker {
        CloudChecker { provider: Provider::Aws }
    }
    pub fn gcp() -> CloudChecker {
        CloudChecker { provider: Provider::Gcp }
    }
    pub fn azure() -> CloudChecker {
        CloudChecker { provider: Provider::Azure }
    }
}

fn config<'a>(monitor: &'a Monitor, provider: Provider) -> Result<&'a CloudConfig, String> {
    match (&monitor.config, provider) {
        (MonitorTypeConfig::Aws(c), Provider::Aws) => Ok(c),
        (MonitorTypeConfig::Gcp(c), Provider::Gcp) => Ok(c),
        (MonitorTypeConfig::Azure(c), Provider::Azure) => Ok(c),
        (other, _) => Err(format!("expected {:?} config, got {}", provider, other.type_name())),
    }
}

/// A metric's recent samples reduced to the shape the dashboard wants.
pub struct MetricSummary {
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        }
    }
}

/// Trend compares the mean of the most recent half of the window against
/// the mean of the older half, not the single last sample against the
/// overall average — a single noisy datapoint shouldn't flip the trend.
fn trend_of(datapoints: &[f64]) -> Trend {
    if datapoints.len() < 2 {
        return Trend::Flat;
    }
    let mid = datapoints.len() / 2;
    let (older, recent) = datapoints.split_at(mid);
    let older_avg = older.iter().sum::<f64>() / older.len() as f64;
    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

    if older_avg.abs() < f64::EPSILON {
        return Trend::Flat;
    }
    let delta = (recent_avg - older_avg) / older_avg;
    if delta > 0.10 {
        Trend::Up
    } else if delta < -0.10 {
        Trend::Down
    } else {
        Trend::Flat
    }
}

fn summarize(datapoints: &[f64]) -> Option<MetricSummary> {
    if datapoints.is_empty() {
        return None;
    }
    let current = *datapoints.last().unwrap();
    let average = datapoints.iter().sum::<f64>() / datapoints.len() as f64;
    let min = datapoints.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = datapoints.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let trend = trend_of(datapoints);

    Some(MetricSummary { current, average, min, max, trend })
}

/// Best-effort advisory hook: a cloud checker may ask for a short,
/// free-text recommendation alongside a metric breach. No built-in
/// implementation calls out to anything; a deployment wires its own.
#[rocket::async_trait]
pub trait AdvisorySink: Send + Sync {
    async fn advise(&self, resource_id: &str, metric: &str, summary: &MetricSummary) -> Option<String>;
}

pub struct NoopAdvisorySink;

#[rocket::async_trait]
impl AdvisorySink for NoopAdvisorySink {
    async fn advise(&self, _resource_id: &str, _metric: &str, _summary: &MetricSummary) -> Option<String> {
        None
    }
}

#[rocket::async_trait]
impl Checker for CloudChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor, self.provider)?;
        if cfg.resource_id.trim().is_empty() {
            return Err("resource_id must not be empty".to_string());
        }
        if !cfg.credentials.is_object() {
            return Err("credentials must be a JSON object".to_string());
        }
        match self.provider {
            Provider::Aws => aws::validate_credentials(&cfg.credentials),
            Provider::Gcp => gcp::validate_credentials(&cfg.credentials),
            Provider::Azure => azure::validate_credentials(&cfg.credentials),
        }
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor, self.provider) {
            Ok(c) => c.clone(),
            Err(e) => return CheckResult::error(e),
        };
        let timeout = Duration::from_secs(monitor.timeout_seconds as u64);
        let metric = cfg.metric.clone().unwrap_or_else(|| default_metric(self.provider).to_string());

        let start = Instant::now();
        let fetch = async {
            match self.provider {
                Provider::Aws => aws::fetch_datapoints(&cfg, &metric).await,
                Provider::Gcp => gcp::fetch_datapoints(&cfg, &metric).await,
                Provider::Azure => azure::fetch_datapoints(&cfg, &metric).await,
            }
        };
        let result = tokio::time::timeout(timeout, fetch).await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let datapoints = match result {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => return CheckResult::error(e),
            Err(_) => return CheckResult::error("cloud metric fetch timed out"),
        };

        let summary = match summarize(&datapoints) {
            Some(s) => s,
            None => return CheckResult::error(format!("no datapoints returned for {metric}")),
        };

        let status = classify(summary.current, &monitor.thresholds);

        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(summary.current),
            status,
            message: format!(
                "{metric}={:.2} (avg {:.2}, trend {})",
                summary.current,
                summary.average,
                summary.trend.as_str()
            ),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({
                "resource_id": cfg.resource_id,
                "metric": metric,
                "current": summary.current,
                "average": summary.average,
                "min": summary.min,
                "max": summary.max,
                "trend": summary.trend.as_str(),
            })),
        }
    }
}

fn default_metric(provider: Provider) -> &'static str {
    match provider {
        Provider::Aws => "CPUUtilization",
        Provider::Gcp => "compute.googleapis.com/instance/cpu/utilization",
        Provider::Azure => "Percentage CPU",
    }
}
