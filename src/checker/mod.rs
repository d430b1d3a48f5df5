//! Checker contract & registry — component B. A checker is a `validate` +
//! `check` pair keyed by monitor type; the registry is a process-wide
//! table populated once at startup, mirroring the spec's "compile the
//! table statically at startup" redesign note (§9).

mod api_post;
mod certificate;
pub mod cloud;
mod docker;
mod dns;
mod log;
mod ping;
mod ssh;
mod tcp;
mod url;

use crate::models::{CheckResult, Monitor};
use std::collections::HashMap;
use std::time::Duration;

#[rocket::async_trait]
pub trait Checker: Send + Sync {
    /// Static, synchronous validation of a monitor's config for this
    /// checker's type. Called once at monitor creation/update time.
    fn validate(&self, monitor: &Monitor) -> Result<(), String>;

    /// Probe the target. May suspend for network/file/process I/O up to
    /// `monitor.timeout_seconds` — the Executor also enforces this bound
    /// independently, so a checker that ignores it is still capped.
    async fn check(&self, monitor: &Monitor) -> CheckResult;
}

/// Process-wide `type -> checker` table, built once before the Scheduler
/// starts and never mutated afterward.
pub struct Registry {
    checkers: HashMap<&'static str, Box<dyn Checker>>,
}

impl Registry {
    pub fn new() -> Registry {
        let mut checkers: HashMap<&'static str, Box<dyn Checker>> = HashMap::new();
        checkers.insert("url", Box::new(url::UrlChecker));
        checkers.insert("api_post", Box::new(api_post::ApiPostChecker));
        checkers.insert("ssh", Box::new(ssh::SshChecker));
        checkers.insert("ping", Box::new(ping::PingChecker));
        checkers.insert("log", Box::new(log::LogChecker));
        checkers.insert("certificate", Box::new(certificate::CertificateChecker));
        checkers.insert("docker", Box::new(docker::DockerChecker));
        checkers.insert("aws", Box::new(cloud::CloudChecker::aws()));
        checkers.insert("gcp", Box::new(cloud::CloudChecker::gcp()));
        checkers.insert("azure", Box::new(cloud::CloudChecker::azure()));
        checkers.insert("tcp", Box::new(tcp::TcpChecker));
        checkers.insert("dns", Box::new(dns::DnsChecker));
        Registry { checkers }
    }

    pub fn lookup(&self, type_name: &str) -> Option<&dyn Checker> {
        self.checkers.get(type_name).map(|b| b.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

/// Run a checker's `check` bounded by the monitor's configured timeout.
/// Exceeding the bound yields an error result rather than hanging the
/// Executor's pipeline for this monitor.
pub async fn check_with_timeout(checker: &dyn Checker, monitor: &Monitor) -> CheckResult {
    let timeout = Duration::from_secs(monitor.timeout_seconds as u64);
    match tokio::time::timeout(timeout, checker.check(monitor)).await {
        Ok(result) => result,
        Err(_) => CheckResult::error(format!("check exceeded {}s timeout", monitor.timeout_seconds)),
    }
}

/// Shared helper: build a case-insensitive regex, used by the `url`,
/// `api_post`, `ssh` and `log` checkers for positive/negative pattern
/// matching (spec: "always applied case-insensitive").
pub(crate) fn case_insensitive_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    regex::RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Shared helper: an HTTP status code is only meaningful in `[100, 600)`,
/// used by the `url` and `api_post` checkers to validate configured
/// `status_codes` entries.
pub(crate) fn validate_status_codes(codes: &[u16]) -> Result<(), String> {
    for &code in codes {
        if !(100..600).contains(&code) {
            return Err(format!("status code {code} is out of range [100, 600)"));
        }
    }
    Ok(())
}
