use serde::{Deserialize, Serialize};

/// Outcome classification shared by every checker and the hysteresis state
/// machine. `Error` means the checker could not complete a probe at all
/// (connect refused, timeout, DNS failure, ...); it is distinct from a
/// classified-but-unhealthy `Alarm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Alarm,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warning => "warning",
            Status::Alarm => "alarm",
            Status::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Status {
        match s {
            "ok" => Status::Ok,
            "warning" => Status::Warning,
            "alarm" => Status::Alarm,
            _ => Status::Error,
        }
    }
}

/// Severity an open alert carries. A subset of `Status` — alerts never
/// open at `Ok` and `Error` escalates through the same warn/alarm ladder
/// as a numeric threshold breach (an unreachable target is worse than a
/// slow one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Alarm,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Alarm => "alarm",
        }
    }

    pub fn parse(s: &str) -> Severity {
        match s {
            "alarm" => Severity::Alarm,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    InRecovery,
    Recovered,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::InRecovery => "in_recovery",
            AlertStatus::Recovered => "recovered",
        }
    }

    pub fn parse(s: &str) -> AlertStatus {
        match s {
            "acknowledged" => AlertStatus::Acknowledged,
            "in_recovery" => AlertStatus::InRecovery,
            "recovered" => AlertStatus::Recovered,
            _ => AlertStatus::Active,
        }
    }

    /// True for the states the spec calls "an alert already
    /// active/acknowledged/in_recovery" — at most one such alert may
    /// exist per monitor at a time.
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertStatus::Recovered)
    }
}

/// The result of one `Checker::check` invocation, before it is folded into
/// state/alert lifecycle. `success` is true iff `status` is `Ok` or
/// `Warning` — a warning is not an outright failure, only the hysteresis
/// machine decides whether it escalates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub value: Option<f64>,
    pub status: Status,
    pub message: String,
    pub response_time_ms: Option<u32>,
    pub status_code: Option<u16>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn error(message: impl Into<String>) -> CheckResult {
        CheckResult {
            success: false,
            value: None,
            status: Status::Error,
            message: message.into(),
            response_time_ms: None,
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: None,
        }
    }

    pub fn maintenance() -> CheckResult {
        CheckResult {
            success: true,
            value: None,
            status: Status::Ok,
            message: "in maintenance".to_string(),
            response_time_ms: None,
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: None,
        }
    }
}

/// Optional low/high warning/alarm thresholds, shared by every numeric
/// checker. Any absent threshold is ignored by `classify`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_alarm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_alarm: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub prefs: ContactPrefs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPrefs {
    #[serde(default = "default_true")]
    pub email: bool,
}

impl Default for ContactPrefs {
    fn default() -> Self {
        ContactPrefs { email: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub send_daily_reminder: bool,
}

/// Per-type config blocks. Tagged union — see DESIGN.md for why this
/// replaces the source's flat bag-of-optional-columns-per-type shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorTypeConfig {
    Url(UrlConfig),
    ApiPost(ApiPostConfig),
    Ssh(SshConfig),
    Ping(PingConfig),
    Log(LogConfig),
    Certificate(CertificateConfig),
    Docker(DockerConfig),
    Aws(CloudConfig),
    Gcp(CloudConfig),
    Azure(CloudConfig),
    Tcp(TcpConfig),
    Dns(DnsConfig),
}

impl MonitorTypeConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            MonitorTypeConfig::Url(_) => "url",
            MonitorTypeConfig::ApiPost(_) => "api_post",
            MonitorTypeConfig::Ssh(_) => "ssh",
            MonitorTypeConfig::Ping(_) => "ping",
            MonitorTypeConfig::Log(_) => "log",
            MonitorTypeConfig::Certificate(_) => "certificate",
            MonitorTypeConfig::Docker(_) => "docker",
            MonitorTypeConfig::Aws(_) => "aws",
            MonitorTypeConfig::Gcp(_) => "gcp",
            MonitorTypeConfig::Azure(_) => "azure",
            MonitorTypeConfig::Tcp(_) => "tcp",
            MonitorTypeConfig::Dns(_) => "dns",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlConfig {
    #[serde(default = "default_status_codes")]
    pub status_codes: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_pattern: Option<String>,
}

fn default_status_codes() -> Vec<u16> {
    vec![200, 201, 204, 301, 302, 303, 304]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPostConfig {
    pub post_body: serde_json::Value,
    #[serde(default = "default_status_codes")]
    pub status_codes: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_pattern: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingConfig {
    #[serde(default = "default_ping_count")]
    pub count: u32,
    #[serde(default = "default_ping_timeout_ms")]
    pub timeout_ms: u32,
}

fn default_ping_count() -> u32 {
    4
}
fn default_ping_timeout_ms() -> u32 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshTarget>,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: u32,
    #[serde(default)]
    pub extra_patterns: Vec<LogPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshTarget {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPattern {
    pub pattern: String,
    pub category: String,
    pub severity: String, // critical | high | medium
    pub remediation: String,
}

fn default_tail_lines() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    pub hostname: String,
    #[serde(default = "default_tls_port")]
    pub port: u16,
    #[serde(default = "default_warning_days")]
    pub warning_threshold_days: i64,
    #[serde(default = "default_alarm_days")]
    pub alarm_threshold_days: i64,
}

fn default_tls_port() -> u16 {
    443
}
fn default_warning_days() -> i64 {
    30
}
fn default_alarm_days() -> i64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    pub connection: DockerConnection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_filter: Option<String>,
    #[serde(default = "default_cpu_warn")]
    pub cpu_warning_pct: f64,
    #[serde(default = "default_cpu_alarm")]
    pub cpu_alarm_pct: f64,
    #[serde(default = "default_mem_warn")]
    pub memory_warning_pct: f64,
    #[serde(default = "default_mem_alarm")]
    pub memory_alarm_pct: f64,
    #[serde(default = "default_restart_limit")]
    pub restart_count_limit: u32,
}

fn default_cpu_warn() -> f64 {
    75.0
}
fn default_cpu_alarm() -> f64 {
    90.0
}
fn default_mem_warn() -> f64 {
    75.0
}
fn default_mem_alarm() -> f64 {
    90.0
}
fn default_restart_limit() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DockerConnection {
    LocalSocket { path: Option<String> },
    RemoteTcp { host: String, port: u16 },
    Ssh(SshTarget),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub credentials: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    pub hostname: String,
    #[serde(default = "default_record_type")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

fn default_record_type() -> String {
    "A".to_string()
}

/// Shared identity + scheduling fields, common to every monitor type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    pub target: String,
    pub config: MonitorTypeConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default = "default_consecutive_warning")]
    pub consecutive_warning: u32,
    #[serde(default = "default_consecutive_alarm")]
    pub consecutive_alarm: u32,
    #[serde(default = "default_reset_after_m_ok")]
    pub reset_after_m_ok: u32,
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub running: bool,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub alert_settings: AlertSettings,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn default_consecutive_warning() -> u32 {
    2
}
fn default_consecutive_alarm() -> u32 {
    3
}
fn default_reset_after_m_ok() -> u32 {
    2
}
fn default_period_minutes() -> u32 {
    5
}
fn default_timeout_seconds() -> u32 {
    10
}

/// Monitor creation payload (validated in `routes::monitors` before a
/// `Monitor` is constructed).
#[derive(Debug, Deserialize)]
pub struct CreateMonitor {
    pub name: String,
    pub target: String,
    pub config: MonitorTypeConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    pub consecutive_warning: Option<u32>,
    pub consecutive_alarm: Option<u32>,
    pub reset_after_m_ok: Option<u32>,
    pub period_minutes: Option<u32>,
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub alert_settings: AlertSettings,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMonitor {
    pub name: Option<String>,
    pub target: Option<String>,
    pub config: Option<MonitorTypeConfig>,
    pub thresholds: Option<Thresholds>,
    pub consecutive_warning: Option<u32>,
    pub consecutive_alarm: Option<u32>,
    pub reset_after_m_ok: Option<u32>,
    pub period_minutes: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub contacts: Option<Vec<Contact>>,
    pub dependencies: Option<Vec<String>>,
    pub active: Option<bool>,
    pub running: Option<bool>,
    pub maintenance_windows: Option<Vec<MaintenanceWindow>>,
    pub alert_settings: Option<AlertSettings>,
}

/// Validate the cross-field invariants from distilled spec §3. Pure —
/// does not touch the database.
pub fn validate_monitor(name: &str, thresholds: &Thresholds, period_minutes: u32, timeout_seconds: u32) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if period_minutes < 1 {
        return Err("period_minutes must be >= 1".to_string());
    }
    if timeout_seconds < 5 {
        return Err("timeout_seconds must be >= 5".to_string());
    }
    if timeout_seconds as u64 >= (period_minutes as u64) * 60 {
        return Err("timeout_seconds must be less than period_minutes * 60".to_string());
    }
    if let (Some(lw), Some(la)) = (thresholds.low_warning, thresholds.low_alarm) {
        if lw > la {
            return Err("low_warning must be <= low_alarm".to_string());
        }
    }
    if let (Some(hw), Some(ha)) = (thresholds.high_warning, thresholds.high_alarm) {
        if hw > ha {
            return Err("high_warning must be <= high_alarm".to_string());
        }
    }
    Ok(())
}

/// Per-monitor running counters and current severity. Created on first
/// observation, mutated only by the State Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorState {
    pub monitor_id: String,
    pub current_status: Status,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check_time: Option<chrono::DateTime<chrono::Utc>>,
    pub last_value: Option<f64>,
    pub last_error: Option<String>,
    pub active_alert_id: Option<String>,
    /// Severity of the currently-open alert, mirrored here from the
    /// `alerts` table so the State Manager can tell a warning→alarm
    /// transition (emit `Upgrade`) apart from an alarm that's already open
    /// (no further signal) without a second table lookup.
    pub active_alert_severity: Option<Severity>,
    pub recovery_in_progress: bool,
    pub recovery_attempt_count: u32,
}

impl MonitorState {
    pub fn new(monitor_id: impl Into<String>) -> MonitorState {
        MonitorState {
            monitor_id: monitor_id.into(),
            current_status: Status::Ok,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check_time: None,
            last_value: None,
            last_error: None,
            active_alert_id: None,
            active_alert_severity: None,
            recovery_in_progress: false,
            recovery_attempt_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub channel: String,
    pub recipient: String,
    pub sent_at: chrono::DateTime<chrono::Utc>,
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub monitor_id: String,
    pub monitor_name: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub triggered_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<chrono::DateTime<chrono::Utc>>,
    pub current_value: Option<f64>,
    pub threshold_value: Option<f64>,
    pub consecutive_failures: u32,
    pub notifications_sent: Vec<NotificationLog>,
    pub last_notification_at: Option<chrono::DateTime<chrono::Utc>>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

/// One probe's numeric/categorical datum, appended to the observations
/// collection. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub monitor_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub value: Option<f64>,
    pub status: Status,
    pub response_time_ms: Option<u32>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
