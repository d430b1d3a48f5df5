//! Notification sink — component I. Sends alert/recovery email via SMTP.
//! At-least-once: every attempt appends a `NotificationLog` regardless of
//! outcome (§4.I); the Alert Manager is the source of truth for
//! dedup via `last_notification_at`, so this sink is itself stateless.

use crate::models::{Alert, Contact, NotificationLog, NotificationStatus, Severity};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl SmtpConfig {
    /// `None` when any of `SMTP_HOST`/`SMTP_USERNAME`/`SMTP_PASSWORD`/`SMTP_FROM`
    /// is unset — matching the teacher's `std::env::var(...).ok()` chains.
    pub fn from_env() -> Option<SmtpConfig> {
        let host = std::env::var("SMTP_HOST").ok()?;
        let username = std::env::var("SMTP_USERNAME").ok()?;
        let password = std::env::var("SMTP_PASSWORD").ok()?;
        let from = std::env::var("SMTP_FROM").ok()?;
        let port = std::env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(587);
        Some(SmtpConfig { host, port, username, password, from })
    }
}

pub enum NotificationKind {
    Opened,
    Upgraded,
    Recovered { duration: String },
}

fn subject(kind: &NotificationKind, alert: &Alert) -> String {
    match kind {
        NotificationKind::Opened => format!("[{}] {} — alert opened", alert.severity.as_str().to_uppercase(), alert.monitor_name),
        NotificationKind::Upgraded => format!("[ALARM] {} — escalated", alert.monitor_name),
        NotificationKind::Recovered { .. } => format!("[RECOVERED] {}", alert.monitor_name),
    }
}

fn body(kind: &NotificationKind, alert: &Alert) -> String {
    match kind {
        NotificationKind::Recovered { duration } => format!(
            "Monitor {} has recovered.\n\nTriggered at: {}\nDuration of outage: {}\n",
            alert.monitor_name,
            alert.triggered_at.to_rfc3339(),
            duration,
        ),
        _ => format!(
            "Monitor: {}\nSeverity: {}\nCurrent value: {}\nThreshold: {}\nConsecutive failures: {}\nTriggered at: {}\n\n{}\n",
            alert.monitor_name,
            alert.severity.as_str(),
            alert.current_value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".into()),
            alert.threshold_value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".into()),
            alert.consecutive_failures,
            alert.triggered_at.to_rfc3339(),
            alert.message,
        ),
    }
}

/// Send one email to one recipient. Always returns a `NotificationLog` —
/// a `sent=false` outcome is recorded, never propagated as an error that
/// would abort the Alert Manager's loop over contacts (§7: notification
/// errors are logged and do not alter alert status).
pub async fn send(smtp: Option<&SmtpConfig>, alert: &Alert, contact: &Contact, kind: NotificationKind) -> NotificationLog {
    let now = chrono::Utc::now();
    let Some(smtp) = smtp else {
        return NotificationLog {
            channel: "email".into(),
            recipient: contact.email.clone(),
            sent_at: now,
            status: NotificationStatus::Failed,
            message_id: None,
            error: Some("smtp not configured".into()),
        };
    };

    let email = Message::builder()
        .from(smtp.from.parse().unwrap_or_else(|_| "monitoring@localhost".parse().unwrap()))
        .to(match contact.email.parse() {
            Ok(addr) => addr,
            Err(e) => {
                return NotificationLog {
                    channel: "email".into(),
                    recipient: contact.email.clone(),
                    sent_at: now,
                    status: NotificationStatus::Failed,
                    message_id: None,
                    error: Some(format!("invalid recipient address: {e}")),
                }
            }
        })
        .subject(subject(&kind, alert))
        .header(ContentType::TEXT_PLAIN)
        .body(body(&kind, alert));

    let email = match email {
        Ok(e) => e,
        Err(e) => {
            return NotificationLog {
                channel: "email".into(),
                recipient: contact.email.clone(),
                sent_at: now,
                status: NotificationStatus::Failed,
                message_id: None,
                error: Some(format!("failed to build message: {e}")),
            }
        }
    };

    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        .map(|b| b.port(smtp.port).credentials(Credentials::new(smtp.username.clone(), smtp.password.clone())).build());

    let transport: AsyncSmtpTransport<Tokio1Executor> = match transport {
        Ok(t) => t,
        Err(e) => {
            return NotificationLog {
                channel: "email".into(),
                recipient: contact.email.clone(),
                sent_at: now,
                status: NotificationStatus::Failed,
                message_id: None,
                error: Some(format!("failed to build smtp transport: {e}")),
            }
        }
    };

    match transport.send(email).await {
        Ok(response) => NotificationLog {
            channel: "email".into(),
            recipient: contact.email.clone(),
            sent_at: now,
            status: NotificationStatus::Sent,
            message_id: response.code().to_string().into(),
            error: None,
        },
        Err(e) => NotificationLog {
            channel: "email".into(),
            recipient: contact.email.clone(),
            sent_at: now,
            status: NotificationStatus::Failed,
            message_id: None,
            error: Some(format!("send failed: {e}")),
        },
    }
}

/// Fan out to every contact that has email enabled in `prefs`. Returns
/// the logs to append to the alert's `notifications_sent`.
pub async fn send_to_contacts(smtp: Option<&SmtpConfig>, alert: &Alert, contacts: &[Contact], severity: Option<Severity>, recovered_duration: Option<String>) -> Vec<NotificationLog> {
    let kind_for = |_: &Contact| -> NotificationKind {
        if let Some(duration) = recovered_duration.clone() {
            NotificationKind::Recovered { duration }
        } else if matches!(severity, Some(Severity::Alarm)) && alert.notifications_sent.iter().any(|n| n.channel == "email") {
            NotificationKind::Upgraded
        } else {
            NotificationKind::Opened
        }
    };

    let mut logs = Vec::with_capacity(contacts.len());
    for contact in contacts {
        if !contact.prefs.email {
            continue;
        }
        logs.push(send(smtp, alert, contact, kind_for(contact)).await);
    }
    logs
}
