use super::Checker;
use crate::models::{CertificateConfig, CheckResult, Monitor, MonitorTypeConfig, Status};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use x509_parser::prelude::*;

pub struct CertificateChecker;

fn config(monitor: &Monitor) -> Result<&CertificateConfig, String> {
    match &monitor.config {
        MonitorTypeConfig::Certificate(c) => Ok(c),
        other => Err(format!("expected certificate config, got {}", other.type_name())),
    }
}

/// Accepts any certificate chain so the checker can *inspect* an
/// expired or self-signed certificate rather than failing the TLS
/// handshake before it gets a look at it — the whole point of this
/// monitor type is to see certificates other clients would reject.
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Matches a certificate name against the dialed hostname, honouring a
/// single-label `*.` wildcard (`*.example.com` matches `api.example.com`
/// but not `a.b.example.com`).
fn matches_name(cert_name: Option<&str>, hostname: &str) -> bool {
    match cert_name {
        Some(name) if name == hostname => true,
        Some(name) => match name.strip_prefix("*.") {
            Some(suffix) => match hostname.split_once('.') {
                Some((_, rest)) => rest == suffix,
                None => false,
            },
            None => false,
        },
        None => false,
    }
}

fn common_name(name: &X509Name) -> Option<String> {
    name.iter_common_name().next().and_then(|cn| cn.as_str().ok()).map(|s| s.to_string())
}

fn subject_alt_names(cert: &X509Certificate) -> Vec<String> {
    let mut sans = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    sans.push(dns.to_string());
                }
            }
        }
    }
    sans
}

#[rocket::async_trait]
impl Checker for CertificateChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), String> {
        let cfg = config(monitor)?;
        if cfg.hostname.trim().is_empty() {
            return Err("hostname must not be empty".to_string());
        }
        if cfg.alarm_threshold_days > cfg.warning_threshold_days {
            return Err("alarm_threshold_days must be <= warning_threshold_days".to_string());
        }
        Ok(())
    }

    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let cfg = match config(monitor) {
            Ok(c) => c.clone(),
            Err(e) => return CheckResult::error(e),
        };

        let start = Instant::now();
        let addr = format!("{}:{}", cfg.hostname, cfg.port);
        let tcp = match tokio::time::timeout(
            Duration::from_secs(monitor.timeout_seconds as u64),
            TcpStream::connect(&addr),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return CheckResult::error(format!("Connection refused: {e}")),
            Err(_) => return CheckResult::error("Connection timed out"),
        };

        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("rustls default protocol versions")
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();

        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
        let server_name = match rustls_pki_types::ServerName::try_from(cfg.hostname.clone()) {
            Ok(n) => n,
            Err(e) => return CheckResult::error(format!("invalid hostname for SNI: {e}")),
        };

        let tls_stream = match tokio::time::timeout(
            Duration::from_secs(monitor.timeout_seconds as u64),
            connector.connect(server_name, tcp),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return CheckResult::error(format!("TLS handshake failed: {e}")),
            Err(_) => return CheckResult::error("TLS handshake timed out"),
        };
        let elapsed_ms = start.elapsed().as_millis() as u32;

        let (_, session) = tls_stream.get_ref();
        let chain = match session.peer_certificates() {
            Some(c) if !c.is_empty() => c,
            _ => return CheckResult::error("server presented no certificate"),
        };

        let leaf_der = &chain[0];
        let cert = match x509_parser::parse_x509_certificate(leaf_der.as_ref()) {
            Ok((_, cert)) => cert,
            Err(e) => return CheckResult::error(format!("failed to parse certificate: {e}")),
        };

        let now_ts = chrono::Utc::now().timestamp();
        let not_after_ts = cert.validity().not_after.timestamp();
        let days_until_expiry = ((not_after_ts - now_ts) as f64 / 86_400.0).floor();

        let subject_cn = common_name(cert.subject());
        let issuer_cn = common_name(cert.issuer());
        let self_signed = cert.subject() == cert.issuer();
        let sans = subject_alt_names(&cert);
        let hostname_matches = matches_name(subject_cn.as_deref(), &cfg.hostname)
            || sans.iter().any(|s| matches_name(Some(s.as_str()), &cfg.hostname));
        let chain_expired = chain.iter().any(|der| {
            x509_parser::parse_x509_certificate(der.as_ref())
                .map(|(_, c)| c.validity().not_after.timestamp() < now_ts)
                .unwrap_or(false)
        });

        let status = if days_until_expiry <= cfg.alarm_threshold_days as f64 {
            Status::Alarm
        } else if days_until_expiry <= cfg.warning_threshold_days as f64 {
            Status::Warning
        } else {
            Status::Ok
        };

        CheckResult {
            success: matches!(status, Status::Ok | Status::Warning),
            value: Some(days_until_expiry),
            status,
            message: format!("certificate expires in {days_until_expiry:.0} days"),
            response_time_ms: Some(elapsed_ms),
            status_code: None,
            timestamp: chrono::Utc::now(),
            metadata: Some(serde_json::json!({
                "issuer": issuer_cn,
                "subject": subject_cn,
                "sans": sans,
                "serial": cert.raw_serial_as_string(),
                "signature_algorithm": cert.signature_algorithm.algorithm.to_id_string(),
                "self_signed": self_signed,
                "hostname_matches": hostname_matches,
                "chain_expired": chain_expired,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_matches() {
        assert!(matches_name(Some("api.example.com"), "api.example.com"));
    }

    #[test]
    fn single_label_wildcard_matches_one_level() {
        assert!(matches_name(Some("*.example.com"), "api.example.com"));
    }

    #[test]
    fn single_label_wildcard_does_not_match_two_levels_deep() {
        assert!(!matches_name(Some("*.example.com"), "a.b.example.com"));
    }

    #[test]
    fn wildcard_does_not_match_bare_apex() {
        assert!(!matches_name(Some("*.example.com"), "example.com"));
    }

    #[test]
    fn unrelated_name_does_not_match() {
        assert!(!matches_name(Some("other.com"), "api.example.com"));
    }

    #[test]
    fn absent_name_never_matches() {
        assert!(!matches_name(None, "api.example.com"));
    }
}
