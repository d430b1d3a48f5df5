use crate::models::CloudConfig;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

pub fn validate_credentials(credentials: &serde_json::Value) -> Result<(), String> {
    for key in ["client_email", "private_key", "project_id"] {
        if credentials.get(key).and_then(|v| v.as_str()).map(str::is_empty).unwrap_or(true) {
            return Err(format!("gcp credentials missing {key}"));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

async fn exchange_token(client_email: &str, private_key_pem: &str) -> Result<String, String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: client_email.to_string(),
        scope: "https://www.googleapis.com/auth/monitoring.read".to_string(),
        aud: "https://oauth2.googleapis.com/token".to_string(),
        iat: now,
        exp: now + 3600,
    };
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| format!("invalid gcp private key: {e}"))?;
    let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| format!("failed to sign gcp jwt: {e}"))?;

    let client = reqwest::Client::new();
    let response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ])
        .send()
        .await
        .map_err(|e| format!("token exchange failed: {e}"))?;
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("failed to parse token response: {e}"))?;
    json["access_token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| "token response missing access_token".to_string())
}

pub async fn fetch_datapoints(cfg: &CloudConfig, metric: &str) -> Result<Vec<f64>, String> {
    let client_email = cfg.credentials["client_email"].as_str().unwrap_or_default();
    let private_key = cfg.credentials["private_key"].as_str().unwrap_or_default();
    let project_id = cfg.credentials["project_id"].as_str().unwrap_or_default();

    let access_token = exchange_token(client_email, private_key).await?;

    let end = chrono::Utc::now();
    let start = end - chrono::Duration::minutes(5);
    let filter = format!(
        r#"metric.type="{metric}" AND resource.labels.instance_id="{}""#,
        cfg.resource_id
    );

    let client = reqwest::Client::new();
    let response = client
        .get(format!(
            "https://monitoring.googleapis.com/v3/projects/{project_id}/timeSeries"
        ))
        .bearer_auth(access_token)
        .query(&[
            ("filter", filter.as_str()),
            ("interval.startTime", start.to_rfc3339().as_str()),
            ("interval.endTime", end.to_rfc3339().as_str()),
        ])
        .send()
        .await
        .map_err(|e| format!("Cloud Monitoring request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Cloud Monitoring returned {}", response.status()));
    }
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("failed to parse Cloud Monitoring response: {e}"))?;

    let values = json["timeSeries"][0]["points"]
        .as_array()
        .map(|points| {
            points
                .iter()
                .filter_map(|p| {
                    p["value"]["doubleValue"]
                        .as_f64()
                        .or_else(|| p["value"]["int64Value"].as_str().and_then(|s| s.parse().ok()))
                })
                .rev()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(values)
}
