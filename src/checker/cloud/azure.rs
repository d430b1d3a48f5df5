use crate::models::CloudConfig;

pub fn validate_credentials(credentials: &serde_json::Value) -> Result<(), String> {
    for key in ["tenant_id", "client_id", "client_secret"] {
        if credentials.get(key).and_then(|v| v.as_str()).map(str::is_empty).unwrap_or(true) {
            return Err(format!("azure credentials missing {key}"));
        }
    }
    Ok(())
}

async fn exchange_token(tenant_id: &str, client_id: &str, client_secret: &str) -> Result<String, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", "https://management.azure.com/.default"),
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
    let tenant_id = cfg.credentials["tenant_id"].as_str().unwrap_or_default();
    let client_id = cfg.credentials["client_id"].as_str().unwrap_or_default();
    let client_secret = cfg.credentials["client_secret"].as_str().unwrap_or_default();

    let access_token = exchange_token(tenant_id, client_id, client_secret).await?;

    let end = chrono::Utc::now();
    let start = end - chrono::Duration::minutes(5);
    let timespan = format!("{}/{}", start.to_rfc3339(), end.to_rfc3339());

    let client = reqwest::Client::new();
    let response = client
        .get(format!(
            "https://management.azure.com/{}/providers/microsoft.insights/metrics",
            cfg.resource_id.trim_start_matches('/')
        ))
        .bearer_auth(access_token)
        .query(&[
            ("api-version", "2018-01-01"),
            ("metricnames", metric),
            ("timespan", timespan.as_str()),
            ("aggregation", "Average"),
        ])
        .send()
        .await
        .map_err(|e| format!("Azure Monitor request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Azure Monitor returned {}", response.status()));
    }
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("failed to parse Azure Monitor response: {e}"))?;

    let values = json["value"][0]["timeseries"][0]["data"]
        .as_array()
        .map(|points| points.iter().filter_map(|p| p["average"].as_f64()).collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(values)
}
