use crate::models::CloudConfig;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;
use std::time::SystemTime;

pub fn validate_credentials(credentials: &serde_json::Value) -> Result<(), String> {
    for key in ["access_key_id", "secret_access_key"] {
        if credentials.get(key).and_then(|v| v.as_str()).map(str::is_empty).unwrap_or(true) {
            return Err(format!("aws credentials missing {key}"));
        }
    }
    Ok(())
}

pub async fn fetch_datapoints(cfg: &CloudConfig, metric: &str) -> Result<Vec<f64>, String> {
    let access_key_id = cfg.credentials["access_key_id"].as_str().unwrap_or_default().to_string();
    let secret_access_key = cfg.credentials["secret_access_key"].as_str().unwrap_or_default().to_string();
    let session_token = cfg.credentials.get("session_token").and_then(|v| v.as_str()).map(str::to_string);
    let region = cfg.region.clone().unwrap_or_else(|| "us-east-1".to_string());

    let end = chrono::Utc::now();
    let start = end - chrono::Duration::minutes(5);

    let body = serde_json::json!({
        "MetricDataQueries": [{
            "Id": "m1",
            "MetricStat": {
                "Metric": {
                    "Namespace": "AWS/EC2",
                    "MetricName": metric,
                    "Dimensions": [{"Name": "InstanceId", "Value": cfg.resource_id}],
                },
                "Period": 60,
                "Stat": "Average",
            },
        }],
        "StartTime": start.timestamp(),
        "EndTime": end.timestamp(),
    });
    let body_bytes = serde_json::to_vec(&body).map_err(|e| format!("failed to encode request: {e}"))?;

    let endpoint = format!("https://monitoring.{region}.amazonaws.com/");
    let credentials = Credentials::new(access_key_id, secret_access_key, session_token, None, "sentrygrid");
    let identity = credentials.into();

    let signing_settings = SigningSettings::default();
    let signing_params = SigningParams::builder()
        .identity(&identity)
        .region(&region)
        .name("monitoring")
        .time(SystemTime::now())
        .settings(signing_settings)
        .build()
        .map_err(|e| format!("failed to build signing params: {e}"))?
        .into();

    let headers = [
        ("content-type", "application/x-amz-json-1.1"),
        ("x-amz-target", "GraniteServiceVersion20100801.GetMetricData"),
    ];
    let signable_request = SignableRequest::new(
        "POST",
        &endpoint,
        headers.iter().map(|(k, v)| (*k, *v)),
        SignableBody::Bytes(&body_bytes),
    )
    .map_err(|e| format!("failed to build signable request: {e}"))?;

    let signing_instructions = sign(signable_request, &signing_params)
        .map_err(|e| format!("failed to sign request: {e}"))?
        .into_parts()
        .0;

    let client = reqwest::Client::new();
    let mut request = client.post(&endpoint).body(body_bytes);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    for (name, value) in signing_instructions.headers() {
        request = request.header(name, value);
    }

    let response = request.send().await.map_err(|e| format!("CloudWatch request failed: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("CloudWatch returned {}", response.status()));
    }
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("failed to parse CloudWatch response: {e}"))?;

    let values = json["MetricDataResults"][0]["Values"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(values)
}
