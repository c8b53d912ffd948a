//! Google Safe Browsing v4 lookup.

use super::{ReputationReport, ReputationService};
use crate::error::ToolError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

const THREAT_TYPES: [&str; 4] = [
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Deserialize)]
struct ThreatMatch {
    #[serde(rename = "threatType", default)]
    threat_type: String,
}

pub struct SafeBrowsingClient {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    retry: RetryPolicy,
}

impl SafeBrowsingClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn check_once(&self, api_key: &str, url: &str) -> Result<ReputationReport, ToolError> {
        let payload = json!({
            "client": { "clientId": "scamprobe", "clientVersion": env!("CARGO_PKG_VERSION") },
            "threatInfo": {
                "threatTypes": THREAT_TYPES,
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }]
            }
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("Safe Browsing", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::from_reqwest("Safe Browsing", e))?;

        if !status.is_success() {
            return Err(ToolError::from_status("Safe Browsing", status, &body));
        }

        parse_find_response(&body)
    }
}

#[async_trait]
impl ReputationService for SafeBrowsingClient {
    async fn check(&self, url: &str) -> Result<ReputationReport, ToolError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ToolError::Configuration("Safe Browsing API key is not configured".to_string())
        })?;
        debug!("Checking Safe Browsing for {}", url);
        self.retry
            .run("Safe Browsing lookup", || self.check_once(api_key, url))
            .await
    }
}

fn parse_find_response(body: &str) -> Result<ReputationReport, ToolError> {
    let parsed: FindResponse = serde_json::from_str(body)
        .map_err(|e| ToolError::malformed(format!("Safe Browsing: {}", e), body))?;

    let mut threats_found: Vec<String> = parsed
        .matches
        .into_iter()
        .map(|m| {
            if m.threat_type.is_empty() {
                "UNKNOWN".to_string()
            } else {
                m.threat_type
            }
        })
        .collect();
    threats_found.sort();
    threats_found.dedup();

    let raw_score = threat_score(&threats_found);
    Ok(ReputationReport {
        threats_found,
        raw_score,
    })
}

/// Highest severity among the matched threat types.
pub fn threat_score(threats: &[String]) -> u8 {
    threats
        .iter()
        .map(|t| match t.as_str() {
            "MALWARE" => 90,
            "SOCIAL_ENGINEERING" => 80,
            "UNWANTED_SOFTWARE" | "POTENTIALLY_HARMFUL_APPLICATION" => 60,
            _ => 50,
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_score() {
        assert_eq!(threat_score(&[]), 0);
        assert_eq!(threat_score(&["UNWANTED_SOFTWARE".to_string()]), 60);
        assert_eq!(
            threat_score(&["SOCIAL_ENGINEERING".to_string(), "MALWARE".to_string()]),
            90
        );
        assert_eq!(threat_score(&["SOMETHING_NEW".to_string()]), 50);
    }

    #[test]
    fn test_parse_empty_response() {
        let report = parse_find_response("{}").unwrap();
        assert!(report.threats_found.is_empty());
        assert_eq!(report.raw_score, 0);
    }

    #[test]
    fn test_parse_matches() {
        let body = r#"{"matches":[
            {"threatType":"SOCIAL_ENGINEERING","platformType":"ANY_PLATFORM"},
            {"threatType":"SOCIAL_ENGINEERING"}
        ]}"#;
        let report = parse_find_response(body).unwrap();
        assert_eq!(report.threats_found, vec!["SOCIAL_ENGINEERING"]);
        assert_eq!(report.raw_score, 80);
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_find_response("<html>quota</html>").unwrap_err();
        assert_eq!(err.raw_payload(), Some("<html>quota</html>"));
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let client = SafeBrowsingClient::new(reqwest::Client::new(), Some("  ".to_string()), RetryPolicy::none());
        let err = client.check("https://example.com").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
