//! Domain registration lookup over RDAP.

use super::{DomainInfo, DomainInfoService};
use crate::error::ToolError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://rdap.org";

pub struct RdapClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RdapClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }

    async fn lookup_once(&self, domain: &str) -> Result<DomainInfo, ToolError> {
        let url = format!("{}/domain/{}", self.base_url, domain);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/rdap+json")
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("RDAP", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::from_reqwest("RDAP", e))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::Upstream(format!(
                "no RDAP record for {}",
                domain
            )));
        }
        if !status.is_success() {
            return Err(ToolError::from_status("RDAP", status, &body));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ToolError::malformed(format!("RDAP: {}", e), body.clone()))?;
        parse_rdap(domain, &json).ok_or_else(|| {
            ToolError::malformed("RDAP: response is not a domain object", body)
        })
    }
}

#[async_trait]
impl DomainInfoService for RdapClient {
    async fn lookup(&self, domain: &str) -> Result<DomainInfo, ToolError> {
        debug!("RDAP lookup for {}", domain);
        self.retry
            .run("RDAP lookup", || self.lookup_once(domain))
            .await
    }
}

/// Pull registration data out of an RDAP domain object.
///
/// Returns `None` when the payload is not a domain object at all.
pub fn parse_rdap(domain: &str, json: &Value) -> Option<DomainInfo> {
    let obj = json.as_object()?;
    if obj.get("objectClassName").and_then(Value::as_str) != Some("domain") {
        return None;
    }

    let mut info = DomainInfo {
        domain: domain.to_string(),
        ..DomainInfo::default()
    };

    for event in obj.get("events").and_then(Value::as_array).into_iter().flatten() {
        let action = event.get("eventAction").and_then(Value::as_str);
        let date = event
            .get("eventDate")
            .and_then(Value::as_str)
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc));
        match action {
            Some("registration") => info.creation_date = date,
            Some("expiration") => info.expiration_date = date,
            _ => {}
        }
    }

    info.registrar = obj
        .get("entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|e| {
            e.get("roles")
                .and_then(Value::as_array)
                .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some("registrar")))
        })
        .and_then(vcard_name);

    info.name_servers = obj
        .get("nameservers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|ns| ns.get("ldhName").and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect();

    info.status = obj
        .get("status")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    Some(info)
}

/// The `fn` property of an entity's jCard.
fn vcard_name(entity: &Value) -> Option<String> {
    entity
        .get("vcardArray")?
        .get(1)?
        .as_array()?
        .iter()
        .find(|prop| prop.get(0).and_then(Value::as_str) == Some("fn"))
        .and_then(|prop| prop.get(3))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_parse_rdap_domain() {
        let json = json!({
            "objectClassName": "domain",
            "ldhName": "EXAMPLE.COM",
            "status": ["client transfer prohibited"],
            "events": [
                {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2030-08-13T04:00:00Z"}
            ],
            "entities": [
                {"roles": ["abuse"], "vcardArray": ["vcard", [["fn", {}, "text", "Abuse Desk"]]]},
                {"roles": ["registrar"], "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["fn", {}, "text", "RESERVED-Internet Assigned Numbers Authority"]
                ]]}
            ],
            "nameservers": [{"ldhName": "A.IANA-SERVERS.NET"}, {"ldhName": "B.IANA-SERVERS.NET"}]
        });

        let info = parse_rdap("example.com", &json).unwrap();
        assert_eq!(info.creation_date.unwrap().year(), 1995);
        assert_eq!(info.expiration_date.unwrap().year(), 2030);
        assert_eq!(
            info.registrar.as_deref(),
            Some("RESERVED-Internet Assigned Numbers Authority")
        );
        assert_eq!(info.name_servers, vec!["a.iana-servers.net", "b.iana-servers.net"]);
        assert_eq!(info.status.len(), 1);
    }

    #[test]
    fn test_parse_rdap_rejects_non_domain() {
        assert!(parse_rdap("x.com", &json!({"objectClassName": "error"})).is_none());
        assert!(parse_rdap("x.com", &json!([1, 2])).is_none());
    }
}
