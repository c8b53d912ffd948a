//! Domain name and registration heuristics.

use super::{Analysis, Tool, ToolContext, DOMAIN_ANALYSIS};
use crate::error::ToolError;
use crate::models::{clamp_confidence, ToolDescriptor};
use crate::services::{DomainInfo, DomainInfoService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

const BRAND_KEYWORDS: [&str; 12] = [
    "paypal", "apple", "microsoft", "amazon", "google", "facebook", "instagram", "twitter",
    "netflix", "spotify", "adobe", "dropbox",
];

const ACTION_KEYWORDS: [&str; 12] = [
    "login", "verify", "secure", "account", "update", "suspended", "urgent", "immediate",
    "confirm", "banking", "security", "warning",
];

const KEYWORD_POINTS: f64 = 15.0;
const INDICATOR_POINTS: f64 = 10.0;
const MAX_CONFIDENCE: f64 = 95.0;

/// Inspects the host name and its registration record.
pub struct DomainTool {
    descriptor: ToolDescriptor,
    service: Arc<dyn DomainInfoService>,
}

impl DomainTool {
    pub fn new(service: Arc<dyn DomainInfoService>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                DOMAIN_ANALYSIS,
                "Analyze the domain name, its age and registration data",
                0,
            ),
            service,
        }
    }
}

#[async_trait]
impl Tool for DomainTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
        let host = ctx
            .target
            .host()
            .ok_or_else(|| ToolError::Unavailable(format!("no host in {}", ctx.target.url)))?;
        let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();

        // Registration lookup failures are findings, not tool failures.
        let (registered, registration) = if is_ip_host(&domain) {
            (
                domain.clone(),
                Err("IP address hosts have no registration record".to_string()),
            )
        } else {
            let registered = registrable_domain(&domain).to_string();
            let lookup = self.service.lookup(&registered).await.map_err(|e| {
                debug!("Registration lookup for {} failed: {}", registered, e);
                e.to_string()
            });
            (registered, lookup)
        };

        let mut analysis = score_domain(&domain, registration.as_ref(), Utc::now());
        if let Some(findings) = analysis.findings.as_object_mut() {
            findings.insert("registered_domain".to_string(), Value::String(registered));
        }
        Ok(analysis)
    }
}

/// The name a registry holds a record for: `login.paypal-verify.co.uk`
/// becomes `paypal-verify.co.uk`. A bare suffix is returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    psl::domain_str(host).unwrap_or(host)
}

/// Score a domain from its name and (optional) registration record.
pub fn score_domain(
    domain: &str,
    registration: Result<&DomainInfo, &String>,
    now: DateTime<Utc>,
) -> Analysis {
    let keywords = suspicious_keywords(domain);

    let labels: Vec<&str> = domain.split('.').collect();
    let hyphen_count = domain.matches('-').count();
    let digit_count = domain.chars().filter(char::is_ascii_digit).count();
    let subdomain_count = labels.len().saturating_sub(2);
    let ip_host = is_ip_host(domain);

    let mut indicators = Vec::new();
    if hyphen_count > 2 {
        indicators.push("Multiple hyphens in domain".to_string());
    }
    if domain.len() > 25 {
        indicators.push("Unusually long domain".to_string());
    }
    if subdomain_count > 2 && !ip_host {
        indicators.push("Multiple subdomains".to_string());
    }
    if ip_host {
        indicators.push("Raw IP address instead of a domain name".to_string());
    } else if digit_count > 3 {
        indicators.push("Many digits in domain".to_string());
    }

    let mut confidence =
        keywords.len() as f64 * KEYWORD_POINTS + indicators.len() as f64 * INDICATOR_POINTS;

    let registration_json = match registration {
        Ok(info) => {
            if let Some(created) = info.creation_date {
                let age_days = (now - created).num_days();
                if age_days < 30 {
                    confidence += 40.0;
                    indicators.push(format!("Very new domain ({} days old)", age_days));
                } else if age_days < 90 {
                    confidence += 20.0;
                    indicators.push(format!("Recently created domain ({} days old)", age_days));
                } else if age_days < 365 {
                    confidence += 20.0;
                    indicators.push(format!("Domain less than a year old ({} days)", age_days));
                }
            }
            if let Some(expires) = info.expiration_date {
                let days_left = (expires - now).num_days();
                if days_left < 30 {
                    confidence += 20.0;
                    indicators.push(format!("Registration expires in {} days", days_left));
                }
            }
            json!({
                "creation_date": info.creation_date,
                "expiration_date": info.expiration_date,
                "registrar": info.registrar,
                "name_servers": info.name_servers,
                "status": info.status,
            })
        }
        Err(message) => json!({ "error": message }),
    };

    Analysis::new(
        clamp_confidence(confidence.min(MAX_CONFIDENCE)),
        json!({
            "domain": domain,
            "suspicious_keywords": keywords,
            "character_analysis": {
                "hyphen_count": hyphen_count,
                "digit_count": digit_count,
                "length": domain.len(),
                "subdomain_count": subdomain_count,
                "ip_host": ip_host,
            },
            "risk_indicators": indicators,
            "registration": registration_json,
        }),
    )
}

/// Brand and action keywords in the domain, ignoring a brand's own domain.
fn suspicious_keywords(domain: &str) -> Vec<Value> {
    BRAND_KEYWORDS
        .iter()
        .map(|k| (k, "brand"))
        .chain(ACTION_KEYWORDS.iter().map(|k| (k, "action")))
        .filter_map(|(keyword, kind)| {
            let position = domain.find(keyword)?;
            let own_domain = domain == format!("{}.com", keyword)
                || domain.starts_with(&format!("{}.", keyword));
            (!own_domain).then(|| json!({ "keyword": keyword, "type": kind, "position": position }))
        })
        .collect()
}

fn is_ip_host(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}
