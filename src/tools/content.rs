//! Page content heuristics.

use super::{Analysis, Tool, ToolContext, CONTENT_ANALYSIS};
use crate::error::ToolError;
use crate::models::{clamp_confidence, ToolDescriptor};
use crate::services::page::{extract_page, truncate_chars, MAX_TEXT_CHARS};
use crate::services::{ContentExtractor, PageContent, SecurityHeaders};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

const SUSPICIOUS_PHRASES: [&str; 9] = [
    "urgent",
    "immediate",
    "suspended",
    "verify now",
    "click here",
    "limited time",
    "act now",
    "confirm identity",
    "update payment",
];

const ELEMENT_POINTS: f64 = 5.0;
const CREDENTIAL_FORM_POINTS: f64 = 20.0;
const PLAIN_HTTP_POINTS: f64 = 10.0;
const MAX_CONFIDENCE: f64 = 95.0;

/// Findings of the content tool; dependents read the page from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFindings {
    pub page: PageContent,
    /// False when the page came with the target instead of being fetched.
    pub fetched: bool,
    pub suspicious_elements: Vec<String>,
    pub credential_forms: usize,
}

/// Fetches the page (unless the target carries it) and scores its content.
pub struct ContentTool {
    descriptor: ToolDescriptor,
    extractor: Arc<dyn ContentExtractor>,
}

impl ContentTool {
    pub fn new(extractor: Arc<dyn ContentExtractor>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                CONTENT_ANALYSIS,
                "Fetch the page and analyze its text, forms, links and images",
                0,
            ),
            extractor,
        }
    }
}

#[async_trait]
impl Tool for ContentTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
        let target = ctx.target;
        let (page, fetched) = match (&target.html, &target.text) {
            (Some(html), _) => (extract_page(&target.url, &target.url, html), false),
            (None, Some(text)) => (
                PageContent {
                    requested_url: target.url.clone(),
                    final_url: target.url.clone(),
                    text: truncate_chars(text, MAX_TEXT_CHARS),
                    security_headers: SecurityHeaders {
                        https: target.url.starts_with("https://"),
                        ..SecurityHeaders::default()
                    },
                    ..PageContent::default()
                },
                false,
            ),
            (None, None) => (self.extractor.extract(&target.url).await?, true),
        };

        let findings = inspect(page, fetched);
        let confidence = clamp_confidence(score(&findings));
        let findings = serde_json::to_value(&findings)
            .map_err(|e| ToolError::Fault(format!("cannot encode content findings: {}", e)))?;
        Ok(Analysis::new(confidence, findings))
    }
}

/// Collect the suspicious elements of a page.
pub fn inspect(page: PageContent, fetched: bool) -> ContentFindings {
    let mut elements = Vec::new();

    let text = format!("{} {}", page.title, page.text).to_lowercase();
    for phrase in SUSPICIOUS_PHRASES {
        if text.contains(phrase) {
            elements.push(format!("Suspicious text: '{}'", phrase));
        }
    }

    let page_host = host_of(&page.final_url);
    for form in &page.forms {
        let action_host = page_host
            .as_ref()
            .and_then(|base| base.join(&form.action).ok())
            .and_then(|u| u.host_str().map(str::to_lowercase));
        let own_host = page_host
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        if let (Some(action), Some(own)) = (action_host, own_host) {
            if !form.action.is_empty() && action != own {
                elements.push(format!("Form submits to a different host: {}", action));
            }
        }
    }

    if fetched {
        let requested = host_of(&page.requested_url).and_then(|u| u.host_str().map(str::to_lowercase));
        let landed = page_host
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        if requested.is_some() && landed.is_some() && requested != landed {
            elements.push(format!(
                "Redirected to a different host: {}",
                landed.unwrap_or_default()
            ));
        }

        let headers = &page.security_headers;
        if headers.https
            && !headers.strict_transport_security
            && !headers.content_security_policy
            && !headers.x_frame_options
        {
            elements.push("No security headers".to_string());
        }
    }

    if page.links.external_count >= 10 && page.links.external_count > page.links.internal_count * 2
    {
        elements.push(format!(
            "Mostly external links ({} external, {} internal)",
            page.links.external_count, page.links.internal_count
        ));
    }

    let credential_forms = page.forms.iter().filter(|f| f.collects_credentials).count();

    ContentFindings {
        page,
        fetched,
        suspicious_elements: elements,
        credential_forms,
    }
}

fn score(findings: &ContentFindings) -> f64 {
    let mut confidence = findings.suspicious_elements.len() as f64 * ELEMENT_POINTS;
    if findings.credential_forms > 0 {
        confidence += CREDENTIAL_FORM_POINTS;
    }
    if !findings.page.security_headers.https {
        confidence += PLAIN_HTTP_POINTS;
    }
    confidence.min(MAX_CONFIDENCE)
}

fn host_of(url: &str) -> Option<Url> {
    Url::parse(url).ok().filter(|u| u.host_str().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Target, ToolStatus};
    use crate::services::{FormInfo, LinkSummary};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtractor {
        page: PageContent,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentExtractor for CountingExtractor {
        async fn extract(&self, _url: &str) -> Result<PageContent, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.page.clone())
        }
    }

    fn fetched_page() -> PageContent {
        PageContent {
            requested_url: "http://bit.example/abc".to_string(),
            final_url: "http://login.example.net/".to_string(),
            text: "Your account is suspended. Verify now!".to_string(),
            forms: vec![FormInfo {
                action: "https://collector.example.org/post".to_string(),
                method: "post".to_string(),
                inputs: Vec::new(),
                collects_credentials: true,
            }],
            ..PageContent::default()
        }
    }

    #[test]
    fn test_inspect_fetched_page() {
        let findings = inspect(fetched_page(), true);
        // suspended, verify now, foreign form, redirect.
        assert_eq!(findings.suspicious_elements.len(), 4);
        assert_eq!(findings.credential_forms, 1);
        // 4 * 5 + 20 + 10 (plain http)
        assert_eq!(score(&findings), 50.0);
    }

    #[test]
    fn test_clean_https_page_scores_zero() {
        let page = PageContent {
            requested_url: "https://example.com".to_string(),
            final_url: "https://example.com".to_string(),
            title: "Example Domain".to_string(),
            text: "This domain is for use in illustrative examples.".to_string(),
            links: LinkSummary {
                internal_count: 3,
                ..LinkSummary::default()
            },
            security_headers: SecurityHeaders {
                https: true,
                strict_transport_security: true,
                ..SecurityHeaders::default()
            },
            ..PageContent::default()
        };
        let findings = inspect(page, true);
        assert!(findings.suspicious_elements.is_empty());
        assert_eq!(score(&findings), 0.0);
    }

    #[test]
    fn test_phishing_fixture() {
        let url = "http://paypa1-secure.example.net/login";
        let html = include_str!("../../fixtures/phishing_login.html");
        let findings = inspect(extract_page(url, url, html), false);

        // suspended, verify now, act now, foreign form.
        assert_eq!(findings.suspicious_elements.len(), 4);
        assert!(findings
            .suspicious_elements
            .iter()
            .any(|e| e.contains("collect.example.org")));
        assert_eq!(findings.credential_forms, 1);
        assert_eq!(findings.page.images.len(), 1);
        assert!(!findings.page.text.contains("document.title"));
        assert_eq!(score(&findings), 50.0);
    }

    #[tokio::test]
    async fn test_supplied_html_bypasses_extractor() {
        let extractor = Arc::new(CountingExtractor {
            page: PageContent::default(),
            calls: AtomicUsize::new(0),
        });
        let tool = ContentTool::new(extractor.clone());
        let target = Target::new("https://shop.example.com")
            .with_html("<html><body><p>Limited time offer, act now</p></body></html>");
        let prior = BTreeMap::new();

        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.confidence, 10);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

        let findings: ContentFindings = serde_json::from_value(result.findings).unwrap();
        assert!(!findings.fetched);
        assert!(findings.page.text.contains("Limited time offer"));
    }

    #[tokio::test]
    async fn test_fetches_when_target_has_no_content() {
        let extractor = Arc::new(CountingExtractor {
            page: fetched_page(),
            calls: AtomicUsize::new(0),
        });
        let tool = ContentTool::new(extractor.clone());
        let target = Target::new("http://bit.example/abc");
        let prior = BTreeMap::new();

        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.confidence, 50);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }
}
