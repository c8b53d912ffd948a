//! Page fetching and HTML extraction.

use super::{
    read_capped, ContentExtractor, FormInfo, FormInput, ImageRef, LinkSummary, PageContent,
    SecurityHeaders,
};
use crate::error::ToolError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Maximum characters of visible text kept per page.
pub const MAX_TEXT_CHARS: usize = 3000;

/// Maximum images and sample links kept per page.
const MAX_IMAGES: usize = 10;
const MAX_SAMPLE_LINKS: usize = 10;

/// Maximum HTML body accepted (5 MB).
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// Subtrees whose text never counts as visible page text.
const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "svg"];

/// Fetches pages over HTTP and parses them with `scraper`.
pub struct HttpContentExtractor {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpContentExtractor {
    pub fn new(http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    async fn fetch_once(&self, url: &str) -> Result<PageContent, ToolError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("page fetch", e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response.headers().clone();

        if status.is_server_error() {
            return Err(ToolError::from_status("page fetch", status, ""));
        }

        let body = read_capped(response, "page", MAX_BODY_SIZE).await?;

        let html = String::from_utf8_lossy(&body);
        let mut page = extract_page(url, &final_url, &html);
        page.status_code = status.as_u16();
        page.security_headers = security_headers(&final_url, &headers);
        Ok(page)
    }
}

#[async_trait]
impl ContentExtractor for HttpContentExtractor {
    async fn extract(&self, url: &str) -> Result<PageContent, ToolError> {
        debug!("Fetching page: {}", url);
        self.retry.run("page fetch", || self.fetch_once(url)).await
    }
}

fn security_headers(final_url: &str, headers: &HeaderMap) -> SecurityHeaders {
    SecurityHeaders {
        https: final_url.starts_with("https://"),
        strict_transport_security: headers.contains_key("strict-transport-security"),
        content_security_policy: headers.contains_key("content-security-policy"),
        x_frame_options: headers.contains_key("x-frame-options"),
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

/// Parse HTML into a [`PageContent`].
///
/// `requested_url` is what the caller asked for, `final_url` is where any
/// redirects ended; relative links and images resolve against `final_url`.
/// Only the `https` header flag can be derived from the URL alone, the
/// other security headers stay false.
pub fn extract_page(requested_url: &str, final_url: &str, html: &str) -> PageContent {
    let document = Html::parse_document(html);
    let base = Url::parse(final_url).ok();
    let page_host = base
        .as_ref()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

    let title = document
        .select(&selector("title"))
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let body = document.select(&selector("body")).next();
    let text = visible_text(body.unwrap_or_else(|| document.root_element()));

    PageContent {
        requested_url: requested_url.to_string(),
        final_url: final_url.to_string(),
        status_code: 0,
        title,
        text: truncate_chars(&text, MAX_TEXT_CHARS),
        forms: extract_forms(&document),
        links: extract_links(&document, base.as_ref(), page_host.as_deref()),
        images: extract_images(&document, base.as_ref()),
        meta: extract_meta(&document),
        security_headers: SecurityHeaders {
            https: final_url.starts_with("https://"),
            ..SecurityHeaders::default()
        },
    }
}

/// Collect text nodes, skipping script/style subtrees.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIP_TAGS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn extract_forms(document: &Html) -> Vec<FormInfo> {
    let input_sel = selector("input");
    document
        .select(&selector("form"))
        .map(|form| {
            let inputs: Vec<FormInput> = form
                .select(&input_sel)
                .map(|input| FormInput {
                    input_type: input
                        .value()
                        .attr("type")
                        .unwrap_or("text")
                        .to_lowercase(),
                    name: input.value().attr("name").unwrap_or("").to_lowercase(),
                    required: input.value().attr("required").is_some(),
                })
                .collect();

            let collects_credentials = inputs.iter().any(|i| {
                matches!(i.input_type.as_str(), "password" | "email")
                    || ["password", "passwd", "card", "cvv", "ssn", "pin"]
                        .iter()
                        .any(|needle| i.name.contains(needle))
            });

            FormInfo {
                action: form.value().attr("action").unwrap_or("").to_string(),
                method: form
                    .value()
                    .attr("method")
                    .unwrap_or("get")
                    .to_lowercase(),
                inputs,
                collects_credentials,
            }
        })
        .collect()
}

fn extract_links(document: &Html, base: Option<&Url>, page_host: Option<&str>) -> LinkSummary {
    let mut summary = LinkSummary::default();

    for link in document.select(&selector("a[href]")) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve(base, href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let host = resolved.host_str().map(|h| h.to_lowercase());
        if host.as_deref() == page_host {
            summary.internal_count += 1;
            if summary.internal.len() < MAX_SAMPLE_LINKS {
                summary.internal.push(resolved.to_string());
            }
        } else {
            summary.external_count += 1;
            if summary.external.len() < MAX_SAMPLE_LINKS {
                summary.external.push(resolved.to_string());
            }
        }
    }

    summary
}

fn extract_images(document: &Html, base: Option<&Url>) -> Vec<ImageRef> {
    document
        .select(&selector("img[src]"))
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            if src.starts_with("data:") {
                return None;
            }
            let resolved = resolve(base, src)?;
            Some(ImageRef {
                src: resolved.to_string(),
                alt: img.value().attr("alt").unwrap_or("").to_string(),
            })
        })
        .take(MAX_IMAGES)
        .collect()
}

fn extract_meta(document: &Html) -> BTreeMap<String, String> {
    document
        .select(&selector("meta"))
        .filter_map(|meta| {
            let el = meta.value();
            let name = el.attr("name").or_else(|| el.attr("property"))?;
            let content = el.attr("content")?;
            Some((name.to_string(), content.to_string()))
        })
        .collect()
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
