//! External collaborators used by the tools.
//!
//! Each collaborator is a trait so tools can be exercised against fakes;
//! the submodules hold the default HTTP-backed implementations.

pub mod ollama;
pub mod page;
pub mod rdap;
pub mod safe_browsing;

pub use ollama::{OllamaClient, OllamaSettings};
pub use page::{extract_page, HttpContentExtractor};
pub use rdap::RdapClient;
pub use safe_browsing::SafeBrowsingClient;

use crate::error::ToolError;
use crate::models::{Priority, Target, ToolDescriptor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("scamprobe/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")
}

/// Read a response body, refusing anything larger than `limit` bytes.
///
/// A declared `Content-Length` over the limit is rejected before any byte
/// is read; otherwise chunks are read until the limit is crossed.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    what: &str,
    limit: usize,
) -> Result<Vec<u8>, ToolError> {
    let mut body = CappedBody::new(what, limit);
    body.check_declared(response.content_length())?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ToolError::from_reqwest(what, e))?
    {
        body.push(&chunk)?;
    }
    Ok(body.buf)
}

struct CappedBody<'a> {
    what: &'a str,
    limit: usize,
    buf: Vec<u8>,
}

impl<'a> CappedBody<'a> {
    fn new(what: &'a str, limit: usize) -> Self {
        Self {
            what,
            limit,
            buf: Vec::new(),
        }
    }

    fn too_large(&self, size: u64) -> ToolError {
        ToolError::Unavailable(format!(
            "{} too large: {} bytes (max {})",
            self.what, size, self.limit
        ))
    }

    fn check_declared(&self, content_length: Option<u64>) -> Result<(), ToolError> {
        match content_length {
            Some(size) if size > self.limit as u64 => Err(self.too_large(size)),
            _ => Ok(()),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<(), ToolError> {
        let size = self.buf.len() + chunk.len();
        if size > self.limit {
            return Err(self.too_large(size as u64));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }
}

/// A form found on the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormInfo {
    pub action: String,
    pub method: String,
    pub inputs: Vec<FormInput>,
    /// Asks for a password, email or payment detail.
    pub collects_credentials: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    pub input_type: String,
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    /// First few external links.
    pub external: Vec<String>,
    /// First few same-host links.
    pub internal: Vec<String>,
    pub external_count: usize,
    pub internal_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeaders {
    pub https: bool,
    pub strict_transport_security: bool,
    pub content_security_policy: bool,
    pub x_frame_options: bool,
}

/// Structured view of a fetched page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub requested_url: String,
    pub final_url: String,
    #[serde(default)]
    pub status_code: u16,
    pub title: String,
    pub text: String,
    pub forms: Vec<FormInfo>,
    pub links: LinkSummary,
    pub images: Vec<ImageRef>,
    pub meta: BTreeMap<String, String>,
    pub security_headers: SecurityHeaders,
}

/// Outcome of a reputation database lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationReport {
    pub threats_found: Vec<String>,
    /// 0-100, 0 when nothing matched.
    pub raw_score: u8,
}

/// Registration data for a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub domain: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub registrar: Option<String>,
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub status: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Low,
    Medium,
    High,
}

/// Verdict of a text classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextVerdict {
    pub scam_likelihood: Likelihood,
    /// Classifier certainty, 0-100.
    pub confidence: f64,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub social_engineering_tactics: Vec<String>,
    #[serde(default)]
    pub overall_assessment: String,
}

/// Verdict of an image classifier for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVerdict {
    pub suspicious: bool,
    /// 0-100.
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub deepfake_indicators: Vec<String>,
}

/// Tool selection proposed by a plan advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAdvice {
    pub tools: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<PageContent, ToolError>;
}

#[async_trait]
pub trait ReputationService: Send + Sync {
    async fn check(&self, url: &str) -> Result<ReputationReport, ToolError>;
}

#[async_trait]
pub trait DomainInfoService: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<DomainInfo, ToolError>;
}

#[async_trait]
pub trait TextClassifier: Send + Sync {
    async fn classify_text(&self, text: &str) -> Result<TextVerdict, ToolError>;
}

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify_image(&self, image: &ImageRef) -> Result<ImageVerdict, ToolError>;
}

/// Proposes which tools to run for a target.
#[async_trait]
pub trait PlanAdvisor: Send + Sync {
    async fn advise(
        &self,
        target: &Target,
        tools: &[ToolDescriptor],
    ) -> Result<PlanAdvice, ToolError>;
}

/// Strip a surrounding Markdown code fence, if any, from a model reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
