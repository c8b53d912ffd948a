//! Data models for the investigation core.
//!
//! This module contains the data structures shared by the planner,
//! orchestrator, aggregator and report generator.

use crate::error::{ErrorKind, ToolError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The URL under investigation plus any already-extracted artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// URL being assessed.
    pub url: String,
    /// Pre-fetched page HTML. When present the page is not fetched again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Pre-extracted visible text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Extra image to analyze alongside the page images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: None,
            text: None,
            image_url: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Lowercased host of the target URL, if it parses.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    /// All text a trigger rule may match against: URL, supplied text and HTML.
    pub fn searchable_text(&self) -> String {
        let mut haystack = self.url.to_lowercase();
        for extra in [&self.text, &self.html].into_iter().flatten() {
            haystack.push('\n');
            haystack.push_str(&extra.to_lowercase());
        }
        haystack
    }
}

/// Static metadata a tool exposes without executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// 0 = free/local, >0 = consumes rate-limited quota.
    pub external_cost: u32,
    /// Tools that must have succeeded before this one runs.
    pub dependencies: Vec<String>,
    /// Error results from this tool are counted as a neutral zero score.
    #[serde(default)]
    pub neutral_on_error: bool,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, external_cost: u32) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            external_cost,
            dependencies: Vec::new(),
            neutral_on_error: false,
        }
    }

    pub fn depends_on(mut self, tool: &str) -> Self {
        self.dependencies.push(tool.to_string());
        self
    }
}

/// Outcome status of one tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Skipped,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Success => write!(f, "Success"),
            ToolStatus::Error => write!(f, "Error"),
            ToolStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

impl ToolStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            ToolStatus::Success => "✅",
            ToolStatus::Error => "❌",
            ToolStatus::Skipped => "⏭️",
        }
    }
}

/// Clamp an arbitrary score into the 0-100 confidence range.
pub fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Result of executing (or skipping) one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    /// Risk confidence in [0, 100]. Always 0 unless status is Success.
    pub confidence: u8,
    /// Tool-specific findings.
    #[serde(default)]
    pub findings: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Raw upstream payload kept when a response could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    /// Error result that still counts towards aggregation as a zero score.
    #[serde(default)]
    pub neutral: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(tool_name: &str, confidence: u8, findings: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Success,
            confidence: confidence.min(100),
            findings,
            error: None,
            error_kind: None,
            diagnostics: None,
            neutral: false,
            duration_ms: 0,
        }
    }

    pub fn error(tool_name: &str, err: &ToolError) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Error,
            confidence: 0,
            findings: Value::Null,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            diagnostics: err.raw_payload().map(str::to_string),
            neutral: false,
            duration_ms: 0,
        }
    }

    pub fn skipped(tool_name: &str, message: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Skipped,
            confidence: 0,
            findings: Value::Null,
            error: Some(message),
            error_kind: None,
            diagnostics: None,
            neutral: false,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Mark an error result as neutral-but-includable.
    pub fn as_neutral(mut self) -> Self {
        if self.status == ToolStatus::Error {
            self.neutral = true;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Whether this result takes part in score aggregation.
    pub fn is_scored(&self) -> bool {
        match self.status {
            ToolStatus::Success => true,
            ToolStatus::Error => self.neutral,
            ToolStatus::Skipped => false,
        }
    }
}

/// Urgency of an investigation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
        }
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" | "critical" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

/// Where the tool list of a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    /// Every registered tool in dependency order.
    Default,
    /// Proposed by the plan advisor and repaired.
    Advisor,
    /// Restricted to a caller-supplied tool list and repaired.
    Restricted,
}

/// Ordered list of tools to run for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationPlan {
    pub tools: Vec<String>,
    pub rationale: String,
    pub priority: Priority,
    /// Quota units the plan is expected to consume.
    pub estimated_cost: u32,
    pub source: PlanSource,
    /// Tools force-included by trigger rules.
    #[serde(default)]
    pub triggered: Vec<String>,
}

impl InvestigationPlan {
    /// Build a plan directly from a tool list, mostly for callers that
    /// bypass the planner.
    pub fn from_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            rationale: "Caller-supplied plan".to_string(),
            priority: Priority::Medium,
            estimated_cost: 0,
            source: PlanSource::Restricted,
            triggered: Vec::new(),
        }
    }
}

/// One tool's non-zero contribution to the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub tool_name: String,
    pub confidence: u8,
}

/// Weighted combination of the tool confidences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedScore {
    pub weighted_sum: f64,
    pub max_possible_weighted_sum: f64,
    /// Normalized risk probability in [0, 100].
    pub normalized_probability: u8,
    /// Results with confidence > 0, in execution order.
    pub contributing_factors: Vec<ContributingFactor>,
}

impl Default for AggregatedScore {
    fn default() -> Self {
        Self {
            weighted_sum: 0.0,
            max_possible_weighted_sum: 0.0,
            normalized_probability: 0,
            contributing_factors: Vec::new(),
        }
    }
}

/// Discrete risk verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Extreme,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Minimal => write!(f, "Minimal"),
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Moderate => write!(f, "Moderate"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Extreme => write!(f, "Extreme"),
        }
    }
}

impl RiskLevel {
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "🟢",
            RiskLevel::Low => "🔵",
            RiskLevel::Moderate => "🟡",
            RiskLevel::High => "🟠",
            RiskLevel::Extreme => "🔴",
        }
    }

    /// Canned user-facing advice for this level.
    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "Proceed with normal caution. No meaningful risk indicators were found.",
            RiskLevel::Low => "Likely legitimate, but double-check before sharing personal details.",
            RiskLevel::Moderate => "Exercise caution and verify the site independently before interacting.",
            RiskLevel::High => "Avoid this site. Do not provide personal or payment information.",
            RiskLevel::Extreme => "Do not interact. This site shows strong indicators of being a scam.",
        }
    }
}

/// Lifecycle of one investigation. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationPhase {
    Created,
    Planned,
    Executing,
    Aggregated,
    Classified,
    Reported,
}

/// Immutable record of a whole investigation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub target: Target,
    pub plan: InvestigationPlan,
    pub results: BTreeMap<String, ToolResult>,
    pub execution_order: Vec<String>,
    pub score: AggregatedScore,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub phase: InvestigationPhase,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Rate-limited calls admitted while the tools ran; None without a limiter.
    #[serde(default)]
    pub quota_used: Option<u64>,
    pub version: String,
}

impl InvestigationReport {
    /// Results in the order the tools ran.
    pub fn ordered_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.execution_order
            .iter()
            .filter_map(|name| self.results.get(name))
    }

    pub fn count_by_status(&self, status: ToolStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }
}
