//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.scamprobe.toml` files.

use crate::analysis::aggregator::DEFAULT_FALLBACK_WEIGHT;
use crate::analysis::ScoringWeights;
use crate::investigation::planner::DEEPFAKE_KEYWORDS;
use crate::investigation::TriggerRule;
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::services::ollama::OllamaSettings;
use crate::services::rdap::DEFAULT_BASE_URL;
use crate::services::safe_browsing::DEFAULT_ENDPOINT;
use crate::tools::image::DEFAULT_MAX_IMAGES;
use crate::tools::IMAGE_ANALYSIS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".scamprobe.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Shared quota for LLM calls.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub reputation: ReputationConfig,

    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// HTTP request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Upper bound for a single tool run in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,

    /// Overall investigation deadline in seconds. Unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: default_http_timeout(),
            tool_timeout_seconds: default_tool_timeout(),
            deadline_seconds: None,
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    120
}

/// Sliding-window limits for the shared LLM quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window")]
    pub window_seconds: u64,

    #[serde(default = "default_safety_margin")]
    pub safety_margin_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window(),
            safety_margin_ms: default_safety_margin(),
        }
    }
}

fn default_max_requests() -> usize {
    55
}

fn default_window() -> u64 {
    60
}

fn default_safety_margin() -> u64 {
    100
}

/// Ollama model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model used for text classification and plan advice.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for image classification.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_ollama_url() -> String {
    OllamaSettings::default().base_url
}

fn default_model() -> String {
    OllamaSettings::default().model
}

fn default_vision_model() -> String {
    OllamaSettings::default().vision_model
}

fn default_temperature() -> f32 {
    0.1
}

/// Safe Browsing reputation lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// API key. Usually supplied through `GOOGLE_SAFE_BROWSING_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_reputation_endpoint")]
    pub endpoint: String,

    /// Host suffixes never sent for lookup.
    #[serde(default = "default_excluded_suffixes")]
    pub excluded_suffixes: Vec<String>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_reputation_endpoint(),
            excluded_suffixes: default_excluded_suffixes(),
        }
    }
}

fn default_reputation_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_excluded_suffixes() -> Vec<String> {
    vec![".gov", ".mil", "localhost"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Registration data lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_rdap_url")]
    pub rdap_url: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            rdap_url: default_rdap_url(),
        }
    }
}

fn default_rdap_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Page content settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Images sent to the vision model per investigation.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
        }
    }
}

fn default_max_images() -> usize {
    DEFAULT_MAX_IMAGES
}

/// One keyword rule that forces a tool into every plan it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub tool: String,
    pub keywords: Vec<String>,
}

/// Planning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Ask the LLM to propose a plan before running tools.
    #[serde(default)]
    pub use_advisor: bool,

    #[serde(default = "default_triggers")]
    pub triggers: Vec<TriggerConfig>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            use_advisor: false,
            triggers: default_triggers(),
        }
    }
}

fn default_triggers() -> Vec<TriggerConfig> {
    vec![TriggerConfig {
        tool: IMAGE_ANALYSIS.to_string(),
        keywords: DEEPFAKE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
    }]
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight for tools not listed in `weights`.
    #[serde(default = "default_fallback_weight")]
    pub fallback_weight: f64,

    /// Tools whose errors count as a zero score instead of being dropped.
    #[serde(default)]
    pub neutral_on_error: Vec<String>,

    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fallback_weight: default_fallback_weight(),
            neutral_on_error: Vec::new(),
            weights: default_weights(),
        }
    }
}

fn default_fallback_weight() -> f64 {
    DEFAULT_FALLBACK_WEIGHT
}

fn default_weights() -> BTreeMap<String, f64> {
    ScoringWeights::default().weights
}

/// Backoff for transient network failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    8000
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.ollama_url {
            self.llm.ollama_url = url.clone();
        }
        if let Some(ref model) = args.model {
            self.llm.model = model.clone();
        }
        if let Some(ref key) = args.safe_browsing_key {
            self.reputation.api_key = Some(key.clone());
        }
        if let Some(timeout) = args.timeout {
            self.general.deadline_seconds = Some(timeout);
        }
        if args.advise {
            self.planner.use_advisor = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.window_seconds),
        )
        .with_safety_margin(Duration::from_millis(self.rate_limit.safety_margin_ms))
    }

    pub fn ollama_settings(&self) -> OllamaSettings {
        OllamaSettings {
            base_url: self.llm.ollama_url.clone(),
            model: self.llm.model.clone(),
            vision_model: self.llm.vision_model.clone(),
            temperature: self.llm.temperature,
        }
    }

    pub fn scoring_weights(&self) -> ScoringWeights {
        ScoringWeights::with_overrides(&self.scoring.weights, self.scoring.fallback_weight)
    }

    /// Compile the configured trigger rules.
    pub fn trigger_rules(&self) -> Result<Vec<TriggerRule>> {
        self.planner
            .triggers
            .iter()
            .map(|t| {
                TriggerRule::new(&t.tool, &t.keywords)
                    .with_context(|| format!("Invalid trigger keywords for tool '{}'", t.tool))
            })
            .collect()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.general.tool_timeout_seconds.max(1))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.general.deadline_seconds.map(Duration::from_secs)
    }
}
