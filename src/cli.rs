//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::RiskLevel;
use clap::Parser;
use std::path::PathBuf;

/// ScamProbe - tool-orchestrated scam risk assessment for URLs
///
/// Runs reputation, domain, content, text and image checks against a URL,
/// combines them into a weighted scam probability and prints a report.
///
/// Examples:
///   scamprobe --url https://paypa1-verify.example.com
///   scamprobe --url https://shop.example.com --tools content_analysis,text_analysis
///   scamprobe --url https://example.com --advise --format json --output report.json
///   scamprobe --url https://example.com --dry-run
///   scamprobe --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// URL to investigate
    #[arg(short, long, value_name = "URL", required_unless_present = "init_config")]
    pub url: Option<String>,

    /// File with already-extracted page text to analyze
    #[arg(long, value_name = "FILE")]
    pub text_file: Option<PathBuf>,

    /// Extra image URL to analyze alongside the page images
    #[arg(long, value_name = "URL")]
    pub image: Option<String>,

    /// Only run these tools (comma-separated); dependencies are added
    ///
    /// Example: --tools reputation_lookup,text_analysis
    #[arg(long, value_name = "TOOLS", value_delimiter = ',')]
    pub tools: Option<Vec<String>>,

    /// Ask the LLM to propose the investigation plan
    #[arg(long)]
    pub advise: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fail if the risk level is at or above this level
    ///
    /// Useful for CI pipelines and mail filters. Exit code 2 when reached.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Print the investigation plan and exit without running tools
    #[arg(long)]
    pub dry_run: bool,

    /// Overall investigation deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .scamprobe.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Ollama model for text classification and plan advice
    #[arg(short, long, env = "SCAMPROBE_MODEL")]
    pub model: Option<String>,

    /// Google Safe Browsing API key
    #[arg(long, env = "GOOGLE_SAFE_BROWSING_API_KEY", hide_env_values = true)]
    pub safe_browsing_key: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .scamprobe.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Risk threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Moderate,
    High,
    Extreme,
}

impl From<FailOnLevel> for RiskLevel {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => RiskLevel::Low,
            FailOnLevel::Moderate => RiskLevel::Moderate,
            FailOnLevel::High => RiskLevel::High,
            FailOnLevel::Extreme => RiskLevel::Extreme,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The target URL; empty until validated.
    pub fn target_url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        let url = self.target_url();
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err("URL must be an absolute http:// or https:// address".to_string()),
        }

        if let Some(ref ollama_url) = self.ollama_url {
            if !ollama_url.starts_with("http://") && !ollama_url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref tools) = self.tools {
            if tools.iter().all(|t| t.trim().is_empty()) {
                return Err("--tools needs at least one tool name".to_string());
            }
        }

        if let Some(ref path) = self.text_file {
            if !path.is_file() {
                return Err(format!("Text file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Requested tool names, trimmed, with blanks removed.
    pub fn tool_restriction(&self) -> Option<Vec<String>> {
        self.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::NamedTempFile;

    fn make_args() -> Args {
        Args {
            url: Some("https://example.com/login".to_string()),
            text_file: None,
            image: None,
            tools: None,
            advise: false,
            format: OutputFormat::Markdown,
            output: None,
            fail_on: None,
            dry_run: false,
            timeout: None,
            config: None,
            ollama_url: None,
            model: None,
            safe_browsing_key: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.url = Some("example.com".to_string());
        assert!(args.validate().is_err());

        args.url = Some("ftp://example.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_text_file() {
        let mut args = make_args();
        args.text_file = Some(PathBuf::from("/definitely/not/here.txt"));
        assert!(args.validate().is_err());

        let file = NamedTempFile::new().unwrap();
        args.text_file = Some(file.path().to_path_buf());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.url = None;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_tool_restriction_trims() {
        let mut args = make_args();
        assert_eq!(args.tool_restriction(), None);

        args.tools = Some(vec![" text_analysis".to_string(), "".to_string()]);
        assert_eq!(args.tool_restriction(), Some(vec!["text_analysis".to_string()]));

        args.tools = Some(vec![" ".to_string()]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_fail_on_maps_to_risk_level() {
        assert_eq!(RiskLevel::from(FailOnLevel::Moderate), RiskLevel::Moderate);
        assert!(RiskLevel::High >= RiskLevel::from(FailOnLevel::Moderate));
    }

    #[test]
    fn test_merge_with_args_only_overrides_given_values() {
        let mut config = Config::default();
        let mut args = make_args();
        config.merge_with_args(&args);
        assert_eq!(config.llm.model, "llama3.2:latest");
        assert!(!config.planner.use_advisor);

        args.model = Some("mistral:7b".to_string());
        args.timeout = Some(45);
        args.advise = true;
        args.safe_browsing_key = Some("key".to_string());
        config.merge_with_args(&args);
        assert_eq!(config.llm.model, "mistral:7b");
        assert_eq!(config.general.deadline_seconds, Some(45));
        assert!(config.planner.use_advisor);
        assert_eq!(config.reputation.api_key.as_deref(), Some("key"));
    }
}
