//! ScamProbe - scam risk assessment for URLs
//!
//! A CLI tool that plans and runs reputation, domain, content, text and
//! image checks against a URL and reports a weighted scam probability.
//!
//! Exit codes:
//!   0 - Success (risk below threshold, or no --fail-on set)
//!   1 - Runtime error (bad arguments, config, report write, etc.)
//!   2 - Risk level at or above the --fail-on threshold

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use scamprobe::cli::{Args, OutputFormat};
use scamprobe::config::{Config, DEFAULT_CONFIG_FILE};
use scamprobe::investigation::Investigator;
use scamprobe::models::{InvestigationPlan, RiskLevel, Target, ToolStatus};
use scamprobe::report;
use scamprobe::services::{
    self, HttpContentExtractor, OllamaClient, RdapClient, SafeBrowsingClient,
};
use scamprobe::tools::{
    ContentTool, DomainTool, ImageTool, ReputationTool, TextTool, ToolRegistry,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("ScamProbe v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_investigation(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Investigation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .scamprobe.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize models, rate limits, weights and triggers.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so a report printed to stdout stays clean.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete investigation workflow. Returns exit code (0 or 2).
async fn run_investigation(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let target = build_target(&args)?;
    let investigator = build_investigator(&config)?;

    if let Some(restrict) = args.tool_restriction() {
        for name in &restrict {
            if !investigator.registry().contains(name) {
                warn!("Unknown tool '{}' in --tools; it will be ignored", name);
            }
        }
    }

    let plan = investigator.plan(&target, args.tool_restriction()).await;

    if args.dry_run {
        return handle_dry_run(&target, &plan);
    }

    let spinner = (!args.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!(
            "Investigating {} with {} tool(s)...",
            target.url,
            plan.tools.len()
        ));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    });

    let investigation = investigator.run_plan(target, plan).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&investigation)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&investigation, &config.scoring_weights())
        }
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => println!("{}", output),
    }

    if !args.quiet {
        eprintln!("\n📊 Investigation Summary:");
        eprintln!(
            "   {} Risk: {} ({}% scam probability)",
            investigation.risk_level.emoji(),
            investigation.risk_level,
            investigation.score.normalized_probability
        );
        eprintln!(
            "   Tools: ✅ {} | ❌ {} | ⏭️ {}",
            investigation.count_by_status(ToolStatus::Success),
            investigation.count_by_status(ToolStatus::Error),
            investigation.count_by_status(ToolStatus::Skipped)
        );
        eprintln!("   Duration: {:.1}s", investigation.duration_seconds);
        if let Some(ref path) = args.output {
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
    }

    if let Some(fail_level) = args.fail_on {
        let threshold = RiskLevel::from(fail_level);
        if investigation.risk_level >= threshold {
            eprintln!(
                "\n⛔ Risk level {} is at or above {:?}. Failing (exit code 2).",
                investigation.risk_level, fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Handle --dry-run: print the plan, run nothing.
fn handle_dry_run(target: &Target, plan: &InvestigationPlan) -> Result<i32> {
    println!("\n🔍 Dry run: planning only (no tools executed)...\n");
    println!("   Target: {}", target.url);
    println!("   Source: {:?}", plan.source);
    println!("   Priority: {}", plan.priority);
    println!("   Estimated cost: {}", plan.estimated_cost);
    if !plan.triggered.is_empty() {
        println!("   Triggered: {}", plan.triggered.join(", "));
    }
    println!("   Rationale: {}\n", plan.rationale);

    for (i, tool) in plan.tools.iter().enumerate() {
        println!("     {}. 🔧 {}", i + 1, tool);
    }

    println!("\n✅ Dry run complete. No tools were run.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// Assemble the Target from the URL and optional artifacts.
fn build_target(args: &Args) -> Result<Target> {
    let mut target = Target::new(args.target_url());

    if let Some(ref path) = args.text_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {}", path.display()))?;
        target = target.with_text(text);
    }
    if let Some(ref image) = args.image {
        target = target.with_image(image.clone());
    }

    Ok(target)
}

/// Wire the HTTP collaborators, tools and scoring into an Investigator.
fn build_investigator(config: &Config) -> Result<Investigator> {
    let http = services::http_client(Duration::from_secs(config.general.http_timeout_seconds))?;
    let retry = config.retry_policy();
    let limiter = Arc::new(config.rate_limiter());

    info!(
        "🤖 Ollama: {} (text: {}, vision: {})",
        config.llm.ollama_url, config.llm.model, config.llm.vision_model
    );
    info!(
        "⏱️  Rate limit: {} requests per {}s",
        limiter.max_requests(),
        limiter.time_window().as_secs()
    );

    let reputation = SafeBrowsingClient::new(http.clone(), config.reputation.api_key.clone(), retry)
        .with_endpoint(config.reputation.endpoint.clone());
    let rdap = RdapClient::new(http.clone(), config.domain.rdap_url.clone(), retry);
    let extractor = HttpContentExtractor::new(http.clone(), retry);
    let ollama = Arc::new(OllamaClient::new(
        http,
        config.ollama_settings(),
        limiter.clone(),
        retry,
    ));

    let mut registry = ToolRegistry::new()
        .with(Arc::new(ReputationTool::new(
            Arc::new(reputation),
            config.reputation.excluded_suffixes.clone(),
        )))
        .with(Arc::new(DomainTool::new(Arc::new(rdap))))
        .with(Arc::new(ContentTool::new(Arc::new(extractor))))
        .with(Arc::new(ImageTool::new(
            ollama.clone(),
            config.content.max_images,
        )))
        .with(Arc::new(TextTool::new(ollama.clone())));
    registry.set_neutral_on_error(&config.scoring.neutral_on_error);

    let mut investigator = Investigator::new(registry, config.trigger_rules()?)
        .with_rate_limiter(limiter)
        .with_weights(config.scoring_weights())
        .with_tool_timeout(config.tool_timeout())
        .with_deadline(config.deadline());

    if config.planner.use_advisor {
        investigator = investigator.with_advisor(ollama);
    }

    Ok(investigator)
}
