//! Switchboard CLI - route prompts to expert handlers

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::config::Config;
use switchboard_core::embedding::CachedEmbedder;
use switchboard_core::routing::{
    AdaptiveStrategy, ExpertProfile, Feedback, RequestContext, RoutingDecision,
    RoutingStrategy,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about = "Adaptive multi-strategy expert router", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a prompt to an expert
    Route {
        /// The prompt to route
        prompt: String,
        /// Request context entries (key=value, value parsed as JSON when possible)
        #[arg(short, long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Give up and use the fallback expert after this many milliseconds
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,
    },

    /// Replay a JSONL log of prompts and outcomes through the router
    Replay {
        /// File with one {"prompt", "success", "response_time"} object per line
        file: PathBuf,
    },

    /// Show router state
    State {
        /// Initialize strategies (computes profile embeddings) before reporting
        #[arg(long)]
        init: bool,
    },

    /// List the built-in expert profiles
    Profiles,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// One line of a replay log
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    prompt: String,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    response_time: f64,
    #[serde(default)]
    context: Option<RequestContext>,
}

fn default_success() -> bool {
    true
}

/// Totals printed after a replay
#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    requests: usize,
    successes: usize,
    explorations: usize,
    fallbacks: usize,
    experts: BTreeMap<String, usize>,
    average_confidence: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("switchboard=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Route {
            prompt,
            context,
            deadline_ms,
        } => cmd_route(&prompt, &context, deadline_ms, cli.format, cli.quiet).await,

        Commands::Replay { file } => cmd_replay(&file, cli.format, cli.quiet).await,

        Commands::State { init } => cmd_state(init).await,

        Commands::Profiles => cmd_profiles(cli.format),

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn build_router() -> anyhow::Result<AdaptiveStrategy> {
    let config = Config::load()?;
    let router = AdaptiveStrategy::from_config(&config).context("Failed to build router")?;
    debug!(strategies = ?router.strategy_names(), "Router ready");
    Ok(router)
}

/// Parse `key=value` pairs, keeping values that are valid JSON as JSON
fn parse_context(entries: &[String]) -> anyhow::Result<Option<RequestContext>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let mut context = RequestContext::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("Context entry '{}' must look like key=value", entry))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Context entry '{}' has an empty key", entry);
        }
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(Some(context))
}

fn print_decision(decision: &RoutingDecision, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(decision)?);
        return Ok(());
    }
    if quiet {
        println!("{}", decision.expert);
        return Ok(());
    }

    println!("Expert:     {}", decision.expert);
    println!("Confidence: {:.3}", decision.confidence);
    println!("Strategy:   {}", decision.strategy_used);
    if let Some(id) = decision.decision_id() {
        println!("Decision:   {}", id);
    }
    if let Some(reason) = decision.fallback_reason() {
        println!("Fallback:   {}", reason);
    }
    if let Some(votes) = decision.metadata_value("strategies").and_then(Value::as_object) {
        println!();
        println!("Votes:");
        for (name, vote) in votes {
            println!(
                "  {:<12} {:<14} confidence {:.3}  weight {:.3}",
                name,
                vote["expert"].as_str().unwrap_or("?"),
                vote["confidence"].as_f64().unwrap_or(0.0),
                vote["adjusted_weight"].as_f64().unwrap_or(0.0),
            );
        }
    }
    Ok(())
}

async fn cmd_route(
    prompt: &str,
    context: &[String],
    deadline_ms: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let context = parse_context(context)?;
    let router = build_router()?;

    let decision = match deadline_ms {
        Some(ms) => {
            router
                .select_expert_with_deadline(prompt, context.as_ref(), Duration::from_millis(ms))
                .await?
        }
        None => router.select_expert(prompt, context.as_ref()).await?,
    };

    print_decision(&decision, format, quiet)?;
    router.shutdown().await?;
    Ok(())
}

fn read_replay_log(path: &Path) -> anyhow::Result<Vec<ReplayEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file: {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid replay entry on line {}", index + 1))
        })
        .collect()
}

async fn cmd_replay(path: &Path, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let entries = read_replay_log(path)?;
    let router = build_router()?;

    info!(entries = entries.len(), file = %path.display(), "Replaying routing log");

    let mut summary = ReplaySummary::default();
    let mut confidence_total = 0.0;

    for entry in &entries {
        let decision = router
            .select_expert(&entry.prompt, entry.context.as_ref())
            .await?;

        summary.requests += 1;
        confidence_total += decision.confidence;
        if entry.success {
            summary.successes += 1;
        }
        if decision.is_exploration() {
            summary.explorations += 1;
        }
        if decision.fallback_reason().is_some() {
            summary.fallbacks += 1;
        }
        *summary
            .experts
            .entry(decision.expert.to_string())
            .or_default() += 1;

        if !quiet && format == OutputFormat::Text {
            println!(
                "{:<14} {:.3}  {}",
                decision.expert, decision.confidence, entry.prompt
            );
        }

        router
            .update_performance(
                decision.expert,
                entry.success,
                entry.response_time,
                &Feedback::for_decision(&decision),
            )
            .await?;
    }

    if summary.requests > 0 {
        summary.average_confidence = confidence_total / summary.requests as f64;
    }
    let state = router.strategy_state();
    router.shutdown().await?;

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({ "summary": summary, "state": state });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if !quiet {
                println!();
            }
            println!(
                "Replayed {} requests ({} successful, {} explorations, {} fallbacks)",
                summary.requests, summary.successes, summary.explorations, summary.fallbacks
            );
            println!("Average confidence: {:.3}", summary.average_confidence);
            for (expert, count) in &summary.experts {
                println!("  {:<14} {}", expert, count);
            }
            if !quiet {
                println!();
                println!("Learned strategy performance:");
                for (name, performance) in router.learned_performance() {
                    println!("  {:<12} {:.3}", name, performance);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_state(init: bool) -> anyhow::Result<()> {
    let router = build_router()?;
    if init {
        router.initialize().await?;
    }
    println!("{}", serde_json::to_string_pretty(&router.strategy_state())?);
    router.shutdown().await?;
    Ok(())
}

fn cmd_profiles(format: OutputFormat) -> anyhow::Result<()> {
    let profiles = ExpertProfile::defaults();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for profile in &profiles {
        println!("{}", profile.expert);
        println!("  {}", profile.description);
        println!("  Keywords: {}", profile.keywords.join(", "));
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Switchboard Health Check");
        println!("========================");
        println!();
    }

    let mut all_ok = true;

    // Check config file location
    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    // Check configuration and the embedding service
    match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
                let strategies: Vec<String> = config
                    .adaptive
                    .strategies
                    .iter()
                    .map(|s| format!("{}:{}", s.kind, s.weight))
                    .collect();
                println!("     Strategies: {}", strategies.join(", "));
            }

            let host = config.embedding.resolved_host();
            let embedding = match CachedEmbedder::from_config(&config.embedding) {
                Ok(embedder) => embedder.embed("switchboard health check").await.map(|_| ()),
                Err(e) => Err(e),
            };
            match embedding {
                Ok(()) => {
                    if !quiet {
                        println!(
                            "[OK] Embeddings: {} ({}, {} dimensions)",
                            host, config.embedding.model, config.embedding.dimension
                        );
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Embeddings: {} - {}", host, e);
                        if let Some(hint) = e.suggestion() {
                            println!("     Try: {}", hint);
                        }
                        println!("     Vector routing will fall back to the orchestrator");
                    }
                }
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
        }
    }

    // Summary
    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod main_tests;
