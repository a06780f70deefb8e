// AgentGate - Main Entry Point
//
// Command-line front end for the action gate:
// - Evaluate agent actions against an identity's permission policy
// - Drive the keyed rate limiter
// - Show the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use agentgate::clock::SystemClock;
use agentgate::config::Config;
use agentgate::permissions::{Decision, PermissionChecker};
use agentgate::rate_limit::{RateLimiter, DEFAULT_KEY};
use agentgate::{logging, metrics};
use tracing::info;

/// AgentGate: rate limiting and permission policy for autonomous agents
#[derive(Parser, Debug)]
#[command(name = "agentgate")]
#[command(author = "AgentGate Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Gate agent actions behind rate limits and permission policy", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file (defaults to the XDG config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate actions in order, recording each allowed one
    Check {
        /// Actions to attempt
        #[arg(required = true)]
        actions: Vec<String>,

        /// Grant a one-shot approval before evaluating (repeatable)
        #[arg(long = "approve")]
        approvals: Vec<String>,

        /// Print per-action stats as JSON afterwards
        #[arg(long)]
        stats: bool,
    },
    /// Attempt a key against the rate limiter several times
    Limit {
        /// Bucket key (empty for the default key)
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,

        /// Number of attempts
        #[arg(long, default_value_t = 1)]
        attempts: u32,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging, args.verbose)?;
    metrics::init().context("Failed to register metrics")?;

    info!("AgentGate v0.1.0 starting...");

    match args.command {
        Some(Commands::Check {
            actions,
            approvals,
            stats,
        }) => check_actions(&config, &actions, &approvals, stats)?,
        Some(Commands::Limit { key, attempts }) => run_limiter(&config, &key, attempts)?,
        Some(Commands::ShowConfig) => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", text);
        }
        None => {
            info!("No command specified. Use \"agentgate --help\" for usage.");
        }
    }

    Ok(())
}

/// Evaluate each action against the identity's policy
fn check_actions(
    config: &Config,
    actions: &[String],
    approvals: &[String],
    print_stats: bool,
) -> Result<()> {
    let checker = PermissionChecker::from_identity_with_clock(&config.identity, Arc::new(SystemClock))
        .context("Invalid identity permissions")?;

    for action in approvals {
        checker.grant_approval(action);
    }

    for action in actions {
        match checker.try_record(action) {
            Decision::Allowed => println!("ALLOWED {}", action),
            Decision::Denied(denial) => println!("DENIED {}: {}", action, denial),
        }
    }

    if print_stats {
        let stats = serde_json::to_string_pretty(&checker.get_stats())?;
        println!("{}", stats);
    }

    Ok(())
}

/// Run `attempts` back-to-back requests for `key`
fn run_limiter(config: &Config, key: &str, attempts: u32) -> Result<()> {
    let limiter = RateLimiter::from_config(&config.rate_limit, Arc::new(SystemClock))
        .context("Invalid rate limit configuration")?;

    for attempt in 1..=attempts {
        let result = limiter.check(key);
        if result.allowed {
            println!("{} allowed (remaining {})", attempt, result.remaining);
        } else {
            let wait = result.retry_after.unwrap_or_default();
            println!("{} denied (retry after {:.3}s)", attempt, wait.as_secs_f64());
        }
    }

    let stats = serde_json::to_string_pretty(&limiter.stats())?;
    println!("{}", stats);
    Ok(())
}
