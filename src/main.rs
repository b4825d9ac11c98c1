//! Convoke command-line interface
//!
//! Thin driver over the conversation core:
//!   convoke run <setup.json>     load a setup and run it to completion
//!   convoke clear-cache          drop the response cache

use anyhow::Context;
use clap::{Parser, Subcommand};
use convoke::cache::ResponseCache;
use convoke::config::{CacheConfig, RuntimeConfig};
use convoke::conversation::{ConversationRuntime, StepOutcome};
use convoke::setup::Setup;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convoke", version, about = "Multi-model meeting simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a setup file and run the conversation to completion
    Run {
        /// Path to the setup JSON file
        setup: PathBuf,

        /// Response cache file (defaults to the user cache directory)
        #[arg(long)]
        cache_file: Option<PathBuf>,

        /// Seconds a cached response stays valid
        #[arg(long)]
        cache_ttl_secs: Option<u64>,

        /// Log cache hit/miss decisions
        #[arg(long)]
        cache_debug: bool,

        /// Skip the response cache entirely for this run
        #[arg(long)]
        no_cache: bool,

        /// Pause for Enter between turns
        #[arg(long)]
        step: bool,
    },
    /// Remove every cached response
    ClearCache {
        /// Response cache file (defaults to the user cache directory)
        #[arg(long)]
        cache_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            setup,
            cache_file,
            cache_ttl_secs,
            cache_debug,
            no_cache,
            step,
        } => {
            let mut config = RuntimeConfig::new();
            config.cache.path = if no_cache {
                None
            } else {
                Some(cache_file.unwrap_or_else(CacheConfig::default_path))
            };
            if let Some(secs) = cache_ttl_secs {
                config.cache.ttl = std::time::Duration::from_secs(secs);
            }
            config.cache.debug = cache_debug;
            let config = config.apply_env();

            run_conversation(&setup, config, step).await
        }
        Command::ClearCache { cache_file } => {
            let path = cache_file.unwrap_or_else(CacheConfig::default_path);
            let cache = ResponseCache::open(&path, false);
            cache.clear();
            println!("Cache cleared: {}", path.display());
            Ok(())
        }
    }
}

async fn run_conversation(
    setup_path: &PathBuf,
    config: RuntimeConfig,
    stepwise: bool,
) -> anyhow::Result<()> {
    let mut setup = Setup::load(setup_path)
        .with_context(|| format!("loading setup from {}", setup_path.display()))?;
    setup.ensure_conversation_id();

    let runtime = ConversationRuntime::new(config);
    let mut run = runtime
        .start_run(setup)
        .context("starting conversation run")?;

    // The scripted opening message, when configured, is already recorded.
    let mut printed = 0;
    print_new_messages(&run, &mut printed);

    loop {
        if stepwise {
            println!("[Enter for next turn]");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
        }
        let outcome = run.step().await?;
        // Goal checks and closing messages land in the transcript without
        // being the step's own message, so print from the watermark.
        print_new_messages(&run, &mut printed);
        if let StepOutcome::Terminated(reason) = outcome {
            println!("\nConversation finished: {reason:?}");
            break;
        }
    }

    let usage = run.usage();
    println!(
        "Tokens: {} prompt / {} completion ({} cache hits, {} misses, {} connector calls)",
        usage.totals.prompt_tokens,
        usage.totals.completion_tokens,
        usage.cache_hits,
        usage.cache_misses,
        usage.connector_calls
    );
    if let Some(path) = run.log_path() {
        println!("Log saved to {}", path.display());
    }
    Ok(())
}

fn print_new_messages(run: &convoke::RunHandle, printed: &mut usize) {
    for message in &run.transcript().messages[*printed..] {
        let hit = if message.cache_hit { " (cached)" } else { "" };
        println!("{}: {}{}", message.speaker, message.text, hit);
    }
    *printed = run.transcript().messages.len();
}
