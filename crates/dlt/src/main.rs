// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod tui;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use dd_log_tail::config::{
    get_config, write_default_config, ConfigBuilder, EnvConfigSource, FlagsConfigSource,
    PartialConfig,
};
use dd_log_tail::{
    logger, parse_time_range, BatchEngine, Config, ConsoleSink, Formatter, LogsClient, TailEngine,
};

const LOG_ENV: &str = "DLT_LOG";
const DEFAULT_LOG_LEVEL: &str = "info";

/// dlt is a command-line tool for tailing Datadog Logs in real-time.
///
/// Authentication is configured via environment variables (DD_API_KEY,
/// DD_APP_KEY, DD_SITE), and log filtering is available via tags.
#[derive(Debug, Parser)]
#[command(name = "dlt", version, about = "Datadog Logs Tail - Real-time log tailing tool")]
#[command(after_help = "Examples:
  dlt                                        # Basic usage
  dlt --query \"service:web,env:prod\"         # Filter by tags
  dlt --level error --format json            # Filter by log level and output format
  dlt --level error,warn --query \"env:prod\"  # Filter by multiple log levels and tags
  dlt --timestamp 2024-01-15T10:00:00Z,2024-01-15T11:00:00Z  # Retrieve a past range")]
struct Args {
    /// Configuration file (default: ~/.dlt/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tag filter (comma-separated)
    #[arg(short, long)]
    query: Option<String>,

    /// Log level (debug, info, warn, error) - supports comma-separated values
    #[arg(short, long)]
    level: Option<String>,

    /// Output format (json, text)
    #[arg(short, long)]
    format: Option<String>,

    /// Enable TUI mode for interactive log viewing
    #[arg(short, long)]
    tui: bool,

    /// Retrieve a past time range instead of tailing: from,to in RFC3339
    #[arg(long)]
    timestamp: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a default configuration file
    Init,
}

impl Args {
    fn flags(&self) -> PartialConfig {
        PartialConfig {
            tags: self.query.clone(),
            log_level: self.level.clone(),
            output_format: self.format.clone(),
            timestamp: self.timestamp.clone(),
            ..PartialConfig::default()
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dlt").join("config.yaml"))
}

/// Installs the diagnostics subscriber on stderr. The terminal panel owns the
/// screen, so diagnostics are dropped in that mode.
fn init_logging(quiet: bool) -> Result<()> {
    let level = if quiet {
        "off".to_string()
    } else {
        std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    };
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in DLT_LOG")?,
        )
        .with_writer(std::io::stderr)
        .event_format(logger::Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!(path = %path.display(), "Reading configuration file");
            get_config(&path, args.flags())
        }
        None => {
            warn!("Unable to locate the home directory, skipping configuration file");
            ConfigBuilder::default()
                .add_source(Box::new(EnvConfigSource))
                .add_source(Box::new(FlagsConfigSource(args.flags())))
                .build()
        }
    };

    config
        .validate()
        .context("configuration validation failed")?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

fn print_filters(config: &Config) {
    println!("Output format: {}", config.output_format);
    if !config.tags.is_empty() {
        println!("Tag filter: {}", config.tags);
    }
    if !config.log_level.is_empty() {
        println!("Log level: {}", config.log_level);
    }
    println!("---");
}

async fn tail(client: LogsClient, config: &Config, cancel: CancellationToken) -> Result<()> {
    println!("Starting Datadog Logs tail...");
    print_filters(config);

    let mut engine = TailEngine::new(
        client,
        config.query(),
        Formatter::from_name(&config.output_format),
        config.retry_count,
    );
    engine
        .run(&mut ConsoleSink, &cancel)
        .await
        .context("failed to tail logs")
}

async fn batch(client: LogsClient, config: &Config, cancel: CancellationToken) -> Result<()> {
    let (from, to) = parse_time_range(&config.timestamp)?;

    println!(
        "Retrieving logs from {} to {}...",
        from.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        to.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
    );
    print_filters(config);

    let engine = BatchEngine::new(
        client,
        config.query(),
        Formatter::from_name(&config.output_format),
    );
    let count = engine
        .run(from, to, &mut ConsoleSink, &cancel)
        .await
        .context("failed to fetch logs")?;

    if cancel.is_cancelled() {
        return Ok(());
    }
    if count == 0 {
        println!("No logs found for the specified time range.");
    } else {
        println!("\nRetrieved {count} log entries.");
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    if let Some(Command::Init) = args.command {
        let path = args
            .config
            .clone()
            .or_else(default_config_path)
            .context("failed to get home directory")?;
        write_default_config(&path)?;
        println!("Default configuration file created: {}", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;
    let client = LogsClient::new(&config).context("failed to create Datadog client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, stopping");
            on_signal.cancel();
        }
    });

    if args.tui {
        tui::run(client, &config, cancel).await.context("TUI error")
    } else if !config.timestamp.is_empty() {
        batch(client, &config, cancel).await
    } else {
        tail(client, &config, cancel).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.tui) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
