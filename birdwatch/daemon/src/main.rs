//! Birdwatch Daemon - Filtered Stream Consumer
//!
//! Installs the configured filter rules, opens the filtered stream and writes
//! each record to stdout as one JSON line. Logs go to stderr so stdout can be
//! piped straight into another tool.
//!
//! # Usage
//!
//! ```bash
//! # Token from the environment, rules from ~/.config/birdwatch/config.toml
//! TWITTER_BEARER_TOKEN=... birdwatch-daemon > tweets.jsonl
//!
//! # Extra rules on the command line
//! birdwatch-daemon --rule '#rust -is:retweet' --rule 'from:rustlang'
//!
//! # Validate rules with the server, then exit
//! birdwatch-daemon --dry-run
//!
//! # Verbose logging
//! RUST_LOG=birdwatch_core=debug birdwatch-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: close every open stream and exit

mod ingest;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use birdwatch_core::{
    load_config_from_path, AddOrDeleteRulesRequest, ApiClient, BirdwatchToml, QueryParameters,
    Rule, StreamClient, StreamRegistry,
};

use ingest::{Ingestor, ReconnectPolicy};

/// Birdwatch Daemon - stream matching tweets as JSON lines
#[derive(Parser, Debug)]
#[command(name = "birdwatch-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "BIRDWATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// App-only bearer token
    #[arg(long, env = "TWITTER_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: Option<String>,

    /// API host
    #[arg(long, env = "TWITTER_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Additional filter rule (repeatable)
    #[arg(short = 'r', long = "rule", value_name = "RULE")]
    rules: Vec<String>,

    /// Validate rules with the server without applying them, then exit
    #[arg(long)]
    dry_run: bool,

    /// Consecutive failed connections tolerated before exiting
    #[arg(long, default_value_t = 5)]
    reconnect_attempts: u32,

    /// Delay between reconnects in milliseconds
    #[arg(long, default_value_t = 5_000)]
    reconnect_delay_ms: u64,
}

impl Args {
    /// Merge the configuration file with command-line overrides
    fn apply(&self, mut config: BirdwatchToml) -> BirdwatchToml {
        if let Some(ref token) = self.bearer_token {
            config.client.bearer_token = Some(token.clone());
        }
        if let Some(ref url) = self.api_url {
            config.client.base_url = url.clone();
        }
        config
            .rules
            .extend(self.rules.iter().map(|value| Rule::new(value.as_str())));
        config
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}

/// Initialize logging on stderr
fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("birdwatch_daemon=info".parse()?)
                .add_directive("birdwatch_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Add configured rules the server does not have yet
async fn sync_rules(api: &ApiClient, rules: &[Rule], dry_run: bool) -> Result<()> {
    if rules.is_empty() {
        info!("No rules configured, streaming with the server's current rules");
        return Ok(());
    }

    let existing = api
        .get_rules(&QueryParameters::new())
        .await
        .context("Failed to list stream rules")?;
    let missing: Vec<Rule> = rules
        .iter()
        .filter(|rule| !existing.rules.iter().any(|e| e.value == rule.value))
        .cloned()
        .collect();

    if missing.is_empty() {
        info!(active = existing.rules.len(), "All configured rules already active");
        return Ok(());
    }

    let response = api
        .add_or_delete_rules(&AddOrDeleteRulesRequest::add(missing), dry_run)
        .await
        .context("Failed to add stream rules")?;
    info!(
        added = response.rules.len(),
        dry_run,
        "Stream rules synchronized"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    info!("Birdwatch daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .clone()
        .or_else(birdwatch_core::default_config_path);
    let config = args.apply(load_config_from_path(config_path)?);

    let api = ApiClient::new(&config.client).context("Failed to create API client")?;
    sync_rules(&api, &config.rules, args.dry_run).await?;
    if args.dry_run {
        info!("Dry run complete");
        return Ok(());
    }

    let registry = StreamRegistry::new();
    let cancel = CancellationToken::new();
    {
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            cancel.cancel();
            registry.shutdown_all();
        });
    }

    let client = StreamClient::with_config(api, registry, config.stream.clone());
    let ingestor = Ingestor::new(
        client,
        config.query.to_params(),
        cancel,
        args.reconnect_policy(),
    );

    let mut stdout = tokio::io::stdout();
    match ingestor.run(&mut stdout).await {
        Ok(records) => {
            info!(records, "Birdwatch daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["birdwatch-daemon"]).unwrap();
        assert!(!args.dry_run);
        assert_eq!(
            args.reconnect_policy(),
            ReconnectPolicy {
                attempts: 5,
                delay: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::try_parse_from([
            "birdwatch-daemon",
            "--bearer-token",
            "cli-token",
            "--api-url",
            "http://localhost:9000",
            "--rule",
            "#rust",
            "-r",
            "from:rustlang",
        ])
        .unwrap();

        let mut file = BirdwatchToml::default();
        file.rules.push(Rule::new("cats"));
        let config = args.apply(file);

        assert_eq!(config.client.bearer_token.as_deref(), Some("cli-token"));
        assert_eq!(config.client.base_url, "http://localhost:9000");
        let values: Vec<_> = config.rules.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["cats", "#rust", "from:rustlang"]);
    }
}
