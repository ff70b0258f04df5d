//! BinkP mailer front end.
//!
//! Two modes: `serve` runs the answering side until interrupted, `poll`
//! dials one configured link (or all dialable links) and exchanges mail
//! once. Configuration is a jNode-style key=value file.

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

use binkp_core::FtnAddress;
use binkp_node::{Config, FsQueue, Node, NodeError};

#[derive(Parser)]
#[command(name = "binkp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "binkp.conf")]
    config: String,

    /// Override the configured log level with TRACE
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for incoming sessions until interrupted
    Serve,

    /// Dial a link and exchange mail once
    Poll {
        /// Link FTN address; all dialable links when omitted
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    init_logging(&config, cli.verbose)?;

    let queue = Arc::new(FsQueue::new(&config.outbound_dir));
    let node = Node::new(config, queue);

    match cli.command {
        Commands::Serve => serve(&node).await,
        Commands::Poll { address } => poll(&node, address.as_deref()).await,
    }
}

async fn serve(node: &Node) -> anyhow::Result<()> {
    if !node.config().server_enabled {
        bail!("binkp.server is disabled in the configuration");
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; draining sessions");
            signal_cancel.cancel();
        }
    });

    node.listen_and_serve(cancel).await?;

    let stats = node.stats();
    info!(
        sessions = stats.sessions_total,
        bytes_rx = stats.totals.bytes_rx,
        bytes_tx = stats.totals.bytes_tx,
        files_rx = stats.totals.files_rx,
        files_tx = stats.totals.files_tx,
        "server stopped"
    );
    Ok(())
}

async fn poll(node: &Node, address: Option<&str>) -> anyhow::Result<()> {
    if !node.config().client_enabled {
        bail!("binkp.client is disabled in the configuration");
    }

    let links: Vec<FtnAddress> = match address {
        Some(address) => {
            let address: FtnAddress = address
                .parse()
                .with_context(|| format!("bad link address {address:?}"))?;
            vec![address]
        }
        None => node
            .config()
            .links
            .iter()
            .filter(|link| link.host.is_some())
            .map(|link| link.address.clone())
            .collect(),
    };
    if links.is_empty() {
        bail!("no dialable links configured");
    }

    let mut failures = 0usize;
    for link in &links {
        match node.poll(link, CancellationToken::new()).await {
            Ok(outcome) => {
                info!(
                    %link,
                    reason = ?outcome.reason,
                    files_tx = outcome.counters.files_tx,
                    files_rx = outcome.counters.files_rx,
                    "poll finished"
                );
            }
            Err(NodeError::Session { link, source }) if source.is_transient() => {
                warn!(%link, error = %source, "poll failed; will retry next run");
                failures += 1;
            }
            Err(e) => {
                error!(%link, error = %e, "poll failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} polls failed", links.len());
    }
    Ok(())
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        match config.log_level {
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let builder = tracing_subscriber::fmt().with_max_level(level);
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}
