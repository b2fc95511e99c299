//! netdiag command line entry point.
//!
//! ```bash
//! netdiag ifaces
//! netdiag ping 192.168.4.1 -c 10
//! NETDIAG_LOG=debug netdiag ping example.com --json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use netdiag::config::defaults::LOG_ENV;
use netdiag::host::{snapshot_interfaces, IcmpTransport, SystemResolver};
use netdiag::{
    list_interfaces, print_interfaces, JsonSink, PingEngine, ProbeConfig, ResultSink, TextSink,
};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "netdiag")]
#[command(about = "List network interfaces and probe hosts with ICMP echo", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every configured interface
    Ifaces {
        /// Emit one JSON object per interface
        #[arg(long)]
        json: bool,
    },
    /// Send ICMP echo requests to an address or hostname
    Ping {
        /// IPv4 address or hostname
        target: String,

        /// Number of echo requests (default 4)
        #[arg(short, long)]
        count: Option<u32>,

        /// Per-request reply timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Delay between requests in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Emit one JSON object per result
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    match args.command {
        Command::Ifaces { json } => list(json),
        Command::Ping {
            target,
            count,
            timeout_ms,
            interval_ms,
            json,
        } => {
            let mut config = ProbeConfig::from_env()?;
            if let Some(ms) = timeout_ms {
                config = config.with_reply_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = interval_ms {
                config = config.with_interval(Duration::from_millis(ms));
            }
            config.validate()?;
            ping(config, &target, count, json).await
        }
    }
}

/// Logs go to stderr so stdout carries only listings and results.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn list(json: bool) -> anyhow::Result<()> {
    let chain = snapshot_interfaces().context("reading interface table")?;
    debug!(count = chain.len(), "Listing interfaces");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        for record in list_interfaces(&chain) {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        }
    } else {
        print_interfaces(&chain, &mut out)?;
    }
    Ok(())
}

async fn ping(config: ProbeConfig, target: &str, count: Option<u32>, json: bool) -> anyhow::Result<()> {
    let handle = Handle::current();
    let sink: Arc<dyn ResultSink> = if json {
        Arc::new(JsonSink::new(io::stdout()))
    } else {
        Arc::new(TextSink::stdout())
    };
    let engine = PingEngine::with_fallback(
        Arc::new(SystemResolver::new(handle.clone())),
        Arc::new(IcmpTransport::new(handle, config.clone())),
        config,
        sink,
    );

    let token = engine.ping(target, count, None)?;
    info!(%token, target, "Probe started");

    engine.idle().await;
    Ok(())
}
