mod config;
mod handler;
mod io;
mod progress;
mod protocol;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: fsrelay-agent [--config <path>] (--stdio | --listen <addr>)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stdio            Serve NDJSON over stdin/stdout");
    eprintln!("  --listen <addr>    Serve NDJSON over TCP (e.g. 127.0.0.1:7685)");
    eprintln!("  --config <path>    Driver configuration (default: $FSRELAY_CONFIG or");
    eprintln!("                     $XDG_CONFIG_HOME/fsrelay-agent/config.json)");
    eprintln!("  --version          Print version and exit");
    eprintln!("  --help             Print this help message");
}

enum Mode {
    Stdio,
    Listen(String),
}

struct CliArgs {
    mode: Mode,
    config: Option<PathBuf>,
}

/// Parse the command line. `Ok(None)` means the process is done
/// (`--version` / `--help`).
fn parse_args(args: &[String]) -> anyhow::Result<Option<CliArgs>> {
    let mut mode = None;
    let mut config = None;
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => {
                println!("fsrelay-agent {}", VERSION);
                return Ok(None);
            }
            "--help" => {
                print_usage();
                return Ok(None);
            }
            "--stdio" => mode = Some(Mode::Stdio),
            "--listen" => {
                let addr = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--listen requires an address"))?;
                mode = Some(Mode::Listen(addr.clone()));
            }
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown option: {other}"),
        }
    }

    let mode = mode.ok_or_else(|| anyhow::anyhow!("One of --stdio or --listen is required"))?;
    Ok(Some(CliArgs { mode, config }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(1);
        }
    };

    // Configure tracing to stderr so it doesn't interfere with the protocol on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AgentConfig::load(cli.config.as_deref());
    let drivers = Arc::new(registry::build_drivers(&config));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                shutdown.cancel();
            }
        }
    });

    match cli.mode {
        Mode::Stdio => {
            info!("fsrelay-agent {} ({}) starting in stdio mode", VERSION, config.name);
            io::stdio::run_stdio_loop(drivers, shutdown).await
        }
        Mode::Listen(addr) => {
            info!("fsrelay-agent {} ({}) starting in TCP mode", VERSION, config.name);
            io::tcp::run_tcp_listener(&addr, drivers, shutdown).await
        }
    }
}
