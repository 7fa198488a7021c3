//! delimsrv - Delimiter-Framed Echo Server
//!
//! Runs a listener with the echo handler: every message is logged and sent
//! straight back. Useful for trying out clients and delimiters.

use delimsrv::connection::ConnectionStats;
use delimsrv::{Delimiter, EchoHandler, Listener, ListenerConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for in-flight connections after a stop
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse configuration from command-line arguments
fn config_from_args() -> ListenerConfig {
    let mut config = ListenerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = Some(require_value(&args, i, "--host").to_string());
                i += 2;
            }
            "--port" | "-p" => {
                config.port = require_value(&args, i, "--port")
                    .parse()
                    .unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                i += 2;
            }
            "--delimiter" | "-d" => {
                config.delimiter = Delimiter::from_escaped(require_value(&args, i, "--delimiter"))
                    .unwrap_or_else(|e| {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    });
                i += 2;
            }
            "--read-timeout" | "-t" => {
                let secs: u64 = require_value(&args, i, "--read-timeout")
                    .parse()
                    .unwrap_or_else(|_| {
                        eprintln!("Error: invalid timeout");
                        std::process::exit(1);
                    });
                config.read_timeout = Some(Duration::from_secs(secs));
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("delimsrv version {}", delimsrv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn require_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
delimsrv - Delimiter-Framed Echo Server

USAGE:
    delimsrv [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind, first IPv4 address is used (default: this machine's host name)
    -p, --port <PORT>            Port to listen on (default: 11000)
    -d, --delimiter <DELIM>      End-of-message marker, escapes \n \r \t \0 \\ allowed (default: ;)
    -t, --read-timeout <SECS>    Drop clients that send nothing for SECS seconds (default: never)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    delimsrv                          # Start on <hostname>:11000
    delimsrv --host 127.0.0.1         # Loopback only
    delimsrv --port 12000             # Start on port 12000
    delimsrv --delimiter '\n'         # One message per line

CONNECTING:
    $ printf 'hello;' | nc $(hostname) 11000
    hello;
"#
    );
}

fn print_banner(config: &ListenerConfig) {
    println!(
        r#"
delimsrv v{} - Delimiter-Framed Echo Server
──────────────────────────────────────────────
Binding {} (delimiter "{}")

Use Ctrl+C to shutdown gracefully.
"#,
        delimsrv::VERSION,
        config.bind_address(),
        config.delimiter
    );
}

/// Waits until every in-flight connection has closed, up to `DRAIN_TIMEOUT`.
async fn drain(stats: &ConnectionStats) {
    if tokio::time::timeout(DRAIN_TIMEOUT, stats.wait_idle())
        .await
        .is_err()
    {
        warn!(
            active = stats.active_connections.load(Ordering::Relaxed),
            "Drain timeout reached, abandoning open connections"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = config_from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner(&config);

    let listener = Listener::with_config(EchoHandler::new(), config);
    let stats = listener.stats();

    let socket = listener.bind().await?;
    let serving = listener.serve(socket);
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => result?,
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
            listener.stop();
            serving.await?;
        }
    }

    drain(&stats).await;

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        messages = stats.messages_handled.load(Ordering::Relaxed),
        dropped = stats.messages_dropped.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
