//! Tether server - entry point
//!
//! Runs the Tether HTTP surface with a small demonstration handler: every
//! `request` message is answered with an `answer` carrying a process-wide
//! counter.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use tether_config::{ConfigError, ConfigLoader, TetherConfig};
use tether_server::logging::{init_logging, LogConfig};
use tether_server::Server;
use tether_ws::{Client, Endpoint, EndpointBuilder};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("tether-server {}", tether_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Tether server - session-oriented WebSocket host

USAGE:
    tether-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    TETHER__SERVER__HOST                       Bind host (default: 0.0.0.0)
    TETHER__SERVER__PORT                       Bind port (default: 2000)
    TETHER__SERVER__USE_TLS                    Advertise wss:// and secure cookies
    TETHER__SERVER__CLIENT_SCRIPT              Client runtime path (default: ./ax/ax.js)
    TETHER__SESSION__CONNECTION_TIMEOUT_SECS   Identity cookie lifetime (default: 300)
    TETHER__LOGGING__LEVEL                     Log filter (default: info)
    TETHER__LOGGING__FORMAT                    json or pretty (default: json)

A .env file in the working directory is loaded if present.
"
    );
}

fn load_config(path: Option<PathBuf>) -> Result<TetherConfig, ConfigError> {
    let loader = ConfigLoader::new().with_defaults();
    let loader = match path {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file("tether.toml")?,
    };
    loader.with_dotenv()?.with_env_prefix("TETHER").load()
}

/// Demonstration handlers.
fn demo_endpoint() -> EndpointBuilder {
    let counter = Arc::new(AtomicI64::new(0));

    Endpoint::builder()
        .on_json("request", move |client: Arc<Client>, data: Value| {
            let counter = Arc::clone(&counter);
            async move {
                info!(cid = %client.id(), %data, "Request");
                let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if let Err(e) = client.send_json("answer", &json!({ "value": value })).await {
                    info!(cid = %client.id(), error = %e, "Answer not delivered");
                }
            }
        })
        .on_enter(|client, parts| {
            info!(cid = %client.id(), uri = %parts.uri, "Client entered");
        })
        .on_leave(|client| {
            info!(cid = %client.id(), "Client left");
        })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&LogConfig::from(&config.logging)) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    info!(
        version = tether_server::VERSION,
        host = %config.server.host,
        port = config.server.port,
        "Starting Tether server"
    );

    let server = match Server::from_config(config, demo_endpoint()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to create server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
