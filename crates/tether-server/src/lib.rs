//! # Tether Server
//!
//! HTTP surface for Tether sessions, built on Hyper and Tokio.
//!
//! This crate wires a [`tether_ws::Endpoint`] to the network:
//!
//! - `GET /__ax_init.js` tells the browser its identity and where to connect
//! - `GET /__ax.js` serves the client runtime
//! - `/__ws` upgrades to a WebSocket session
//! - Structured logging setup
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_config::ConfigLoader;
//! use tether_server::{logging, Server};
//! use tether_ws::Endpoint;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_defaults().with_env_prefix("TETHER").load()?;
//!     logging::init_logging(&(&config.logging).into())?;
//!
//!     let builder = Endpoint::builder().on_json("echo", |client, data| async move {
//!         let _ = client.send_json("echo", &data).await;
//!     });
//!     Server::from_config(config, builder)?.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tether-server/0.1.0")]

mod error;
pub mod logging;
pub mod routes;
mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use server::Server;
pub use shutdown::{ConnectionTracker, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
