//! # Tether
//!
//! **Session-oriented WebSocket connections for browser applications.**
//!
//! Each browser tab gets a stable identity kept in a cookie, a duplex
//! WebSocket connection kept alive with pings, and a typed message
//! dispatcher for `{"type": ..., "data": ...}` envelopes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! #[derive(serde::Deserialize)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_defaults().with_env_prefix("TETHER").load()?;
//!
//!     let builder = Endpoint::builder().on("greet", |client, greeting: Greeting| async move {
//!         let _ = client.send_json("hello", &greeting.name).await;
//!     });
//!
//!     Server::from_config(config, builder)?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - [`ws`]: identity, clients, the duplex pump and dispatch
//! - [`config`]: layered configuration
//! - [`server`]: HTTP routes, logging and graceful shutdown

#![doc(html_root_url = "https://docs.rs/tether/0.1.0")]

pub use tether_config as config;
pub use tether_server as server;
pub use tether_ws as ws;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tether_config::{ConfigError, ConfigLoader, TetherConfig};
    pub use tether_server::{Server, ServerError, ShutdownSignal};
    pub use tether_ws::{
        Client, Dispatch, Endpoint, EndpointBuilder, Envelope, IdentityConfig, PumpConfig,
        WsError, WsResult,
    };
}
