//! Session-oriented WebSocket clients for Tether.
//!
//! This crate owns everything that happens on a live browser connection:
//! identity issuance, the per-connection [`Client`], the duplex pump that
//! keeps it alive, and the [`Dispatcher`] that routes inbound JSON messages
//! to application handlers.
//!
//! # Features
//!
//! - **Identity** carried in a `__cid__` cookie, issued when missing and
//!   refreshed over the socket while the connection lives
//! - **Duplex pump** with a sender loop and a receiver loop per connection,
//!   keep-alive pings and a pong deadline
//! - **Typed dispatch** of `{"type": ..., "data": ...}` messages, plus an
//!   optional raw interceptor
//! - **Lifecycle hooks** for connect, disconnect and keep-alive ticks
//! - **Contained panics**: a failing handler ends its own connection only
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_ws::{Client, Endpoint};
//!
//! let endpoint = Endpoint::builder()
//!     .on_json("request", |client: Arc<Client>, data| async move {
//!         let _ = client.send_json("answer", &data).await;
//!     })
//!     .build()?;
//!
//! // In the HTTP layer, once the request is known to be an upgrade:
//! let accept = tether_ws::validate_upgrade_request(&request)?;
//! let resolved = endpoint.identity().resolve(request.headers());
//! // ... send upgrade_response(&accept), take over the IO, then:
//! endpoint.serve(ws_stream, resolved.id, &parts).await;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Connection Flow                         │
//! │                                                              │
//! │  Upgrade request ──► Identity::resolve() ──► 101 + cookie    │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  Endpoint::serve() ──► Client + queued cookie refresh        │
//! │       │                         │                            │
//! │       ▼                         ▼                            │
//! │  on_enter hook          sender loop (spawned)                │
//! │       │                 queue / ping / refresh / shutdown    │
//! │       ▼                                                      │
//! │  receiver loop ──► Dispatcher::dispatch() ──► handlers       │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  Client::shutdown() ──► on_leave hook (once)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! A [`Client`] is either active or closed. Closing happens exactly once,
//! through [`Client::shutdown`]; afterwards every send fails with
//! [`WsError::Disconnected`]. The receiver loop closes the client when the
//! socket ends, so `on_leave` fires unless the application closed the
//! client itself.

pub mod client;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod message;
mod pump;
pub mod registry;
pub mod upgrade;

// Re-exports for convenience
pub use client::Client;
pub use config::PumpConfig;
pub use context::Context;
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{WsError, WsResult};
pub use hooks::Hooks;
pub use identity::{
    CookieRefresh, Identity, IdentityConfig, Resolved, COOKIE_NAME, IDENTITY_LEN, MAX_CONNECTION_TIMEOUT,
};
pub use message::{Envelope, CLOSE_NORMAL, SET_COOKIE_TYPE};
pub use registry::{Dispatch, Dispatcher};
pub use upgrade::{
    bad_request_response, compute_accept_key, is_websocket_request, upgrade_response,
    validate_upgrade_request,
};
