//! The WebSocket endpoint.
//!
//! An [`Endpoint`] bundles everything one WebSocket route needs: pump
//! timing, identity settings, the message dispatcher and lifecycle hooks.
//! Build it once at startup and share it across connections.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_ws::{Client, Endpoint};
//!
//! let endpoint = Endpoint::builder()
//!     .on_json("request", |client: Arc<Client>, data| async move {
//!         let _ = client.send_json("answer", &data).await;
//!     })
//!     .on_leave(|client| tracing::info!(cid = %client.id(), "left"))
//!     .build()?;
//!
//! // After the HTTP layer has completed the upgrade:
//! let ws = WebSocketStream::from_raw_socket(io, Role::Server, Some(endpoint.websocket_config())).await;
//! endpoint.serve(ws, resolved.id, &parts).await;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::WebSocketConfig;
use tracing::{debug, warn};

use crate::client::Client;
use crate::config::PumpConfig;
use crate::error::WsResult;
use crate::hooks::Hooks;
use crate::identity::{Identity, IdentityConfig};
use crate::pump;
use crate::registry::Dispatcher;

/// Shared configuration and handlers for one WebSocket route.
#[derive(Debug)]
pub struct Endpoint {
    pump: PumpConfig,
    identity: Identity,
    dispatcher: Dispatcher,
    hooks: Hooks,
}

impl Endpoint {
    /// Start building an endpoint.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// Pump timing and sizing.
    pub fn pump_config(&self) -> &PumpConfig {
        &self.pump
    }

    /// Settings for building this endpoint's server-side sockets, so that
    /// inbound frames over the read limit are refused before buffering.
    pub fn websocket_config(&self) -> WebSocketConfig {
        self.pump.websocket_config()
    }

    /// Identity issuer.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Message dispatcher. Handlers may still be registered after build.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Lifecycle hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Serve one upgraded connection until it ends.
    ///
    /// Builds the [`Client`] for `id`, queues the identity cookie refresh,
    /// fires `on_enter`, then runs the duplex pump. Returns after teardown.
    pub async fn serve<S>(self: &Arc<Self>, ws: WebSocketStream<S>, id: impl Into<String>, parts: &Parts)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_until(ws, id, parts, std::future::pending()).await;
    }

    /// Like [`serve`](Self::serve), but also closes the connection when
    /// `stop` resolves.
    ///
    /// A connection closed this way counts as ended by the peer, so
    /// `on_leave` still fires.
    pub async fn serve_until<S, F>(
        self: &Arc<Self>,
        ws: WebSocketStream<S>,
        id: impl Into<String>,
        parts: &Parts,
        stop: F,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let (client, channels) = Client::new(id, self.pump.outbound_capacity);

        match self
            .identity
            .refresh_message(client.id(), SystemTime::now())
            .to_bytes()
        {
            Ok(refresh) => {
                if let Err(e) = client.try_send(refresh) {
                    warn!(cid = %client.id(), error = %e, "Failed to queue identity cookie");
                }
            }
            Err(e) => warn!(cid = %client.id(), error = %e, "Failed to encode identity cookie"),
        }

        debug!(cid = %client.id(), uri = %parts.uri, "Client connected");
        self.hooks.fire_enter(&client, parts);

        pump::run(ws, client, channels, Arc::clone(self), stop).await;
    }
}

/// Builder for [`Endpoint`].
#[derive(Debug, Default)]
pub struct EndpointBuilder {
    pump: PumpConfig,
    identity: IdentityConfig,
    dispatcher: Dispatcher,
    hooks: Hooks,
}

impl EndpointBuilder {
    /// Create a builder with default settings and no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pump timing and sizing.
    pub fn pump_config(mut self, config: PumpConfig) -> Self {
        self.pump = config;
        self
    }

    /// Set identity settings.
    pub fn identity_config(mut self, config: IdentityConfig) -> Self {
        self.identity = config;
        self
    }

    /// Register a JSON handler for `msg_type`.
    pub fn on_json<F, Fut>(self, msg_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.on_json(msg_type, handler);
        self
    }

    /// Register a handler whose `data` is decoded into `T`.
    pub fn on<T, F, Fut>(self, msg_type: impl Into<String>, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<Client>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.on(msg_type, handler);
        self
    }

    /// Register the raw payload interceptor.
    pub fn on_raw<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Arc<Client>, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.dispatcher.on_raw(handler);
        self
    }

    /// Set the connect hook.
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>, &Parts) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_enter(hook);
        self
    }

    /// Set the disconnect hook.
    pub fn on_leave<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_leave(hook);
        self
    }

    /// Set the keep-alive hook.
    pub fn on_ping<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_ping(hook);
        self
    }

    /// Validate the configuration and build the endpoint.
    pub fn build(self) -> WsResult<Arc<Endpoint>> {
        self.pump.validate()?;
        Ok(Arc::new(Endpoint {
            pump: self.pump,
            identity: Identity::new(self.identity),
            dispatcher: self.dispatcher,
            hooks: self.hooks,
        }))
    }
}
