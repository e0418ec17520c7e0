//! Inbound message dispatch.
//!
//! The [`Dispatcher`] maps message types to handlers. It is shared by every
//! connection of an [`Endpoint`](crate::Endpoint); registration normally
//! happens once during setup, lookups happen for every inbound message.
//!
//! # Routing
//!
//! 1. If a raw handler is registered it sees every payload first. Returning
//!    `true` claims the payload and nothing else happens.
//! 2. Otherwise the payload is parsed as `{"type": ..., "data": ...}`.
//!    Malformed payloads are logged and dropped.
//! 3. The handler registered for `type` runs with `data`. Unknown types
//!    are ignored.
//!
//! Handlers are cloned out of the table before they run, so a slow or
//! panicking handler never holds the lock. A handler does block the
//! connection that invoked it until it returns.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use crate::client::Client;
use crate::message::Envelope;

/// Boxed future returned by type-erased handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type-erased JSON message handler.
pub type JsonHandler = Arc<dyn Fn(Arc<Client>, Value) -> BoxFuture<()> + Send + Sync>;

/// A type-erased raw payload interceptor.
pub type RawHandler = Arc<dyn Fn(Arc<Client>, Bytes) -> BoxFuture<bool> + Send + Sync>;

/// Longest payload excerpt included in decode-failure logs.
const LOG_EXCERPT_LEN: usize = 256;

/// What happened to a dispatched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The raw handler claimed the payload.
    Raw,
    /// A JSON handler ran.
    Handled,
    /// The payload parsed but no handler is registered for its type.
    Unhandled,
    /// The payload was not a valid envelope and was dropped.
    Invalid,
}

#[derive(Default)]
struct Handlers {
    json: HashMap<String, JsonHandler>,
    raw: Option<RawHandler>,
}

/// Type-keyed handler table plus an optional raw interceptor.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<Handlers>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `msg_type`, replacing any previous one.
    pub fn on_json<F, Fut>(&self, msg_type: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let erased: JsonHandler = Arc::new(move |client, data| Box::pin(handler(client, data)));
        self.handlers.write().json.insert(msg_type.into(), erased);
    }

    /// Register a handler whose `data` is decoded into `T` first.
    ///
    /// A `data` value that does not decode is logged and dropped.
    pub fn on<T, F, Fut>(&self, msg_type: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<Client>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let msg_type = msg_type.into();
        let handler = Arc::new(handler);
        let name = msg_type.clone();
        self.on_json(msg_type, move |client, data| {
            let handler = Arc::clone(&handler);
            let name = name.clone();
            async move {
                match serde_json::from_value::<T>(data) {
                    Ok(data) => handler(client, data).await,
                    Err(e) => {
                        warn!(cid = %client.id(), msg_type = %name, error = %e, "Dropping message with invalid data");
                    }
                }
            }
        });
    }

    /// Register the raw interceptor, replacing any previous one.
    pub fn on_raw<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<Client>, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let erased: RawHandler = Arc::new(move |client, payload| Box::pin(handler(client, payload)));
        self.handlers.write().raw = Some(erased);
    }

    /// Check if a handler is registered for `msg_type`.
    pub fn contains(&self, msg_type: &str) -> bool {
        self.handlers.read().json.contains_key(msg_type)
    }

    /// Check if a raw interceptor is registered.
    pub fn has_raw(&self) -> bool {
        self.handlers.read().raw.is_some()
    }

    /// Number of registered JSON handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().json.len()
    }

    /// Check if no JSON handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().json.is_empty()
    }

    /// Route one inbound payload.
    pub async fn dispatch(&self, client: &Arc<Client>, payload: Bytes) -> Dispatch {
        let raw = self.handlers.read().raw.clone();
        if let Some(raw) = raw {
            if raw(Arc::clone(client), payload.clone()).await {
                return Dispatch::Raw;
            }
        }

        let envelope = match Envelope::<Value>::from_slice(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let excerpt = &payload[..payload.len().min(LOG_EXCERPT_LEN)];
                warn!(
                    cid = %client.id(),
                    error = %e,
                    payload = %String::from_utf8_lossy(excerpt),
                    "Received invalid JSON message"
                );
                return Dispatch::Invalid;
            }
        };

        let handler = self.handlers.read().json.get(&envelope.msg_type).cloned();
        match handler {
            Some(handler) => {
                handler(Arc::clone(client), envelope.data).await;
                Dispatch::Handled
            }
            None => {
                trace!(cid = %client.id(), msg_type = %envelope.msg_type, "No handler registered");
                Dispatch::Unhandled
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut types: Vec<&str> = handlers.json.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("types", &types)
            .field("raw", &handlers.raw.is_some())
            .finish()
    }
}
