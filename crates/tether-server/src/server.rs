//! HTTP server hosting the Tether endpoint.
//!
//! # Architecture
//!
//! - TCP listener bound to the configured `host:port`
//! - One HTTP/1.1 connection task per socket, served with upgrades enabled
//! - Three routes: the bootstrap script, the client runtime and the
//!   WebSocket upgrade
//! - Upgraded sockets are handed to [`Endpoint::serve_until`] on their own
//!   task and closed when the server shuts down
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_config::TetherConfig;
//! use tether_server::Server;
//! use tether_ws::Endpoint;
//!
//! let builder = Endpoint::builder().on_json("ping", |client, data| async move {
//!     let _ = client.send_json("pong", &data).await;
//! });
//! Server::from_config(TetherConfig::default(), builder)?.run().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use http::{header, HeaderValue, Method, Request};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tether_config::TetherConfig;
use tether_ws::{bad_request_response, upgrade_response, validate_upgrade_request, Endpoint, EndpointBuilder};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Role;

use crate::error::{ServerError, ServerResult};
use crate::routes::{self, HttpResponse, SessionState, CLIENT_SCRIPT_PATH, INIT_SCRIPT_PATH, WS_PATH};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Per-connection state shared with request handlers.
#[derive(Debug, Clone)]
struct ConnInfo {
    remote_addr: SocketAddr,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
}

/// The Tether HTTP server.
#[derive(Debug)]
pub struct Server {
    config: TetherConfig,
    endpoint: Arc<Endpoint>,
}

impl Server {
    /// Create a server around an already built endpoint.
    ///
    /// Cookies and the bootstrap script use the endpoint's identity
    /// settings; everything else comes from `config`.
    #[must_use]
    pub fn new(config: TetherConfig, endpoint: Arc<Endpoint>) -> Self {
        Self { config, endpoint }
    }

    /// Validate `config` and build the endpoint with its identity settings.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid and
    /// `ServerError::Endpoint` if the endpoint rejects its settings.
    pub fn from_config(config: TetherConfig, builder: EndpointBuilder) -> ServerResult<Self> {
        config.validate()?;
        let endpoint = builder.identity_config(config.identity_config()).build()?;
        Ok(Self::new(config, endpoint))
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    /// The WebSocket endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Bind the configured address and run until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` triggers.
    ///
    /// After the trigger no new connections are accepted, live WebSocket
    /// sessions are asked to close, and the call waits up to the configured
    /// shutdown timeout for them to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn run_with_listener(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let conn = ConnInfo {
                                remote_addr,
                                shutdown: shutdown.clone(),
                                tracker: tracker.clone(),
                            };

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, conn).await {
                                    debug!(%remote_addr, error = %e, "Connection error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }

                () = shutdown.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        drop(listener);

        let shutdown_timeout = server.config.shutdown_timeout();
        info!(
            timeout = ?shutdown_timeout,
            active = tracker.active_connections(),
            "Waiting for connections to close"
        );

        tokio::select! {
            () = tracker.wait_for_shutdown() => info!("All connections closed"),
            () = tokio::time::sleep(shutdown_timeout) => warn!(
                active = tracker.active_connections(),
                "Shutdown timeout reached with connections still active"
            ),
        }

        info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(self: &Arc<Self>, stream: TcpStream, conn: ConnInfo) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let shutdown = conn.shutdown.clone();
        let remote_addr = conn.remote_addr;
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            let conn = conn.clone();
            async move { Ok::<_, Infallible>(server.handle_request(req, &conn).await) }
        });

        let connection = http1::Builder::new().serve_connection(io, service).with_upgrades();
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => result,
            () = shutdown.recv() => {
                debug!(%remote_addr, "Closing HTTP connection for shutdown");
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        }
    }

    async fn handle_request(self: &Arc<Self>, req: Request<Incoming>, conn: &ConnInfo) -> HttpResponse {
        let path = req.uri().path().to_owned();
        debug!(method = %req.method(), http.path = %path, remote_addr = %conn.remote_addr, "Request");

        match path.as_str() {
            WS_PATH => self.handle_websocket(req, conn),
            INIT_SCRIPT_PATH if req.method() == Method::GET => self.handle_init_script(&req),
            CLIENT_SCRIPT_PATH if req.method() == Method::GET => {
                routes::client_script(&self.config.server.client_script).await
            }
            _ => routes::not_found(&path),
        }
    }

    /// `GET /__ax_init.js`: resolve or issue the identity and describe the
    /// session to the browser.
    fn handle_init_script(&self, req: &Request<Incoming>) -> HttpResponse {
        let resolved = self.endpoint.identity().resolve(req.headers());
        let state = SessionState {
            cid: &resolved.id,
            conn_timeout: self.endpoint.identity().config().connection_timeout,
            host: routes::request_host(req.headers(), req.uri()),
            port: self.config.server.port,
            secure: self.config.server.use_tls,
        };

        let mut response = routes::javascript(state.to_script());
        if resolved.issued {
            debug!(cid = %resolved.id, "Issued new identity");
            self.set_cookie(&mut response, &resolved.id);
        }
        response
    }

    /// `/__ws`: complete the handshake and run the session on its own task.
    fn handle_websocket(self: &Arc<Self>, mut req: Request<Incoming>, conn: &ConnInfo) -> HttpResponse {
        let remote_addr = conn.remote_addr;

        let response = validate_upgrade_request(&req).and_then(|accept| upgrade_response(&accept));
        let mut response = match response {
            Ok(response) => response,
            Err(e) => {
                debug!(%remote_addr, error = %e, "Rejected WebSocket upgrade");
                return bad_request_response(&e);
            }
        };

        let resolved = self.endpoint.identity().resolve(req.headers());
        if resolved.issued {
            warn!(%remote_addr, cid = %resolved.id, "Upgrade without a valid identity cookie, issued a new one");
            self.set_cookie(&mut response, &resolved.id);
        }

        let on_upgrade = hyper::upgrade::on(&mut req);
        let (parts, _body) = req.into_parts();
        let endpoint = Arc::clone(&self.endpoint);
        let stop = conn.shutdown.recv();
        let token = conn.tracker.acquire();

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let socket = Some(endpoint.websocket_config());
                    let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, socket).await;
                    endpoint.serve_until(ws, resolved.id, &parts, stop).await;
                }
                Err(e) => warn!(%remote_addr, error = %e, "WebSocket upgrade failed"),
            }
            drop(token);
        });

        response
    }

    fn set_cookie(&self, response: &mut HttpResponse, id: &str) {
        let cookie = self.endpoint.identity().set_cookie(id, SystemTime::now());
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!(cid = %id, error = %e, "Identity cookie is not a valid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::SessionConfig;
    use std::time::Duration;

    #[test]
    fn test_from_config_applies_identity_settings() {
        let mut config = TetherConfig::default();
        config.server.use_tls = true;
        config.session = SessionConfig {
            connection_timeout_secs: 90,
        };

        let server = Server::from_config(config, Endpoint::builder()).unwrap();
        let identity = server.endpoint().identity().config();
        assert_eq!(identity.connection_timeout, Duration::from_secs(90));
        assert!(identity.secure);
        assert!(server.config().server.use_tls);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = TetherConfig::default();
        config.server.port = 0;
        let err = Server::from_config(config, Endpoint::builder()).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_from_config_rejects_invalid_endpoint() {
        let pump = tether_ws::PumpConfig::new()
            .read_timeout(Duration::from_secs(4))
            .ping_interval(Duration::from_secs(3));
        let err = Server::from_config(TetherConfig::default(), Endpoint::builder().pump_config(pump))
            .unwrap_err();
        assert!(matches!(err, ServerError::Endpoint(_)));
    }

    #[tokio::test]
    async fn test_run_with_listener_stops_on_shutdown() {
        let server = Server::from_config(TetherConfig::default(), Endpoint::builder()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), server.run_with_listener(listener, shutdown))
            .await
            .expect("server should stop")
            .unwrap();
    }
}
