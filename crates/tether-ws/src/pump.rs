//! The duplex pump.
//!
//! Each connection runs two loops. The sender loop owns the write half: it
//! drains the outbound queue, writes keep-alive pings, re-issues the identity
//! cookie and reacts to [`Client::shutdown`]. The receiver loop owns the read
//! half and runs on the caller's task: it enforces the pong deadline and
//! dispatches every data frame.
//!
//! Either loop ending takes the other one down. The sender loop holds a
//! one-shot sender the receiver loop watches, and the receiver loop's exit
//! goes through [`Client::shutdown`], which signals the sender loop.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, trace, warn};

use crate::client::{Client, ClientChannels};
use crate::endpoint::Endpoint;
use crate::error::{WsError, WsResult};
use crate::message::{data_frame, frame_payload, normal_close};

type Sink<S> = SplitSink<WebSocketStream<S>, tungstenite::Message>;
type Stream<S> = SplitStream<WebSocketStream<S>>;

/// Run both loops for `client` until the connection is gone or `stop`
/// resolves.
pub(crate) async fn run<S, F>(
    ws: WebSocketStream<S>,
    client: Arc<Client>,
    channels: ClientChannels,
    endpoint: Arc<Endpoint>,
    stop: F,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let (sink, stream) = ws.split();
    let (sender_alive, sender_done) = oneshot::channel::<()>();

    let sender = tokio::spawn(send_loop(
        sink,
        Arc::clone(&client),
        channels,
        Arc::clone(&endpoint),
        sender_alive,
    ));

    let received = AssertUnwindSafe(recv_loop(stream, &client, &endpoint, sender_done, stop))
        .catch_unwind()
        .await;
    match received {
        Ok(Ok(())) => debug!(cid = %client.id(), "Receiver loop finished"),
        Ok(Err(e)) => log_loop_error(&client, "receiver", &e),
        Err(panic) => error!(
            cid = %client.id(),
            error = %WsError::Panicked(panic_message(panic.as_ref())),
            "Receiver loop panicked"
        ),
    }

    if client.shutdown().is_ok() {
        endpoint.hooks().fire_leave(&client);
    }

    match sender.await {
        Ok(Ok(())) => trace!(cid = %client.id(), "Sender loop finished"),
        Ok(Err(e)) => log_loop_error(&client, "sender", &e),
        Err(e) if e.is_panic() => error!(
            cid = %client.id(),
            error = %WsError::Panicked(panic_message(e.into_panic().as_ref())),
            "Sender loop panicked"
        ),
        Err(e) => debug!(cid = %client.id(), error = %e, "Sender loop cancelled"),
    }

    debug!(cid = %client.id(), "Client disconnected");
}

async fn send_loop<S>(
    mut sink: Sink<S>,
    client: Arc<Client>,
    channels: ClientChannels,
    endpoint: Arc<Endpoint>,
    // Dropped on return; the receiver loop treats that as the end of the connection.
    _alive: oneshot::Sender<()>,
) -> WsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ClientChannels {
        mut outbound,
        mut shutdown,
    } = channels;
    let config = endpoint.pump_config();
    let identity = endpoint.identity();
    let write_timeout = config.write_timeout;

    let mut ticker = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first cookie went out through the queue when the client was built.
    let mut cookie_issued = Instant::now();

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = write_frame(&mut sink, normal_close(), write_timeout).await;
                break Ok(());
            }
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    let _ = write_frame(&mut sink, normal_close(), write_timeout).await;
                    break Ok(());
                };
                if let Err(e) = write_frame(&mut sink, data_frame(payload), write_timeout).await {
                    break Err(e);
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write_frame(&mut sink, tungstenite::Message::Ping(Bytes::new()), write_timeout).await {
                    break Err(e);
                }
                endpoint.hooks().fire_ping(&client);

                if identity.needs_refresh(cookie_issued.elapsed()) {
                    match identity.refresh_message(client.id(), SystemTime::now()).to_bytes() {
                        Ok(refresh) => {
                            if let Err(e) = write_frame(&mut sink, data_frame(refresh), write_timeout).await {
                                break Err(e);
                            }
                            cookie_issued = Instant::now();
                            trace!(cid = %client.id(), "Refreshed identity cookie");
                        }
                        Err(e) => warn!(cid = %client.id(), error = %e, "Failed to encode cookie refresh"),
                    }
                }
            }
        }
    };

    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
    result
}

async fn recv_loop<S, F>(
    mut stream: Stream<S>,
    client: &Arc<Client>,
    endpoint: &Endpoint,
    mut sender_done: oneshot::Receiver<()>,
    stop: F,
) -> WsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()> + Send,
{
    tokio::pin!(stop);
    let config = endpoint.pump_config();
    let read_timeout = config.read_timeout;
    let mut deadline = Instant::now() + read_timeout;

    loop {
        let next = tokio::select! {
            _ = &mut sender_done => return Ok(()),
            () = &mut stop => {
                debug!(cid = %client.id(), "Server stopping, closing connection");
                return Ok(());
            }
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => return Err(WsError::ReadTimeout(read_timeout)),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(frame))) => frame,
        };
        client.touch();

        match frame {
            tungstenite::Message::Pong(_) => deadline = Instant::now() + read_timeout,
            tungstenite::Message::Ping(_) | tungstenite::Message::Frame(_) => {}
            tungstenite::Message::Close(frame) => {
                debug!(cid = %client.id(), close = ?frame, "Peer closed connection");
                return Ok(());
            }
            data => {
                let Some(payload) = frame_payload(data) else {
                    continue;
                };
                if payload.len() > config.max_message_size {
                    return Err(WsError::MessageTooLarge {
                        size: payload.len(),
                        limit: config.max_message_size,
                    });
                }
                let outcome = endpoint.dispatcher().dispatch(client, payload).await;
                trace!(cid = %client.id(), ?outcome, "Dispatched message");
            }
        }
    }
}

async fn write_frame<S>(sink: &mut Sink<S>, msg: tungstenite::Message, limit: Duration) -> WsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, sink.send(msg)).await {
        Ok(result) => result.map_err(WsError::from),
        Err(_) => Err(WsError::WriteTimeout(limit)),
    }
}

fn log_loop_error(client: &Client, side: &'static str, error: &WsError) {
    if error.is_expected_close() {
        debug!(cid = %client.id(), side, error = %error, "Connection closed");
    } else {
        warn!(cid = %client.id(), side, error = %error, "Connection ended with error");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
