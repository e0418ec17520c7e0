//! Duplex pump configuration.
//!
//! The keep-alive interval must stay strictly inside the peer read timeout,
//! otherwise a healthy peer would time out between two pings. The defaults
//! keep a 1:2 ratio.

use std::time::Duration;

use tungstenite::protocol::WebSocketConfig;

use crate::error::{WsError, WsResult};

/// Timing and sizing for a client's sender and receiver loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// Deadline for a single frame write (default: 5 seconds).
    pub write_timeout: Duration,
    /// Close the connection if no pong arrives within this window (default: 10 seconds).
    pub read_timeout: Duration,
    /// Ping period (default: 5 seconds).
    pub ping_interval: Duration,
    /// Maximum inbound message size in bytes (default: 512 KB).
    pub max_message_size: usize,
    /// Capacity of the outbound queue (default: 256).
    pub outbound_capacity: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        let read_timeout = Duration::from_secs(10);
        Self {
            write_timeout: Duration::from_secs(5),
            read_timeout,
            ping_interval: read_timeout / 2,
            max_message_size: 512 * 1024,
            outbound_capacity: 256,
        }
    }
}

impl PumpConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write deadline.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the read timeout and derive the ping interval from it.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self.ping_interval = timeout / 2;
        self
    }

    /// Override the ping interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the maximum inbound message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the outbound queue capacity.
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Socket settings that make the protocol layer refuse any frame or
    /// message above `max_message_size` as soon as its header is read.
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.max_message_size))
            .max_frame_size(Some(self.max_message_size))
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> WsResult<()> {
        if self.write_timeout.is_zero() {
            return Err(WsError::invalid_config("write_timeout must be non-zero"));
        }
        if self.ping_interval.is_zero() {
            return Err(WsError::invalid_config("ping_interval must be non-zero"));
        }
        if self.ping_interval.checked_mul(2).map_or(true, |d| d > self.read_timeout) {
            return Err(WsError::invalid_config(format!(
                "ping_interval ({:?}) must be at most half of read_timeout ({:?})",
                self.ping_interval, self.read_timeout
            )));
        }
        if self.outbound_capacity == 0 {
            return Err(WsError::invalid_config("outbound_capacity must be non-zero"));
        }
        if self.max_message_size == 0 {
            return Err(WsError::invalid_config("max_message_size must be non-zero"));
        }
        Ok(())
    }
}
