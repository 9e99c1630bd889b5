//! Write side of a client connection and its identity.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use messenger_common::id::{prefix, PrefixedId};
use tokio::sync::{watch, Mutex};
use tokio::time;

use crate::error::TransportError;

/// Unique identity of one registered connection (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionId {
    pub fn new() -> Self {
        Self(<Self as PrefixedId>::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound half of a client connection.
///
/// Shared between the connection's own dispatch loop (direct replies) and the
/// broadcast worker (fan-out), so writes take `&self`.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Close the connection. Calling it more than once is a no-op.
    async fn close(&self);

    /// Resolves once [`ClientSink::close`] has been called. The read side of
    /// the connection waits on this so a server-side close ends its loop.
    async fn closed(&self);
}

/// One-shot close flag shared by a sink and whoever waits on it.
pub(crate) struct CloseSignal(watch::Sender<bool>);

impl CloseSignal {
    pub(crate) fn new() -> Self {
        Self(watch::Sender::new(false))
    }

    /// Raise the flag. Returns `true` only for the first caller.
    pub(crate) fn fire(&self) -> bool {
        !self.0.send_replace(true)
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.0.borrow()
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// [`ClientSink`] over the write half of an axum WebSocket.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
    signal: CloseSignal,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(inner),
            write_timeout,
            signal: CloseSignal::new(),
        }
    }
}

#[async_trait]
impl ClientSink for WsSink {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if self.signal.is_fired() {
            return Err(TransportError::Closed);
        }
        let send = async {
            let mut inner = self.inner.lock().await;
            inner.send(Message::Text(text.into())).await
        };
        match time::timeout(self.write_timeout, send).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_elapsed) => Err(TransportError::Timeout),
        }
    }

    async fn close(&self) {
        // Fire before taking the write lock so the reader stops even while a
        // stuck write holds it.
        if !self.signal.fire() {
            return;
        }
        let mut inner = self.inner.lock().await;
        // The peer may already be gone; a failed close changes nothing.
        let _ = time::timeout(self.write_timeout, inner.close()).await;
    }

    async fn closed(&self) {
        self.signal.wait().await;
    }
}
