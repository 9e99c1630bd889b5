//! Per-connection dispatch loop.
//!
//! `AwaitingMessage → {initial, message, message_reply} → AwaitingMessage`
//! until the transport fails or the peer closes. Parse and persistence
//! failures are answered on the same socket and the loop continues; only a
//! read or write failure on the connection itself ends it.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::time;

use super::connection::{ClientSink, ConnectionId};
use super::envelope::{Envelope, EnvelopeError};
use super::events::{ErrorEnvelope, FinalMessage, FinalMessageReply, InitialMessages};
use super::fanout::BroadcastHub;
use super::registry::ConnectionRegistry;
use crate::db::repository::MessageRepository;
use crate::error::RepositoryError;

/// A request that failed but leaves the connection usable.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("error {action}: {source}")]
    Persistence {
        action: &'static str,
        #[source]
        source: RepositoryError,
    },

    #[error("error encoding response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a dispatch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The peer sent a close frame or the stream ended.
    Closed,
    /// A read, write or idle deadline failed.
    TransportError,
}

/// Shared, per-process dependencies of every dispatch loop.
pub struct Dispatcher {
    repo: Arc<dyn MessageRepository>,
    hub: Arc<BroadcastHub>,
    registry: Arc<ConnectionRegistry>,
    read_idle_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        hub: Arc<BroadcastHub>,
        registry: Arc<ConnectionRegistry>,
        read_idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            repo,
            hub,
            registry,
            read_idle_timeout,
        }
    }

    /// Run the loop for one connection until it terminates. The connection
    /// is deregistered before this returns.
    pub async fn run<S, E>(&self, conn_id: &ConnectionId, sink: &dyn ClientSink, mut source: S) -> Termination
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        loop {
            let frame = match self.next_frame(conn_id, sink, &mut source).await {
                Ok(frame) => frame,
                Err(termination) => {
                    self.registry.remove(conn_id).await;
                    return termination;
                }
            };

            let response = match Envelope::parse_text(&frame) {
                Ok(envelope) => self.handle(conn_id, envelope).await,
                Err(err) => Err(err.into()),
            };

            let reply = match response {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(conn_id = %conn_id, %err, "request failed");
                    Some(ErrorEnvelope::new(err.to_string()).to_json())
                }
            };

            if let Some(text) = reply {
                if let Err(err) = sink.send_text(&text).await {
                    tracing::debug!(conn_id = %conn_id, %err, "reply write failed");
                    self.registry.remove(conn_id).await;
                    return Termination::TransportError;
                }
            }
        }
    }

    /// Route one envelope. `Ok(Some(text))` is a direct reply for the
    /// requesting connection only.
    async fn handle(&self, conn_id: &ConnectionId, envelope: Envelope) -> Result<Option<String>, DispatchError> {
        match envelope {
            Envelope::Initial { chat_id } => {
                let messages = self
                    .repo
                    .load_messages(chat_id)
                    .await
                    .map_err(|source| DispatchError::Persistence {
                        action: "loading messages",
                        source,
                    })?;
                tracing::debug!(conn_id = %conn_id, chat_id, count = messages.len(), "history loaded");
                Ok(Some(encode(&InitialMessages::new(messages))?))
            }
            Envelope::Message(message) => {
                self.repo
                    .save_message(&message)
                    .await
                    .map_err(|source| DispatchError::Persistence {
                        action: "saving message",
                        source,
                    })?;
                let chat_id = message.chat_id;
                if self.hub.enqueue_message(FinalMessage::new(message)).is_ok() {
                    tracing::debug!(conn_id = %conn_id, chat_id, kind = "message", "queued for broadcast");
                }
                Ok(None)
            }
            Envelope::Reply(reply) => {
                self.repo
                    .save_message_reply(&reply)
                    .await
                    .map_err(|source| DispatchError::Persistence {
                        action: "saving reply",
                        source,
                    })?;
                let chat_id = reply.chat_id;
                if self.hub.enqueue_reply(FinalMessageReply::new(reply)).is_ok() {
                    tracing::debug!(conn_id = %conn_id, chat_id, kind = "message_reply", "queued for broadcast");
                }
                Ok(None)
            }
        }
    }

    /// Block for the next data frame. Control frames are skipped. A close
    /// of `sink` (registry removal, shutdown) ends the wait.
    async fn next_frame<S, E>(
        &self,
        conn_id: &ConnectionId,
        sink: &dyn ClientSink,
        source: &mut S,
    ) -> Result<String, Termination>
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        loop {
            let read = async {
                match self.read_idle_timeout {
                    Some(deadline) => time::timeout(deadline, source.next()).await.ok(),
                    None => Some(source.next().await),
                }
            };

            let next = tokio::select! {
                biased;
                () = sink.closed() => {
                    tracing::debug!(conn_id = %conn_id, "connection closed by server");
                    return Err(Termination::Closed);
                }
                next = read => match next {
                    Some(next) => next,
                    None => {
                        tracing::debug!(conn_id = %conn_id, "read idle timeout");
                        return Err(Termination::TransportError);
                    }
                },
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned())
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(Termination::Closed),
                Some(Err(err)) => {
                    tracing::debug!(conn_id = %conn_id, %err, "ws read error");
                    return Err(Termination::TransportError);
                }
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, DispatchError> {
    Ok(serde_json::to_string(value)?)
}
