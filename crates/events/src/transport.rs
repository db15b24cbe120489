//! Pub/sub transport boundary.
//!
//! The bus only needs a broadcast medium with fire-and-forget, at-least-once
//! semantics: messages published while nobody listens are lost, and there is
//! no redelivery. Redis pub/sub is the production implementation; tests use
//! the in-memory hub.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Serialized messages received on one channel.
///
/// The stream ends when the underlying listener connection goes away.
pub type MessageStream = BoxStream<'static, String>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connection error: {0}")]
    Connection(String),

    #[error("transport command error: {0}")]
    Command(String),

    #[error("transport connection closed")]
    Closed,
}

/// Factory for transport connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Connection>, TransportError>;
}

/// A live transport connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Broadcast `payload` to every current listener of `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;

    /// Open an independent connection to the same broker.
    ///
    /// Listeners get their own connection so a slow subscriber never blocks
    /// the publish path or other subscribers.
    async fn duplicate(&self) -> Result<Arc<dyn Connection>, TransportError>;

    /// Start listening on `channel`. Registration is complete when this returns.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError>;

    /// Release the connection. Further commands fail with [`TransportError::Closed`].
    async fn disconnect(&self) -> Result<(), TransportError>;
}
