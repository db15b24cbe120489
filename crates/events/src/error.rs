use thiserror::Error;

use edumyles_core::SubscriptionId;

use crate::store::{EventLogError, RegistryError};
use crate::transport::TransportError;

/// Errors surfaced to callers of the [`EventBus`](crate::EventBus).
///
/// Handler failures never appear here: they are retried, then logged and
/// dropped at the dispatch boundary.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus not connected")]
    NotConnected,

    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("durable event write failed: {0}")]
    DurableWrite(#[source] EventLogError),

    #[error("event history unavailable: {0}")]
    History(#[source] EventLogError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
