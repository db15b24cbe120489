//! Infrastructure transports for the event bus.
//!
//! The bus itself and its in-memory hub live in `edumyles-events`; this module
//! provides the broker-backed implementation.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::RedisTransport;
