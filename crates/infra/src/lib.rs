//! Infrastructure layer: Redis transport, Postgres persistence, config.

pub mod config;
pub mod event_bus;
pub mod event_store;

pub use config::InfraConfig;
pub use event_store::{PostgresEventLog, PostgresSubscriptionRegistry};

#[cfg(feature = "redis")]
pub use event_bus::RedisTransport;
