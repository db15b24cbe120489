//! Postgres-backed durable event log and subscription registry.

pub mod postgres;
pub mod subscriptions;

pub use postgres::PostgresEventLog;
pub use subscriptions::PostgresSubscriptionRegistry;
