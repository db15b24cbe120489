//! Event bus wiring: picks broker and persistence from configuration.
//!
//! | Setting | Set | Unset |
//! |---------|-----|-------|
//! | `REDIS_URL` | Redis pub/sub (needs the `redis` feature) | in-process hub |
//! | `DATABASE_URL` | Postgres log + registry | in-memory log + registry |

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use edumyles_events::{
    EventBus, EventLog, InMemoryEventLog, InMemorySubscriptionRegistry, InMemoryTransport,
    SubscriptionRegistry, Transport,
};
use edumyles_infra::{InfraConfig, PostgresEventLog, PostgresSubscriptionRegistry};

/// Build an unconnected bus from configuration.
pub async fn build_event_bus(config: &InfraConfig) -> anyhow::Result<EventBus> {
    let transport = build_transport(config)?;
    let (log, registry) = build_persistence(config).await?;
    Ok(EventBus::new(transport, log, registry))
}

/// Bus backed entirely by in-memory collaborators.
pub fn in_memory_event_bus() -> EventBus {
    EventBus::new(
        Arc::new(InMemoryTransport::new()),
        Arc::new(InMemoryEventLog::new()),
        Arc::new(InMemorySubscriptionRegistry::new()),
    )
}

fn build_transport(config: &InfraConfig) -> anyhow::Result<Arc<dyn Transport>> {
    match config.redis_url.as_deref() {
        None => {
            info!("REDIS_URL not set; using in-process event transport");
            Ok(Arc::new(InMemoryTransport::new()))
        }
        Some(url) => redis_transport(url),
    }
}

#[cfg(feature = "redis")]
fn redis_transport(url: &str) -> anyhow::Result<Arc<dyn Transport>> {
    let transport = edumyles_infra::RedisTransport::new(url).context("invalid REDIS_URL")?;
    info!("using redis event transport");
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "redis"))]
fn redis_transport(_url: &str) -> anyhow::Result<Arc<dyn Transport>> {
    anyhow::bail!("REDIS_URL is set but this binary was built without the `redis` feature")
}

async fn build_persistence(
    config: &InfraConfig,
) -> anyhow::Result<(Arc<dyn EventLog>, Arc<dyn SubscriptionRegistry>)> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("DATABASE_URL not set; using in-memory event log and subscription registry");
        return Ok((
            Arc::new(InMemoryEventLog::new()),
            Arc::new(InMemorySubscriptionRegistry::new()),
        ));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let log = PostgresEventLog::new(pool.clone());
    log.ensure_schema().await.context("failed to prepare event_log")?;
    let registry = PostgresSubscriptionRegistry::new(pool);
    registry
        .ensure_schema()
        .await
        .context("failed to prepare event_subscriptions")?;

    info!(max_connections = config.database_max_connections, "using postgres event log");
    Ok((Arc::new(log), Arc::new(registry)))
}
