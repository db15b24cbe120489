//! Postgres-backed subscription registry (`event_subscriptions` table).
//!
//! Rows are written when a module is installed for a school and read back for
//! introspection. The live bus never consults this table when delivering.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use edumyles_events::{RegistryError, SubscriptionRecord, SubscriptionRegistry};

use super::postgres::describe_sqlx_error;

const CREATE_EVENT_SUBSCRIPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS event_subscriptions (
    id          UUID PRIMARY KEY,
    event_type  TEXT NOT NULL,
    module_id   TEXT NOT NULL,
    handler     TEXT NOT NULL,
    active      BOOLEAN NOT NULL DEFAULT TRUE,
    priority    INTEGER NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_EVENT_SUBSCRIPTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS event_subscriptions_module_idx
    ON event_subscriptions (module_id, active)
"#;

#[derive(Debug, Clone)]
pub struct PostgresSubscriptionRegistry {
    pool: Arc<PgPool>,
}

impl PostgresSubscriptionRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        for statement in [CREATE_EVENT_SUBSCRIPTIONS, CREATE_EVENT_SUBSCRIPTIONS_INDEX] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| RegistryError::Write(describe_sqlx_error("ensure_schema", e)))?;
        }
        Ok(())
    }

    /// Insert or replace a registration row.
    #[instrument(
        skip(self, record),
        fields(module_id = %record.module_id, event_type = %record.event_type),
        err
    )]
    pub async fn register(&self, record: &SubscriptionRecord) -> Result<(), RegistryError> {
        sqlx::query(
            r#"
            INSERT INTO event_subscriptions
                (id, event_type, module_id, handler, active, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                module_id = EXCLUDED.module_id,
                handler = EXCLUDED.handler,
                active = EXCLUDED.active,
                priority = EXCLUDED.priority
            "#,
        )
        .bind(record.id)
        .bind(&record.event_type)
        .bind(&record.module_id)
        .bind(&record.handler)
        .bind(record.active)
        .bind(record.priority)
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| RegistryError::Write(describe_sqlx_error("register", e)))?;

        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for PostgresSubscriptionRegistry {
    #[instrument(skip(self), err)]
    async fn list_subscriptions(&self, module_id: &str) -> Result<Vec<SubscriptionRecord>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, module_id, handler, active, priority, created_at
            FROM event_subscriptions
            WHERE module_id = $1 AND active = TRUE
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .bind(module_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| RegistryError::Read(describe_sqlx_error("list_subscriptions", e)))?;

        rows.iter()
            .map(|row| {
                SubscriptionRow::from_row(row)
                    .map(SubscriptionRecord::from)
                    .map_err(|e| {
                        RegistryError::Read(format!("failed to decode event_subscriptions row: {e}"))
                    })
            })
            .collect()
    }
}

struct SubscriptionRow {
    id: Uuid,
    event_type: String,
    module_id: String,
    handler: String,
    active: bool,
    priority: i32,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for SubscriptionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            module_id: row.try_get("module_id")?,
            handler: row.try_get("handler")?,
            active: row.try_get("active")?,
            priority: row.try_get("priority")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            module_id: row.module_id,
            handler: row.handler,
            active: row.active,
            priority: row.priority,
            created_at: row.created_at,
        }
    }
}
