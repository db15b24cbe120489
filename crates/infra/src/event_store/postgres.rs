//! Postgres-backed durable event log.
//!
//! ## Error Mapping
//!
//! SQLx errors become [`EventLogError`] with the failing operation in the
//! message:
//!
//! | SQLx Error | EventLogError |
//! |------------|---------------|
//! | any error during `append` / `ensure_schema` | `Write` |
//! | any error during `query` | `Read` |
//! | row decoding failure | `Read` |
//!
//! ## Tenant Isolation
//!
//! Every read includes `tenant_id` in the WHERE clause.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use tracing::{instrument, Span};
use uuid::Uuid;

use edumyles_core::{EventId, TenantId};
use edumyles_events::{Event, EventLog, EventLogError, EventLogFilter, EventMetadata, NewEvent, Pagination};

const CREATE_EVENT_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS event_log (
    id          UUID PRIMARY KEY,
    type        TEXT NOT NULL,
    source      TEXT NOT NULL,
    tenant_id   TEXT NOT NULL,
    timestamp   TIMESTAMPTZ NOT NULL,
    data        JSONB NOT NULL DEFAULT '{}'::jsonb,
    metadata    JSONB
)
"#;

const CREATE_EVENT_LOG_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS event_log_tenant_timestamp_idx
    ON event_log (tenant_id, timestamp DESC)
"#;

/// Durable, append-only event log in the `event_log` table.
#[derive(Debug, Clone)]
pub struct PostgresEventLog {
    pool: Arc<PgPool>,
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the table and index if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), EventLogError> {
        for statement in [CREATE_EVENT_LOG, CREATE_EVENT_LOG_INDEX] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error(Operation::Write, "ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for PostgresEventLog {
    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.id(),
            event_type = %event.event_type(),
            tenant_id = %event.tenant_id()
        ),
        err
    )]
    async fn append(&self, event: &Event) -> Result<(), EventLogError> {
        let data = JsonValue::Object(event.data().clone());
        let metadata = event.metadata().cloned().map(Json);

        sqlx::query(
            r#"
            INSERT INTO event_log (id, type, source, tenant_id, timestamp, data, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id().as_uuid())
        .bind(event.event_type())
        .bind(event.source())
        .bind(event.tenant_id().as_str())
        .bind(event.timestamp())
        .bind(data)
        .bind(metadata)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(Operation::Write, "append", e))?;

        Ok(())
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, event_count = tracing::field::Empty), err)]
    async fn query(
        &self,
        tenant_id: &TenantId,
        filter: &EventLogFilter,
        pagination: Pagination,
    ) -> Result<Vec<Event>, EventLogError> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, source, tenant_id, timestamp, data, metadata
            FROM event_log
            WHERE tenant_id = $1
                AND ($2::text IS NULL OR type = $2)
                AND ($3::text IS NULL OR source = $3)
                AND ($4::timestamptz IS NULL OR timestamp >= $4)
                AND ($5::timestamptz IS NULL OR timestamp <= $5)
            ORDER BY timestamp DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(filter.event_type.as_deref())
        .bind(filter.source.as_deref())
        .bind(filter.after)
        .bind(filter.before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(Operation::Read, "query", e))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let stored = EventLogRow::from_row(&row)
                .map_err(|e| EventLogError::Read(format!("failed to decode event_log row: {e}")))?;
            events.push(stored.into_event());
        }

        Span::current().record("event_count", events.len());
        Ok(events)
    }
}

struct EventLogRow {
    id: Uuid,
    event_type: String,
    source: String,
    tenant_id: String,
    timestamp: DateTime<Utc>,
    data: JsonValue,
    metadata: Option<Json<EventMetadata>>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for EventLogRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: row.try_get("type")?,
            source: row.try_get("source")?,
            tenant_id: row.try_get("tenant_id")?,
            timestamp: row.try_get("timestamp")?,
            data: row.try_get("data")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl EventLogRow {
    fn into_event(self) -> Event {
        let data = match self.data {
            JsonValue::Object(map) => map,
            _ => Default::default(),
        };

        let mut new = NewEvent::new(self.event_type, self.source, TenantId::new(self.tenant_id))
            .with_data(data);
        if let Some(Json(metadata)) = self.metadata {
            new = new.with_metadata(metadata);
        }

        Event::restore(EventId::from_uuid(self.id), self.timestamp, new)
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Read,
    Write,
}

fn map_sqlx_error(operation: Operation, name: &str, err: sqlx::Error) -> EventLogError {
    let msg = describe_sqlx_error(name, err);
    match operation {
        Operation::Read => EventLogError::Read(msg),
        Operation::Write => EventLogError::Write(msg),
    }
}

/// Human-readable sqlx failure, tagged with the operation that hit it.
pub(crate) fn describe_sqlx_error(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("database error in {operation} ({code}): {}", db_err.message()),
            None => format!("database error in {operation}: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        sqlx::Error::PoolTimedOut => format!("connection pool timed out in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_tagged_with_operation_and_direction() {
        let write = map_sqlx_error(Operation::Write, "append", sqlx::Error::PoolClosed);
        assert!(matches!(&write, EventLogError::Write(msg) if msg.contains("append")));

        let read = map_sqlx_error(Operation::Read, "query", sqlx::Error::RowNotFound);
        assert!(matches!(&read, EventLogError::Read(msg) if msg.contains("query")));
    }

    #[test]
    fn rows_restore_the_published_event() {
        let mut data = serde_json::Map::new();
        data.insert("userId".into(), "u1".into());
        let row = EventLogRow {
            id: Uuid::now_v7(),
            event_type: "user.login".into(),
            source: "auth".into(),
            tenant_id: "t1".into(),
            timestamp: Utc::now(),
            data: JsonValue::Object(data),
            metadata: Some(Json(EventMetadata {
                request_id: Some("req-1".into()),
                ..Default::default()
            })),
        };
        let id = row.id;

        let event = row.into_event();

        assert_eq!(event.id().as_uuid(), &id);
        assert_eq!(event.event_type(), "user.login");
        assert_eq!(event.tenant_id().as_str(), "t1");
        assert_eq!(event.data().get("userId"), Some(&JsonValue::from("u1")));
        assert_eq!(
            event.metadata().and_then(|m| m.request_id.as_deref()),
            Some("req-1")
        );
    }

    #[test]
    fn non_object_data_restores_as_empty() {
        let row = EventLogRow {
            id: Uuid::now_v7(),
            event_type: "a.b".into(),
            source: "test".into(),
            tenant_id: "t1".into(),
            timestamp: Utc::now(),
            data: JsonValue::Null,
            metadata: None,
        };

        assert!(row.into_event().data().is_empty());
    }
}
