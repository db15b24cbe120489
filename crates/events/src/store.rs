//! Durable event log and subscription registry boundaries.
//!
//! Both are persistence collaborators of the bus. The log receives every
//! published event (audit/replay); the registry is a read-only view of
//! persisted module subscriptions used for introspection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edumyles_core::TenantId;

use crate::subscription::SubscriptionRecord;
use crate::Event;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log write failed: {0}")]
    Write(String),

    #[error("event log read failed: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("subscription registry read failed: {0}")]
    Read(String),

    #[error("subscription registry write failed: {0}")]
    Write(String),
}

/// Pagination parameters for log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Maximum page size accepted from callers.
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for log queries. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogFilter {
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl EventLogFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.as_deref().is_none_or(|t| t == event.event_type())
            && self.source.as_deref().is_none_or(|s| s == event.source())
            && self.after.is_none_or(|after| event.timestamp() >= after)
            && self.before.is_none_or(|before| event.timestamp() <= before)
    }
}

/// Append-only durable store of published events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist a stamped event. Idempotency is not required.
    async fn append(&self, event: &Event) -> Result<(), EventLogError>;

    /// Tenant-scoped read, newest first.
    async fn query(
        &self,
        tenant_id: &TenantId,
        filter: &EventLogFilter,
        pagination: Pagination,
    ) -> Result<Vec<Event>, EventLogError>;
}

/// Persisted module subscriptions.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Active registrations for a module, highest priority first.
    async fn list_subscriptions(&self, module_id: &str) -> Result<Vec<SubscriptionRecord>, RegistryError>;
}
