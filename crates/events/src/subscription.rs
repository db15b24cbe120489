use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use edumyles_core::TenantId;

use crate::retry::RetryPolicy;
use crate::Event;

/// Predicate evaluated before a handler is invoked.
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Options for a live subscription.
///
/// - `priority` is informational (reported in logs); the live delivery path
///   does not order by it.
/// - `filter` rejections are silent: no handler call, no retry, no log.
/// - `retry_policy` governs retry of handler failures for this subscription.
#[derive(Clone, Default)]
pub struct SubscriptionOptions {
    pub priority: i32,
    pub filter: Option<EventFilter>,
    pub retry_policy: Option<RetryPolicy>,
}

impl core::fmt::Debug for SubscriptionOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("priority", &self.priority)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Only accept events belonging to `tenant_id`.
    pub fn for_tenant(self, tenant_id: TenantId) -> Self {
        self.with_filter(move |event| event.tenant_id() == &tenant_id)
    }

    /// Whether the filter (if any) lets `event` through.
    pub fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

/// A persisted subscription registration (introspection only).
///
/// Registry rows are written by module installation, not by
/// `EventBus::subscribe`; the two are intentionally separate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub event_type: String,
    pub module_id: String,
    /// Name of the handler inside the module.
    pub handler: String,
    pub active: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn new(
        event_type: impl Into<String>,
        module_id: impl Into<String>,
        handler: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            module_id: module_id.into(),
            handler: handler.into(),
            active: true,
            priority,
            created_at: Utc::now(),
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}
