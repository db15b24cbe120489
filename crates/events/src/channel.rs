//! Transport channel naming.
//!
//! These names are shared with every other service on the same broker and
//! must not change.

use edumyles_core::TenantId;

/// Channel carrying every event of one type, across tenants.
pub fn event_channel(event_type: &str) -> String {
    format!("event:{event_type}")
}

/// Channel carrying every event of one tenant, across types.
pub fn tenant_channel(tenant_id: &TenantId) -> String {
    format!("tenant:{tenant_id}:events")
}
