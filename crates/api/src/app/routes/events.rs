//! Tenant-scoped event endpoints: publish and durable history.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use edumyles_events::{EventBus, EventLogFilter, NewEvent, Pagination};

use crate::app::dto::{EventListQuery, PublishEventRequest};
use crate::app::errors::{bus_error_to_response, json_error};
use crate::context::TenantContext;

/// POST /api/events
///
/// Publishes on behalf of the tenant in `x-tenant-id`; responds 201 with the
/// stamped event once it is durably recorded.
pub async fn publish_event(
    Extension(bus): Extension<Arc<EventBus>>,
    tenant: TenantContext,
    Json(body): Json<PublishEventRequest>,
) -> Response {
    if body.event_type.trim().is_empty() || body.source.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "type and source are required",
        );
    }

    let mut new = NewEvent::new(body.event_type, body.source, tenant.tenant_id().clone())
        .with_data(body.data);
    if let Some(metadata) = body.metadata {
        new = new.with_metadata(metadata);
    }

    match bus.publish(new).await {
        Ok(event) => {
            info!(event_id = %event.id(), event_type = %event.event_type(), "event accepted");
            (StatusCode::CREATED, Json(event)).into_response()
        }
        Err(e) => bus_error_to_response(e),
    }
}

/// GET /api/events?type=X&source=Y&after=T&before=T&limit=50&offset=0
///
/// Newest first. `limit` defaults to 50 and is capped at 1000.
pub async fn list_events(
    Extension(bus): Extension<Arc<EventBus>>,
    tenant: TenantContext,
    Query(query): Query<EventListQuery>,
) -> Response {
    let filter = EventLogFilter {
        event_type: query.event_type,
        source: query.source,
        after: query.after,
        before: query.before,
    };
    let pagination = Pagination::new(query.limit, query.offset);

    match bus.history(tenant.tenant_id(), &filter, pagination).await {
        Ok(events) => Json(json!({
            "events": events,
            "limit": pagination.limit,
            "offset": pagination.offset,
        }))
        .into_response(),
        Err(e) => bus_error_to_response(e),
    }
}
