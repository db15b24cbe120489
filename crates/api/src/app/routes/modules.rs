use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    Json,
};

use edumyles_events::EventBus;

use crate::app::errors::bus_error_to_response;

/// GET /api/modules/:module_id/subscriptions
///
/// Active registry rows for the module, highest priority first.
pub async fn list_subscriptions(
    Extension(bus): Extension<Arc<EventBus>>,
    Path(module_id): Path<String>,
) -> Response {
    match bus.get_subscriptions(&module_id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => bus_error_to_response(e),
    }
}
