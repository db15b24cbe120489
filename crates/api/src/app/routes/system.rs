use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use edumyles_events::EventBus;

use crate::app::dto::{health_label, HealthResponse, HealthServices};

/// GET /health
///
/// 200 while the event bus answers its liveness probe, 503 otherwise.
pub async fn health(Extension(bus): Extension<Arc<EventBus>>) -> impl IntoResponse {
    let bus_healthy = bus.is_healthy().await;
    let status = if bus_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: health_label(bus_healthy),
            timestamp: Utc::now(),
            services: HealthServices {
                event_bus: health_label(bus_healthy),
            },
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
