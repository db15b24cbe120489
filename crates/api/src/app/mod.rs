//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event bus wiring (transport, durable log, registry)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use edumyles_events::EventBus;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around a shared (already connected) bus.
pub fn build_app(bus: Arc<EventBus>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router())
        .layer(ServiceBuilder::new().layer(Extension(bus)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_is_unavailable_before_connect() {
        let app = build_app(Arc::new(services::in_memory_event_bus()));

        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["services"]["eventBus"], "unhealthy");
    }

    #[tokio::test]
    async fn publishing_requires_a_tenant_header() {
        let bus = Arc::new(services::in_memory_event_bus());
        bus.connect().await.unwrap();
        let app = build_app(bus);

        let res = app
            .oneshot(
                Request::post("/api/events")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"user.login","source":"auth"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
