use axum::{routing::get, Router};

pub mod events;
pub mod modules;
pub mod system;

/// Router for tenant-scoped and introspection endpoints (mounted at `/api`).
pub fn router() -> Router {
    Router::new()
        .route("/events", get(events::list_events).post(events::publish_event))
        .route("/modules/:module_id/subscriptions", get(modules::list_subscriptions))
}
