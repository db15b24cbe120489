use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use edumyles_events::BusError;

pub fn bus_error_to_response(err: BusError) -> axum::response::Response {
    match err {
        BusError::NotConnected => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "event_bus_unavailable",
            "event bus not connected",
        ),
        BusError::Transport(e) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "event_bus_unavailable", e.to_string())
        }
        BusError::DurableWrite(e) => json_error(StatusCode::BAD_GATEWAY, "durable_write_failed", e.to_string()),
        BusError::SubscriptionNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "subscription_not_found",
            format!("subscription {id} not found"),
        ),
        BusError::History(e) => json_error(StatusCode::BAD_GATEWAY, "history_unavailable", e.to_string()),
        BusError::Registry(e) => json_error(StatusCode::BAD_GATEWAY, "registry_unavailable", e.to_string()),
        BusError::Serialization(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
