use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edumyles_events::{EventData, EventMetadata};

/// Body of `POST /api/events`. The tenant comes from the request header.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub data: EventData,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

/// `GET /api/events?type=user.login&limit=50&offset=0`
#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthServices {
    pub event_bus: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: HealthServices,
    pub version: &'static str,
}

pub fn health_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}
