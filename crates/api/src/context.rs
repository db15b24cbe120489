use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use edumyles_core::TenantId;

use crate::app::errors::json_error;

/// Header carrying the tenant (school) a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant context for a request.
///
/// Required by every tenant-scoped route; extraction fails with 400 when the
/// header is missing or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, Response> {
        let raw = headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        TenantId::parse(raw)
            .map(Self::new)
            .map_err(|_| {
                json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_tenant",
                    format!("{TENANT_HEADER} header is required"),
                )
            })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
