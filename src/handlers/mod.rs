pub mod asns;
pub mod bgp_globals;
pub mod bgp_sessions;
pub mod community_lists;
pub mod decommission;
pub mod devices;
pub mod interfaces;
pub mod peer_groups;
pub mod prefix_lists;
pub mod route_policies;
pub mod services;
pub mod vlans;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CmdbError;
use crate::models::ListFilter;
use crate::AppState;

/// Shared pagination query parameters for list endpoints.
/// Defaults: limit=100, offset=0. Max limit=1000.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

impl PaginationQuery {
    /// Clamp limit to [1, 1000] and offset to >= 0
    pub fn sanitize(&self) -> (i32, i32) {
        sanitize(self.limit, self.offset)
    }
}

/// Query parameters for lists of device-scoped objects
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub device_id: Option<i64>,
    pub device_name: Option<String>,
    pub name: Option<String>,
    #[serde(default = "default_page_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

impl ListQuery {
    pub fn into_filter(self) -> ListFilter {
        let (limit, offset) = sanitize(self.limit, self.offset);
        ListFilter {
            device_id: self.device_id,
            device_name: self.device_name,
            name: self.name,
            limit,
            offset,
        }
    }
}

fn sanitize(limit: i32, offset: i32) -> (i32, i32) {
    (limit.clamp(1, 1000), offset.max(0))
}

fn default_page_limit() -> i32 {
    100
}

/// Error response: `{"error": "message"}`, plus one entry per field
/// problem when a submission is rejected.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                details: self.details,
            }),
        )
            .into_response()
    }
}

impl From<CmdbError> for ApiError {
    fn from(err: CmdbError) -> Self {
        let status = match &err {
            CmdbError::EmptyCollection { .. }
            | CmdbError::DuplicateKey { .. }
            | CmdbError::Validation(_)
            | CmdbError::InvalidInput(_)
            | CmdbError::NoIdentifierAvailable { .. } => StatusCode::BAD_REQUEST,
            CmdbError::DuplicateSession | CmdbError::Protected { .. } | CmdbError::Conflict(_) => {
                StatusCode::CONFLICT
            }
        };
        Self {
            status,
            details: err.details(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors first, no string matching
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::new(StatusCode::NOT_FOUND, nf.to_string());
        }
        let err = match err.downcast::<CmdbError>() {
            Ok(domain) => return domain.into(),
            Err(err) => err,
        };
        if let Some(sqlx::Error::Database(db_err)) = err.downcast_ref::<sqlx::Error>() {
            if db_err.is_unique_violation() {
                return Self::conflict("an object with the same identity already exists");
            }
            if db_err.is_foreign_key_violation() {
                return Self::conflict("object is still referenced by other objects");
            }
        }
        tracing::error!("Request failed: {:#}", err);
        Self::internal("internal error")
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint, reports whether the database answers
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, health, db) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            tracing::warn!("Healthcheck database ping failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };
    (
        status,
        Json(serde_json::json!({
            "status": health,
            "database": db,
            "service": "netcfg-cmdb",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    #[test]
    fn test_domain_errors_map_to_status() {
        let err: ApiError = anyhow::Error::from(CmdbError::DuplicateSession).into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = anyhow::Error::from(CmdbError::Validation(vec![
            FieldError::device_mismatch("route_policy_in"),
            FieldError::unknown_reference("local_address", 4),
        ]))
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.details.len(), 2);

        let err: ApiError = anyhow::Error::from(CmdbError::NoIdentifierAvailable { min: 1, max: 2 }).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = anyhow::Error::from(crate::db::NotFoundError::new("ASN", "7")).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "ASN not found: 7");
    }

    #[test]
    fn test_storage_failure_is_generic() {
        let err: ApiError = anyhow::anyhow!("disk I/O error at /data/netcfg.db").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }

    #[test]
    fn test_list_query_clamped() {
        let query: ListQuery = serde_json::from_value(serde_json::json!({
            "device_name": "router-a",
            "limit": 5000,
            "offset": -3,
        }))
        .unwrap();
        let filter = query.into_filter();
        assert_eq!(filter.limit, 1000);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.device_name.as_deref(), Some("router-a"));
    }
}
