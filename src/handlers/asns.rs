use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, PaginationQuery};

/// List ASNs
pub async fn list_asns(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<Asn>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let asns = state.store.list_asns(limit, offset).await?;
    Ok(Json(asns))
}

/// Get a single ASN by ID
pub async fn get_asn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Asn>, ApiError> {
    let asn = state
        .store
        .get_asn(id)
        .await?
        .ok_or_else(|| ApiError::not_found("ASN"))?;
    Ok(Json(asn))
}

/// Create an ASN with an explicit number
pub async fn create_asn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAsnRequest>,
) -> Result<(StatusCode, Json<Asn>), ApiError> {
    let asn = state.store.create_asn(&req).await?;
    Ok(created(asn))
}

/// Allocate the lowest free ASN of the requested range
pub async fn create_available_asn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailableAsnRequest>,
) -> Result<(StatusCode, Json<Asn>), ApiError> {
    let asn = state.store.create_next_available_asn(&req).await?;
    Ok(created(asn))
}

/// Delete an ASN
pub async fn delete_asn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_asn(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
