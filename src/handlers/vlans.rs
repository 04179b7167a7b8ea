use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery, PaginationQuery};

pub async fn list_vlans(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<Vlan>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let items = state.store.list_vlans(limit, offset).await?;
    Ok(Json(items))
}

/// Create a VLAN, `vid` must be within 1..=4094
pub async fn create_vlan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVlanRequest>,
) -> Result<(StatusCode, Json<Vlan>), ApiError> {
    let item = state.store.create_vlan(&req).await?;
    Ok(created(item))
}

pub async fn delete_vlan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_vlan(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List VRFs, filtered by device or name
pub async fn list_vrfs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Vrf>>, ApiError> {
    let items = state.store.list_vrfs(&query.into_filter()).await?;
    Ok(Json(items))
}

pub async fn create_vrf(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVrfRequest>,
) -> Result<(StatusCode, Json<Vrf>), ApiError> {
    let item = state.store.create_vrf(&req).await?;
    Ok(created(item))
}

pub async fn delete_vrf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_vrf(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
