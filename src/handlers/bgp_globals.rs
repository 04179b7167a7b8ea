use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

/// List BGP global configurations
pub async fn list_bgp_globals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BgpGlobal>>, ApiError> {
    let globals = state.store.list_bgp_globals(&query.into_filter()).await?;
    Ok(Json(globals))
}

/// Get a BGP global configuration by ID
pub async fn get_bgp_global(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BgpGlobal>, ApiError> {
    let global = state
        .store
        .get_bgp_global(id)
        .await?
        .ok_or_else(|| ApiError::not_found("BGP global"))?;
    Ok(Json(global))
}

/// Create the BGP global configuration of a device (one per device)
pub async fn create_bgp_global(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BgpGlobalRequest>,
) -> Result<(StatusCode, Json<BgpGlobal>), ApiError> {
    let global = state.store.create_bgp_global(&req).await?;
    Ok(created(global))
}

/// Update a BGP global configuration. AFI/SAFI sets and their aggregates
/// and redistributed networks are reconciled level by level.
pub async fn update_bgp_global(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BgpGlobalRequest>,
) -> Result<Json<BgpGlobal>, ApiError> {
    let global = state.store.update_bgp_global(id, &req).await?;
    Ok(Json(global))
}

/// Delete a BGP global configuration
pub async fn delete_bgp_global(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_bgp_global(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
