use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

/// List BGP sessions having either side on the filtered device
pub async fn list_bgp_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BgpSession>>, ApiError> {
    let sessions = state.store.list_bgp_sessions(&query.into_filter()).await?;
    Ok(Json(sessions))
}

pub async fn get_bgp_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BgpSession>, ApiError> {
    let session = state
        .store
        .get_bgp_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found("BGP session"))?;
    Ok(Json(session))
}

/// Create a session and both of its sides. Refused when a session already
/// joins the same two (device, address) endpoints, in either order.
pub async fn create_bgp_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BgpSessionRequest>,
) -> Result<(StatusCode, Json<BgpSession>), ApiError> {
    let session = state.store.create_bgp_session(&req).await?;
    Ok(created(session))
}

/// Update a session. Each side's AFI/SAFI sets are reconciled when given.
pub async fn update_bgp_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BgpSessionRequest>,
) -> Result<Json<BgpSession>, ApiError> {
    let session = state.store.update_bgp_session(id, &req).await?;
    Ok(Json(session))
}

/// Delete a session together with both of its sides
pub async fn delete_bgp_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_bgp_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_device_bgp_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeviceBgpSession>>, ApiError> {
    let sessions = state.store.list_device_bgp_sessions(&query.into_filter()).await?;
    Ok(Json(sessions))
}

pub async fn get_device_bgp_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeviceBgpSession>, ApiError> {
    let session = state
        .store
        .get_device_bgp_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found("device BGP session"))?;
    Ok(Json(session))
}
