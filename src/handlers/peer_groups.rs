use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

pub async fn list_peer_groups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BgpPeerGroup>>, ApiError> {
    let groups = state.store.list_peer_groups(&query.into_filter()).await?;
    Ok(Json(groups))
}

pub async fn get_peer_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BgpPeerGroup>, ApiError> {
    let group = state
        .store
        .get_peer_group(id)
        .await?
        .ok_or_else(|| ApiError::not_found("BGP peer group"))?;
    Ok(Json(group))
}

/// Create a peer group; its route policies must be on the same device
pub async fn create_peer_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BgpPeerGroupRequest>,
) -> Result<(StatusCode, Json<BgpPeerGroup>), ApiError> {
    let group = state.store.create_peer_group(&req).await?;
    Ok(created(group))
}

pub async fn update_peer_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BgpPeerGroupRequest>,
) -> Result<Json<BgpPeerGroup>, ApiError> {
    let group = state.store.update_peer_group(id, &req).await?;
    Ok(Json(group))
}

pub async fn delete_peer_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_peer_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
