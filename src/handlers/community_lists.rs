use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

/// List BGP community lists, filtered by device or name
pub async fn list_community_lists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BgpCommunityList>>, ApiError> {
    let items = state.store.list_community_lists(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Get a single BGP community list by ID
pub async fn get_community_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BgpCommunityList>, ApiError> {
    let item = state
        .store
        .get_community_list(id)
        .await?
        .ok_or_else(|| ApiError::not_found("BGP community list"))?;
    Ok(Json(item))
}

/// Create a BGP community list with its terms
pub async fn create_community_list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BgpCommunityListRequest>,
) -> Result<(StatusCode, Json<BgpCommunityList>), ApiError> {
    let item = state.store.create_community_list(&req).await?;
    Ok(created(item))
}

/// Reconcile the submitted terms against the stored ones
pub async fn update_community_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BgpCommunityListRequest>,
) -> Result<Json<BgpCommunityList>, ApiError> {
    let item = state.store.update_community_list(id, &req).await?;
    Ok(Json(item))
}

/// Delete a BGP community list
pub async fn delete_community_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_community_list(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
