use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

/// List prefix lists, filtered by device or name
pub async fn list_prefix_lists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PrefixList>>, ApiError> {
    let items = state.store.list_prefix_lists(&query.into_filter()).await?;
    Ok(Json(items))
}

pub async fn get_prefix_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PrefixList>, ApiError> {
    let item = state
        .store
        .get_prefix_list(id)
        .await?
        .ok_or_else(|| ApiError::not_found("prefix list"))?;
    Ok(Json(item))
}

/// Create a prefix list with its terms
pub async fn create_prefix_list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrefixListRequest>,
) -> Result<(StatusCode, Json<PrefixList>), ApiError> {
    let item = state.store.create_prefix_list(&req).await?;
    Ok(created(item))
}

/// Replace the terms of a prefix list, see `update_route_policy`
pub async fn update_prefix_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<PrefixListRequest>,
) -> Result<Json<PrefixList>, ApiError> {
    let item = state.store.update_prefix_list(id, &req).await?;
    Ok(Json(item))
}

/// Delete a prefix list
pub async fn delete_prefix_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_prefix_list(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
