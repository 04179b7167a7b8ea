use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

/// List route policies, filtered by device or name
pub async fn list_route_policies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RoutePolicy>>, ApiError> {
    let items = state.store.list_route_policies(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Get a single route policy by ID
pub async fn get_route_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RoutePolicy>, ApiError> {
    let item = state
        .store
        .get_route_policy(id)
        .await?
        .ok_or_else(|| ApiError::not_found("route policy"))?;
    Ok(Json(item))
}

/// Create a route policy with its terms
pub async fn create_route_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoutePolicyRequest>,
) -> Result<(StatusCode, Json<RoutePolicy>), ApiError> {
    let item = state.store.create_route_policy(&req).await?;
    Ok(created(item))
}

/// Replace the terms of a route policy. Terms are matched by sequence: missing ones
/// are deleted, new ones inserted and the rest updated in place.
pub async fn update_route_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RoutePolicyRequest>,
) -> Result<Json<RoutePolicy>, ApiError> {
    let item = state.store.update_route_policy(id, &req).await?;
    Ok(Json(item))
}

/// Delete a route policy
pub async fn delete_route_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_route_policy(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
