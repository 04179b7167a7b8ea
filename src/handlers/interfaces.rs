use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery};

pub async fn list_device_interfaces(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeviceInterface>>, ApiError> {
    let items = state.store.list_device_interfaces(&query.into_filter()).await?;
    Ok(Json(items))
}

pub async fn create_device_interface(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDeviceInterfaceRequest>,
) -> Result<(StatusCode, Json<DeviceInterface>), ApiError> {
    let item = state.store.create_device_interface(&req).await?;
    Ok(created(item))
}

pub async fn delete_device_interface(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_device_interface(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List logical interfaces, filtered by the device of their parent interface
pub async fn list_logical_interfaces(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<LogicalInterface>>, ApiError> {
    let items = state.store.list_logical_interfaces(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Create a logical interface. Its VRF must be on the parent interface's device.
pub async fn create_logical_interface(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLogicalInterfaceRequest>,
) -> Result<(StatusCode, Json<LogicalInterface>), ApiError> {
    let item = state.store.create_logical_interface(&req).await?;
    Ok(created(item))
}

pub async fn delete_logical_interface(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_logical_interface(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List links having either end on the filtered device
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Link>>, ApiError> {
    let items = state.store.list_links(&query.into_filter()).await?;
    Ok(Json(items))
}

pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Link>, ApiError> {
    let item = state
        .store
        .get_link(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Link"))?;
    Ok(Json(item))
}

pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LinkRequest>,
) -> Result<(StatusCode, Json<Link>), ApiError> {
    let item = state.store.create_link(&req).await?;
    Ok(created(item))
}

pub async fn update_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<LinkRequest>,
) -> Result<Json<Link>, ApiError> {
    let item = state.store.update_link(id, &req).await?;
    Ok(Json(item))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_link(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
