use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, PaginationQuery};

/// List devices
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let devices = state.store.list_devices(limit, offset).await?;
    Ok(Json(devices))
}

/// Get a single device by ID
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Device>, ApiError> {
    let device = state
        .store
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))?;
    Ok(Json(device))
}

/// Create a device
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    let device = state.store.create_device(&req).await?;
    Ok(created(device))
}

/// Rename a device, refused while configuration objects point at it
pub async fn rename_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RenameDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let device = state.store.rename_device(id, &req).await?;
    Ok(Json(device))
}

/// List IP addresses
pub async fn list_ip_addresses(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<IpAddress>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let addresses = state.store.list_ip_addresses(limit, offset).await?;
    Ok(Json(addresses))
}

/// Get a single IP address by ID
pub async fn get_ip_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<IpAddress>, ApiError> {
    let address = state
        .store
        .get_ip_address(id)
        .await?
        .ok_or_else(|| ApiError::not_found("IP address"))?;
    Ok(Json(address))
}

/// Create an IP address
pub async fn create_ip_address(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIpAddressRequest>,
) -> Result<(StatusCode, Json<IpAddress>), ApiError> {
    let address = state.store.create_ip_address(&req).await?;
    Ok(created(address))
}

/// Change an address. Moving the host part is refused while a BGP session
/// uses it as local address.
pub async fn update_ip_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateIpAddressRequest>,
) -> Result<Json<IpAddress>, ApiError> {
    let address = state.store.update_ip_address(id, &req).await?;
    Ok(Json(address))
}
