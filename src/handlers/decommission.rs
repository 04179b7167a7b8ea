use axum::{extract::State, Json};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::ApiError;

/// Delete every configuration object of a device. The device itself and
/// its interfaces are kept.
pub async fn delete_all_objects(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecommissionRequest>,
) -> Result<Json<DecommissionReport>, ApiError> {
    if req.device_name.trim().is_empty() {
        return Err(ApiError::bad_request("device_name is required"));
    }
    let report = state.store.decommission_device(&req.device_name).await?;
    Ok(Json(report))
}
