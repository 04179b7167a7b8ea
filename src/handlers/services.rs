use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError, ListQuery, PaginationQuery};

// ========== SNMP ==========

pub async fn list_snmp_communities(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<SnmpCommunity>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let items = state.store.list_snmp_communities(limit, offset).await?;
    Ok(Json(items))
}

pub async fn create_snmp_community(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSnmpCommunityRequest>,
) -> Result<(StatusCode, Json<SnmpCommunity>), ApiError> {
    let item = state.store.create_snmp_community(&req).await?;
    Ok(created(item))
}

pub async fn delete_snmp_community(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_snmp_community(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List SNMP configurations with their community ids
pub async fn list_snmp(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Snmp>>, ApiError> {
    let items = state.store.list_snmp(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Create the SNMP configuration of a device, at most one per device
pub async fn create_snmp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSnmpRequest>,
) -> Result<(StatusCode, Json<Snmp>), ApiError> {
    let item = state.store.create_snmp(&req).await?;
    Ok(created(item))
}

pub async fn delete_snmp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_snmp(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_snmp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Snmp>, ApiError> {
    let item = state
        .store
        .get_snmp(id)
        .await?
        .ok_or_else(|| ApiError::not_found("SNMP configuration"))?;
    Ok(Json(item))
}

// ========== Syslog ==========

pub async fn list_syslog_servers(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<SyslogServer>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let items = state.store.list_syslog_servers(limit, offset).await?;
    Ok(Json(items))
}

pub async fn create_syslog_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSyslogServerRequest>,
) -> Result<(StatusCode, Json<SyslogServer>), ApiError> {
    let item = state.store.create_syslog_server(&req).await?;
    Ok(created(item))
}

pub async fn delete_syslog_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_syslog_server(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_syslog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Syslog>>, ApiError> {
    let items = state.store.list_syslog(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Create the syslog configuration of a device, at most one per device
pub async fn create_syslog(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSyslogRequest>,
) -> Result<(StatusCode, Json<Syslog>), ApiError> {
    let item = state.store.create_syslog(&req).await?;
    Ok(created(item))
}

pub async fn delete_syslog(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_syslog(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_syslog(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Syslog>, ApiError> {
    let item = state
        .store
        .get_syslog(id)
        .await?
        .ok_or_else(|| ApiError::not_found("syslog configuration"))?;
    Ok(Json(item))
}

// ========== TACACS ==========

pub async fn list_tacacs_servers(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<TacacsServer>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let items = state.store.list_tacacs_servers(limit, offset).await?;
    Ok(Json(items))
}

/// Create a TACACS server
pub async fn create_tacacs_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTacacsServerRequest>,
) -> Result<(StatusCode, Json<TacacsServer>), ApiError> {
    let item = state.store.create_tacacs_server(&req).await?;
    Ok(created(item))
}

pub async fn delete_tacacs_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_tacacs_server(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tacacs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Tacacs>>, ApiError> {
    let items = state.store.list_tacacs(&query.into_filter()).await?;
    Ok(Json(items))
}

/// Create the TACACS configuration of a device, at most one per device
pub async fn create_tacacs(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTacacsRequest>,
) -> Result<(StatusCode, Json<Tacacs>), ApiError> {
    let item = state.store.create_tacacs(&req).await?;
    Ok(created(item))
}

pub async fn delete_tacacs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_tacacs(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_tacacs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Tacacs>, ApiError> {
    let item = state
        .store
        .get_tacacs(id)
        .await?
        .ok_or_else(|| ApiError::not_found("TACACS configuration"))?;
    Ok(Json(item))
}
