mod asns;
mod bgp_globals;
mod bgp_sessions;
mod community_lists;
mod decommission;
mod devices;
mod interfaces;
mod peer_groups;
mod prefix_lists;
mod route_policies;
pub(crate) mod row_helpers;
mod services;
mod store_bgp;
mod store_services;
mod vlans;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::sync::Arc;

use crate::models::*;
use crate::reconcile::allocator::NamedLocks;

/// Typed error for "resource not found", downcast
/// by the API error handler.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Name of the lock serializing next-available ASN allocations
pub const ASN_ALLOCATION_LOCK: &str = "create-next-available-asn";

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    locks: Arc<NamedLocks>,
}

impl Store {
    /// Create a new database store with a specific pool size.
    /// `":memory:"` gives a private in-memory database.
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self {
            pool,
            locks: Arc::new(NamedLocks::new()),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ========== Device Operations ==========

    pub async fn list_devices(&self, limit: i32, offset: i32) -> Result<Vec<Device>> {
        devices::DeviceRepo::list(&self.pool, limit, offset).await
    }

    pub async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        devices::DeviceRepo::get(&self.pool, id).await
    }

    pub async fn create_device(&self, req: &CreateDeviceRequest) -> Result<Device> {
        devices::DeviceRepo::create(&self.pool, req).await
    }

    pub async fn rename_device(&self, id: i64, req: &RenameDeviceRequest) -> Result<Device> {
        devices::DeviceRepo::rename(&self.pool, id, req).await
    }

    // ========== IP Address Operations ==========

    pub async fn list_ip_addresses(&self, limit: i32, offset: i32) -> Result<Vec<IpAddress>> {
        devices::IpAddressRepo::list(&self.pool, limit, offset).await
    }

    pub async fn get_ip_address(&self, id: i64) -> Result<Option<IpAddress>> {
        devices::IpAddressRepo::get(&self.pool, id).await
    }

    pub async fn create_ip_address(&self, req: &CreateIpAddressRequest) -> Result<IpAddress> {
        devices::IpAddressRepo::create(&self.pool, req).await
    }

    pub async fn update_ip_address(&self, id: i64, req: &UpdateIpAddressRequest) -> Result<IpAddress> {
        devices::IpAddressRepo::update(&self.pool, id, req).await
    }

    // ========== ASN Operations ==========

    pub async fn list_asns(&self, limit: i32, offset: i32) -> Result<Vec<Asn>> {
        asns::AsnRepo::list(&self.pool, limit, offset).await
    }

    pub async fn get_asn(&self, id: i64) -> Result<Option<Asn>> {
        asns::AsnRepo::get(&self.pool, id).await
    }

    pub async fn create_asn(&self, req: &CreateAsnRequest) -> Result<Asn> {
        asns::AsnRepo::create(&self.pool, req).await
    }

    pub async fn delete_asn(&self, id: i64) -> Result<()> {
        asns::AsnRepo::delete(&self.pool, id).await
    }

    /// Create an ASN with the lowest free number of the requested range.
    /// Allocations are serialized process-wide.
    pub async fn create_next_available_asn(&self, req: &AvailableAsnRequest) -> Result<Asn> {
        let _guard = self.locks.acquire(ASN_ALLOCATION_LOCK).await;
        asns::AsnRepo::create_next_available(&self.pool, req).await
    }

    // ========== Route Policy Operations ==========

    pub async fn list_route_policies(&self, filter: &ListFilter) -> Result<Vec<RoutePolicy>> {
        route_policies::RoutePolicyRepo::list(&self.pool, filter).await
    }

    pub async fn get_route_policy(&self, id: i64) -> Result<Option<RoutePolicy>> {
        route_policies::RoutePolicyRepo::get(&self.pool, id).await
    }

    pub async fn create_route_policy(&self, req: &RoutePolicyRequest) -> Result<RoutePolicy> {
        route_policies::RoutePolicyRepo::create(&self.pool, req).await
    }

    pub async fn update_route_policy(&self, id: i64, req: &RoutePolicyRequest) -> Result<RoutePolicy> {
        route_policies::RoutePolicyRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_route_policy(&self, id: i64) -> Result<()> {
        route_policies::RoutePolicyRepo::delete(&self.pool, id).await
    }

    // ========== Prefix List Operations ==========

    pub async fn list_prefix_lists(&self, filter: &ListFilter) -> Result<Vec<PrefixList>> {
        prefix_lists::PrefixListRepo::list(&self.pool, filter).await
    }

    pub async fn get_prefix_list(&self, id: i64) -> Result<Option<PrefixList>> {
        prefix_lists::PrefixListRepo::get(&self.pool, id).await
    }

    pub async fn create_prefix_list(&self, req: &PrefixListRequest) -> Result<PrefixList> {
        prefix_lists::PrefixListRepo::create(&self.pool, req).await
    }

    pub async fn update_prefix_list(&self, id: i64, req: &PrefixListRequest) -> Result<PrefixList> {
        prefix_lists::PrefixListRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_prefix_list(&self, id: i64) -> Result<()> {
        prefix_lists::PrefixListRepo::delete(&self.pool, id).await
    }

    // ========== BGP Community List Operations ==========

    pub async fn list_community_lists(&self, filter: &ListFilter) -> Result<Vec<BgpCommunityList>> {
        community_lists::CommunityListRepo::list(&self.pool, filter).await
    }

    pub async fn get_community_list(&self, id: i64) -> Result<Option<BgpCommunityList>> {
        community_lists::CommunityListRepo::get(&self.pool, id).await
    }

    pub async fn create_community_list(&self, req: &BgpCommunityListRequest) -> Result<BgpCommunityList> {
        community_lists::CommunityListRepo::create(&self.pool, req).await
    }

    pub async fn update_community_list(
        &self,
        id: i64,
        req: &BgpCommunityListRequest,
    ) -> Result<BgpCommunityList> {
        community_lists::CommunityListRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_community_list(&self, id: i64) -> Result<()> {
        community_lists::CommunityListRepo::delete(&self.pool, id).await
    }

    // ========== Decommission ==========

    pub async fn decommission_device(&self, device_name: &str) -> Result<DecommissionReport> {
        decommission::DecommissionRepo::decommission(&self.pool, device_name).await
    }
}
