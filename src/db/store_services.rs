use anyhow::Result;

use crate::models::*;
use super::Store;
use super::{interfaces, services, vlans};

impl Store {
    // ========== SNMP Operations ==========

    pub async fn list_snmp_communities(&self, limit: i32, offset: i32) -> Result<Vec<SnmpCommunity>> {
        services::SnmpCommunityRepo::list(&self.pool, limit, offset).await
    }

    pub async fn create_snmp_community(&self, req: &CreateSnmpCommunityRequest) -> Result<SnmpCommunity> {
        services::SnmpCommunityRepo::create(&self.pool, req).await
    }

    pub async fn delete_snmp_community(&self, id: i64) -> Result<()> {
        services::SnmpCommunityRepo::delete(&self.pool, id).await
    }

    pub async fn list_snmp(&self, filter: &ListFilter) -> Result<Vec<Snmp>> {
        services::SnmpRepo::list(&self.pool, filter).await
    }

    pub async fn get_snmp(&self, id: i64) -> Result<Option<Snmp>> {
        services::SnmpRepo::get(&self.pool, id).await
    }

    pub async fn create_snmp(&self, req: &CreateSnmpRequest) -> Result<Snmp> {
        services::SnmpRepo::create(&self.pool, req).await
    }

    pub async fn delete_snmp(&self, id: i64) -> Result<()> {
        services::SnmpRepo::delete(&self.pool, id).await
    }

    // ========== Syslog Operations ==========

    pub async fn list_syslog_servers(&self, limit: i32, offset: i32) -> Result<Vec<SyslogServer>> {
        services::SyslogServerRepo::list(&self.pool, limit, offset).await
    }

    pub async fn create_syslog_server(&self, req: &CreateSyslogServerRequest) -> Result<SyslogServer> {
        services::SyslogServerRepo::create(&self.pool, req).await
    }

    pub async fn delete_syslog_server(&self, id: i64) -> Result<()> {
        services::SyslogServerRepo::delete(&self.pool, id).await
    }

    pub async fn list_syslog(&self, filter: &ListFilter) -> Result<Vec<Syslog>> {
        services::SyslogRepo::list(&self.pool, filter).await
    }

    pub async fn get_syslog(&self, id: i64) -> Result<Option<Syslog>> {
        services::SyslogRepo::get(&self.pool, id).await
    }

    pub async fn create_syslog(&self, req: &CreateSyslogRequest) -> Result<Syslog> {
        services::SyslogRepo::create(&self.pool, req).await
    }

    pub async fn delete_syslog(&self, id: i64) -> Result<()> {
        services::SyslogRepo::delete(&self.pool, id).await
    }

    // ========== TACACS Operations ==========

    pub async fn list_tacacs_servers(&self, limit: i32, offset: i32) -> Result<Vec<TacacsServer>> {
        services::TacacsServerRepo::list(&self.pool, limit, offset).await
    }

    pub async fn create_tacacs_server(&self, req: &CreateTacacsServerRequest) -> Result<TacacsServer> {
        services::TacacsServerRepo::create(&self.pool, req).await
    }

    pub async fn delete_tacacs_server(&self, id: i64) -> Result<()> {
        services::TacacsServerRepo::delete(&self.pool, id).await
    }

    pub async fn list_tacacs(&self, filter: &ListFilter) -> Result<Vec<Tacacs>> {
        services::TacacsRepo::list(&self.pool, filter).await
    }

    pub async fn get_tacacs(&self, id: i64) -> Result<Option<Tacacs>> {
        services::TacacsRepo::get(&self.pool, id).await
    }

    pub async fn create_tacacs(&self, req: &CreateTacacsRequest) -> Result<Tacacs> {
        services::TacacsRepo::create(&self.pool, req).await
    }

    pub async fn delete_tacacs(&self, id: i64) -> Result<()> {
        services::TacacsRepo::delete(&self.pool, id).await
    }

    // ========== VLAN / VRF Operations ==========

    pub async fn list_vlans(&self, limit: i32, offset: i32) -> Result<Vec<Vlan>> {
        vlans::VlanRepo::list(&self.pool, limit, offset).await
    }

    pub async fn create_vlan(&self, req: &CreateVlanRequest) -> Result<Vlan> {
        vlans::VlanRepo::create(&self.pool, req).await
    }

    pub async fn delete_vlan(&self, id: i64) -> Result<()> {
        vlans::VlanRepo::delete(&self.pool, id).await
    }

    pub async fn list_vrfs(&self, filter: &ListFilter) -> Result<Vec<Vrf>> {
        vlans::VrfRepo::list(&self.pool, filter).await
    }

    pub async fn create_vrf(&self, req: &CreateVrfRequest) -> Result<Vrf> {
        vlans::VrfRepo::create(&self.pool, req).await
    }

    pub async fn delete_vrf(&self, id: i64) -> Result<()> {
        vlans::VrfRepo::delete(&self.pool, id).await
    }

    // ========== Interface Operations ==========

    pub async fn list_device_interfaces(&self, filter: &ListFilter) -> Result<Vec<DeviceInterface>> {
        interfaces::DeviceInterfaceRepo::list(&self.pool, filter).await
    }

    pub async fn create_device_interface(&self, req: &CreateDeviceInterfaceRequest) -> Result<DeviceInterface> {
        interfaces::DeviceInterfaceRepo::create(&self.pool, req).await
    }

    pub async fn delete_device_interface(&self, id: i64) -> Result<()> {
        interfaces::DeviceInterfaceRepo::delete(&self.pool, id).await
    }

    pub async fn list_logical_interfaces(&self, filter: &ListFilter) -> Result<Vec<LogicalInterface>> {
        interfaces::LogicalInterfaceRepo::list(&self.pool, filter).await
    }

    pub async fn create_logical_interface(
        &self,
        req: &CreateLogicalInterfaceRequest,
    ) -> Result<LogicalInterface> {
        interfaces::LogicalInterfaceRepo::create(&self.pool, req).await
    }

    pub async fn delete_logical_interface(&self, id: i64) -> Result<()> {
        interfaces::LogicalInterfaceRepo::delete(&self.pool, id).await
    }

    // ========== Link Operations ==========

    pub async fn list_links(&self, filter: &ListFilter) -> Result<Vec<Link>> {
        interfaces::LinkRepo::list(&self.pool, filter).await
    }

    pub async fn get_link(&self, id: i64) -> Result<Option<Link>> {
        interfaces::LinkRepo::get(&self.pool, id).await
    }

    pub async fn create_link(&self, req: &LinkRequest) -> Result<Link> {
        interfaces::LinkRepo::create(&self.pool, req).await
    }

    pub async fn update_link(&self, id: i64, req: &LinkRequest) -> Result<Link> {
        interfaces::LinkRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_link(&self, id: i64) -> Result<()> {
        interfaces::LinkRepo::delete(&self.pool, id).await
    }
}
