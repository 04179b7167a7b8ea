//! Columns that pin a device name or an IP address in place.
//!
//! Configuration objects refer to devices and addresses of the inventory.
//! Renaming a device or changing an address that is still referenced would
//! silently change the meaning of that configuration, so such changes are
//! refused while any registered column points at the object.

use anyhow::Result;
use sqlx::SqliteConnection;
use std::sync::OnceLock;

use crate::error::CmdbError;
use crate::reconcile::scope::RefTarget;

/// A `table.column` holding the id of a protected object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedColumn {
    /// Human name of the referencing object, used in the error message
    pub entity: &'static str,
    pub table: &'static str,
    pub column: &'static str,
}

impl ProtectedColumn {
    pub const fn new(entity: &'static str, table: &'static str, column: &'static str) -> Self {
        Self { entity, table, column }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtectRegistry {
    devices: Vec<ProtectedColumn>,
    ip_addresses: Vec<ProtectedColumn>,
    route_policies: Vec<ProtectedColumn>,
    prefix_lists: Vec<ProtectedColumn>,
    community_lists: Vec<ProtectedColumn>,
    peer_groups: Vec<ProtectedColumn>,
    vrfs: Vec<ProtectedColumn>,
}

static REGISTRY: OnceLock<ProtectRegistry> = OnceLock::new();

impl ProtectRegistry {
    /// Every device and IP address reference of the schema
    pub fn standard() -> Self {
        Self {
            devices: vec![
                ProtectedColumn::new("BGP global", "bgp_globals", "device_id"),
                ProtectedColumn::new("device BGP session", "device_bgp_sessions", "device_id"),
                ProtectedColumn::new("BGP peer group", "bgp_peer_groups", "device_id"),
                ProtectedColumn::new("route policy", "route_policies", "device_id"),
                ProtectedColumn::new("prefix list", "prefix_lists", "device_id"),
                ProtectedColumn::new("BGP community list", "bgp_community_lists", "device_id"),
                ProtectedColumn::new("VRF", "vrfs", "device_id"),
                ProtectedColumn::new("device interface", "device_interfaces", "device_id"),
                ProtectedColumn::new("SNMP", "snmp", "device_id"),
                ProtectedColumn::new("syslog", "syslog", "device_id"),
                ProtectedColumn::new("TACACS", "tacacs", "device_id"),
            ],
            ip_addresses: vec![
                ProtectedColumn::new("device BGP session", "device_bgp_sessions", "local_address_id"),
                ProtectedColumn::new("logical interface", "logical_interfaces", "ipv4_address_id"),
                ProtectedColumn::new("logical interface", "logical_interfaces", "ipv6_address_id"),
            ],
            route_policies: vec![
                ProtectedColumn::new("device BGP session", "device_bgp_sessions", "route_policy_in_id"),
                ProtectedColumn::new("device BGP session", "device_bgp_sessions", "route_policy_out_id"),
                ProtectedColumn::new("AFI/SAFI set", "afi_safis", "route_policy_in_id"),
                ProtectedColumn::new("AFI/SAFI set", "afi_safis", "route_policy_out_id"),
                ProtectedColumn::new("BGP peer group", "bgp_peer_groups", "route_policy_in_id"),
                ProtectedColumn::new("BGP peer group", "bgp_peer_groups", "route_policy_out_id"),
            ],
            prefix_lists: vec![ProtectedColumn::new(
                "route policy term",
                "route_policy_terms",
                "from_prefix_list_id",
            )],
            community_lists: vec![ProtectedColumn::new(
                "route policy term",
                "route_policy_terms",
                "from_bgp_community_list_id",
            )],
            peer_groups: vec![ProtectedColumn::new(
                "device BGP session",
                "device_bgp_sessions",
                "peer_group_id",
            )],
            vrfs: vec![ProtectedColumn::new("logical interface", "logical_interfaces", "vrf_id")],
        }
    }

    /// Register the process-wide registry. Only the first call has an effect.
    pub fn install(self) -> &'static ProtectRegistry {
        let installed = REGISTRY.get_or_init(|| self);
        tracing::debug!(
            "Protect registry: {} device columns, {} IP address columns",
            installed.devices.len(),
            installed.ip_addresses.len()
        );
        installed
    }

    pub fn devices(&self) -> &[ProtectedColumn] {
        &self.devices
    }

    pub fn ip_addresses(&self) -> &[ProtectedColumn] {
        &self.ip_addresses
    }

    /// Columns pointing at a device-scoped object of kind `target`
    pub fn referrers(&self, target: RefTarget) -> &[ProtectedColumn] {
        match target {
            RefTarget::RoutePolicy => &self.route_policies,
            RefTarget::PrefixList => &self.prefix_lists,
            RefTarget::BgpCommunityList => &self.community_lists,
            RefTarget::PeerGroup => &self.peer_groups,
            RefTarget::Vrf => &self.vrfs,
        }
    }
}

/// The installed registry, or the standard one when none was installed
pub fn registry() -> &'static ProtectRegistry {
    REGISTRY.get_or_init(ProtectRegistry::standard)
}

/// First registered column still referencing `id`
pub async fn first_reference(
    conn: &mut SqliteConnection,
    columns: &[ProtectedColumn],
    id: i64,
) -> Result<Option<&'static str>> {
    for col in columns {
        let found: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            col.table, col.column
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        if found.is_some() {
            return Ok(Some(col.entity));
        }
    }
    Ok(None)
}

/// Refuse a device rename while the device is referenced
pub async fn check_device_rename(
    conn: &mut SqliteConnection,
    device_id: i64,
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    if old_name == new_name {
        return Ok(());
    }
    if let Some(entity) = first_reference(conn, registry().devices(), device_id).await? {
        return Err(CmdbError::Protected {
            anchor: "Device name",
            entity,
        }
        .into());
    }
    Ok(())
}

/// Refuse an address change while the IP address is referenced. Only the
/// address itself counts; a new prefix length alone is allowed.
pub async fn check_address_change(
    conn: &mut SqliteConnection,
    address_id: i64,
    old_address: &str,
    new_address: &str,
) -> Result<()> {
    if host_part(old_address) == host_part(new_address) {
        return Ok(());
    }
    if let Some(entity) = first_reference(conn, registry().ip_addresses(), address_id).await? {
        return Err(CmdbError::Protected {
            anchor: "IP address",
            entity,
        }
        .into());
    }
    Ok(())
}

/// Refuse to move a device-scoped object to another device while other
/// objects point at it: they would be left referencing a foreign device.
pub async fn check_device_move(
    conn: &mut SqliteConnection,
    target: RefTarget,
    id: i64,
    new_device_id: i64,
) -> Result<()> {
    let current: Option<(i64,)> = sqlx::query_as(&format!("SELECT device_id FROM {} WHERE id = ?", target.table()))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match current {
        Some((device_id,)) if device_id != new_device_id => {}
        _ => return Ok(()),
    }
    if let Some(entity) = first_reference(conn, registry().referrers(target), id).await? {
        return Err(CmdbError::Protected {
            anchor: target.device_anchor(),
            entity,
        }
        .into());
    }
    Ok(())
}

fn host_part(address: &str) -> Option<std::net::IpAddr> {
    address
        .parse::<ipnetwork::IpNetwork>()
        .map(|net| net.ip())
        .ok()
        .or_else(|| address.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_part_ignores_mask() {
        assert_eq!(host_part("10.0.0.1/31"), host_part("10.0.0.1/24"));
        assert_ne!(host_part("10.0.0.1/31"), host_part("10.0.0.2/31"));
        assert_eq!(host_part("2001:db8::1"), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_standard_registry_covers_address_columns() {
        let registry = ProtectRegistry::standard();
        let columns: Vec<&str> = registry.ip_addresses().iter().map(|c| c.column).collect();
        assert!(columns.contains(&"local_address_id"));
        assert!(columns.contains(&"ipv4_address_id"));
        assert!(columns.contains(&"ipv6_address_id"));
        assert!(registry.devices().iter().any(|c| c.table == "route_policies"));
        assert!(registry
            .referrers(RefTarget::PrefixList)
            .iter()
            .any(|c| c.column == "from_prefix_list_id"));
    }
}
