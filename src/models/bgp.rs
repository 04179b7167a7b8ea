use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::{double_option, merge_field, AfiSafiName, AssetState, DeviceRef, MonitoringState};

/// Lowest and highest valid 4-byte AS numbers
pub const BGP_MIN_ASN: u32 = 1;
pub const BGP_MAX_ASN: u32 = u32::MAX;

// ========== ASN ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asn {
    pub id: i64,
    pub number: u32,
    pub organization_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAsnRequest {
    pub number: u32,
    pub organization_name: String,
}

/// Allocate the lowest free AS number of `[min_asn, max_asn]`
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableAsnRequest {
    pub organization_name: String,
    pub min_asn: u32,
    pub max_asn: u32,
}

// ========== Device BGP session ==========

/// Address family enabled on one side of a BGP session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfiSafi {
    pub afi_safi_name: AfiSafiName,
    pub route_policy_in_id: Option<i64>,
    pub route_policy_out_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AfiSafiInput {
    pub afi_safi_name: AfiSafiName,
    #[serde(default, deserialize_with = "double_option")]
    pub route_policy_in_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub route_policy_out_id: Option<Option<i64>>,
}

impl AfiSafiInput {
    pub fn to_afi_safi(&self) -> AfiSafi {
        let mut afi_safi = AfiSafi {
            afi_safi_name: self.afi_safi_name,
            route_policy_in_id: None,
            route_policy_out_id: None,
        };
        self.apply(&mut afi_safi);
        afi_safi
    }

    pub fn apply(&self, afi_safi: &mut AfiSafi) {
        merge_field(&mut afi_safi.route_policy_in_id, &self.route_policy_in_id);
        merge_field(&mut afi_safi.route_policy_out_id, &self.route_policy_out_id);
    }
}

/// One side of a BGP session, as configured on its device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBgpSession {
    pub id: i64,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub local_address_id: i64,
    // Enriched via JOIN (not stored)
    pub local_address: String,
    pub local_asn_id: Option<i64>,
    pub description: String,
    pub enforce_first_as: bool,
    pub route_policy_in_id: Option<i64>,
    pub route_policy_out_id: Option<i64>,
    pub enabled: bool,
    pub peer_group_id: Option<i64>,
    pub maximum_prefixes: Option<u32>,
    pub afi_safis: Vec<AfiSafi>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Desired state of one side of a session. On update, fields left out keep
/// their stored value and `afi_safis: None` keeps the stored set.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceBgpSessionInput {
    pub device: DeviceRef,
    pub local_address_id: i64,
    #[serde(default, deserialize_with = "double_option")]
    pub local_asn_id: Option<Option<i64>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enforce_first_as: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub route_policy_in_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub route_policy_out_id: Option<Option<i64>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub peer_group_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub maximum_prefixes: Option<Option<u32>>,
    #[serde(default)]
    pub afi_safis: Option<Vec<AfiSafiInput>>,
}

/// Session-level fields of a device BGP session, resolved and merged,
/// ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBgpSessionFields {
    pub device_id: i64,
    pub local_address_id: i64,
    pub local_asn_id: Option<i64>,
    pub description: String,
    pub enforce_first_as: bool,
    pub route_policy_in_id: Option<i64>,
    pub route_policy_out_id: Option<i64>,
    pub enabled: bool,
    pub peer_group_id: Option<i64>,
    pub maximum_prefixes: Option<u32>,
}

impl DeviceBgpSessionFields {
    pub fn new(device_id: i64, input: &DeviceBgpSessionInput) -> Self {
        let mut fields = Self {
            device_id,
            local_address_id: input.local_address_id,
            local_asn_id: None,
            description: String::new(),
            enforce_first_as: true,
            route_policy_in_id: None,
            route_policy_out_id: None,
            enabled: true,
            peer_group_id: None,
            maximum_prefixes: None,
        };
        fields.apply(device_id, input);
        fields
    }

    pub fn from_session(session: &DeviceBgpSession) -> Self {
        Self {
            device_id: session.device_id,
            local_address_id: session.local_address_id,
            local_asn_id: session.local_asn_id,
            description: session.description.clone(),
            enforce_first_as: session.enforce_first_as,
            route_policy_in_id: session.route_policy_in_id,
            route_policy_out_id: session.route_policy_out_id,
            enabled: session.enabled,
            peer_group_id: session.peer_group_id,
            maximum_prefixes: session.maximum_prefixes,
        }
    }

    pub fn apply(&mut self, device_id: i64, input: &DeviceBgpSessionInput) {
        self.device_id = device_id;
        self.local_address_id = input.local_address_id;
        merge_field(&mut self.local_asn_id, &input.local_asn_id);
        merge_field(&mut self.description, &input.description);
        merge_field(&mut self.enforce_first_as, &input.enforce_first_as);
        merge_field(&mut self.route_policy_in_id, &input.route_policy_in_id);
        merge_field(&mut self.route_policy_out_id, &input.route_policy_out_id);
        merge_field(&mut self.enabled, &input.enabled);
        merge_field(&mut self.peer_group_id, &input.peer_group_id);
        merge_field(&mut self.maximum_prefixes, &input.maximum_prefixes);
    }
}

// ========== BGP session pair ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpSession {
    pub id: i64,
    pub peer_a: DeviceBgpSession,
    pub peer_b: DeviceBgpSession,
    pub state: AssetState,
    pub monitoring_state: MonitoringState,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BgpSession {
    /// Display name, `device_a:address_a <-> device_b:address_b`
    pub fn display(&self) -> String {
        format!(
            "{}:{} <-> {}:{}",
            self.peer_a.device_name,
            self.peer_a.local_address,
            self.peer_b.device_name,
            self.peer_b.local_address
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BgpSessionRequest {
    pub peer_a: DeviceBgpSessionInput,
    pub peer_b: DeviceBgpSessionInput,
    #[serde(default)]
    pub state: Option<AssetState>,
    #[serde(default)]
    pub monitoring_state: Option<MonitoringState>,
    #[serde(default)]
    pub password: Option<String>,
}

// ========== Peer groups ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpPeerGroup {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub description: String,
    pub local_asn_id: Option<i64>,
    pub remote_asn_id: Option<i64>,
    pub enforce_first_as: bool,
    pub route_policy_in_id: Option<i64>,
    pub route_policy_out_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BgpPeerGroupRequest {
    pub name: String,
    pub device: DeviceRef,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub local_asn_id: Option<i64>,
    #[serde(default)]
    pub remote_asn_id: Option<i64>,
    #[serde(default)]
    pub enforce_first_as: Option<bool>,
    #[serde(default)]
    pub route_policy_in_id: Option<i64>,
    #[serde(default)]
    pub route_policy_out_id: Option<i64>,
}

// ========== BGP global ==========

/// A prefix entry of a global AFI/SAFI (aggregate or redistributed network)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BgpPrefix {
    pub prefix: IpNetwork,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAfiSafi {
    pub afi_safi_name: AfiSafiName,
    pub aggregates: Vec<BgpPrefix>,
    pub redistributed_networks: Vec<BgpPrefix>,
}

/// `None` for a nested list keeps the stored entries, a list replaces them
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalAfiSafiInput {
    pub afi_safi_name: AfiSafiName,
    #[serde(default)]
    pub aggregates: Option<Vec<BgpPrefix>>,
    #[serde(default)]
    pub redistributed_networks: Option<Vec<BgpPrefix>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpGlobal {
    pub id: i64,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub local_asn_id: i64,
    pub router_id: String,
    pub ebgp_administrative_distance: Option<u32>,
    pub ibgp_administrative_distance: Option<u32>,
    pub graceful_restart: bool,
    pub graceful_restart_time: Option<u32>,
    pub ecmp: bool,
    pub ecmp_maximum_paths: u32,
    pub afi_safis: Vec<GlobalAfiSafi>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BgpGlobalRequest {
    pub device: DeviceRef,
    pub local_asn_id: i64,
    #[serde(default)]
    pub router_id: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub ebgp_administrative_distance: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ibgp_administrative_distance: Option<Option<u32>>,
    #[serde(default)]
    pub graceful_restart: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub graceful_restart_time: Option<Option<u32>>,
    #[serde(default)]
    pub ecmp: Option<bool>,
    #[serde(default)]
    pub ecmp_maximum_paths: Option<u32>,
    #[serde(default)]
    pub afi_safis: Option<Vec<GlobalAfiSafiInput>>,
}

/// Scalar fields of a BGP global, merged and ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct BgpGlobalFields {
    pub device_id: i64,
    pub local_asn_id: i64,
    pub router_id: String,
    pub ebgp_administrative_distance: Option<u32>,
    pub ibgp_administrative_distance: Option<u32>,
    pub graceful_restart: bool,
    pub graceful_restart_time: Option<u32>,
    pub ecmp: bool,
    pub ecmp_maximum_paths: u32,
}

impl BgpGlobalFields {
    pub fn new(device_id: i64, req: &BgpGlobalRequest) -> Self {
        let mut fields = Self {
            device_id,
            local_asn_id: req.local_asn_id,
            router_id: String::new(),
            ebgp_administrative_distance: None,
            ibgp_administrative_distance: None,
            graceful_restart: false,
            graceful_restart_time: None,
            ecmp: true,
            ecmp_maximum_paths: 32,
        };
        fields.apply(device_id, req);
        fields
    }

    pub fn from_global(global: &BgpGlobal) -> Self {
        Self {
            device_id: global.device_id,
            local_asn_id: global.local_asn_id,
            router_id: global.router_id.clone(),
            ebgp_administrative_distance: global.ebgp_administrative_distance,
            ibgp_administrative_distance: global.ibgp_administrative_distance,
            graceful_restart: global.graceful_restart,
            graceful_restart_time: global.graceful_restart_time,
            ecmp: global.ecmp,
            ecmp_maximum_paths: global.ecmp_maximum_paths,
        }
    }

    pub fn apply(&mut self, device_id: i64, req: &BgpGlobalRequest) {
        self.device_id = device_id;
        self.local_asn_id = req.local_asn_id;
        merge_field(&mut self.router_id, &req.router_id);
        merge_field(&mut self.ebgp_administrative_distance, &req.ebgp_administrative_distance);
        merge_field(&mut self.ibgp_administrative_distance, &req.ibgp_administrative_distance);
        merge_field(&mut self.graceful_restart, &req.graceful_restart);
        merge_field(&mut self.graceful_restart_time, &req.graceful_restart_time);
        merge_field(&mut self.ecmp, &req.ecmp);
        merge_field(&mut self.ecmp_maximum_paths, &req.ecmp_maximum_paths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_input(json: &str) -> DeviceBgpSessionInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_session_fields_defaults() {
        let input = session_input(r#"{"device": {"id": 1}, "local_address_id": 7}"#);
        let fields = DeviceBgpSessionFields::new(1, &input);
        assert!(fields.enabled);
        assert!(fields.enforce_first_as);
        assert_eq!(fields.local_address_id, 7);
        assert!(input.afi_safis.is_none());
    }

    #[test]
    fn test_session_fields_partial_update() {
        let create = session_input(
            r#"{"device": {"id": 1}, "local_address_id": 7, "description": "to spine",
                "maximum_prefixes": 1000, "route_policy_in_id": 3}"#,
        );
        let mut fields = DeviceBgpSessionFields::new(1, &create);

        let update = session_input(
            r#"{"device": {"id": 1}, "local_address_id": 7, "maximum_prefixes": null}"#,
        );
        fields.apply(1, &update);

        assert_eq!(fields.description, "to spine");
        assert_eq!(fields.route_policy_in_id, Some(3));
        assert_eq!(fields.maximum_prefixes, None);
    }

    #[test]
    fn test_global_afi_safi_nested_lists() {
        let input: GlobalAfiSafiInput = serde_json::from_str(
            r#"{"afi_safi_name": "ipv4-unicast", "aggregates": [{"prefix": "10.0.0.0/8"}]}"#,
        )
        .unwrap();
        assert_eq!(input.aggregates.as_ref().map(Vec::len), Some(1));
        assert!(input.redistributed_networks.is_none());
    }
}
