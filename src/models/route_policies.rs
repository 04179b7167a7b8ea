use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::{double_option, merge_field, Decision, DeviceRef, Origin, RouteType, SourceProtocol};

/// RoutePolicy is a named, device-scoped, ordered set of terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub terms: Vec<RoutePolicyTerm>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One term of a route policy, identified by its sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePolicyTerm {
    pub sequence: u32,
    pub decision: Decision,
    pub description: String,

    // match
    pub from_bgp_community: String,
    pub from_bgp_community_list_id: Option<i64>,
    pub from_prefix_list_id: Option<i64>,
    pub from_source_protocol: Option<SourceProtocol>,
    pub from_route_type: Option<RouteType>,
    pub from_local_pref: Option<i64>,

    // set
    pub set_local_pref: Option<i64>,
    pub set_community: String,
    pub set_origin: Option<Origin>,
    pub set_metric: Option<i64>,
    pub set_large_community: String,
    pub set_as_path_prepend_asn_id: Option<i64>,
    pub set_as_path_prepend_repeat: Option<u32>,
    pub set_next_hop: Option<IpAddr>,
}

impl RoutePolicyTerm {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            decision: Decision::default(),
            description: String::new(),
            from_bgp_community: String::new(),
            from_bgp_community_list_id: None,
            from_prefix_list_id: None,
            from_source_protocol: None,
            from_route_type: None,
            from_local_pref: None,
            set_local_pref: None,
            set_community: String::new(),
            set_origin: None,
            set_metric: None,
            set_large_community: String::new(),
            set_as_path_prepend_asn_id: None,
            set_as_path_prepend_repeat: None,
            set_next_hop: None,
        }
    }
}

/// Submitted term. Fields left out of the payload keep their stored value
/// when the term already exists; nullable fields accept `null` to clear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutePolicyTermInput {
    pub sequence: u32,
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub from_bgp_community: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_bgp_community_list_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_prefix_list_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_source_protocol: Option<Option<SourceProtocol>>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_route_type: Option<Option<RouteType>>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_local_pref: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_local_pref: Option<Option<i64>>,
    #[serde(default)]
    pub set_community: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_origin: Option<Option<Origin>>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_metric: Option<Option<i64>>,
    #[serde(default)]
    pub set_large_community: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_as_path_prepend_asn_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_as_path_prepend_repeat: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub set_next_hop: Option<Option<IpAddr>>,
}

impl RoutePolicyTermInput {
    /// Apply the submitted fields onto a term, leaving the others untouched
    pub fn apply(&self, term: &mut RoutePolicyTerm) {
        merge_field(&mut term.decision, &self.decision);
        merge_field(&mut term.description, &self.description);
        merge_field(&mut term.from_bgp_community, &self.from_bgp_community);
        merge_field(&mut term.from_bgp_community_list_id, &self.from_bgp_community_list_id);
        merge_field(&mut term.from_prefix_list_id, &self.from_prefix_list_id);
        merge_field(&mut term.from_source_protocol, &self.from_source_protocol);
        merge_field(&mut term.from_route_type, &self.from_route_type);
        merge_field(&mut term.from_local_pref, &self.from_local_pref);
        merge_field(&mut term.set_local_pref, &self.set_local_pref);
        merge_field(&mut term.set_community, &self.set_community);
        merge_field(&mut term.set_origin, &self.set_origin);
        merge_field(&mut term.set_metric, &self.set_metric);
        merge_field(&mut term.set_large_community, &self.set_large_community);
        merge_field(&mut term.set_as_path_prepend_asn_id, &self.set_as_path_prepend_asn_id);
        merge_field(&mut term.set_as_path_prepend_repeat, &self.set_as_path_prepend_repeat);
        merge_field(&mut term.set_next_hop, &self.set_next_hop);
    }
}

/// RoutePolicyRequest for creating/updating a route policy with its terms
#[derive(Debug, Clone, Deserialize)]
pub struct RoutePolicyRequest {
    pub name: String,
    pub device: DeviceRef,
    #[serde(default)]
    pub description: Option<String>,
    pub terms: Vec<RoutePolicyTermInput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unsent_fields() {
        let mut term = RoutePolicyTerm::new(10);
        term.decision = Decision::Deny;
        term.from_prefix_list_id = Some(4);
        term.set_community = "65000:1".to_string();

        let input: RoutePolicyTermInput = serde_json::from_str(
            r#"{"sequence": 10, "set_community": "65000:2", "from_prefix_list_id": null}"#,
        )
        .unwrap();
        input.apply(&mut term);

        assert_eq!(term.decision, Decision::Deny);
        assert_eq!(term.set_community, "65000:2");
        assert_eq!(term.from_prefix_list_id, None);
    }

    #[test]
    fn test_request_accepts_device_by_name() {
        let req: RoutePolicyRequest = serde_json::from_str(
            r#"{"name": "RM-TEST", "device": {"name": "router-test"},
                "terms": [{"sequence": 10, "decision": "permit", "set_origin": "igp",
                           "set_next_hop": "10.0.0.1"}]}"#,
        )
        .unwrap();
        assert_eq!(req.device, DeviceRef::ByName("router-test".to_string()));
        assert_eq!(req.terms[0].set_origin, Some(Some(Origin::Igp)));
        assert_eq!(
            req.terms[0].set_next_hop,
            Some(Some("10.0.0.1".parse().unwrap()))
        );
    }
}
