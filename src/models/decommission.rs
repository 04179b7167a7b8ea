use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct DecommissionRequest {
    pub device_name: String,
}

/// Display names of everything removed by a decommission, per kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecommissionReport {
    pub bgp_sessions: Vec<String>,
    pub device_bgp_sessions: Vec<String>,
    pub bgp_peer_groups: Vec<String>,
    pub route_policies: Vec<String>,
    pub prefix_lists: Vec<String>,
    pub bgp_community_lists: Vec<String>,
    pub snmp: Vec<String>,
    pub syslog: Vec<String>,
    pub tacacs: Vec<String>,
}

impl DecommissionReport {
    pub fn total(&self) -> usize {
        self.bgp_sessions.len()
            + self.device_bgp_sessions.len()
            + self.bgp_peer_groups.len()
            + self.route_policies.len()
            + self.prefix_lists.len()
            + self.bgp_community_lists.len()
            + self.snmp.len()
            + self.syslog.len()
            + self.tacacs.len()
    }
}
