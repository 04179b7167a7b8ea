use serde::{Deserialize, Serialize};

/// Permit/deny decision shared by route policy, prefix list and
/// community list terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Permit,
    Deny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AssetState {
    Production,
    Maintenance,
    #[default]
    Staging,
    OutOfService,
}

/// Monitoring state of an asset, independent of its state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MonitoringState {
    Critical,
    Warning,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum AfiSafiName {
    #[serde(rename = "ipv4-unicast")]
    #[sqlx(rename = "ipv4-unicast")]
    Ipv4Unicast,
    #[serde(rename = "ipv6-unicast")]
    #[sqlx(rename = "ipv6-unicast")]
    Ipv6Unicast,
    #[serde(rename = "l2vpn-evpn")]
    #[sqlx(rename = "l2vpn-evpn")]
    L2vpnEvpn,
    #[serde(rename = "ipv4-flowspec")]
    #[sqlx(rename = "ipv4-flowspec")]
    Ipv4Flowspec,
}

impl AfiSafiName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipv4Unicast => "ipv4-unicast",
            Self::Ipv6Unicast => "ipv6-unicast",
            Self::L2vpnEvpn => "l2vpn-evpn",
            Self::Ipv4Flowspec => "ipv4-flowspec",
        }
    }
}

impl std::fmt::Display for AfiSafiName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Ipv4,
    Ipv6,
}

impl IpVersion {
    pub fn max_prefix_len(&self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::Ipv4 => 4,
            Self::Ipv6 => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SourceProtocol {
    Bgp,
    Isis,
    Static,
    Connected,
    Ospf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RouteType {
    Ibgp,
    Ebgp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Origin {
    Igp,
    Egp,
    Incomplete,
}

/// SNMP community string permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SnmpCommunityType {
    #[default]
    Ro,
    Rw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_afi_safi_wire_names() {
        let parsed: AfiSafiName = serde_json::from_str("\"l2vpn-evpn\"").unwrap();
        assert_eq!(parsed, AfiSafiName::L2vpnEvpn);
        assert_eq!(
            serde_json::to_string(&AfiSafiName::Ipv4Flowspec).unwrap(),
            "\"ipv4-flowspec\""
        );
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Decision::default(), Decision::Permit);
        assert_eq!(AssetState::default(), AssetState::Staging);
        assert_eq!(MonitoringState::default(), MonitoringState::Disabled);
        assert_eq!(
            serde_json::to_string(&AssetState::OutOfService).unwrap(),
            "\"out_of_service\""
        );
    }
}
