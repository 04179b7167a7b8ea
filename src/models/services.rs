use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeviceRef, SnmpCommunityType};

// ========== SNMP ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpCommunity {
    pub id: i64,
    pub name: String,
    pub community: String,
    #[serde(rename = "type")]
    pub community_type: SnmpCommunityType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSnmpCommunityRequest {
    pub name: String,
    pub community: String,
    #[serde(rename = "type", default)]
    pub community_type: SnmpCommunityType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snmp {
    pub id: i64,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub location: String,
    pub contact: String,
    pub community_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSnmpRequest {
    pub device: DeviceRef,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub community_ids: Vec<i64>,
}

// ========== Syslog ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyslogServer {
    pub id: i64,
    pub server_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSyslogServerRequest {
    pub server_address: std::net::IpAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Syslog {
    pub id: i64,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub server_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSyslogRequest {
    pub device: DeviceRef,
    #[serde(default)]
    pub server_ids: Vec<i64>,
}

// ========== TACACS ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacacsServer {
    pub id: i64,
    pub server_address: String,
    pub priority: u32,
    pub tcp_port: u16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTacacsServerRequest {
    pub server_address: std::net::IpAddr,
    #[serde(default = "default_tacacs_priority")]
    pub priority: u32,
    #[serde(default = "default_tacacs_port")]
    pub tcp_port: u16,
}

fn default_tacacs_priority() -> u32 {
    1
}

fn default_tacacs_port() -> u16 {
    49
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tacacs {
    pub id: i64,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passkey: Option<String>,
    pub server_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTacacsRequest {
    pub device: DeviceRef,
    #[serde(default)]
    pub passkey: Option<String>,
    #[serde(default)]
    pub server_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tacacs_server_defaults() {
        let req: CreateTacacsServerRequest =
            serde_json::from_str(r#"{"server_address": "192.0.2.10"}"#).unwrap();
        assert_eq!(req.priority, 1);
        assert_eq!(req.tcp_port, 49);
    }

    #[test]
    fn test_snmp_community_type_field() {
        let req: CreateSnmpCommunityRequest =
            serde_json::from_str(r#"{"name": "monitoring", "community": "s3cret", "type": "rw"}"#)
                .unwrap();
        assert_eq!(req.community_type, SnmpCommunityType::Rw);
    }
}
