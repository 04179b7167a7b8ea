use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssetState, DeviceRef, MonitoringState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInterface {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub enabled: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceInterfaceRequest {
    pub name: String,
    pub device: DeviceRef,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// Sub-interface of a device interface, `parent.index`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalInterface {
    pub id: i64,
    pub parent_interface_id: i64,
    pub index: u16,
    pub enabled: bool,
    pub vrf_id: Option<i64>,
    pub ipv4_address_id: Option<i64>,
    pub ipv6_address_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogicalInterfaceRequest {
    pub parent_interface_id: i64,
    pub index: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub vrf_id: Option<i64>,
    #[serde(default)]
    pub ipv4_address_id: Option<i64>,
    #[serde(default)]
    pub ipv6_address_id: Option<i64>,
}

/// Cable between two device interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub interface_a_id: i64,
    pub interface_b_id: i64,
    // Enriched via JOIN (not stored)
    pub interface_a_name: String,
    pub device_a_name: String,
    pub interface_b_name: String,
    pub device_b_name: String,
    pub state: AssetState,
    pub monitoring_state: MonitoringState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    pub fn display(&self) -> String {
        format!(
            "{}:{} <--> {}:{}",
            self.device_a_name, self.interface_a_name, self.device_b_name, self.interface_b_name
        )
    }
}

/// LinkRequest for creating/updating a link. States left out default on
/// creation and keep their value on update.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub interface_a_id: i64,
    pub interface_b_id: i64,
    #[serde(default)]
    pub state: Option<AssetState>,
    #[serde(default)]
    pub monitoring_state: Option<MonitoringState>,
}

fn default_enabled() -> bool {
    true
}
