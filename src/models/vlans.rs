use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceRef;

pub const VLAN_MIN_VID: u16 = 1;
pub const VLAN_MAX_VID: u16 = 4094;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vlan {
    pub id: i64,
    pub vid: u16,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVlanRequest {
    pub vid: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CreateVlanRequest {
    pub fn vid_in_range(&self) -> bool {
        (VLAN_MIN_VID..=VLAN_MAX_VID).contains(&self.vid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vrf {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVrfRequest {
    pub name: String,
    pub device: DeviceRef,
}
