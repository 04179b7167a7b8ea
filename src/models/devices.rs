use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device from the inventory. Configuration objects are scoped to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameDeviceRequest {
    pub name: String,
}

/// How a payload designates a device: `{"id": 1}` or `{"name": "router-1"}`.
/// In-process callers already holding a device pass it as `Resolved`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawDeviceRef")]
pub enum DeviceRef {
    ById(i64),
    ByName(String),
    Resolved(Device),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeviceRef {
    Id { id: i64 },
    Name { name: String },
}

impl From<RawDeviceRef> for DeviceRef {
    fn from(raw: RawDeviceRef) -> Self {
        match raw {
            RawDeviceRef::Id { id } => Self::ById(id),
            RawDeviceRef::Name { name } => Self::ByName(name),
        }
    }
}

impl From<Device> for DeviceRef {
    fn from(device: Device) -> Self {
        Self::Resolved(device)
    }
}

impl std::fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ById(id) => write!(f, "id {}", id),
            Self::ByName(name) => write!(f, "{}", name),
            Self::Resolved(device) => write!(f, "{}", device.name),
        }
    }
}

/// IP address from the inventory, in CIDR notation (`10.0.0.1/31`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: i64,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIpAddressRequest {
    pub address: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateIpAddressRequest {
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_ref_forms() {
        let by_id: DeviceRef = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(by_id, DeviceRef::ById(3));

        let by_name: DeviceRef = serde_json::from_str(r#"{"name": "router-test"}"#).unwrap();
        assert_eq!(by_name, DeviceRef::ByName("router-test".to_string()));

        assert!(serde_json::from_str::<DeviceRef>(r#"{"serial": "x"}"#).is_err());
    }
}
