mod bgp;
mod choices;
mod community_lists;
mod decommission;
mod devices;
mod interfaces;
mod prefix_lists;
mod route_policies;
mod services;
mod vlans;

pub use bgp::*;
pub use choices::*;
pub use community_lists::*;
pub use decommission::*;
pub use devices::*;
pub use interfaces::*;
pub use prefix_lists::*;
pub use route_policies::*;
pub use services::*;
pub use vlans::*;

use serde::{Deserialize, Deserializer};

/// Deserialize a field that distinguishes "absent" from "explicit null".
///
/// Used with `#[serde(default, deserialize_with = "double_option")]` on an
/// `Option<Option<T>>`: a missing key stays `None`, `null` becomes
/// `Some(None)` and a value becomes `Some(Some(v))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Apply a submitted value to a stored one, keeping the stored value when
/// the field was not part of the submission.
pub fn merge_field<T: Clone>(slot: &mut T, submitted: &Option<T>) {
    if let Some(value) = submitted {
        *slot = value.clone();
    }
}

/// Filters accepted by list endpoints of device-scoped objects
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub device_id: Option<i64>,
    pub device_name: Option<String>,
    pub name: Option<String>,
    pub limit: i32,
    pub offset: i32,
}
