use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{merge_field, Decision, DeviceRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpCommunityList {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub terms: Vec<BgpCommunityListTerm>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpCommunityListTerm {
    pub sequence: u32,
    pub decision: Decision,
    pub community: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BgpCommunityListTermInput {
    pub sequence: u32,
    #[serde(default)]
    pub decision: Option<Decision>,
    pub community: String,
}

impl BgpCommunityListTermInput {
    pub fn to_term(&self) -> BgpCommunityListTerm {
        BgpCommunityListTerm {
            sequence: self.sequence,
            decision: self.decision.unwrap_or_default(),
            community: self.community.clone(),
        }
    }

    pub fn apply(&self, term: &mut BgpCommunityListTerm) {
        merge_field(&mut term.decision, &self.decision);
        term.community = self.community.clone();
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BgpCommunityListRequest {
    pub name: String,
    pub device: DeviceRef,
    pub terms: Vec<BgpCommunityListTermInput>,
}
