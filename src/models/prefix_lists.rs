use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::{double_option, merge_field, Decision, DeviceRef, IpVersion};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixList {
    pub id: i64,
    pub name: String,
    pub device_id: i64,
    // Enriched via JOIN (not stored)
    pub device_name: String,
    pub ip_version: IpVersion,
    pub terms: Vec<PrefixListTerm>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixListTerm {
    pub sequence: u32,
    pub decision: Decision,
    pub prefix: IpNetwork,
    pub le: Option<u8>,
    pub ge: Option<u8>,
}

impl PrefixListTerm {
    /// Check the term against the prefix list's IP version: the prefix must
    /// be of that version, `ge`/`le` must be longer than the prefix mask and
    /// not exceed the maximum length, and `le` may not be lower than `ge`.
    pub fn check(&self, ip_version: IpVersion) -> Vec<(&'static str, String)> {
        let mut problems = Vec::new();
        let max_len = ip_version.max_prefix_len();
        let mask_len = self.prefix.prefix();

        let prefix_version = if self.prefix.is_ipv4() { 4 } else { 6 };
        if prefix_version != ip_version.number() {
            problems.push((
                "prefix",
                format!(
                    "Invalid IP prefix, IP version mismatch: IPv{} instead of IPv{}",
                    prefix_version,
                    ip_version.number()
                ),
            ));
            return problems;
        }

        let valid_len = |len: u8| len > mask_len && len <= max_len;
        if let Some(ge) = self.ge {
            if !valid_len(ge) {
                problems.push(("ge", "Invalid ge value".to_string()));
            }
        }
        if let Some(le) = self.le {
            if !valid_len(le) {
                problems.push(("le", "Invalid le value".to_string()));
            }
        }
        if let (Some(le), Some(ge)) = (self.le, self.ge) {
            if le < ge {
                problems.push((
                    "le",
                    "Invalid values for le and ge, le should be lower than ge".to_string(),
                ));
            }
        }
        problems
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefixListTermInput {
    pub sequence: u32,
    #[serde(default)]
    pub decision: Option<Decision>,
    pub prefix: IpNetwork,
    #[serde(default, deserialize_with = "double_option")]
    pub le: Option<Option<u8>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ge: Option<Option<u8>>,
}

impl PrefixListTermInput {
    pub fn to_term(&self) -> PrefixListTerm {
        let mut term = PrefixListTerm {
            sequence: self.sequence,
            decision: Decision::default(),
            prefix: self.prefix,
            le: None,
            ge: None,
        };
        self.apply(&mut term);
        term
    }

    pub fn apply(&self, term: &mut PrefixListTerm) {
        term.prefix = self.prefix;
        merge_field(&mut term.decision, &self.decision);
        merge_field(&mut term.le, &self.le);
        merge_field(&mut term.ge, &self.ge);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefixListRequest {
    pub name: String,
    pub device: DeviceRef,
    #[serde(default)]
    pub ip_version: IpVersion,
    pub terms: Vec<PrefixListTermInput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(prefix: &str, ge: Option<u8>, le: Option<u8>) -> PrefixListTerm {
        PrefixListTerm {
            sequence: 5,
            decision: Decision::Permit,
            prefix: prefix.parse().unwrap(),
            le,
            ge,
        }
    }

    #[test]
    fn test_valid_terms() {
        assert!(term("10.0.0.0/8", None, None).check(IpVersion::Ipv4).is_empty());
        assert!(term("10.0.0.0/8", Some(16), Some(24)).check(IpVersion::Ipv4).is_empty());
        assert!(term("2001:db8::/32", Some(48), Some(64)).check(IpVersion::Ipv6).is_empty());
    }

    #[test]
    fn test_version_mismatch() {
        let problems = term("2001:db8::/32", None, None).check(IpVersion::Ipv4);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, "prefix");
        assert!(problems[0].1.contains("IPv6 instead of IPv4"));
    }

    #[test]
    fn test_mask_len_operators() {
        // ge not longer than the prefix mask
        assert_eq!(term("10.0.0.0/8", Some(8), None).check(IpVersion::Ipv4)[0].0, "ge");
        // le beyond the IPv4 maximum
        assert_eq!(term("10.0.0.0/8", None, Some(33)).check(IpVersion::Ipv4)[0].0, "le");
        // le lower than ge
        let problems = term("10.0.0.0/8", Some(24), Some(16)).check(IpVersion::Ipv4);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].1.contains("le should be lower than ge"));
    }

    #[test]
    fn test_apply_keeps_unsent_bounds() {
        let mut stored = term("10.0.0.0/8", Some(16), Some(24));
        let input: PrefixListTermInput =
            serde_json::from_str(r#"{"sequence": 5, "prefix": "10.0.0.0/8", "le": null}"#).unwrap();
        input.apply(&mut stored);
        assert_eq!(stored.ge, Some(16));
        assert_eq!(stored.le, None);
    }
}
