//! Device-scope validation of cross-references.
//!
//! A configuration object may only point to objects configured on the same
//! device: a route policy term on router A cannot match a prefix list of
//! router B. References are resolved to their owning device first, then
//! checked all at once so that every offending field is reported.

use anyhow::Result;
use sqlx::{Row, SqliteConnection};

use crate::error::FieldError;

/// Kinds of device-scoped objects a term can point to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    RoutePolicy,
    PrefixList,
    BgpCommunityList,
    PeerGroup,
    Vrf,
}

impl RefTarget {
    pub fn table(&self) -> &'static str {
        match self {
            Self::RoutePolicy => "route_policies",
            Self::PrefixList => "prefix_lists",
            Self::BgpCommunityList => "bgp_community_lists",
            Self::PeerGroup => "bgp_peer_groups",
            Self::Vrf => "vrfs",
        }
    }

    /// Name of the device field of such an object, in error messages
    pub fn device_anchor(&self) -> &'static str {
        match self {
            Self::RoutePolicy => "Route policy device",
            Self::PrefixList => "Prefix list device",
            Self::BgpCommunityList => "BGP community list device",
            Self::PeerGroup => "BGP peer group device",
            Self::Vrf => "VRF device",
        }
    }
}

/// A named reference field and the id it holds, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRef {
    pub field: &'static str,
    pub target: RefTarget,
    pub id: Option<i64>,
}

impl CrossRef {
    pub fn new(field: &'static str, target: RefTarget, id: Option<i64>) -> Self {
        Self { field, target, id }
    }
}

/// A non-null reference with its owning device. `owner` is `None` when the
/// referenced object does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub field: &'static str,
    pub id: i64,
    pub owner: Option<i64>,
}

/// Look up the owning device of every non-null reference
pub async fn resolve(conn: &mut SqliteConnection, refs: &[CrossRef]) -> Result<Vec<ResolvedRef>> {
    let mut resolved = Vec::with_capacity(refs.len());
    for r in refs {
        let Some(id) = r.id else { continue };
        let row = sqlx::query(&format!("SELECT device_id FROM {} WHERE id = ?", r.target.table()))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        resolved.push(ResolvedRef {
            field: r.field,
            id,
            owner: row.map(|row| row.get::<i64, _>("device_id")),
        });
    }
    Ok(resolved)
}

/// Check that every resolved reference belongs to `expected_device`.
/// Returns one error per offending field, in input order.
pub fn validate_cross_references(
    expected_device: i64,
    refs: &[ResolvedRef],
) -> Result<(), Vec<FieldError>> {
    let errors: Vec<FieldError> = refs
        .iter()
        .filter_map(|r| match r.owner {
            None => Some(FieldError::unknown_reference(r.field, r.id)),
            Some(owner) if owner != expected_device => Some(FieldError::device_mismatch(r.field)),
            Some(_) => None,
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Resolve and validate in one go, for objects that are not term
/// collections (session endpoints, peer groups, logical interfaces)
pub async fn check_device_scope(
    conn: &mut SqliteConnection,
    expected_device: i64,
    refs: &[CrossRef],
) -> Result<Vec<FieldError>> {
    let resolved = resolve(conn, refs).await?;
    Ok(validate_cross_references(expected_device, &resolved)
        .err()
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldErrorKind;

    fn owned(field: &'static str, owner: i64) -> ResolvedRef {
        ResolvedRef {
            field,
            id: 100,
            owner: Some(owner),
        }
    }

    #[test]
    fn test_all_on_same_device() {
        let refs = vec![owned("from_prefix_list", 1), owned("from_bgp_community_list", 1)];
        assert!(validate_cross_references(1, &refs).is_ok());
        assert!(validate_cross_references(1, &[]).is_ok());
    }

    #[test]
    fn test_collects_every_mismatch() {
        let refs = vec![
            owned("route_policy_in", 2),
            owned("route_policy_out", 1),
            owned("peer_group", 3),
        ];
        let errors = validate_cross_references(1, &refs).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["route_policy_in", "peer_group"]);
        assert!(errors.iter().all(|e| e.kind == FieldErrorKind::DeviceMismatch));
        assert_eq!(errors[0].to_string(), "route_policy_in is not on the same device");
    }

    #[test]
    fn test_unknown_reference() {
        let refs = vec![ResolvedRef {
            field: "from_prefix_list",
            id: 42,
            owner: None,
        }];
        let errors = validate_cross_references(1, &refs).unwrap_err();
        assert_eq!(errors[0].kind, FieldErrorKind::UnknownReference { id: 42 });
    }
}
