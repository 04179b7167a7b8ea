use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::models::*;
use crate::protect;
use crate::reconcile::scope::{CrossRef, RefTarget};
use crate::reconcile::{self, ParentScope, Stored, TermCollection};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, get_optional_ip, none_if_empty, LIST_FILTER_WHERE};

const SELECT_ROUTE_POLICY: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM route_policies o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_term_row(row: &SqliteRow) -> Result<Stored<RoutePolicyTerm>> {
    Ok(Stored {
        id: row.get("id"),
        term: RoutePolicyTerm {
            sequence: row.get("sequence"),
            decision: row.get("decision"),
            description: row.get("description"),
            from_bgp_community: row.get("from_bgp_community"),
            from_bgp_community_list_id: row.get("from_bgp_community_list_id"),
            from_prefix_list_id: row.get("from_prefix_list_id"),
            from_source_protocol: row.get("from_source_protocol"),
            from_route_type: row.get("from_route_type"),
            from_local_pref: row.get("from_local_pref"),
            set_local_pref: row.get("set_local_pref"),
            set_community: row.get("set_community"),
            set_origin: row.get("set_origin"),
            set_metric: row.get("set_metric"),
            set_large_community: row.get("set_large_community"),
            set_as_path_prepend_asn_id: row.get("set_as_path_prepend_asn_id"),
            set_as_path_prepend_repeat: row.get("set_as_path_prepend_repeat"),
            set_next_hop: get_optional_ip(row, "set_next_hop")?,
        },
    })
}

/// Route policy terms, keyed by sequence
pub struct RoutePolicyTerms;

#[async_trait]
impl TermCollection for RoutePolicyTerms {
    type Key = u32;
    type Term = RoutePolicyTerm;
    type Desired = RoutePolicyTermInput;
    type Parent = ParentScope;

    const LABEL: &'static str = "route policy";

    fn scope(parent: &ParentScope) -> ParentScope {
        *parent
    }

    fn term_key(term: &RoutePolicyTerm) -> u32 {
        term.sequence
    }

    fn desired_key(desired: &RoutePolicyTermInput) -> u32 {
        desired.sequence
    }

    fn create(desired: &RoutePolicyTermInput) -> RoutePolicyTerm {
        let mut term = RoutePolicyTerm::new(desired.sequence);
        desired.apply(&mut term);
        term
    }

    fn merge(desired: &RoutePolicyTermInput, term: &mut RoutePolicyTerm) {
        desired.apply(term);
    }

    fn cross_references(term: &RoutePolicyTerm) -> Vec<CrossRef> {
        vec![
            CrossRef::new("from_prefix_list", RefTarget::PrefixList, term.from_prefix_list_id),
            CrossRef::new(
                "from_bgp_community_list",
                RefTarget::BgpCommunityList,
                term.from_bgp_community_list_id,
            ),
        ]
    }

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<RoutePolicyTerm>>> {
        let rows = sqlx::query("SELECT * FROM route_policy_terms WHERE route_policy_id = ? ORDER BY sequence")
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(map_term_row).collect()
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &RoutePolicyTerm) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO route_policy_terms (
                route_policy_id, sequence, decision, description,
                from_bgp_community, from_bgp_community_list_id, from_prefix_list_id,
                from_source_protocol, from_route_type, from_local_pref,
                set_local_pref, set_community, set_origin, set_metric, set_large_community,
                set_as_path_prepend_asn_id, set_as_path_prepend_repeat, set_next_hop,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(parent_id)
        .bind(term.sequence)
        .bind(term.decision)
        .bind(&term.description)
        .bind(&term.from_bgp_community)
        .bind(term.from_bgp_community_list_id)
        .bind(term.from_prefix_list_id)
        .bind(term.from_source_protocol)
        .bind(term.from_route_type)
        .bind(term.from_local_pref)
        .bind(term.set_local_pref)
        .bind(&term.set_community)
        .bind(term.set_origin)
        .bind(term.set_metric)
        .bind(&term.set_large_community)
        .bind(term.set_as_path_prepend_asn_id)
        .bind(term.set_as_path_prepend_repeat)
        .bind(term.set_next_hop.map(|ip| ip.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, term: &RoutePolicyTerm) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE route_policy_terms SET
                decision = ?, description = ?,
                from_bgp_community = ?, from_bgp_community_list_id = ?, from_prefix_list_id = ?,
                from_source_protocol = ?, from_route_type = ?, from_local_pref = ?,
                set_local_pref = ?, set_community = ?, set_origin = ?, set_metric = ?,
                set_large_community = ?, set_as_path_prepend_asn_id = ?,
                set_as_path_prepend_repeat = ?, set_next_hop = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(term.decision)
        .bind(&term.description)
        .bind(&term.from_bgp_community)
        .bind(term.from_bgp_community_list_id)
        .bind(term.from_prefix_list_id)
        .bind(term.from_source_protocol)
        .bind(term.from_route_type)
        .bind(term.from_local_pref)
        .bind(term.set_local_pref)
        .bind(&term.set_community)
        .bind(term.set_origin)
        .bind(term.set_metric)
        .bind(&term.set_large_community)
        .bind(term.set_as_path_prepend_asn_id)
        .bind(term.set_as_path_prepend_repeat)
        .bind(term.set_next_hop.map(|ip| ip.to_string()))
        .bind(Utc::now())
        .bind(row_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM route_policy_terms WHERE id = ?")
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Route policy database operations
pub struct RoutePolicyRepo;

impl RoutePolicyRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<RoutePolicy>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_ROUTE_POLICY, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;

        let mut conn = pool.acquire().await?;
        let mut policies = Vec::with_capacity(rows.len());
        for row in &rows {
            policies.push(Self::with_terms(&mut conn, row).await?);
        }
        Ok(policies)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<RoutePolicy>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    pub(crate) async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<RoutePolicy>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_ROUTE_POLICY))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_terms(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_terms(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<RoutePolicy> {
        let id: i64 = row.get("id");
        let terms = RoutePolicyTerms::load(conn, id).await?;
        Ok(RoutePolicy {
            id,
            name: row.get("name"),
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            description: none_if_empty(row.get("description")),
            terms: terms.into_iter().map(|s| s.term).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Create a route policy together with its terms
    pub async fn create(pool: &Pool<Sqlite>, req: &RoutePolicyRequest) -> Result<RoutePolicy> {
        reconcile::check_submission::<RoutePolicyTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO route_policies (device_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let scope = ParentScope { id, device_id: device.id };
        reconcile::reconcile::<RoutePolicyTerms>(&mut tx, &scope, &req.terms).await?;

        let policy = Self::get_with(&mut tx, id)
            .await?
            .context("Route policy not found after creation")?;
        tx.commit().await?;
        Ok(policy)
    }

    /// Update a route policy and reconcile its terms with the submitted list
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &RoutePolicyRequest) -> Result<RoutePolicy> {
        reconcile::check_submission::<RoutePolicyTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM route_policies WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(super::NotFoundError::new("Route policy", &id.to_string()).into());
        }
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        protect::check_device_move(&mut tx, RefTarget::RoutePolicy, id, device.id).await?;

        let mut update = sqlx::QueryBuilder::<Sqlite>::new("UPDATE route_policies SET name = ");
        update.push_bind(&req.name);
        update.push(", device_id = ").push_bind(device.id);
        if let Some(description) = &req.description {
            update.push(", description = ").push_bind(description);
        }
        update.push(", updated_at = ").push_bind(Utc::now());
        update.push(" WHERE id = ").push_bind(id);
        update.build().execute(&mut *tx).await?;

        let scope = ParentScope { id, device_id: device.id };
        reconcile::reconcile::<RoutePolicyTerms>(&mut tx, &scope, &req.terms).await?;

        let policy = Self::get_with(&mut tx, id)
            .await?
            .context("Route policy not found after update")?;
        tx.commit().await?;
        Ok(policy)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM route_policies WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Route policy", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::db::Store;
    use crate::error::{CmdbError, FieldErrorKind};

    async fn prefix_list(store: &Store, device: &str, name: &str) -> PrefixList {
        let req: PrefixListRequest = serde_json::from_str(&format!(
            r#"{{"name": "{}", "device": {{"name": "{}"}},
                "terms": [{{"sequence": 10, "prefix": "10.0.0.0/8"}}]}}"#,
            name, device
        ))
        .unwrap();
        store.create_prefix_list(&req).await.unwrap()
    }

    fn policy(device: &str, terms: serde_json::Value) -> RoutePolicyRequest {
        serde_json::from_value(serde_json::json!({
            "name": "RM-TEST",
            "device": {"name": device},
            "description": "test policy",
            "terms": terms,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_cross_device_reference_rejects_whole_submission() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let local = prefix_list(&store, "router-a", "PL-LOCAL").await;
        let remote = prefix_list(&store, "router-b", "PL-REMOTE").await;

        let created = store
            .create_route_policy(&policy(
                "router-a",
                serde_json::json!([{"sequence": 10, "from_prefix_list_id": local.id}]),
            ))
            .await
            .unwrap();

        let err = store
            .update_route_policy(
                created.id,
                &policy(
                    "router-a",
                    serde_json::json!([
                        {"sequence": 10, "from_prefix_list_id": local.id, "set_local_pref": 200},
                        {"sequence": 20, "from_prefix_list_id": remote.id},
                        {"sequence": 30, "from_bgp_community_list_id": 9999},
                    ]),
                ),
            )
            .await
            .unwrap_err();

        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "from_prefix_list");
                assert_eq!(errors[0].kind, FieldErrorKind::DeviceMismatch);
                assert_eq!(errors[1].kind, FieldErrorKind::UnknownReference { id: 9999 });
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        // nothing was written, not even the valid first term
        let stored = store.get_route_policy(created.id).await.unwrap().unwrap();
        assert_eq!(stored.terms.len(), 1);
        assert_eq!(stored.terms[0].set_local_pref, None);
    }

    #[tokio::test]
    async fn test_partial_term_update_keeps_other_fields() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        let local = prefix_list(&store, "router-a", "PL-LOCAL").await;

        let created = store
            .create_route_policy(&policy(
                "router-a",
                serde_json::json!([{
                    "sequence": 10,
                    "decision": "deny",
                    "from_prefix_list_id": local.id,
                    "set_community": "65000:1",
                    "set_next_hop": "192.0.2.1",
                }]),
            ))
            .await
            .unwrap();

        let updated = store
            .update_route_policy(
                created.id,
                &policy("router-a", serde_json::json!([{"sequence": 10, "set_metric": 50}])),
            )
            .await
            .unwrap();

        let term = &updated.terms[0];
        assert_eq!(term.decision, Decision::Deny);
        assert_eq!(term.from_prefix_list_id, Some(local.id));
        assert_eq!(term.set_community, "65000:1");
        assert_eq!(term.set_metric, Some(50));
        assert_eq!(term.set_next_hop, Some("192.0.2.1".parse().unwrap()));
        assert_eq!(updated.description.as_deref(), Some("test policy"));
    }

    #[tokio::test]
    async fn test_referenced_prefix_list_cannot_be_deleted() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        let local = prefix_list(&store, "router-a", "PL-LOCAL").await;
        store
            .create_route_policy(&policy(
                "router-a",
                serde_json::json!([{"sequence": 10, "from_prefix_list_id": local.id}]),
            ))
            .await
            .unwrap();

        assert!(store.delete_prefix_list(local.id).await.is_err());
    }
}
