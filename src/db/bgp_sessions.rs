use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::error::{CmdbError, FieldError};
use crate::models::*;
use crate::reconcile::guard::{self, EndpointPair, SessionEndpoint};
use crate::reconcile::scope::{self, CrossRef, RefTarget};
use crate::reconcile::{self, ParentScope, Stored, TermCollection};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_device_filter, DEVICE_FILTER_WHERE};

const SELECT_DEVICE_BGP_SESSION: &str = r#"
    SELECT o.*, d.name AS device_name, ip.address AS local_address
    FROM device_bgp_sessions o
    JOIN devices d ON o.device_id = d.id
    JOIN ip_addresses ip ON o.local_address_id = ip.id
"#;

const SELECT_BGP_SESSION: &str = r#"
    SELECT s.*
    FROM bgp_sessions s
    JOIN device_bgp_sessions pa ON s.peer_a_id = pa.id
    JOIN device_bgp_sessions pb ON s.peer_b_id = pb.id
    JOIN devices da ON pa.device_id = da.id
    JOIN devices db ON pb.device_id = db.id
"#;

/// Address families of one device BGP session, keyed by AFI/SAFI name
pub struct AfiSafiTerms;

#[async_trait]
impl TermCollection for AfiSafiTerms {
    type Key = AfiSafiName;
    type Term = AfiSafi;
    type Desired = AfiSafiInput;
    type Parent = ParentScope;

    const LABEL: &'static str = "AFI/SAFI set";
    const ALLOW_EMPTY: bool = true;

    fn scope(parent: &ParentScope) -> ParentScope {
        *parent
    }

    fn term_key(term: &AfiSafi) -> AfiSafiName {
        term.afi_safi_name
    }

    fn desired_key(desired: &AfiSafiInput) -> AfiSafiName {
        desired.afi_safi_name
    }

    fn create(desired: &AfiSafiInput) -> AfiSafi {
        desired.to_afi_safi()
    }

    fn merge(desired: &AfiSafiInput, term: &mut AfiSafi) {
        desired.apply(term);
    }

    fn cross_references(term: &AfiSafi) -> Vec<CrossRef> {
        vec![
            CrossRef::new("route_policy_in", RefTarget::RoutePolicy, term.route_policy_in_id),
            CrossRef::new("route_policy_out", RefTarget::RoutePolicy, term.route_policy_out_id),
        ]
    }

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<AfiSafi>>> {
        let rows = sqlx::query(
            "SELECT * FROM afi_safis WHERE device_bgp_session_id = ? ORDER BY afi_safi_name",
        )
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .iter()
            .map(|row| Stored {
                id: row.get("id"),
                term: AfiSafi {
                    afi_safi_name: row.get("afi_safi_name"),
                    route_policy_in_id: row.get("route_policy_in_id"),
                    route_policy_out_id: row.get("route_policy_out_id"),
                },
            })
            .collect())
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &AfiSafi) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO afi_safis (
                device_bgp_session_id, afi_safi_name, route_policy_in_id, route_policy_out_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(parent_id)
        .bind(term.afi_safi_name)
        .bind(term.route_policy_in_id)
        .bind(term.route_policy_out_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, term: &AfiSafi) -> Result<()> {
        sqlx::query(
            "UPDATE afi_safis SET route_policy_in_id = ?, route_policy_out_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(term.route_policy_in_id)
        .bind(term.route_policy_out_id)
        .bind(Utc::now())
        .bind(row_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM afi_safis WHERE id = ?")
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Device BGP session database operations. Device sessions are written
/// through their session pair, never on their own.
pub struct DeviceBgpSessionRepo;

impl DeviceBgpSessionRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<DeviceBgpSession>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.id LIMIT ? OFFSET ?",
            SELECT_DEVICE_BGP_SESSION, DEVICE_FILTER_WHERE
        );
        let rows = bind_device_filter(sqlx::query(&sql), filter)
            .fetch_all(pool)
            .await?;

        let mut conn = pool.acquire().await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(Self::with_afi_safis(&mut conn, row).await?);
        }
        Ok(sessions)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<DeviceBgpSession>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    pub(crate) async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<DeviceBgpSession>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_DEVICE_BGP_SESSION))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_afi_safis(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_afi_safis(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<DeviceBgpSession> {
        let id: i64 = row.get("id");
        let afi_safis = AfiSafiTerms::load(conn, id).await?;
        Ok(DeviceBgpSession {
            id,
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            local_address_id: row.get("local_address_id"),
            local_address: row.get("local_address"),
            local_asn_id: row.get("local_asn_id"),
            description: row.get("description"),
            enforce_first_as: row.get("enforce_first_as"),
            route_policy_in_id: row.get("route_policy_in_id"),
            route_policy_out_id: row.get("route_policy_out_id"),
            enabled: row.get("enabled"),
            peer_group_id: row.get("peer_group_id"),
            maximum_prefixes: row.get("maximum_prefixes"),
            afi_safis: afi_safis.into_iter().map(|s| s.term).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Problems with one side of a pair: session-level references, the
    /// local address and the AFI/SAFI set (submitted, or kept when `None`)
    async fn errors(
        conn: &mut SqliteConnection,
        fields: &DeviceBgpSessionFields,
        current: Option<&DeviceBgpSession>,
        afi_safis: Option<&[AfiSafiInput]>,
    ) -> Result<Vec<FieldError>> {
        let refs = [
            CrossRef::new("route_policy_in", RefTarget::RoutePolicy, fields.route_policy_in_id),
            CrossRef::new("route_policy_out", RefTarget::RoutePolicy, fields.route_policy_out_id),
            CrossRef::new("peer_group", RefTarget::PeerGroup, fields.peer_group_id),
        ];
        let mut errors = scope::check_device_scope(conn, fields.device_id, &refs).await?;

        let address: Option<(i64,)> = sqlx::query_as("SELECT id FROM ip_addresses WHERE id = ?")
            .bind(fields.local_address_id)
            .fetch_optional(&mut *conn)
            .await?;
        if address.is_none() {
            errors.push(FieldError::unknown_reference("local_address", fields.local_address_id));
        }

        match afi_safis {
            Some(desired) => {
                let parent = ParentScope {
                    id: current.map(|s| s.id).unwrap_or_default(),
                    device_id: fields.device_id,
                };
                errors.extend(reconcile::validate::<AfiSafiTerms>(conn, &parent, desired).await?);
            }
            None => {
                for afi_safi in current.map(|s| s.afi_safis.as_slice()).unwrap_or_default() {
                    let refs = AfiSafiTerms::cross_references(afi_safi);
                    let found = scope::check_device_scope(conn, fields.device_id, &refs).await?;
                    errors.extend(found.into_iter().map(|e| e.in_term(afi_safi.afi_safi_name.to_string())));
                }
            }
        }
        Ok(errors)
    }

    /// Insert or update one side, then reconcile its AFI/SAFI set when one
    /// was submitted
    async fn write(
        conn: &mut SqliteConnection,
        id: Option<i64>,
        fields: &DeviceBgpSessionFields,
        afi_safis: Option<&[AfiSafiInput]>,
    ) -> Result<i64> {
        let now = Utc::now();
        let id = match id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE device_bgp_sessions SET
                        device_id = ?, local_address_id = ?, local_asn_id = ?, description = ?,
                        enforce_first_as = ?, route_policy_in_id = ?, route_policy_out_id = ?,
                        enabled = ?, peer_group_id = ?, maximum_prefixes = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(fields.device_id)
                .bind(fields.local_address_id)
                .bind(fields.local_asn_id)
                .bind(&fields.description)
                .bind(fields.enforce_first_as)
                .bind(fields.route_policy_in_id)
                .bind(fields.route_policy_out_id)
                .bind(fields.enabled)
                .bind(fields.peer_group_id)
                .bind(fields.maximum_prefixes)
                .bind(now)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                id
            }
            None => sqlx::query(
                r#"
                INSERT INTO device_bgp_sessions (
                    device_id, local_address_id, local_asn_id, description,
                    enforce_first_as, route_policy_in_id, route_policy_out_id,
                    enabled, peer_group_id, maximum_prefixes, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(fields.device_id)
            .bind(fields.local_address_id)
            .bind(fields.local_asn_id)
            .bind(&fields.description)
            .bind(fields.enforce_first_as)
            .bind(fields.route_policy_in_id)
            .bind(fields.route_policy_out_id)
            .bind(fields.enabled)
            .bind(fields.peer_group_id)
            .bind(fields.maximum_prefixes)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid(),
        };

        if let Some(desired) = afi_safis {
            let parent = ParentScope {
                id,
                device_id: fields.device_id,
            };
            reconcile::reconcile::<AfiSafiTerms>(conn, &parent, desired).await?;
        }
        Ok(id)
    }
}

/// BGP session pair database operations
pub struct BgpSessionRepo;

impl BgpSessionRepo {
    /// Session pairs, optionally restricted to those with one side on a device
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<BgpSession>> {
        let sql = format!(
            r#"{}
            WHERE (? IS NULL OR pa.device_id = ? OR pb.device_id = ?)
              AND (? IS NULL OR da.name = ? OR db.name = ?)
            ORDER BY s.id LIMIT ? OFFSET ?"#,
            SELECT_BGP_SESSION
        );
        let rows = sqlx::query(&sql)
            .bind(filter.device_id)
            .bind(filter.device_id)
            .bind(filter.device_id)
            .bind(filter.device_name.as_deref())
            .bind(filter.device_name.as_deref())
            .bind(filter.device_name.as_deref())
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await?;

        let mut conn = pool.acquire().await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(Self::with_peers(&mut conn, row).await?);
        }
        Ok(sessions)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<BgpSession>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    pub(crate) async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<BgpSession>> {
        let row = sqlx::query(&format!("{} WHERE s.id = ?", SELECT_BGP_SESSION))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_peers(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_peers(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<BgpSession> {
        let peer_a_id: i64 = row.get("peer_a_id");
        let peer_b_id: i64 = row.get("peer_b_id");
        let peer_a = DeviceBgpSessionRepo::get_with(conn, peer_a_id)
            .await?
            .with_context(|| format!("Device BGP session {} missing", peer_a_id))?;
        let peer_b = DeviceBgpSessionRepo::get_with(conn, peer_b_id)
            .await?
            .with_context(|| format!("Device BGP session {} missing", peer_b_id))?;
        Ok(BgpSession {
            id: row.get("id"),
            peer_a,
            peer_b,
            state: row.get("state"),
            monitoring_state: row.get("monitoring_state"),
            password: row.get("password"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Refuse a pair whose endpoints already form another session
    async fn check_unique(
        conn: &mut SqliteConnection,
        a: &DeviceBgpSessionFields,
        b: &DeviceBgpSessionFields,
        exclude_id: Option<i64>,
    ) -> Result<()> {
        let candidate = EndpointPair {
            a: SessionEndpoint {
                device_id: a.device_id,
                local_address_id: a.local_address_id,
            },
            b: SessionEndpoint {
                device_id: b.device_id,
                local_address_id: b.local_address_id,
            },
        };
        let existing = guard::find_candidates(conn, &candidate).await?;
        guard::check_duplicate_session(&candidate, &existing, exclude_id)?;
        Ok(())
    }

    /// Validate both sides together so that every problem is reported
    async fn validate_peers(
        conn: &mut SqliteConnection,
        req: &BgpSessionRequest,
        a: &DeviceBgpSessionFields,
        b: &DeviceBgpSessionFields,
        current: Option<&BgpSession>,
    ) -> Result<()> {
        let mut errors: Vec<FieldError> = Vec::new();
        let sides = [
            ("peer_a", a, current.map(|s| &s.peer_a), &req.peer_a),
            ("peer_b", b, current.map(|s| &s.peer_b), &req.peer_b),
        ];
        for (label, fields, stored, input) in sides {
            // a new side always gets an AFI/SAFI set, empty by default
            let afi_safis = match (stored, &input.afi_safis) {
                (None, None) => Some(&[][..]),
                (_, submitted) => submitted.as_deref(),
            };
            let found = DeviceBgpSessionRepo::errors(conn, fields, stored, afi_safis).await?;
            errors.extend(found.into_iter().map(|e| e.within(label)));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CmdbError::Validation(errors).into())
        }
    }

    /// Create a session pair and both of its sides
    pub async fn create(pool: &Pool<Sqlite>, req: &BgpSessionRequest) -> Result<BgpSession> {
        let mut tx = pool.begin().await?;
        let device_a = DeviceRepo::resolve(&mut tx, &req.peer_a.device).await?;
        let device_b = DeviceRepo::resolve(&mut tx, &req.peer_b.device).await?;
        let a = DeviceBgpSessionFields::new(device_a.id, &req.peer_a);
        let b = DeviceBgpSessionFields::new(device_b.id, &req.peer_b);

        Self::check_unique(&mut tx, &a, &b, None).await?;
        Self::validate_peers(&mut tx, req, &a, &b, None).await?;

        let no_afi_safis: &[AfiSafiInput] = &[];
        let peer_a_id = DeviceBgpSessionRepo::write(
            &mut tx,
            None,
            &a,
            Some(req.peer_a.afi_safis.as_deref().unwrap_or(no_afi_safis)),
        )
        .await?;
        let peer_b_id = DeviceBgpSessionRepo::write(
            &mut tx,
            None,
            &b,
            Some(req.peer_b.afi_safis.as_deref().unwrap_or(no_afi_safis)),
        )
        .await?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO bgp_sessions (
                peer_a_id, peer_b_id, state, monitoring_state, password, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(peer_a_id)
        .bind(peer_b_id)
        .bind(req.state.unwrap_or_default())
        .bind(req.monitoring_state.unwrap_or_default())
        .bind(req.password.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let session = Self::get_with(&mut tx, result.last_insert_rowid())
            .await?
            .context("BGP session not found after creation")?;
        tx.commit().await?;

        tracing::info!("Created BGP session {}", session.display());
        Ok(session)
    }

    /// Update a session pair. Fields left out keep their value on both sides.
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &BgpSessionRequest) -> Result<BgpSession> {
        let mut tx = pool.begin().await?;
        let current = Self::get_with(&mut tx, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("BGP session", &id.to_string()))?;

        let device_a = DeviceRepo::resolve(&mut tx, &req.peer_a.device).await?;
        let device_b = DeviceRepo::resolve(&mut tx, &req.peer_b.device).await?;
        let mut a = DeviceBgpSessionFields::from_session(&current.peer_a);
        a.apply(device_a.id, &req.peer_a);
        let mut b = DeviceBgpSessionFields::from_session(&current.peer_b);
        b.apply(device_b.id, &req.peer_b);

        Self::check_unique(&mut tx, &a, &b, Some(id)).await?;
        Self::validate_peers(&mut tx, req, &a, &b, Some(&current)).await?;

        DeviceBgpSessionRepo::write(&mut tx, Some(current.peer_a.id), &a, req.peer_a.afi_safis.as_deref())
            .await?;
        DeviceBgpSessionRepo::write(&mut tx, Some(current.peer_b.id), &b, req.peer_b.afi_safis.as_deref())
            .await?;

        sqlx::query(
            "UPDATE bgp_sessions SET state = ?, monitoring_state = ?, password = ?, updated_at = ? WHERE id = ?",
        )
        .bind(req.state.unwrap_or(current.state))
        .bind(req.monitoring_state.unwrap_or(current.monitoring_state))
        .bind(req.password.as_deref().unwrap_or(&current.password))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let session = Self::get_with(&mut tx, id)
            .await?
            .context("BGP session not found after update")?;
        tx.commit().await?;
        Ok(session)
    }

    /// Delete a session pair together with both of its sides
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let mut tx = pool.begin().await?;
        let peers: Option<(i64, i64)> =
            sqlx::query_as("SELECT peer_a_id, peer_b_id FROM bgp_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((peer_a_id, peer_b_id)) = peers else {
            return Err(super::NotFoundError::new("BGP session", &id.to_string()).into());
        };
        Self::delete_pair(&mut tx, id, peer_a_id, peer_b_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn delete_pair(
        conn: &mut SqliteConnection,
        id: i64,
        peer_a_id: i64,
        peer_b_id: i64,
    ) -> Result<()> {
        sqlx::query("DELETE FROM bgp_sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM device_bgp_sessions WHERE id IN (?, ?)")
            .bind(peer_a_id)
            .bind(peer_b_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::db::Store;
    use crate::error::FieldErrorKind;

    struct Fixture {
        store: Store,
        addr_a: IpAddress,
        addr_b: IpAddress,
    }

    async fn fixture() -> Fixture {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let addr_a = testutil::address(&store, "10.0.0.0/31").await;
        let addr_b = testutil::address(&store, "10.0.0.1/31").await;
        Fixture { store, addr_a, addr_b }
    }

    fn pair(a: (&str, i64), b: (&str, i64), extra: serde_json::Value) -> BgpSessionRequest {
        let mut value = serde_json::json!({
            "peer_a": {"device": {"name": a.0}, "local_address_id": a.1},
            "peer_b": {"device": {"name": b.0}, "local_address_id": b.1},
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(value).unwrap()
    }

    async fn route_policy(store: &Store, device: &str, name: &str) -> RoutePolicy {
        let req: RoutePolicyRequest = serde_json::from_value(serde_json::json!({
            "name": name,
            "device": {"name": device},
            "terms": [{"sequence": 10}],
        }))
        .unwrap();
        store.create_route_policy(&req).await.unwrap()
    }

    #[tokio::test]
    async fn test_reversed_pair_is_rejected() {
        let f = fixture().await;
        let created = f
            .store
            .create_bgp_session(&pair(
                ("router-a", f.addr_a.id),
                ("router-b", f.addr_b.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(created.display(), "router-a:10.0.0.0/31 <-> router-b:10.0.0.1/31");
        assert_eq!(created.state, AssetState::Staging);
        assert!(created.peer_a.afi_safis.is_empty());

        let err = f
            .store
            .create_bgp_session(&pair(
                ("router-b", f.addr_b.id),
                ("router-a", f.addr_a.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CmdbError>(), Some(CmdbError::DuplicateSession)));

        // updating the pair onto its own endpoints is fine
        f.store
            .update_bgp_session(
                created.id,
                &pair(
                    ("router-a", f.addr_a.id),
                    ("router-b", f.addr_b.id),
                    serde_json::json!({"state": "production"}),
                ),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_both_sides() {
        let f = fixture().await;
        let created = f
            .store
            .create_bgp_session(&pair(
                ("router-a", f.addr_a.id),
                ("router-b", f.addr_b.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let all = ListFilter {
            limit: 100,
            ..Default::default()
        };
        assert_eq!(f.store.list_device_bgp_sessions(&all).await.unwrap().len(), 2);

        f.store.delete_bgp_session(created.id).await.unwrap();

        assert!(f.store.list_device_bgp_sessions(&all).await.unwrap().is_empty());
        assert!(f.store.get_bgp_session(created.id).await.unwrap().is_none());
        assert!(f.store.delete_bgp_session(created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_errors_of_both_sides_reported_together() {
        let f = fixture().await;
        let on_a = route_policy(&f.store, "router-a", "RM-A").await;

        let mut req = pair(
            ("router-a", f.addr_a.id),
            ("router-b", 9999),
            serde_json::json!({}),
        );
        req.peer_b.route_policy_in_id = Some(Some(on_a.id));
        req.peer_b.afi_safis = Some(vec![serde_json::from_value(serde_json::json!({
            "afi_safi_name": "ipv4-unicast",
            "route_policy_out_id": on_a.id,
        }))
        .unwrap()]);

        let err = f.store.create_bgp_session(&req).await.unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                let labels: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert_eq!(
                    labels,
                    vec![
                        "[peer_b] route_policy_in is not on the same device",
                        "[peer_b] local_address references unknown object 9999",
                        "[peer_b ipv4-unicast] route_policy_out is not on the same device",
                    ]
                );
                assert_eq!(errors[1].kind, FieldErrorKind::UnknownReference { id: 9999 });
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_afi_safis_kept_when_omitted() {
        let f = fixture().await;
        let on_a = route_policy(&f.store, "router-a", "RM-A").await;
        let created = f
            .store
            .create_bgp_session(&pair(
                ("router-a", f.addr_a.id),
                ("router-b", f.addr_b.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let mut req = pair(
            ("router-a", f.addr_a.id),
            ("router-b", f.addr_b.id),
            serde_json::json!({}),
        );
        req.peer_a.afi_safis = Some(vec![
            serde_json::from_value(serde_json::json!({
                "afi_safi_name": "ipv4-unicast",
                "route_policy_in_id": on_a.id,
            }))
            .unwrap(),
            serde_json::from_value(serde_json::json!({"afi_safi_name": "ipv6-unicast"})).unwrap(),
        ]);
        let updated = f.store.update_bgp_session(created.id, &req).await.unwrap();
        assert_eq!(updated.peer_a.afi_safis.len(), 2);

        // no afi_safis key: the set stays, other fields change
        let mut req = pair(
            ("router-a", f.addr_a.id),
            ("router-b", f.addr_b.id),
            serde_json::json!({}),
        );
        req.peer_a.description = Some("uplink".to_string());
        let updated = f.store.update_bgp_session(created.id, &req).await.unwrap();
        assert_eq!(updated.peer_a.description, "uplink");
        assert_eq!(updated.peer_a.afi_safis.len(), 2);
        assert_eq!(updated.peer_a.afi_safis[0].route_policy_in_id, Some(on_a.id));

        // an empty list clears it
        req.peer_a.afi_safis = Some(Vec::new());
        let updated = f.store.update_bgp_session(created.id, &req).await.unwrap();
        assert!(updated.peer_a.afi_safis.is_empty());
    }
}
