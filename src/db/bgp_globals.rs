use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use ipnetwork::IpNetwork;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};
use std::marker::PhantomData;

use crate::error::{CmdbError, FieldError};
use crate::models::*;
use crate::reconcile::{self, ParentScope, Stored, TermCollection};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_device_filter, get_network, DEVICE_FILTER_WHERE};

const SELECT_BGP_GLOBAL: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM bgp_globals o
    JOIN devices d ON o.device_id = d.id
"#;

/// Table holding one kind of prefix entry of a global AFI/SAFI
pub trait PrefixTable: Send + Sync + 'static {
    const TABLE: &'static str;
    const LABEL: &'static str;
}

pub struct Aggregates;

impl PrefixTable for Aggregates {
    const TABLE: &'static str = "bgp_aggregates";
    const LABEL: &'static str = "aggregates";
}

pub struct RedistributedNetworks;

impl PrefixTable for RedistributedNetworks {
    const TABLE: &'static str = "bgp_redistributed_networks";
    const LABEL: &'static str = "redistributed_networks";
}

/// Network address form of a prefix: host bits cleared
fn canonical(net: IpNetwork) -> IpNetwork {
    IpNetwork::new(net.network(), net.prefix()).unwrap_or(net)
}

/// Prefix entries of a global AFI/SAFI, keyed by the canonical prefix
pub struct PrefixTerms<T>(PhantomData<T>);

pub type AggregateTerms = PrefixTerms<Aggregates>;
pub type RedistributedNetworkTerms = PrefixTerms<RedistributedNetworks>;

#[async_trait]
impl<T: PrefixTable> TermCollection for PrefixTerms<T> {
    type Key = IpNetwork;
    type Term = BgpPrefix;
    type Desired = BgpPrefix;
    type Parent = ParentScope;

    const LABEL: &'static str = T::LABEL;
    const ALLOW_EMPTY: bool = true;

    fn scope(parent: &ParentScope) -> ParentScope {
        *parent
    }

    fn term_key(term: &BgpPrefix) -> IpNetwork {
        canonical(term.prefix)
    }

    fn desired_key(desired: &BgpPrefix) -> IpNetwork {
        canonical(desired.prefix)
    }

    fn create(desired: &BgpPrefix) -> BgpPrefix {
        BgpPrefix {
            prefix: canonical(desired.prefix),
        }
    }

    fn merge(_desired: &BgpPrefix, _term: &mut BgpPrefix) {}

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<BgpPrefix>>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE global_afi_safi_id = ? ORDER BY id",
            T::TABLE
        ))
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter()
            .map(|row| -> Result<Stored<BgpPrefix>> {
                Ok(Stored {
                    id: row.get("id"),
                    term: BgpPrefix {
                        prefix: get_network(row, "prefix")?,
                    },
                })
            })
            .collect()
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &BgpPrefix) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(&format!(
            "INSERT INTO {} (global_afi_safi_id, prefix, created_at, updated_at) VALUES (?, ?, ?, ?)",
            T::TABLE
        ))
        .bind(parent_id)
        .bind(term.prefix.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, _term: &BgpPrefix) -> Result<()> {
        sqlx::query(&format!("UPDATE {} SET updated_at = ? WHERE id = ?", T::TABLE))
            .bind(Utc::now())
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", T::TABLE))
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Address families of a BGP global, keyed by AFI/SAFI name. Each one owns
/// two nested prefix collections.
pub struct GlobalAfiSafiTerms;

fn nested_error<C: TermCollection>(entries: &[C::Desired]) -> Option<FieldError> {
    reconcile::check_submission::<C>(entries)
        .err()
        .map(|e| FieldError::invalid(C::LABEL, e.to_string()))
}

#[async_trait]
impl TermCollection for GlobalAfiSafiTerms {
    type Key = AfiSafiName;
    type Term = GlobalAfiSafi;
    type Desired = GlobalAfiSafiInput;
    type Parent = ParentScope;

    const LABEL: &'static str = "AFI/SAFI set";
    const ALLOW_EMPTY: bool = true;

    fn scope(parent: &ParentScope) -> ParentScope {
        *parent
    }

    fn term_key(term: &GlobalAfiSafi) -> AfiSafiName {
        term.afi_safi_name
    }

    fn desired_key(desired: &GlobalAfiSafiInput) -> AfiSafiName {
        desired.afi_safi_name
    }

    fn create(desired: &GlobalAfiSafiInput) -> GlobalAfiSafi {
        GlobalAfiSafi {
            afi_safi_name: desired.afi_safi_name,
            aggregates: desired.aggregates.clone().unwrap_or_default(),
            redistributed_networks: desired.redistributed_networks.clone().unwrap_or_default(),
        }
    }

    fn merge(desired: &GlobalAfiSafiInput, term: &mut GlobalAfiSafi) {
        merge_field(&mut term.aggregates, &desired.aggregates);
        merge_field(&mut term.redistributed_networks, &desired.redistributed_networks);
    }

    /// Nested lists are checked up front so that a bad prefix list fails
    /// the submission before any AFI/SAFI row is written
    fn check(_parent: &ParentScope, term: &GlobalAfiSafi) -> Vec<FieldError> {
        [
            nested_error::<AggregateTerms>(&term.aggregates),
            nested_error::<RedistributedNetworkTerms>(&term.redistributed_networks),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<GlobalAfiSafi>>> {
        let rows = sqlx::query(
            "SELECT id, afi_safi_name FROM global_afi_safis WHERE bgp_global_id = ? ORDER BY afi_safi_name",
        )
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut afi_safis = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            let aggregates = AggregateTerms::load(conn, id).await?;
            let redistributed = RedistributedNetworkTerms::load(conn, id).await?;
            afi_safis.push(Stored {
                id,
                term: GlobalAfiSafi {
                    afi_safi_name: row.get("afi_safi_name"),
                    aggregates: aggregates.into_iter().map(|s| s.term).collect(),
                    redistributed_networks: redistributed.into_iter().map(|s| s.term).collect(),
                },
            });
        }
        Ok(afi_safis)
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &GlobalAfiSafi) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO global_afi_safis (bgp_global_id, afi_safi_name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(parent_id)
        .bind(term.afi_safi_name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, _term: &GlobalAfiSafi) -> Result<()> {
        sqlx::query("UPDATE global_afi_safis SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM global_afi_safis WHERE id = ?")
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// A submitted list replaces the nested entries, `None` keeps them
    async fn write_children(
        conn: &mut SqliteConnection,
        parent: &ParentScope,
        row_id: i64,
        desired: &GlobalAfiSafiInput,
    ) -> Result<()> {
        let scope = ParentScope {
            id: row_id,
            device_id: parent.device_id,
        };
        if let Some(aggregates) = &desired.aggregates {
            reconcile::reconcile::<AggregateTerms>(conn, &scope, aggregates).await?;
        }
        if let Some(networks) = &desired.redistributed_networks {
            reconcile::reconcile::<RedistributedNetworkTerms>(conn, &scope, networks).await?;
        }
        Ok(())
    }
}

/// BGP global database operations, one per device
pub struct BgpGlobalRepo;

impl BgpGlobalRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<BgpGlobal>> {
        let sql = format!(
            "{} {} ORDER BY d.name LIMIT ? OFFSET ?",
            SELECT_BGP_GLOBAL, DEVICE_FILTER_WHERE
        );
        let rows = bind_device_filter(sqlx::query(&sql), filter)
            .fetch_all(pool)
            .await?;

        let mut conn = pool.acquire().await?;
        let mut globals = Vec::with_capacity(rows.len());
        for row in &rows {
            globals.push(Self::with_afi_safis(&mut conn, row).await?);
        }
        Ok(globals)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<BgpGlobal>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<BgpGlobal>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_BGP_GLOBAL))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_afi_safis(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_afi_safis(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<BgpGlobal> {
        let id: i64 = row.get("id");
        let afi_safis = GlobalAfiSafiTerms::load(conn, id).await?;
        Ok(BgpGlobal {
            id,
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            local_asn_id: row.get("local_asn_id"),
            router_id: row.get("router_id"),
            ebgp_administrative_distance: row.get("ebgp_administrative_distance"),
            ibgp_administrative_distance: row.get("ibgp_administrative_distance"),
            graceful_restart: row.get("graceful_restart"),
            graceful_restart_time: row.get("graceful_restart_time"),
            ecmp: row.get("ecmp"),
            ecmp_maximum_paths: row.get("ecmp_maximum_paths"),
            afi_safis: afi_safis.into_iter().map(|s| s.term).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn check_asn(conn: &mut SqliteConnection, asn_id: i64) -> Result<()> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM asns WHERE id = ?")
            .bind(asn_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(CmdbError::Validation(vec![FieldError::unknown_reference("local_asn", asn_id)]).into());
        }
        Ok(())
    }

    async fn write(conn: &mut SqliteConnection, id: Option<i64>, fields: &BgpGlobalFields) -> Result<i64> {
        let now = Utc::now();
        match id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE bgp_globals SET
                        device_id = ?, local_asn_id = ?, router_id = ?,
                        ebgp_administrative_distance = ?, ibgp_administrative_distance = ?,
                        graceful_restart = ?, graceful_restart_time = ?,
                        ecmp = ?, ecmp_maximum_paths = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(fields.device_id)
                .bind(fields.local_asn_id)
                .bind(&fields.router_id)
                .bind(fields.ebgp_administrative_distance)
                .bind(fields.ibgp_administrative_distance)
                .bind(fields.graceful_restart)
                .bind(fields.graceful_restart_time)
                .bind(fields.ecmp)
                .bind(fields.ecmp_maximum_paths)
                .bind(now)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                Ok(id)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO bgp_globals (
                        device_id, local_asn_id, router_id,
                        ebgp_administrative_distance, ibgp_administrative_distance,
                        graceful_restart, graceful_restart_time, ecmp, ecmp_maximum_paths,
                        created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(fields.device_id)
                .bind(fields.local_asn_id)
                .bind(&fields.router_id)
                .bind(fields.ebgp_administrative_distance)
                .bind(fields.ibgp_administrative_distance)
                .bind(fields.graceful_restart)
                .bind(fields.graceful_restart_time)
                .bind(fields.ecmp)
                .bind(fields.ecmp_maximum_paths)
                .bind(now)
                .bind(now)
                .execute(&mut *conn)
                .await?;
                Ok(result.last_insert_rowid())
            }
        }
    }

    /// Create the BGP global of a device with its address families
    pub async fn create(pool: &Pool<Sqlite>, req: &BgpGlobalRequest) -> Result<BgpGlobal> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM bgp_globals WHERE device_id = ?")
            .bind(device.id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(CmdbError::Conflict(format!("device {} already has a BGP global", device.name)).into());
        }
        Self::check_asn(&mut tx, req.local_asn_id).await?;

        let fields = BgpGlobalFields::new(device.id, req);
        let id = Self::write(&mut tx, None, &fields).await?;

        let scope = ParentScope { id, device_id: device.id };
        let afi_safis = req.afi_safis.as_deref().unwrap_or_default();
        reconcile::reconcile::<GlobalAfiSafiTerms>(&mut tx, &scope, afi_safis).await?;

        let global = Self::get_with(&mut tx, id)
            .await?
            .context("BGP global not found after creation")?;
        tx.commit().await?;
        Ok(global)
    }

    /// Replace the BGP global. Omitted fields keep their value and an
    /// omitted `afi_safis` keeps the stored address families.
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &BgpGlobalRequest) -> Result<BgpGlobal> {
        let mut tx = pool.begin().await?;
        let current = Self::get_with(&mut tx, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("BGP global", &id.to_string()))?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        Self::check_asn(&mut tx, req.local_asn_id).await?;

        let mut fields = BgpGlobalFields::from_global(&current);
        fields.apply(device.id, req);
        Self::write(&mut tx, Some(id), &fields).await?;

        if let Some(afi_safis) = &req.afi_safis {
            let scope = ParentScope { id, device_id: device.id };
            reconcile::reconcile::<GlobalAfiSafiTerms>(&mut tx, &scope, afi_safis).await?;
        }

        let global = Self::get_with(&mut tx, id)
            .await?
            .context("BGP global not found after update")?;
        tx.commit().await?;
        Ok(global)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM bgp_globals WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("BGP global", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::db::Store;

    async fn asn(store: &Store) -> Asn {
        store
            .create_asn(&CreateAsnRequest {
                number: 65000,
                organization_name: "lab".to_string(),
            })
            .await
            .unwrap()
    }

    fn global(local_asn_id: i64, extra: serde_json::Value) -> BgpGlobalRequest {
        let mut value = serde_json::json!({
            "device": {"name": "router-a"},
            "local_asn_id": local_asn_id,
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(value).unwrap()
    }

    fn prefixes(global: &BgpGlobal, afi: usize) -> (Vec<String>, Vec<String>) {
        let afi = &global.afi_safis[afi];
        (
            afi.aggregates.iter().map(|p| p.prefix.to_string()).collect(),
            afi.redistributed_networks.iter().map(|p| p.prefix.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_nested_prefix_lists_reconciled() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        let asn = asn(&store).await;

        let created = store
            .create_bgp_global(&global(
                asn.id,
                serde_json::json!({
                    "router_id": "192.0.2.1",
                    "afi_safis": [{
                        "afi_safi_name": "ipv4-unicast",
                        "aggregates": [{"prefix": "10.0.0.0/8"}, {"prefix": "172.16.0.0/12"}],
                        "redistributed_networks": [{"prefix": "192.0.2.0/24"}],
                    }],
                }),
            ))
            .await
            .unwrap();
        assert!(created.ecmp);
        assert_eq!(created.ecmp_maximum_paths, 32);
        assert_eq!(
            prefixes(&created, 0),
            (
                vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()],
                vec!["192.0.2.0/24".to_string()]
            )
        );

        // aggregates replaced, redistributed networks left out and kept
        let updated = store
            .update_bgp_global(
                created.id,
                &global(
                    asn.id,
                    serde_json::json!({
                        "afi_safis": [
                            {"afi_safi_name": "ipv4-unicast", "aggregates": [{"prefix": "10.0.0.0/8"}]},
                            {"afi_safi_name": "ipv6-unicast"},
                        ],
                    }),
                ),
            )
            .await
            .unwrap();
        assert_eq!(updated.router_id, "192.0.2.1");
        assert_eq!(updated.afi_safis.len(), 2);
        assert_eq!(
            prefixes(&updated, 0),
            (vec!["10.0.0.0/8".to_string()], vec!["192.0.2.0/24".to_string()])
        );
        assert!(updated.afi_safis[1].aggregates.is_empty());

        // no afi_safis at all keeps both families
        let updated = store
            .update_bgp_global(created.id, &global(asn.id, serde_json::json!({"ecmp": false})))
            .await
            .unwrap();
        assert!(!updated.ecmp);
        assert_eq!(updated.afi_safis.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_nested_prefix_rejected_before_writes() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        let asn = asn(&store).await;
        let created = store
            .create_bgp_global(&global(asn.id, serde_json::json!({})))
            .await
            .unwrap();
        assert!(created.afi_safis.is_empty());

        let err = store
            .update_bgp_global(
                created.id,
                &global(
                    asn.id,
                    serde_json::json!({
                        "afi_safis": [
                            {"afi_safi_name": "ipv6-unicast"},
                            {
                                "afi_safi_name": "ipv4-unicast",
                                "aggregates": [{"prefix": "10.0.0.0/8"}, {"prefix": "10.0.0.0/8"}],
                            },
                        ],
                    }),
                ),
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].term.as_deref(), Some("ipv4-unicast"));
                assert_eq!(errors[0].field, "aggregates");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        let stored = store.get_bgp_global(created.id).await.unwrap().unwrap();
        assert!(stored.afi_safis.is_empty());

        // one global per device
        let err = store
            .create_bgp_global(&global(asn.id, serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CmdbError>(), Some(CmdbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_prefixes_keyed_by_network_address() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        let asn = asn(&store).await;

        let created = store
            .create_bgp_global(&global(
                asn.id,
                serde_json::json!({
                    "afi_safis": [{
                        "afi_safi_name": "ipv4-unicast",
                        "aggregates": [{"prefix": "10.0.0.1/24"}],
                    }],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(prefixes(&created, 0).0, vec!["10.0.0.0/24".to_string()]);

        let err = store
            .update_bgp_global(
                created.id,
                &global(
                    asn.id,
                    serde_json::json!({
                        "afi_safis": [{
                            "afi_safi_name": "ipv4-unicast",
                            "aggregates": [{"prefix": "10.0.0.0/24"}, {"prefix": "10.0.0.7/24"}],
                        }],
                    }),
                ),
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => assert_eq!(errors[0].field, "aggregates"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
