use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use crate::models::*;

use super::bgp_sessions::BgpSessionRepo;

/// Teardown of every configuration object scoped to a device
pub struct DecommissionRepo;

impl DecommissionRepo {
    /// Delete everything configured on `device_name`, in one transaction.
    /// Objects are removed from the most referencing to the most referenced
    /// so that no restricting reference is left dangling on the way.
    pub async fn decommission(pool: &Pool<Sqlite>, device_name: &str) -> Result<DecommissionReport> {
        let mut tx = pool.begin().await?;
        let device: Option<(i64,)> = sqlx::query_as("SELECT id FROM devices WHERE name = ?")
            .bind(device_name)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((device_id,)) = device else {
            return Err(super::NotFoundError::new("Device", device_name).into());
        };

        let mut report = DecommissionReport {
            bgp_sessions: Self::delete_session_pairs(&mut tx, device_id).await?,
            ..Default::default()
        };

        let sessions = sqlx::query(
            r#"
            SELECT o.id, d.name AS device_name, ip.address
            FROM device_bgp_sessions o
            JOIN devices d ON o.device_id = d.id
            JOIN ip_addresses ip ON o.local_address_id = ip.id
            WHERE o.device_id = ?
            ORDER BY o.id
            "#,
        )
        .bind(device_id)
        .fetch_all(&mut *tx)
        .await?;
        report.device_bgp_sessions = sessions
            .iter()
            .map(|row| format!("{}:{}", row.get::<String, _>("device_name"), row.get::<String, _>("address")))
            .collect();
        sqlx::query("DELETE FROM device_bgp_sessions WHERE device_id = ?")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        report.bgp_peer_groups = Self::delete_named(&mut tx, "bgp_peer_groups", device_id).await?;
        report.route_policies = Self::delete_named(&mut tx, "route_policies", device_id).await?;
        report.prefix_lists = Self::delete_named(&mut tx, "prefix_lists", device_id).await?;
        report.bgp_community_lists = Self::delete_named(&mut tx, "bgp_community_lists", device_id).await?;
        report.snmp = Self::delete_config(&mut tx, "snmp", "SNMP", device_id, device_name).await?;
        report.syslog = Self::delete_config(&mut tx, "syslog", "Syslog", device_id, device_name).await?;
        report.tacacs = Self::delete_config(&mut tx, "tacacs", "TACACS", device_id, device_name).await?;

        tx.commit().await?;

        tracing::info!(
            "Decommissioned device {}: {} objects deleted",
            device_name,
            report.total()
        );
        Ok(report)
    }

    /// Session pairs with either side on the device, deleted with both sides
    async fn delete_session_pairs(conn: &mut SqliteConnection, device_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.peer_a_id, s.peer_b_id,
                   da.name AS device_a, ipa.address AS address_a,
                   db.name AS device_b, ipb.address AS address_b
            FROM bgp_sessions s
            JOIN device_bgp_sessions pa ON s.peer_a_id = pa.id
            JOIN device_bgp_sessions pb ON s.peer_b_id = pb.id
            JOIN devices da ON pa.device_id = da.id
            JOIN devices db ON pb.device_id = db.id
            JOIN ip_addresses ipa ON pa.local_address_id = ipa.id
            JOIN ip_addresses ipb ON pb.local_address_id = ipb.id
            WHERE pa.device_id = ? OR pb.device_id = ?
            ORDER BY s.id
            "#,
        )
        .bind(device_id)
        .bind(device_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            names.push(format!(
                "{}:{} <-> {}:{}",
                row.get::<String, _>("device_a"),
                row.get::<String, _>("address_a"),
                row.get::<String, _>("device_b"),
                row.get::<String, _>("address_b")
            ));
            BgpSessionRepo::delete_pair(conn, row.get("id"), row.get("peer_a_id"), row.get("peer_b_id")).await?;
        }
        Ok(names)
    }

    /// Delete the rows of a `(device, name)` table, returning their names
    async fn delete_named(conn: &mut SqliteConnection, table: &str, device_id: i64) -> Result<Vec<String>> {
        let names: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT name FROM {} WHERE device_id = ? ORDER BY name", table))
                .bind(device_id)
                .fetch_all(&mut *conn)
                .await?;
        sqlx::query(&format!("DELETE FROM {} WHERE device_id = ?", table))
            .bind(device_id)
            .execute(&mut *conn)
            .await?;
        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    /// Delete the one-per-device configuration held in `table`, if any
    async fn delete_config(
        conn: &mut SqliteConnection,
        table: &str,
        label: &str,
        device_id: i64,
        device_name: &str,
    ) -> Result<Vec<String>> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE device_id = ?", table))
            .bind(device_id)
            .execute(&mut *conn)
            .await?;
        Ok((0..result.rows_affected())
            .map(|_| format!("{} {}", label, device_name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::db::Store;
    use crate::error::CmdbError;

    async fn build_router_a(store: &Store) {
        testutil::device(store, "router-a").await;
        testutil::device(store, "router-b").await;
        let addr_a = testutil::address(store, "10.0.0.0/31").await;
        let addr_b = testutil::address(store, "10.0.0.1/31").await;

        let pl: PrefixListRequest = serde_json::from_value(serde_json::json!({
            "name": "PL-LOOPBACKS",
            "device": {"name": "router-a"},
            "terms": [{"sequence": 10, "prefix": "192.0.2.0/24", "le": 32}],
        }))
        .unwrap();
        let pl = store.create_prefix_list(&pl).await.unwrap();

        let cl: BgpCommunityListRequest = serde_json::from_value(serde_json::json!({
            "name": "CL-CUSTOMERS",
            "device": {"name": "router-a"},
            "terms": [{"sequence": 10, "community": "65000:100"}],
        }))
        .unwrap();
        let cl = store.create_community_list(&cl).await.unwrap();

        let rp: RoutePolicyRequest = serde_json::from_value(serde_json::json!({
            "name": "RM-EXPORT",
            "device": {"name": "router-a"},
            "terms": [{
                "sequence": 10,
                "from_prefix_list_id": pl.id,
                "from_bgp_community_list_id": cl.id,
            }],
        }))
        .unwrap();
        let rp = store.create_route_policy(&rp).await.unwrap();

        let pg: BgpPeerGroupRequest = serde_json::from_value(serde_json::json!({
            "name": "SPINES",
            "device": {"name": "router-a"},
            "route_policy_out_id": rp.id,
        }))
        .unwrap();
        let pg = store.create_peer_group(&pg).await.unwrap();

        let session: BgpSessionRequest = serde_json::from_value(serde_json::json!({
            "peer_a": {
                "device": {"name": "router-a"},
                "local_address_id": addr_a.id,
                "peer_group_id": pg.id,
                "afi_safis": [{"afi_safi_name": "ipv4-unicast", "route_policy_out_id": rp.id}],
            },
            "peer_b": {"device": {"name": "router-b"}, "local_address_id": addr_b.id},
        }))
        .unwrap();
        store.create_bgp_session(&session).await.unwrap();

        let tacacs: CreateTacacsRequest =
            serde_json::from_value(serde_json::json!({"device": {"name": "router-a"}})).unwrap();
        store.create_tacacs(&tacacs).await.unwrap();
    }

    #[tokio::test]
    async fn test_decommission_with_cross_references() {
        let store = testutil::store().await;
        build_router_a(&store).await;

        let report = store.decommission_device("router-a").await.unwrap();
        assert_eq!(report.bgp_sessions, vec!["router-a:10.0.0.0/31 <-> router-b:10.0.0.1/31"]);
        assert!(report.device_bgp_sessions.is_empty());
        assert_eq!(report.bgp_peer_groups, vec!["SPINES"]);
        assert_eq!(report.route_policies, vec!["RM-EXPORT"]);
        assert_eq!(report.prefix_lists, vec!["PL-LOOPBACKS"]);
        assert_eq!(report.bgp_community_lists, vec!["CL-CUSTOMERS"]);
        assert_eq!(report.tacacs, vec!["TACACS router-a"]);
        assert_eq!(report.total(), 6);

        // the remote side of the pair went with it
        let all = ListFilter {
            limit: 100,
            ..Default::default()
        };
        assert!(store.list_device_bgp_sessions(&all).await.unwrap().is_empty());

        // the device itself stays and can now be renamed
        let device = store.get_device(1).await.unwrap().unwrap();
        store
            .rename_device(device.id, &RenameDeviceRequest { name: "router-z".to_string() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let store = testutil::store().await;
        let err = store.decommission_device("nope").await.unwrap_err();
        assert!(err.downcast_ref::<crate::db::NotFoundError>().is_some());
    }

    #[tokio::test]
    async fn test_protected_while_configured() {
        let store = testutil::store().await;
        build_router_a(&store).await;

        let err = store
            .rename_device(1, &RenameDeviceRequest { name: "router-z".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::Protected { anchor: "Device name", .. })
        ));

        // the session's local address cannot move, a new mask is fine
        let err = store
            .update_ip_address(1, &UpdateIpAddressRequest { address: "10.0.0.8/31".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::Protected { entity: "device BGP session", .. })
        ));
        store
            .update_ip_address(1, &UpdateIpAddressRequest { address: "10.0.0.0/30".to_string() })
            .await
            .unwrap();
    }
}
