use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::error::CmdbError;
use crate::models::*;
use crate::protect;
use crate::reconcile::scope::{self, CrossRef, RefTarget};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, LIST_FILTER_WHERE};

const SELECT_PEER_GROUP: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM bgp_peer_groups o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_peer_group_row(row: &SqliteRow) -> BgpPeerGroup {
    BgpPeerGroup {
        id: row.get("id"),
        name: row.get("name"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        description: row.get("description"),
        local_asn_id: row.get("local_asn_id"),
        remote_asn_id: row.get("remote_asn_id"),
        enforce_first_as: row.get("enforce_first_as"),
        route_policy_in_id: row.get("route_policy_in_id"),
        route_policy_out_id: row.get("route_policy_out_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// BGP peer group database operations
pub struct PeerGroupRepo;

impl PeerGroupRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<BgpPeerGroup>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_PEER_GROUP, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_peer_group_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<BgpPeerGroup>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_PEER_GROUP))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_peer_group_row))
    }

    /// Route policies applied by a peer group must be configured on its device
    async fn check_scope(conn: &mut SqliteConnection, device_id: i64, req: &BgpPeerGroupRequest) -> Result<()> {
        let refs = [
            CrossRef::new("route_policy_in", RefTarget::RoutePolicy, req.route_policy_in_id),
            CrossRef::new("route_policy_out", RefTarget::RoutePolicy, req.route_policy_out_id),
        ];
        let errors = scope::check_device_scope(conn, device_id, &refs).await?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CmdbError::Validation(errors).into())
        }
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &BgpPeerGroupRequest) -> Result<BgpPeerGroup> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        Self::check_scope(&mut tx, device.id, req).await?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO bgp_peer_groups (
                device_id, name, description, local_asn_id, remote_asn_id, enforce_first_as,
                route_policy_in_id, route_policy_out_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(req.local_asn_id)
        .bind(req.remote_asn_id)
        .bind(req.enforce_first_as.unwrap_or(true))
        .bind(req.route_policy_in_id)
        .bind(req.route_policy_out_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Peer group not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &BgpPeerGroupRequest) -> Result<BgpPeerGroup> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        Self::check_scope(&mut tx, device.id, req).await?;
        protect::check_device_move(&mut tx, RefTarget::PeerGroup, id, device.id).await?;

        let result = sqlx::query(
            r#"
            UPDATE bgp_peer_groups SET
                device_id = ?, name = ?, description = ?, local_asn_id = ?, remote_asn_id = ?,
                enforce_first_as = ?, route_policy_in_id = ?, route_policy_out_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(req.local_asn_id)
        .bind(req.remote_asn_id)
        .bind(req.enforce_first_as.unwrap_or(true))
        .bind(req.route_policy_in_id)
        .bind(req.route_policy_out_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Peer group", &id.to_string()).into());
        }
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Peer group not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM bgp_peer_groups WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Peer group", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    #[tokio::test]
    async fn test_peer_group_policy_must_be_local() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let req: RoutePolicyRequest = serde_json::from_value(serde_json::json!({
            "name": "RM-B",
            "device": {"name": "router-b"},
            "terms": [{"sequence": 10}],
        }))
        .unwrap();
        let remote = store.create_route_policy(&req).await.unwrap();

        let group: BgpPeerGroupRequest = serde_json::from_value(serde_json::json!({
            "name": "SPINES",
            "device": {"name": "router-a"},
            "route_policy_out_id": remote.id,
        }))
        .unwrap();
        let err = store.create_peer_group(&group).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CmdbError>(), Some(CmdbError::Validation(e)) if e.len() == 1));

        let group: BgpPeerGroupRequest = serde_json::from_value(serde_json::json!({
            "name": "SPINES",
            "device": {"name": "router-b"},
            "route_policy_out_id": remote.id,
        }))
        .unwrap();
        let created = store.create_peer_group(&group).await.unwrap();
        assert!(created.enforce_first_as);
        assert_eq!(created.device_name, "router-b");
    }
}
