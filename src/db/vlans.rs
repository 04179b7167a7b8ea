use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::error::CmdbError;
use crate::models::*;

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, LIST_FILTER_WHERE};

fn map_vlan_row(row: &SqliteRow) -> Vlan {
    Vlan {
        id: row.get("id"),
        vid: row.get("vid"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// VLAN database operations
pub struct VlanRepo;

impl VlanRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<Vlan>> {
        let rows = sqlx::query("SELECT * FROM vlans ORDER BY vid, name LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_vlan_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateVlanRequest) -> Result<Vlan> {
        if !req.vid_in_range() {
            return Err(CmdbError::invalid(format!(
                "vid must be between {} and {}",
                VLAN_MIN_VID, VLAN_MAX_VID
            ))
            .into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO vlans (vid, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(req.vid)
        .bind(&req.name)
        .bind(&req.description)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let row = sqlx::query("SELECT * FROM vlans WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await?;
        Ok(map_vlan_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM vlans WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("VLAN", &id.to_string()).into());
        }
        Ok(())
    }
}

const SELECT_VRF: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM vrfs o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_vrf_row(row: &SqliteRow) -> Vrf {
    Vrf {
        id: row.get("id"),
        name: row.get("name"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// VRF database operations
pub struct VrfRepo;

impl VrfRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<Vrf>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_VRF, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_vrf_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateVrfRequest) -> Result<Vrf> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;

        let now = Utc::now();
        let result = sqlx::query("INSERT INTO vrfs (device_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(device.id)
            .bind(&req.name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_VRF))
            .bind(result.last_insert_rowid())
            .fetch_optional(&mut *tx)
            .await?
            .context("VRF not found after creation")?;
        tx.commit().await?;
        Ok(map_vrf_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM vrfs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("VRF", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    #[tokio::test]
    async fn test_vid_range() {
        let store = testutil::store().await;
        for vid in [0u16, 4095] {
            let err = store
                .create_vlan(&CreateVlanRequest {
                    vid,
                    name: "bad".to_string(),
                    description: String::new(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<CmdbError>(), Some(CmdbError::InvalidInput(_))));
        }
        let vlan = store
            .create_vlan(&CreateVlanRequest {
                vid: 4094,
                name: "servers".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(vlan.vid, 4094);
    }

    #[tokio::test]
    async fn test_vrf_filter_by_device() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        for device in ["router-a", "router-b"] {
            store
                .create_vrf(&CreateVrfRequest {
                    name: "MGMT".to_string(),
                    device: DeviceRef::ByName(device.to_string()),
                })
                .await
                .unwrap();
        }
        let filter = ListFilter {
            device_name: Some("router-b".to_string()),
            limit: 100,
            ..Default::default()
        };
        let vrfs = store.list_vrfs(&filter).await.unwrap();
        assert_eq!(vrfs.len(), 1);
        assert_eq!(vrfs[0].device_name, "router-b");
    }
}
