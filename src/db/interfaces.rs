use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::error::{CmdbError, FieldError};
use crate::models::*;
use crate::reconcile::scope::{self, CrossRef, RefTarget};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, LIST_FILTER_WHERE};

const SELECT_DEVICE_INTERFACE: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM device_interfaces o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_device_interface_row(row: &SqliteRow) -> DeviceInterface {
    DeviceInterface {
        id: row.get("id"),
        name: row.get("name"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        enabled: row.get("enabled"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Physical interface database operations
pub struct DeviceInterfaceRepo;

impl DeviceInterfaceRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<DeviceInterface>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_DEVICE_INTERFACE, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_device_interface_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateDeviceInterfaceRequest) -> Result<DeviceInterface> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO device_interfaces (device_id, name, enabled, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(req.enabled)
        .bind(&req.description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_DEVICE_INTERFACE))
            .bind(result.last_insert_rowid())
            .fetch_optional(&mut *tx)
            .await?
            .context("Device interface not found after creation")?;
        tx.commit().await?;
        Ok(map_device_interface_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM device_interfaces WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Device interface", &id.to_string()).into());
        }
        Ok(())
    }
}

fn map_logical_interface_row(row: &SqliteRow) -> LogicalInterface {
    LogicalInterface {
        id: row.get("id"),
        parent_interface_id: row.get("parent_interface_id"),
        index: row.get("index"),
        enabled: row.get("enabled"),
        vrf_id: row.get("vrf_id"),
        ipv4_address_id: row.get("ipv4_address_id"),
        ipv6_address_id: row.get("ipv6_address_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Logical interface database operations
pub struct LogicalInterfaceRepo;

impl LogicalInterfaceRepo {
    /// Logical interfaces, optionally restricted to the parent interfaces of a device
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<LogicalInterface>> {
        let rows = sqlx::query(
            r#"
            SELECT o.*
            FROM logical_interfaces o
            JOIN device_interfaces p ON o.parent_interface_id = p.id
            JOIN devices d ON p.device_id = d.id
            WHERE (? IS NULL OR p.device_id = ?)
              AND (? IS NULL OR d.name = ?)
            ORDER BY d.name, p.name, o."index"
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(filter.device_id)
        .bind(filter.device_id)
        .bind(filter.device_name.as_deref())
        .bind(filter.device_name.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_logical_interface_row).collect())
    }

    /// The VRF must live on the parent interface's device and the address
    /// references must exist
    pub async fn create(pool: &Pool<Sqlite>, req: &CreateLogicalInterfaceRequest) -> Result<LogicalInterface> {
        let mut tx = pool.begin().await?;
        let parent: Option<(i64,)> = sqlx::query_as("SELECT device_id FROM device_interfaces WHERE id = ?")
            .bind(req.parent_interface_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((device_id,)) = parent else {
            return Err(CmdbError::Validation(vec![FieldError::unknown_reference(
                "parent_interface",
                req.parent_interface_id,
            )])
            .into());
        };

        let refs = [CrossRef::new("vrf", RefTarget::Vrf, req.vrf_id)];
        let mut errors = scope::check_device_scope(&mut tx, device_id, &refs).await?;
        for (field, id) in [("ipv4_address", req.ipv4_address_id), ("ipv6_address", req.ipv6_address_id)] {
            let Some(id) = id else { continue };
            let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM ip_addresses WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            if found.is_none() {
                errors.push(FieldError::unknown_reference(field, id));
            }
        }
        if !errors.is_empty() {
            return Err(CmdbError::Validation(errors).into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO logical_interfaces (
                parent_interface_id, "index", enabled, vrf_id, ipv4_address_id, ipv6_address_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.parent_interface_id)
        .bind(req.index)
        .bind(req.enabled)
        .bind(req.vrf_id)
        .bind(req.ipv4_address_id)
        .bind(req.ipv6_address_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query("SELECT * FROM logical_interfaces WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(map_logical_interface_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM logical_interfaces WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Logical interface", &id.to_string()).into());
        }
        Ok(())
    }
}

const SELECT_LINK: &str = r#"
    SELECT l.*,
           ia.name AS interface_a_name, dva.name AS device_a_name,
           ib.name AS interface_b_name, dvb.name AS device_b_name
    FROM links l
    JOIN device_interfaces ia ON l.interface_a_id = ia.id
    JOIN devices dva ON ia.device_id = dva.id
    JOIN device_interfaces ib ON l.interface_b_id = ib.id
    JOIN devices dvb ON ib.device_id = dvb.id
"#;

fn map_link_row(row: &SqliteRow) -> Link {
    Link {
        id: row.get("id"),
        interface_a_id: row.get("interface_a_id"),
        interface_b_id: row.get("interface_b_id"),
        interface_a_name: row.get("interface_a_name"),
        device_a_name: row.get("device_a_name"),
        interface_b_name: row.get("interface_b_name"),
        device_b_name: row.get("device_b_name"),
        state: row.get("state"),
        monitoring_state: row.get("monitoring_state"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Link database operations. A link goes away with either of its interfaces.
pub struct LinkRepo;

impl LinkRepo {
    /// Links with either end on the filtered device
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<Link>> {
        let sql = format!(
            r#"{}
            WHERE (? IS NULL OR ia.device_id = ? OR ib.device_id = ?)
              AND (? IS NULL OR dva.name = ? OR dvb.name = ?)
            ORDER BY l.id
            LIMIT ? OFFSET ?"#,
            SELECT_LINK
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
        Ok(rows.iter().map(map_link_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Link>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<Link>> {
        let row = sqlx::query(&format!("{} WHERE l.id = ?", SELECT_LINK))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_link_row))
    }

    /// Both interfaces must exist and be distinct
    async fn check_ends(conn: &mut SqliteConnection, req: &LinkRequest) -> Result<()> {
        let mut errors = Vec::new();
        for (field, id) in [("interface_a", req.interface_a_id), ("interface_b", req.interface_b_id)] {
            let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM device_interfaces WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
            if found.is_none() {
                errors.push(FieldError::unknown_reference(field, id));
            }
        }
        if errors.is_empty() && req.interface_a_id == req.interface_b_id {
            errors.push(FieldError::invalid("interface_b", "a link needs two distinct interfaces"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CmdbError::Validation(errors).into())
        }
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &LinkRequest) -> Result<Link> {
        let mut tx = pool.begin().await?;
        Self::check_ends(&mut tx, req).await?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO links (
                interface_a_id, interface_b_id, state, monitoring_state, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.interface_a_id)
        .bind(req.interface_b_id)
        .bind(req.state.unwrap_or_default())
        .bind(req.monitoring_state.unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let link = Self::get_with(&mut tx, result.last_insert_rowid())
            .await?
            .context("Link not found after creation")?;
        tx.commit().await?;

        tracing::info!("Created link {}", link.display());
        Ok(link)
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &LinkRequest) -> Result<Link> {
        let mut tx = pool.begin().await?;
        let current = Self::get_with(&mut tx, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Link", &id.to_string()))?;
        Self::check_ends(&mut tx, req).await?;

        sqlx::query(
            r#"
            UPDATE links SET interface_a_id = ?, interface_b_id = ?, state = ?, monitoring_state = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.interface_a_id)
        .bind(req.interface_b_id)
        .bind(req.state.unwrap_or(current.state))
        .bind(req.monitoring_state.unwrap_or(current.monitoring_state))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let link = Self::get_with(&mut tx, id).await?.context("Link not found after update")?;
        tx.commit().await?;
        Ok(link)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?").bind(id).execute(pool).await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Link", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::db::Store;
    use crate::error::FieldErrorKind;

    #[tokio::test]
    async fn test_vrf_of_other_device_rejected() {
        let store = testutil::store().await;
        let router_a = testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let et0 = store
            .create_device_interface(&CreateDeviceInterfaceRequest {
                name: "et-0/0/0".to_string(),
                device: router_a.into(),
                enabled: true,
                description: String::new(),
            })
            .await
            .unwrap();
        let remote_vrf = store
            .create_vrf(&CreateVrfRequest {
                name: "MGMT".to_string(),
                device: DeviceRef::ByName("router-b".to_string()),
            })
            .await
            .unwrap();
        let address = testutil::address(&store, "192.0.2.1/31").await;

        let mut req = CreateLogicalInterfaceRequest {
            parent_interface_id: et0.id,
            index: 100,
            enabled: true,
            vrf_id: Some(remote_vrf.id),
            ipv4_address_id: Some(address.id),
            ipv6_address_id: None,
        };
        let err = store.create_logical_interface(&req).await.unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "vrf");
                assert_eq!(errors[0].kind, FieldErrorKind::DeviceMismatch);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        req.vrf_id = None;
        let unit = store.create_logical_interface(&req).await.unwrap();
        assert_eq!(unit.index, 100);
        assert_eq!(unit.ipv4_address_id, Some(address.id));
    }

    async fn interface(store: &Store, device: &Device, name: &str) -> DeviceInterface {
        store
            .create_device_interface(&CreateDeviceInterfaceRequest {
                name: name.to_string(),
                device: device.clone().into(),
                enabled: true,
                description: String::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_link_follows_its_interfaces() {
        let store = testutil::store().await;
        let router_a = testutil::device(&store, "router-a").await;
        let router_b = testutil::device(&store, "router-b").await;
        let et_a = interface(&store, &router_a, "et-0/0/0").await;
        let et_b = interface(&store, &router_b, "et-0/0/1").await;

        let req = LinkRequest {
            interface_a_id: et_a.id,
            interface_b_id: et_b.id,
            state: None,
            monitoring_state: None,
        };
        let link = store.create_link(&req).await.unwrap();
        assert_eq!(link.display(), "router-a:et-0/0/0 <--> router-b:et-0/0/1");
        assert_eq!(link.state, AssetState::Staging);
        assert_eq!(link.monitoring_state, MonitoringState::Disabled);

        let updated = store
            .update_link(
                link.id,
                &LinkRequest {
                    state: Some(AssetState::Production),
                    ..req.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.state, AssetState::Production);
        assert_eq!(updated.monitoring_state, MonitoringState::Disabled);

        let filter = ListFilter {
            device_name: Some("router-b".to_string()),
            limit: 100,
            ..Default::default()
        };
        assert_eq!(store.list_links(&filter).await.unwrap().len(), 1);

        store.delete_device_interface(et_b.id).await.unwrap();
        assert!(store.get_link(link.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_ends_validated() {
        let store = testutil::store().await;
        let router_a = testutil::device(&store, "router-a").await;
        let et_a = interface(&store, &router_a, "et-0/0/0").await;

        let err = store
            .create_link(&LinkRequest {
                interface_a_id: et_a.id,
                interface_b_id: 999,
                state: None,
                monitoring_state: None,
            })
            .await
            .unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].kind, FieldErrorKind::UnknownReference { id: 999 });
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = store
            .create_link(&LinkRequest {
                interface_a_id: et_a.id,
                interface_b_id: et_a.id,
                state: None,
                monitoring_state: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CmdbError>(), Some(CmdbError::Validation(_))));
    }
}
