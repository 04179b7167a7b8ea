use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::error::CmdbError;
use crate::models::*;
use crate::protect;

use super::row_helpers::{map_device_row, map_ip_address_row};

/// Device database operations
pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<Device>> {
        let rows = sqlx::query("SELECT * FROM devices ORDER BY name LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_device_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Device>> {
        let row = sqlx::query("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_device_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateDeviceRequest) -> Result<Device> {
        if req.name.trim().is_empty() {
            return Err(CmdbError::invalid("device name is required").into());
        }
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO devices (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(&req.name)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Device not found after creation")
    }

    /// Rename a device, unless configuration objects still reference it
    pub async fn rename(pool: &Pool<Sqlite>, id: i64, req: &RenameDeviceRequest) -> Result<Device> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| map_device_row(&row))
            .ok_or_else(|| super::NotFoundError::new("Device", &id.to_string()))?;
        protect::check_device_rename(&mut tx, id, &current.name, &req.name).await?;

        sqlx::query("UPDATE devices SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&req.name)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Device not found after update")
    }

    /// Resolve a device reference from a payload. An unknown device is a
    /// client error, reported as invalid input.
    pub async fn resolve(conn: &mut SqliteConnection, device: &DeviceRef) -> Result<Device> {
        let row = match device {
            DeviceRef::ById(id) => {
                sqlx::query("SELECT * FROM devices WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            DeviceRef::ByName(name) => {
                sqlx::query("SELECT * FROM devices WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            DeviceRef::Resolved(device) => return Ok(device.clone()),
        };
        match row {
            Some(row) => Ok(map_device_row(&row)),
            None => Err(CmdbError::invalid(format!("device {} does not exist", device)).into()),
        }
    }
}

/// IP address database operations
pub struct IpAddressRepo;

impl IpAddressRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<IpAddress>> {
        let rows = sqlx::query("SELECT * FROM ip_addresses ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_ip_address_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<IpAddress>> {
        let row = sqlx::query("SELECT * FROM ip_addresses WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_ip_address_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateIpAddressRequest) -> Result<IpAddress> {
        validate_address(&req.address)?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO ip_addresses (address, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&req.address)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("IP address not found after creation")
    }

    /// Change an address, unless it is in use and the host part changes
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &UpdateIpAddressRequest) -> Result<IpAddress> {
        validate_address(&req.address)?;
        let current = Self::get(pool, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("IP address", &id.to_string()))?;

        let mut tx = pool.begin().await?;
        protect::check_address_change(&mut tx, id, &current.address, &req.address).await?;
        sqlx::query("UPDATE ip_addresses SET address = ?, updated_at = ? WHERE id = ?")
            .bind(&req.address)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("IP address not found after update")
    }
}

fn validate_address(address: &str) -> Result<(), CmdbError> {
    address
        .parse::<ipnetwork::IpNetwork>()
        .map(|_| ())
        .map_err(|_| CmdbError::invalid(format!("invalid IP address: {}", address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    #[tokio::test]
    async fn test_resolve_device_ref() {
        let store = testutil::store().await;
        let device = testutil::device(&store, "router-test").await;

        let mut conn = store.pool.acquire().await.unwrap();
        let by_name = DeviceRepo::resolve(&mut conn, &DeviceRef::ByName("router-test".into()))
            .await
            .unwrap();
        assert_eq!(by_name.id, device.id);

        let by_id = DeviceRepo::resolve(&mut conn, &DeviceRef::ById(device.id)).await.unwrap();
        assert_eq!(by_id.name, "router-test");

        let err = DeviceRepo::resolve(&mut conn, &DeviceRef::ByName("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::InvalidInput(_))
        ));

        let resolved = DeviceRepo::resolve(&mut conn, &DeviceRef::from(device.clone())).await.unwrap();
        assert_eq!(resolved, device);
        assert_eq!(DeviceRef::from(device).to_string(), "router-test");
    }

    #[tokio::test]
    async fn test_rename_unreferenced_device() {
        let store = testutil::store().await;
        let device = testutil::device(&store, "router-old").await;

        let renamed = store
            .rename_device(device.id, &RenameDeviceRequest { name: "router-new".into() })
            .await
            .unwrap();
        assert_eq!(renamed.name, "router-new");
    }

    #[tokio::test]
    async fn test_readdress_keeps_mask_change_allowed() {
        let store = testutil::store().await;
        let addr = testutil::address(&store, "10.0.0.1/31").await;

        let updated = store
            .update_ip_address(addr.id, &UpdateIpAddressRequest { address: "10.0.0.1/30".into() })
            .await
            .unwrap();
        assert_eq!(updated.address, "10.0.0.1/30");

        assert!(store
            .update_ip_address(addr.id, &UpdateIpAddressRequest { address: "not-an-ip".into() })
            .await
            .is_err());
    }
}
