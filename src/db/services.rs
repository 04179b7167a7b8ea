//! SNMP, Syslog and TACACS configuration. Each device has at most one
//! configuration of each kind, pointing to shared servers or communities
//! through a membership table.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::error::{CmdbError, FieldError};
use crate::models::*;

use super::devices::DeviceRepo;
use super::row_helpers::{bind_device_filter, get_id_list, none_if_empty, DEVICE_FILTER_WHERE};

/// Membership table linking a device configuration to shared members
struct Members {
    field: &'static str,
    table: &'static str,
    owner_column: &'static str,
    member_column: &'static str,
    member_table: &'static str,
}

const SNMP_COMMUNITIES: Members = Members {
    field: "community_ids",
    table: "snmp_community_members",
    owner_column: "snmp_id",
    member_column: "community_id",
    member_table: "snmp_communities",
};

const SYSLOG_SERVERS: Members = Members {
    field: "server_ids",
    table: "syslog_server_members",
    owner_column: "syslog_id",
    member_column: "server_id",
    member_table: "syslog_servers",
};

const TACACS_SERVERS: Members = Members {
    field: "server_ids",
    table: "tacacs_server_members",
    owner_column: "tacacs_id",
    member_column: "server_id",
    member_table: "tacacs_servers",
};

impl Members {
    /// Select expression yielding the member ids of `o` as a CSV column
    fn select_ids(&self) -> String {
        format!(
            "(SELECT GROUP_CONCAT(m.{}) FROM {} m WHERE m.{} = o.id) AS member_ids",
            self.member_column, self.table, self.owner_column
        )
    }

    async fn check(&self, conn: &mut SqliteConnection, ids: &[i64]) -> Result<()> {
        let mut errors = Vec::new();
        for &id in ids {
            let found: Option<(i64,)> =
                sqlx::query_as(&format!("SELECT id FROM {} WHERE id = ?", self.member_table))
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            if found.is_none() {
                errors.push(FieldError::unknown_reference(self.field, id));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CmdbError::Validation(errors).into())
        }
    }

    async fn insert(&self, conn: &mut SqliteConnection, owner_id: i64, ids: &[i64]) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
            self.table, self.owner_column, self.member_column
        );
        for &id in ids {
            sqlx::query(&sql).bind(owner_id).bind(id).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

/// Refuse a second configuration of the same kind on a device
async fn check_one_per_device(
    conn: &mut SqliteConnection,
    table: &str,
    label: &str,
    device: &Device,
) -> Result<()> {
    let existing: Option<(i64,)> = sqlx::query_as(&format!("SELECT id FROM {} WHERE device_id = ?", table))
        .bind(device.id)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Err(CmdbError::Conflict(format!(
            "device {} already has a {} configuration",
            device.name, label
        ))
        .into());
    }
    Ok(())
}

async fn delete_by_id(pool: &Pool<Sqlite>, table: &str, resource: &str, id: i64) -> Result<()> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(super::NotFoundError::new(resource, &id.to_string()).into());
    }
    Ok(())
}

// ========== SNMP ==========

fn map_snmp_community_row(row: &SqliteRow) -> SnmpCommunity {
    SnmpCommunity {
        id: row.get("id"),
        name: row.get("name"),
        community: row.get("community"),
        community_type: row.get("type"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct SnmpCommunityRepo;

impl SnmpCommunityRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<SnmpCommunity>> {
        let rows = sqlx::query("SELECT * FROM snmp_communities ORDER BY name LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_snmp_community_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateSnmpCommunityRequest) -> Result<SnmpCommunity> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO snmp_communities (name, community, type, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&req.name)
        .bind(&req.community)
        .bind(req.community_type)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let row = sqlx::query("SELECT * FROM snmp_communities WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await?;
        Ok(map_snmp_community_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "snmp_communities", "SNMP community", id).await
    }
}

const SELECT_SNMP: &str = r#"
    SELECT o.*, d.name AS device_name, {members}
    FROM snmp o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_snmp_row(row: &SqliteRow) -> Snmp {
    Snmp {
        id: row.get("id"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        location: row.get("location"),
        contact: row.get("contact"),
        community_ids: get_id_list(row, "member_ids"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct SnmpRepo;

impl SnmpRepo {
    fn select() -> String {
        SELECT_SNMP.replace("{members}", &SNMP_COMMUNITIES.select_ids())
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<Snmp>> {
        let sql = format!(
            "{} {} ORDER BY d.name LIMIT ? OFFSET ?",
            Self::select(),
            DEVICE_FILTER_WHERE
        );
        let rows = bind_device_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_snmp_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Snmp>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", Self::select()))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_snmp_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateSnmpRequest) -> Result<Snmp> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        check_one_per_device(&mut tx, "snmp", "SNMP", &device).await?;
        SNMP_COMMUNITIES.check(&mut tx, &req.community_ids).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO snmp (device_id, location, contact, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(&req.location)
        .bind(&req.contact)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        SNMP_COMMUNITIES.insert(&mut tx, id, &req.community_ids).await?;
        tx.commit().await?;

        Self::get(pool, id).await?.context("SNMP not found after creation")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "snmp", "SNMP", id).await
    }
}

// ========== Syslog ==========

fn map_syslog_server_row(row: &SqliteRow) -> SyslogServer {
    SyslogServer {
        id: row.get("id"),
        server_address: row.get("server_address"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct SyslogServerRepo;

impl SyslogServerRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<SyslogServer>> {
        let rows = sqlx::query("SELECT * FROM syslog_servers ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_syslog_server_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateSyslogServerRequest) -> Result<SyslogServer> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO syslog_servers (server_address, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(req.server_address.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let row = sqlx::query("SELECT * FROM syslog_servers WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await?;
        Ok(map_syslog_server_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "syslog_servers", "Syslog server", id).await
    }
}

const SELECT_SYSLOG: &str = r#"
    SELECT o.*, d.name AS device_name, {members}
    FROM syslog o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_syslog_row(row: &SqliteRow) -> Syslog {
    Syslog {
        id: row.get("id"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        server_ids: get_id_list(row, "member_ids"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct SyslogRepo;

impl SyslogRepo {
    fn select() -> String {
        SELECT_SYSLOG.replace("{members}", &SYSLOG_SERVERS.select_ids())
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<Syslog>> {
        let sql = format!(
            "{} {} ORDER BY d.name LIMIT ? OFFSET ?",
            Self::select(),
            DEVICE_FILTER_WHERE
        );
        let rows = bind_device_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_syslog_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Syslog>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", Self::select()))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_syslog_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateSyslogRequest) -> Result<Syslog> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        check_one_per_device(&mut tx, "syslog", "Syslog", &device).await?;
        SYSLOG_SERVERS.check(&mut tx, &req.server_ids).await?;

        let now = Utc::now();
        let result = sqlx::query("INSERT INTO syslog (device_id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(device.id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_rowid();
        SYSLOG_SERVERS.insert(&mut tx, id, &req.server_ids).await?;
        tx.commit().await?;

        Self::get(pool, id).await?.context("Syslog not found after creation")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "syslog", "Syslog", id).await
    }
}

// ========== TACACS ==========

fn map_tacacs_server_row(row: &SqliteRow) -> TacacsServer {
    TacacsServer {
        id: row.get("id"),
        server_address: row.get("server_address"),
        priority: row.get("priority"),
        tcp_port: row.get("tcp_port"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct TacacsServerRepo;

impl TacacsServerRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<TacacsServer>> {
        let rows = sqlx::query("SELECT * FROM tacacs_servers ORDER BY priority, id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_tacacs_server_row).collect())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateTacacsServerRequest) -> Result<TacacsServer> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tacacs_servers (server_address, priority, tcp_port, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(req.server_address.to_string())
        .bind(req.priority)
        .bind(req.tcp_port)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let row = sqlx::query("SELECT * FROM tacacs_servers WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await?;
        Ok(map_tacacs_server_row(&row))
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "tacacs_servers", "TACACS server", id).await
    }
}

const SELECT_TACACS: &str = r#"
    SELECT o.*, d.name AS device_name, {members}
    FROM tacacs o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_tacacs_row(row: &SqliteRow) -> Tacacs {
    Tacacs {
        id: row.get("id"),
        device_id: row.get("device_id"),
        device_name: row.get("device_name"),
        passkey: none_if_empty(row.get("passkey")),
        server_ids: get_id_list(row, "member_ids"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct TacacsRepo;

impl TacacsRepo {
    fn select() -> String {
        SELECT_TACACS.replace("{members}", &TACACS_SERVERS.select_ids())
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<Tacacs>> {
        let sql = format!(
            "{} {} ORDER BY d.name LIMIT ? OFFSET ?",
            Self::select(),
            DEVICE_FILTER_WHERE
        );
        let rows = bind_device_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;
        Ok(rows.iter().map(map_tacacs_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Tacacs>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", Self::select()))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_tacacs_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateTacacsRequest) -> Result<Tacacs> {
        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        check_one_per_device(&mut tx, "tacacs", "TACACS", &device).await?;
        TACACS_SERVERS.check(&mut tx, &req.server_ids).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tacacs (device_id, passkey, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(req.passkey.as_deref())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        TACACS_SERVERS.insert(&mut tx, id, &req.server_ids).await?;
        tx.commit().await?;

        Self::get(pool, id).await?.context("TACACS not found after creation")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        delete_by_id(pool, "tacacs", "TACACS", id).await
    }
}
