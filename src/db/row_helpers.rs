use anyhow::{Context, Result};
use ipnetwork::IpNetwork;
use sqlx::{sqlite::SqliteRow, Row};
use std::net::IpAddr;

use crate::models::*;

/// Filter empty strings to None, for columns storing '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Parse a prefix stored as text
pub fn get_network(row: &SqliteRow, column: &str) -> Result<IpNetwork> {
    let raw: String = row.get(column);
    raw.parse()
        .with_context(|| format!("Invalid prefix in {}: {}", column, raw))
}

/// Parse a nullable IP address stored as text
pub fn get_optional_ip(row: &SqliteRow, column: &str) -> Result<Option<IpAddr>> {
    match row.get::<Option<String>, _>(column) {
        Some(raw) if !raw.is_empty() => raw
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid IP address in {}: {}", column, raw)),
        _ => Ok(None),
    }
}

/// Parse a comma separated list of ids built with GROUP_CONCAT, sorted
pub fn get_id_list(row: &SqliteRow, column: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = row
        .get::<Option<String>, _>(column)
        .map(|csv| csv.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}

/// Map a SQLite row to a Device struct
pub fn map_device_row(row: &SqliteRow) -> Device {
    Device {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an IpAddress struct
pub fn map_ip_address_row(row: &SqliteRow) -> IpAddress {
    IpAddress {
        id: row.get("id"),
        address: row.get("address"),
        description: none_if_empty(row.get("description")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an Asn struct
pub fn map_asn_row(row: &SqliteRow) -> Asn {
    Asn {
        id: row.get("id"),
        number: row.get("number"),
        organization_name: row.get("organization_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Shared WHERE clause of device-scoped list endpoints. Expects the object
/// table aliased `o` and `devices` aliased `d`; bind with [`bind_list_filter`].
pub const LIST_FILTER_WHERE: &str = r#"
    WHERE (? IS NULL OR o.device_id = ?)
      AND (? IS NULL OR d.name = ?)
      AND (? IS NULL OR o.name = ?)
"#;

pub fn bind_list_filter<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &'q ListFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(filter.device_id)
        .bind(filter.device_id)
        .bind(filter.device_name.as_deref())
        .bind(filter.device_name.as_deref())
        .bind(filter.name.as_deref())
        .bind(filter.name.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
}

/// Like [`LIST_FILTER_WHERE`] for objects without a name of their own
pub const DEVICE_FILTER_WHERE: &str = r#"
    WHERE (? IS NULL OR o.device_id = ?)
      AND (? IS NULL OR d.name = ?)
"#;

pub fn bind_device_filter<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &'q ListFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(filter.device_id)
        .bind(filter.device_id)
        .bind(filter.device_name.as_deref())
        .bind(filter.device_name.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
}
