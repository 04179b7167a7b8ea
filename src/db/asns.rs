use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::collections::BTreeSet;

use crate::error::CmdbError;
use crate::models::*;
use crate::reconcile::allocator;

use super::row_helpers::map_asn_row;

/// ASN database operations
pub struct AsnRepo;

impl AsnRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<Asn>> {
        let rows = sqlx::query("SELECT * FROM asns ORDER BY number, organization_name LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_asn_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Asn>> {
        let row = sqlx::query("SELECT * FROM asns WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_asn_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateAsnRequest) -> Result<Asn> {
        let mut tx = pool.begin().await?;
        let id = Self::insert(&mut tx, req.number, &req.organization_name).await?;
        tx.commit().await?;

        Self::get(pool, id).await?.context("ASN not found after creation")
    }

    /// Pick the lowest free number of the range and create it, in one
    /// transaction. The caller serializes concurrent allocations.
    pub async fn create_next_available(pool: &Pool<Sqlite>, req: &AvailableAsnRequest) -> Result<Asn> {
        let mut tx = pool.begin().await?;

        let rows = sqlx::query("SELECT number FROM asns WHERE number BETWEEN ? AND ?")
            .bind(req.min_asn)
            .bind(req.max_asn)
            .fetch_all(&mut *tx)
            .await?;
        let allocated: BTreeSet<u32> = rows.iter().map(|r| r.get::<u32, _>("number")).collect();

        let number = allocator::allocate_next_available(req.min_asn, req.max_asn, &allocated)?;
        let id = Self::insert(&mut tx, number, &req.organization_name).await?;
        tx.commit().await?;

        tracing::info!(
            "Allocated ASN {} for {} from {}-{}",
            number,
            req.organization_name,
            req.min_asn,
            req.max_asn
        );
        Self::get(pool, id).await?.context("ASN not found after creation")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM asns WHERE id = ?").bind(id).execute(pool).await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("ASN", &id.to_string()).into());
        }
        Ok(())
    }

    async fn insert(conn: &mut SqliteConnection, number: u32, organization_name: &str) -> Result<i64> {
        if number < BGP_MIN_ASN {
            return Err(CmdbError::invalid(format!("ASN must be between {} and {}", BGP_MIN_ASN, BGP_MAX_ASN)).into());
        }
        // One ASN per organization; numbers may repeat across organizations
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM asns WHERE organization_name = ?")
            .bind(organization_name)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_some() {
            return Err(CmdbError::Conflict(format!(
                "ASN with organization name {} already exists",
                organization_name
            ))
            .into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO asns (number, organization_name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(number)
        .bind(organization_name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
