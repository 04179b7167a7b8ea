use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::models::*;
use crate::protect;
use crate::reconcile::scope::RefTarget;
use crate::reconcile::{self, ParentScope, Stored, TermCollection};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, LIST_FILTER_WHERE};

const SELECT_COMMUNITY_LIST: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM bgp_community_lists o
    JOIN devices d ON o.device_id = d.id
"#;

fn map_term_row(row: &SqliteRow) -> Stored<BgpCommunityListTerm> {
    Stored {
        id: row.get("id"),
        term: BgpCommunityListTerm {
            sequence: row.get("sequence"),
            decision: row.get("decision"),
            community: row.get("community"),
        },
    }
}

/// BGP community list terms, keyed by sequence
pub struct CommunityListTerms;

#[async_trait]
impl TermCollection for CommunityListTerms {
    type Key = u32;
    type Term = BgpCommunityListTerm;
    type Desired = BgpCommunityListTermInput;
    type Parent = ParentScope;

    const LABEL: &'static str = "BGP community list";

    fn scope(parent: &ParentScope) -> ParentScope {
        *parent
    }

    fn term_key(term: &BgpCommunityListTerm) -> u32 {
        term.sequence
    }

    fn desired_key(desired: &BgpCommunityListTermInput) -> u32 {
        desired.sequence
    }

    fn create(desired: &BgpCommunityListTermInput) -> BgpCommunityListTerm {
        desired.to_term()
    }

    fn merge(desired: &BgpCommunityListTermInput, term: &mut BgpCommunityListTerm) {
        desired.apply(term);
    }

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<BgpCommunityListTerm>>> {
        let rows = sqlx::query(
            "SELECT * FROM bgp_community_list_terms WHERE bgp_community_list_id = ? ORDER BY sequence",
        )
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_term_row).collect())
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &BgpCommunityListTerm) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO bgp_community_list_terms (bgp_community_list_id, sequence, decision, community, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(parent_id)
        .bind(term.sequence)
        .bind(term.decision)
        .bind(&term.community)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, term: &BgpCommunityListTerm) -> Result<()> {
        sqlx::query("UPDATE bgp_community_list_terms SET decision = ?, community = ?, updated_at = ? WHERE id = ?")
            .bind(term.decision)
            .bind(&term.community)
            .bind(Utc::now())
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bgp_community_list_terms WHERE id = ?")
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// BGP community list database operations
pub struct CommunityListRepo;

impl CommunityListRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<BgpCommunityList>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_COMMUNITY_LIST, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;

        let mut conn = pool.acquire().await?;
        let mut lists = Vec::with_capacity(rows.len());
        for row in &rows {
            lists.push(Self::with_terms(&mut conn, row).await?);
        }
        Ok(lists)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<BgpCommunityList>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<BgpCommunityList>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_COMMUNITY_LIST))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_terms(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_terms(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<BgpCommunityList> {
        let id: i64 = row.get("id");
        let terms = CommunityListTerms::load(conn, id).await?;
        Ok(BgpCommunityList {
            id,
            name: row.get("name"),
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            terms: terms.into_iter().map(|s| s.term).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &BgpCommunityListRequest) -> Result<BgpCommunityList> {
        reconcile::check_submission::<CommunityListTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO bgp_community_lists (device_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let scope = ParentScope { id, device_id: device.id };
        reconcile::reconcile::<CommunityListTerms>(&mut tx, &scope, &req.terms).await?;

        let list = Self::get_with(&mut tx, id)
            .await?
            .context("BGP community list not found after creation")?;
        tx.commit().await?;
        Ok(list)
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &BgpCommunityListRequest) -> Result<BgpCommunityList> {
        reconcile::check_submission::<CommunityListTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        protect::check_device_move(&mut tx, RefTarget::BgpCommunityList, id, device.id).await?;
        let result = sqlx::query(
            "UPDATE bgp_community_lists SET name = ?, device_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&req.name)
        .bind(device.id)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("BGP community list", &id.to_string()).into());
        }

        let scope = ParentScope { id, device_id: device.id };
        reconcile::reconcile::<CommunityListTerms>(&mut tx, &scope, &req.terms).await?;

        let list = Self::get_with(&mut tx, id)
            .await?
            .context("BGP community list not found after update")?;
        tx.commit().await?;
        Ok(list)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM bgp_community_lists WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("BGP community list", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::error::CmdbError;

    fn request(device: &str, terms: &str) -> BgpCommunityListRequest {
        serde_json::from_str(&format!(
            r#"{{"name": "CL-TEST", "device": {{"name": "{}"}}, "terms": {}}}"#,
            device, terms
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_sequences_rejected() {
        let store = testutil::store().await;
        testutil::device(&store, "router-test").await;

        let err = store
            .create_community_list(&request(
                "router-test",
                r#"[{"sequence": 5, "community": "65000:1"}, {"sequence": 5, "community": "65000:2"}]"#,
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_device_name() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let terms = r#"[{"sequence": 10, "community": "65000:100"}]"#;
        store.create_community_list(&request("router-a", terms)).await.unwrap();
        store.create_community_list(&request("router-b", terms)).await.unwrap();

        let filter = ListFilter {
            device_name: Some("router-b".into()),
            limit: 100,
            ..Default::default()
        };
        let lists = store.list_community_lists(&filter).await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].device_name, "router-b");
        assert_eq!(lists[0].terms[0].decision, Decision::Permit);
    }
}
