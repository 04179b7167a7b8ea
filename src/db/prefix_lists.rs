use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::error::FieldError;
use crate::models::*;
use crate::protect;
use crate::reconcile::scope::RefTarget;
use crate::reconcile::{self, ParentScope, Stored, TermCollection};

use super::devices::DeviceRepo;
use super::row_helpers::{bind_list_filter, get_network, LIST_FILTER_WHERE};

const SELECT_PREFIX_LIST: &str = r#"
    SELECT o.*, d.name AS device_name
    FROM prefix_lists o
    JOIN devices d ON o.device_id = d.id
"#;

/// A prefix list as seen by its terms: terms are checked against its IP version
#[derive(Debug, Clone, Copy)]
pub struct PrefixListParent {
    pub scope: ParentScope,
    pub ip_version: IpVersion,
}

fn map_term_row(row: &SqliteRow) -> Result<Stored<PrefixListTerm>> {
    Ok(Stored {
        id: row.get("id"),
        term: PrefixListTerm {
            sequence: row.get("sequence"),
            decision: row.get("decision"),
            prefix: get_network(row, "prefix")?,
            le: row.get("le"),
            ge: row.get("ge"),
        },
    })
}

/// Prefix list terms, keyed by sequence
pub struct PrefixListTerms;

#[async_trait]
impl TermCollection for PrefixListTerms {
    type Key = u32;
    type Term = PrefixListTerm;
    type Desired = PrefixListTermInput;
    type Parent = PrefixListParent;

    const LABEL: &'static str = "prefix list";

    fn scope(parent: &PrefixListParent) -> ParentScope {
        parent.scope
    }

    fn term_key(term: &PrefixListTerm) -> u32 {
        term.sequence
    }

    fn desired_key(desired: &PrefixListTermInput) -> u32 {
        desired.sequence
    }

    fn create(desired: &PrefixListTermInput) -> PrefixListTerm {
        desired.to_term()
    }

    fn merge(desired: &PrefixListTermInput, term: &mut PrefixListTerm) {
        desired.apply(term);
    }

    fn check(parent: &PrefixListParent, term: &PrefixListTerm) -> Vec<FieldError> {
        term.check(parent.ip_version)
            .into_iter()
            .map(|(field, msg)| FieldError::invalid(field, msg))
            .collect()
    }

    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<PrefixListTerm>>> {
        let rows = sqlx::query("SELECT * FROM prefix_list_terms WHERE prefix_list_id = ? ORDER BY sequence")
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(map_term_row).collect()
    }

    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &PrefixListTerm) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO prefix_list_terms (prefix_list_id, sequence, decision, prefix, le, ge, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(parent_id)
        .bind(term.sequence)
        .bind(term.decision)
        .bind(term.prefix.to_string())
        .bind(term.le)
        .bind(term.ge)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, row_id: i64, term: &PrefixListTerm) -> Result<()> {
        sqlx::query(
            "UPDATE prefix_list_terms SET decision = ?, prefix = ?, le = ?, ge = ?, updated_at = ? WHERE id = ?",
        )
        .bind(term.decision)
        .bind(term.prefix.to_string())
        .bind(term.le)
        .bind(term.ge)
        .bind(Utc::now())
        .bind(row_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM prefix_list_terms WHERE id = ?")
            .bind(row_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Prefix list database operations
pub struct PrefixListRepo;

impl PrefixListRepo {
    pub async fn list(pool: &Pool<Sqlite>, filter: &ListFilter) -> Result<Vec<PrefixList>> {
        let sql = format!(
            "{} {} ORDER BY d.name, o.name LIMIT ? OFFSET ?",
            SELECT_PREFIX_LIST, LIST_FILTER_WHERE
        );
        let rows = bind_list_filter(sqlx::query(&sql), filter).fetch_all(pool).await?;

        let mut conn = pool.acquire().await?;
        let mut lists = Vec::with_capacity(rows.len());
        for row in &rows {
            lists.push(Self::with_terms(&mut conn, row).await?);
        }
        Ok(lists)
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<PrefixList>> {
        let mut conn = pool.acquire().await?;
        Self::get_with(&mut conn, id).await
    }

    async fn get_with(conn: &mut SqliteConnection, id: i64) -> Result<Option<PrefixList>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_PREFIX_LIST))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::with_terms(conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn with_terms(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<PrefixList> {
        let id: i64 = row.get("id");
        let terms = PrefixListTerms::load(conn, id).await?;
        Ok(PrefixList {
            id,
            name: row.get("name"),
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            ip_version: row.get("ip_version"),
            terms: terms.into_iter().map(|s| s.term).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Create a prefix list together with its terms
    pub async fn create(pool: &Pool<Sqlite>, req: &PrefixListRequest) -> Result<PrefixList> {
        reconcile::check_submission::<PrefixListTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO prefix_lists (device_id, name, ip_version, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device.id)
        .bind(&req.name)
        .bind(req.ip_version)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let parent = PrefixListParent {
            scope: ParentScope { id, device_id: device.id },
            ip_version: req.ip_version,
        };
        reconcile::reconcile::<PrefixListTerms>(&mut tx, &parent, &req.terms).await?;

        let list = Self::get_with(&mut tx, id)
            .await?
            .context("Prefix list not found after creation")?;
        tx.commit().await?;
        Ok(list)
    }

    /// Update a prefix list and reconcile its terms with the submitted list
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &PrefixListRequest) -> Result<PrefixList> {
        reconcile::check_submission::<PrefixListTerms>(&req.terms)?;

        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            "UPDATE prefix_lists SET name = ?, ip_version = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&req.name)
        .bind(req.ip_version)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Prefix list", &id.to_string()).into());
        }
        let device = DeviceRepo::resolve(&mut tx, &req.device).await?;
        protect::check_device_move(&mut tx, RefTarget::PrefixList, id, device.id).await?;
        sqlx::query("UPDATE prefix_lists SET device_id = ? WHERE id = ?")
            .bind(device.id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let parent = PrefixListParent {
            scope: ParentScope { id, device_id: device.id },
            ip_version: req.ip_version,
        };
        reconcile::reconcile::<PrefixListTerms>(&mut tx, &parent, &req.terms).await?;

        let list = Self::get_with(&mut tx, id)
            .await?
            .context("Prefix list not found after update")?;
        tx.commit().await?;
        Ok(list)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM prefix_lists WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Prefix list", &id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::error::CmdbError;

    fn request(device: &str, terms: &str) -> PrefixListRequest {
        serde_json::from_str(&format!(
            r#"{{"name": "PF-TEST", "device": {{"name": "{}"}}, "terms": {}}}"#,
            device, terms
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_update_partitions_terms() {
        let store = testutil::store().await;
        testutil::device(&store, "router-test").await;

        let created = store
            .create_prefix_list(&request(
                "router-test",
                r#"[{"sequence": 5, "prefix": "10.0.0.0/8"},
                    {"sequence": 10, "prefix": "10.1.0.0/16", "decision": "deny"},
                    {"sequence": 15, "prefix": "10.2.0.0/16"}]"#,
            ))
            .await
            .unwrap();
        assert_eq!(created.terms.len(), 3);

        let updated = store
            .update_prefix_list(
                created.id,
                &request(
                    "router-test",
                    r#"[{"sequence": 10, "prefix": "10.1.0.0/16", "le": 24},
                        {"sequence": 20, "prefix": "10.3.0.0/16"}]"#,
                ),
            )
            .await
            .unwrap();

        let seqs: Vec<u32> = updated.terms.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![10, 20]);
        // decision was not resubmitted and keeps its stored value
        assert_eq!(updated.terms[0].decision, Decision::Deny);
        assert_eq!(updated.terms[0].le, Some(24));
    }

    #[tokio::test]
    async fn test_resubmission_changes_nothing() {
        let store = testutil::store().await;
        testutil::device(&store, "router-test").await;
        let terms = r#"[{"sequence": 5, "prefix": "10.0.0.0/8", "ge": 16, "le": 24}]"#;

        let created = store.create_prefix_list(&request("router-test", terms)).await.unwrap();
        let again = store
            .update_prefix_list(created.id, &request("router-test", terms))
            .await
            .unwrap();
        assert_eq!(created.terms, again.terms);
    }

    #[tokio::test]
    async fn test_empty_terms_rejected() {
        let store = testutil::store().await;
        testutil::device(&store, "router-test").await;

        let err = store.create_prefix_list(&request("router-test", "[]")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::EmptyCollection { .. })
        ));
        assert!(store.list_prefix_lists(&ListFilter { limit: 100, ..Default::default() })
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_term_rolls_back_update() {
        let store = testutil::store().await;
        testutil::device(&store, "router-test").await;
        let created = store
            .create_prefix_list(&request("router-test", r#"[{"sequence": 5, "prefix": "10.0.0.0/8"}]"#))
            .await
            .unwrap();

        let err = store
            .update_prefix_list(
                created.id,
                &request(
                    "router-test",
                    r#"[{"sequence": 10, "prefix": "10.0.0.0/8"},
                        {"sequence": 20, "prefix": "2001:db8::/32"}]"#,
                ),
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<CmdbError>() {
            Some(CmdbError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].term.as_deref(), Some("20"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let stored = store.get_prefix_list(created.id).await.unwrap().unwrap();
        let seqs: Vec<u32> = stored.terms.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![5]);
    }

    #[tokio::test]
    async fn test_referenced_list_stays_on_its_device() {
        let store = testutil::store().await;
        testutil::device(&store, "router-a").await;
        testutil::device(&store, "router-b").await;
        let terms = r#"[{"sequence": 5, "prefix": "10.0.0.0/8"}]"#;

        let pinned = store.create_prefix_list(&request("router-a", terms)).await.unwrap();
        let policy: RoutePolicyRequest = serde_json::from_value(serde_json::json!({
            "name": "RM-IMPORT",
            "device": {"name": "router-a"},
            "terms": [{"sequence": 10, "from_prefix_list_id": pinned.id}],
        }))
        .unwrap();
        store.create_route_policy(&policy).await.unwrap();

        let err = store
            .update_prefix_list(pinned.id, &request("router-b", terms))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CmdbError>(),
            Some(CmdbError::Protected {
                anchor: "Prefix list device",
                entity: "route policy term",
            })
        ));
        let stored = store.get_prefix_list(pinned.id).await.unwrap().unwrap();
        assert_eq!(stored.device_name, "router-a");

        // Unreferenced lists move freely
        let mut free = request("router-a", terms);
        free.name = "PF-FREE".to_string();
        let free_list = store.create_prefix_list(&free).await.unwrap();
        free.device = DeviceRef::ByName("router-b".to_string());
        let moved = store.update_prefix_list(free_list.id, &free).await.unwrap();
        assert_eq!(moved.device_name, "router-b");
    }
}
