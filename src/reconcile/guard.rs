//! Uniqueness of BGP session pairs.
//!
//! A session pair is identified by its two endpoints, each a
//! `(device, local address)` couple. The order of the peers carries no
//! meaning, so `A <-> B` and `B <-> A` are the same adjacency.

use anyhow::Result;
use sqlx::{Row, SqliteConnection};

use crate::error::CmdbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionEndpoint {
    pub device_id: i64,
    pub local_address_id: i64,
}

/// The endpoints of a session pair, as stored (`a` is `peer_a`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub a: SessionEndpoint,
    pub b: SessionEndpoint,
}

impl EndpointPair {
    /// Same unordered endpoint set, in either orientation
    pub fn same_adjacency(&self, other: &EndpointPair) -> bool {
        (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
    }
}

/// A persisted session pair and its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingSession {
    pub id: i64,
    pub endpoints: EndpointPair,
}

/// Reject `candidate` when another session pair connects the same
/// endpoints. `exclude_id` is the pair being updated, if any.
pub fn check_duplicate_session(
    candidate: &EndpointPair,
    existing: &[ExistingSession],
    exclude_id: Option<i64>,
) -> Result<(), CmdbError> {
    let duplicate = existing
        .iter()
        .filter(|s| Some(s.id) != exclude_id)
        .any(|s| s.endpoints.same_adjacency(candidate));
    if duplicate {
        Err(CmdbError::DuplicateSession)
    } else {
        Ok(())
    }
}

/// Persisted session pairs whose endpoints could match `candidate` in
/// either orientation. Meant to run inside the write transaction.
pub async fn find_candidates(
    conn: &mut SqliteConnection,
    candidate: &EndpointPair,
) -> Result<Vec<ExistingSession>> {
    let rows = sqlx::query(
        r#"SELECT s.id,
                  pa.device_id AS a_device_id, pa.local_address_id AS a_address_id,
                  pb.device_id AS b_device_id, pb.local_address_id AS b_address_id
           FROM bgp_sessions s
           JOIN device_bgp_sessions pa ON s.peer_a_id = pa.id
           JOIN device_bgp_sessions pb ON s.peer_b_id = pb.id
           WHERE (pa.device_id = ? AND pa.local_address_id = ?)
              OR (pa.device_id = ? AND pa.local_address_id = ?)"#,
    )
    .bind(candidate.a.device_id)
    .bind(candidate.a.local_address_id)
    .bind(candidate.b.device_id)
    .bind(candidate.b.local_address_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ExistingSession {
            id: row.get("id"),
            endpoints: EndpointPair {
                a: SessionEndpoint {
                    device_id: row.get("a_device_id"),
                    local_address_id: row.get("a_address_id"),
                },
                b: SessionEndpoint {
                    device_id: row.get("b_device_id"),
                    local_address_id: row.get("b_address_id"),
                },
            },
        })
        .collect())
}
