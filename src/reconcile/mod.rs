//! Ordered-term reconciliation.
//!
//! Every list-like configuration object (route policy terms, prefix list
//! terms, AFI/SAFI sets, ...) is stored as rows keyed by `(parent, key)`.
//! A client always submits the complete desired list; [`reconcile`] turns
//! the stored rows into exactly that list: keys present on both sides are
//! updated in place, new keys are created and stored keys that were not
//! submitted are deleted.
//!
//! The whole submission is planned and validated before the first write,
//! inside one transaction (a savepoint when the caller already holds one),
//! so a rejected submission leaves the stored collection untouched.

pub mod allocator;
pub mod guard;
pub mod scope;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{CmdbError, FieldError};
use scope::CrossRef;

/// Identity of the object owning a collection: its row id and the device
/// every cross-reference of its terms must belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentScope {
    pub id: i64,
    pub device_id: i64,
}

/// A term as read back from storage, with its row id
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: i64,
    pub term: T,
}

/// A family of keyed terms stored under a parent.
///
/// Implementations describe how a desired entry is keyed and merged, which
/// other objects a term points to, and how terms are read and written.
/// The reconciliation algorithm itself lives in [`reconcile`].
#[async_trait]
pub trait TermCollection: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync;
    type Term: Clone + Send + Sync;
    type Desired: Send + Sync;
    type Parent: Send + Sync;

    /// Human name used in error messages ("route policy")
    const LABEL: &'static str;
    /// Whether an empty desired list is accepted (and deletes every term)
    const ALLOW_EMPTY: bool = false;

    fn scope(parent: &Self::Parent) -> ParentScope;

    fn term_key(term: &Self::Term) -> Self::Key;
    fn desired_key(desired: &Self::Desired) -> Self::Key;

    /// Build a new term from a desired entry
    fn create(desired: &Self::Desired) -> Self::Term;
    /// Apply a desired entry onto an existing term. Fields the entry does
    /// not carry stay as they are; the key never changes.
    fn merge(desired: &Self::Desired, term: &mut Self::Term);

    /// Device-scoped objects referenced by a term
    fn cross_references(_term: &Self::Term) -> Vec<CrossRef> {
        Vec::new()
    }

    /// Term-level constraints that depend on the parent
    fn check(_parent: &Self::Parent, _term: &Self::Term) -> Vec<FieldError> {
        Vec::new()
    }

    /// Current terms of a parent, in key order
    async fn load(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Stored<Self::Term>>>;
    async fn insert(conn: &mut SqliteConnection, parent_id: i64, term: &Self::Term) -> Result<i64>;
    async fn update(conn: &mut SqliteConnection, row_id: i64, term: &Self::Term) -> Result<()>;
    async fn delete(conn: &mut SqliteConnection, row_id: i64) -> Result<()>;

    /// Write what hangs below a term (nested collections). Runs after the
    /// term row itself has been written.
    async fn write_children(
        _conn: &mut SqliteConnection,
        _parent: &Self::Parent,
        _row_id: i64,
        _desired: &Self::Desired,
    ) -> Result<()> {
        Ok(())
    }
}

/// One planned write, in desired order
#[derive(Debug, Clone, PartialEq)]
pub enum Write<T> {
    Create(T),
    Update { id: i64, term: T },
}

impl<T> Write<T> {
    pub fn term(&self) -> &T {
        match self {
            Write::Create(term) => term,
            Write::Update { term, .. } => term,
        }
    }
}

/// The full set of changes turning the stored collection into the desired one
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<T> {
    pub writes: Vec<Write<T>>,
    pub deletes: Vec<Stored<T>>,
}

/// Counts of what a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Reject empty submissions (unless the collection allows them) and
/// submissions naming the same key twice.
pub fn check_submission<C: TermCollection>(desired: &[C::Desired]) -> Result<(), CmdbError> {
    if desired.is_empty() && !C::ALLOW_EMPTY {
        return Err(CmdbError::EmptyCollection { collection: C::LABEL });
    }

    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for entry in desired {
        let key = C::desired_key(entry);
        if !seen.insert(key.clone()) {
            let key = key.to_string();
            if !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }
    }
    if !duplicates.is_empty() {
        return Err(CmdbError::DuplicateKey {
            collection: C::LABEL,
            keys: duplicates.join(", "),
        });
    }
    Ok(())
}

/// Compute the writes and deletes for a submission, without touching storage.
/// Assumes the submission passed [`check_submission`].
pub fn plan<C: TermCollection>(
    current: Vec<Stored<C::Term>>,
    desired: &[C::Desired],
) -> Plan<C::Term> {
    let mut by_key: HashMap<C::Key, Stored<C::Term>> = HashMap::with_capacity(current.len());
    let mut order = Vec::with_capacity(current.len());
    for stored in current {
        let key = C::term_key(&stored.term);
        order.push(key.clone());
        by_key.insert(key, stored);
    }

    let writes = desired
        .iter()
        .map(|entry| match by_key.remove(&C::desired_key(entry)) {
            Some(Stored { id, mut term }) => {
                C::merge(entry, &mut term);
                Write::Update { id, term }
            }
            None => Write::Create(C::create(entry)),
        })
        .collect();

    let deletes = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();

    Plan { writes, deletes }
}

/// Validation problems of the planned terms: cross-references must exist
/// and belong to the parent's device, term-level constraints must hold.
async fn planned_errors<C: TermCollection>(
    conn: &mut SqliteConnection,
    parent: &C::Parent,
    plan: &Plan<C::Term>,
) -> Result<Vec<FieldError>> {
    let scope = C::scope(parent);
    let mut errors = Vec::new();
    for write in &plan.writes {
        let term = write.term();
        let label = C::term_key(term).to_string();

        let refs = C::cross_references(term);
        let resolved = scope::resolve(conn, &refs).await?;
        if let Err(found) = scope::validate_cross_references(scope.device_id, &resolved) {
            errors.extend(found.into_iter().map(|e| e.in_term(label.clone())));
        }
        errors.extend(C::check(parent, term).into_iter().map(|e| e.in_term(label.clone())));
    }
    Ok(errors)
}

/// Dry run of [`reconcile`]: everything that would make the submission fail
/// validation, without writing. Lets callers owning several collections
/// report all problems at once before touching any of them.
pub async fn validate<C: TermCollection>(
    conn: &mut SqliteConnection,
    parent: &C::Parent,
    desired: &[C::Desired],
) -> Result<Vec<FieldError>> {
    check_submission::<C>(desired)?;
    let current = C::load(conn, C::scope(parent).id).await?;
    let plan = plan::<C>(current, desired);
    planned_errors::<C>(conn, parent, &plan).await
}

/// Make the stored terms of `parent` match `desired`.
///
/// Checks the submission, plans the changes and validates every planned
/// term. All problems are reported together as one `Validation` error and
/// nothing is written in that case.
pub async fn reconcile<C: TermCollection>(
    conn: &mut SqliteConnection,
    parent: &C::Parent,
    desired: &[C::Desired],
) -> Result<ReconcileReport> {
    check_submission::<C>(desired)?;
    let scope = C::scope(parent);

    let mut tx = conn.begin().await?;

    let current = C::load(&mut tx, scope.id).await?;
    let plan = plan::<C>(current, desired);

    let errors = planned_errors::<C>(&mut tx, parent, &plan).await?;
    if !errors.is_empty() {
        return Err(CmdbError::Validation(errors).into());
    }

    let mut report = ReconcileReport::default();
    for (write, entry) in plan.writes.iter().zip(desired) {
        let row_id = match write {
            Write::Create(term) => {
                report.created += 1;
                C::insert(&mut tx, scope.id, term).await?
            }
            Write::Update { id, term } => {
                report.updated += 1;
                C::update(&mut tx, *id, term).await?;
                *id
            }
        };
        C::write_children(&mut tx, parent, row_id, entry).await?;
    }
    for stored in &plan.deletes {
        C::delete(&mut tx, stored.id).await?;
        report.deleted += 1;
    }

    tx.commit().await?;

    tracing::debug!(
        "Reconciled {} {}: {} created, {} updated, {} deleted",
        C::LABEL,
        scope.id,
        report.created,
        report.updated,
        report.deleted
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory collection used to exercise the pure parts of the algorithm
    struct Fake;

    #[derive(Debug, Clone, PartialEq)]
    struct FakeTerm {
        seq: u32,
        value: String,
        note: String,
    }

    struct FakeInput {
        seq: u32,
        value: String,
        note: Option<String>,
    }

    fn input(seq: u32, value: &str) -> FakeInput {
        FakeInput {
            seq,
            value: value.to_string(),
            note: None,
        }
    }

    fn stored(id: i64, seq: u32, value: &str) -> Stored<FakeTerm> {
        Stored {
            id,
            term: FakeTerm {
                seq,
                value: value.to_string(),
                note: "kept".to_string(),
            },
        }
    }

    #[async_trait]
    impl TermCollection for Fake {
        type Key = u32;
        type Term = FakeTerm;
        type Desired = FakeInput;
        type Parent = ParentScope;

        const LABEL: &'static str = "fake list";

        fn scope(parent: &ParentScope) -> ParentScope {
            *parent
        }

        fn term_key(term: &FakeTerm) -> u32 {
            term.seq
        }

        fn desired_key(desired: &FakeInput) -> u32 {
            desired.seq
        }

        fn create(desired: &FakeInput) -> FakeTerm {
            FakeTerm {
                seq: desired.seq,
                value: desired.value.clone(),
                note: desired.note.clone().unwrap_or_default(),
            }
        }

        fn merge(desired: &FakeInput, term: &mut FakeTerm) {
            term.value = desired.value.clone();
            if let Some(note) = &desired.note {
                term.note = note.clone();
            }
        }

        async fn load(_: &mut SqliteConnection, _: i64) -> Result<Vec<Stored<FakeTerm>>> {
            Ok(Vec::new())
        }

        async fn insert(_: &mut SqliteConnection, _: i64, _: &FakeTerm) -> Result<i64> {
            Ok(0)
        }

        async fn update(_: &mut SqliteConnection, _: i64, _: &FakeTerm) -> Result<()> {
            Ok(())
        }

        async fn delete(_: &mut SqliteConnection, _: i64) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plan_partitions_keys() {
        let current = vec![stored(1, 5, "a"), stored(2, 10, "b"), stored(3, 15, "c")];
        let desired = vec![input(10, "b2"), input(20, "d")];

        let plan = plan::<Fake>(current, &desired);

        assert_eq!(plan.writes.len(), 2);
        match &plan.writes[0] {
            Write::Update { id, term } => {
                assert_eq!(*id, 2);
                assert_eq!(term.value, "b2");
                // absent field keeps its stored value
                assert_eq!(term.note, "kept");
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert!(matches!(&plan.writes[1], Write::Create(t) if t.seq == 20));

        let deleted: Vec<u32> = plan.deletes.iter().map(|s| s.term.seq).collect();
        assert_eq!(deleted, vec![5, 15]);
    }

    #[test]
    fn test_plan_keeps_desired_order() {
        let current = vec![stored(1, 5, "a"), stored(2, 10, "b")];
        let desired = vec![input(10, "b"), input(1, "new"), input(5, "a")];

        let plan = plan::<Fake>(current, &desired);
        let keys: Vec<u32> = plan.writes.iter().map(|w| w.term().seq).collect();
        assert_eq!(keys, vec![10, 1, 5]);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_resubmission_is_all_updates() {
        let current = vec![stored(1, 5, "a"), stored(2, 10, "b")];
        let desired = vec![input(5, "a"), input(10, "b")];

        let plan = plan::<Fake>(current, &desired);
        assert!(plan
            .writes
            .iter()
            .all(|w| matches!(w, Write::Update { .. })));
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_empty_submission_rejected() {
        let err = check_submission::<Fake>(&[]).unwrap_err();
        assert!(matches!(err, CmdbError::EmptyCollection { collection: "fake list" }));
        assert_eq!(
            err.to_string(),
            "input is not valid, you must have at least one term in your fake list"
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let desired = vec![input(5, "a"), input(10, "b"), input(5, "c"), input(5, "d")];
        match check_submission::<Fake>(&desired) {
            Err(CmdbError::DuplicateKey { keys, .. }) => assert_eq!(keys, "5"),
            other => panic!("expected duplicate key error, got {:?}", other),
        }
    }
}
