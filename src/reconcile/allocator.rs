//! Lowest-free identifier allocation.
//!
//! Finding the next free AS number and creating it must not interleave with
//! another allocation, or two callers would get the same number. Callers
//! hold a [`NamedLocks`] guard for the whole check-and-create.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::error::CmdbError;

/// Smallest value of `[min, max]` absent from `allocated`, or `None` when
/// the range is exhausted or empty.
pub fn first_available(min: u32, max: u32, allocated: &BTreeSet<u32>) -> Option<u32> {
    if min > max {
        return None;
    }
    let mut candidate = min;
    for &used in allocated.range(min..=max) {
        if used != candidate {
            break;
        }
        if candidate == max {
            return None;
        }
        candidate += 1;
    }
    Some(candidate)
}

/// Validate the requested range and pick the smallest free value
pub fn allocate_next_available(
    min: u32,
    max: u32,
    allocated: &BTreeSet<u32>,
) -> Result<u32, CmdbError> {
    if min > max {
        return Err(CmdbError::invalid(format!(
            "min_asn ({}) must be lower than or equal to max_asn ({})",
            min, max
        )));
    }
    first_available(min, max, allocated).ok_or(CmdbError::NoIdentifierAvailable { min, max })
}

/// Process-wide mutexes keyed by name
#[derive(Default)]
pub struct NamedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock called `name`. It is released when the guard drops.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_first_gap() {
        assert_eq!(first_available(1, 10, &set(&[1, 2, 4])), Some(3));
        assert_eq!(first_available(1, 10, &set(&[])), Some(1));
        assert_eq!(first_available(5, 10, &set(&[1, 2, 3])), Some(5));
        assert_eq!(first_available(1, 3, &set(&[1, 2])), Some(3));
    }

    #[test]
    fn test_exhausted_range() {
        assert_eq!(first_available(1, 3, &set(&[1, 2, 3])), None);
        assert_eq!(first_available(7, 7, &set(&[7])), None);
        assert_eq!(first_available(u32::MAX, u32::MAX, &set(&[u32::MAX])), None);
        assert!(matches!(
            allocate_next_available(1, 3, &set(&[1, 2, 3])),
            Err(CmdbError::NoIdentifierAvailable { min: 1, max: 3 })
        ));
    }

    #[test]
    fn test_inverted_range_is_invalid() {
        assert_eq!(first_available(10, 1, &set(&[])), None);
        assert!(matches!(
            allocate_next_available(10, 1, &set(&[])),
            Err(CmdbError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_named_lock_serializes_holders() {
        let locks = Arc::new(NamedLocks::new());
        let guard = locks.acquire("create-next-available-asn").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("create-next-available-asn").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // other names are independent
        let _other = locks.acquire("something-else").await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
