//! Keyed read/write locks, one per `(board, column)` partition.
//!
//! Guards for several partitions are always taken in ascending key order so two
//! moves travelling in opposite directions cannot deadlock.

use crate::domain::PartitionKey;
use crate::error::{HlaviError, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockMap = HashMap<PartitionKey, Arc<RwLock<()>>>;

enum Guard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// Holds partition locks until dropped
pub struct PartitionGuard {
    partitions: Vec<PartitionKey>,
    guards: Vec<Guard>,
    locks: Arc<Mutex<LockMap>>,
}

impl PartitionGuard {
    pub fn partitions(&self) -> &[PartitionKey] {
        &self.partitions
    }
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        self.guards.clear();
        prune(&self.locks, &self.partitions);
    }
}

/// Keyed lock table. Entries exist only while some caller holds or awaits them.
pub struct PartitionLocks {
    locks: Arc<Mutex<LockMap>>,
    timeout: Duration,
}

impl PartitionLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Exclusive access to every partition in `keys`
    pub async fn write(&self, keys: impl IntoIterator<Item = PartitionKey>) -> Result<PartitionGuard> {
        self.acquire(keys, true).await
    }

    /// Shared access to every partition in `keys`
    pub async fn read(&self, keys: impl IntoIterator<Item = PartitionKey>) -> Result<PartitionGuard> {
        self.acquire(keys, false).await
    }

    /// Number of partitions currently tracked
    pub fn tracked(&self) -> usize {
        lock_map(&self.locks).len()
    }

    async fn acquire(
        &self,
        keys: impl IntoIterator<Item = PartitionKey>,
        exclusive: bool,
    ) -> Result<PartitionGuard> {
        let ordered: BTreeSet<PartitionKey> = keys.into_iter().collect();
        let partitions: Vec<PartitionKey> = ordered.into_iter().collect();

        let handles: Vec<Arc<RwLock<()>>> = {
            let mut locks = lock_map(&self.locks);
            partitions
                .iter()
                .map(|key| Arc::clone(locks.entry(key.clone()).or_default()))
                .collect()
        };

        let acquisition = async {
            let mut guards = Vec::with_capacity(handles.len());
            for handle in handles {
                let guard = if exclusive {
                    Guard::Write(handle.write_owned().await)
                } else {
                    Guard::Read(handle.read_owned().await)
                };
                guards.push(guard);
            }
            guards
        };

        let outcome = tokio::time::timeout(self.timeout, acquisition).await;
        match outcome {
            Ok(guards) => Ok(PartitionGuard {
                partitions,
                guards,
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                prune(&self.locks, &partitions);
                let names: Vec<String> = partitions.iter().map(|p| p.to_string()).collect();
                tracing::warn!(partitions = ?names, timeout = ?self.timeout, "partition lock timed out");
                Err(HlaviError::ConcurrencyConflict(format!(
                    "timed out after {:?} waiting for partitions {}",
                    self.timeout,
                    names.join(", ")
                )))
            }
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    // The map is only ever mutated by whole-entry inserts and removes.
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes entries for `keys` that nobody else holds or waits on
fn prune(locks: &Mutex<LockMap>, keys: &[PartitionKey]) {
    let mut locks = lock_map(locks);
    for key in keys {
        if locks
            .get(key)
            .map_or(false, |handle| Arc::strong_count(handle) == 1)
        {
            locks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoardId;

    fn key(column: &str) -> PartitionKey {
        PartitionKey::new(BoardId::default(), column.into())
    }

    #[tokio::test]
    async fn test_keys_are_sorted_and_deduplicated() {
        let locks = PartitionLocks::new(Duration::from_millis(100));
        let guard = locks
            .write(vec![key("todo"), key("done"), key("todo")])
            .await
            .unwrap();

        assert_eq!(guard.partitions(), &[key("done"), key("todo")]);
    }

    #[tokio::test]
    async fn test_writer_times_out_while_held() {
        let locks = PartitionLocks::new(Duration::from_millis(50));
        let _held = locks.write(vec![key("todo")]).await.unwrap();

        let err = locks.write(vec![key("todo")]).await.err().unwrap();
        assert!(err.is_retryable());

        // Other partitions stay available.
        assert!(locks.write(vec![key("done")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_readers_share_but_block_writers() {
        let locks = PartitionLocks::new(Duration::from_millis(50));
        let _r1 = locks.read(vec![key("todo")]).await.unwrap();
        let _r2 = locks.read(vec![key("todo")]).await.unwrap();

        assert!(locks.write(vec![key("todo")]).await.is_err());
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let locks = PartitionLocks::new(Duration::from_millis(50));
        {
            let _held = locks.write(vec![key("todo")]).await.unwrap();
        }
        assert!(locks.write(vec![key("todo")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_partitions_are_forgotten() {
        let locks = PartitionLocks::new(Duration::from_millis(50));
        for i in 0..1000 {
            let _guard = locks.write(vec![key(&format!("column-{}", i))]).await.unwrap();
        }
        for i in 0..10 {
            let _guard = locks.read(vec![key(&format!("column-{}", i))]).await.unwrap();
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_held_partition_survives_other_release() {
        let locks = PartitionLocks::new(Duration::from_millis(50));
        let held = locks.read(vec![key("todo")]).await.unwrap();
        drop(locks.read(vec![key("todo"), key("done")]).await.unwrap());
        assert_eq!(locks.tracked(), 1);

        // A timed-out writer leaves nothing behind either.
        assert!(locks.write(vec![key("todo")]).await.is_err());
        assert_eq!(locks.tracked(), 1);

        drop(held);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_opposite_order_requests_do_not_deadlock() {
        let locks = Arc::new(PartitionLocks::new(Duration::from_secs(2)));
        let mut handles = Vec::new();

        for i in 0..20 {
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 {
                    vec![key("todo"), key("done")]
                } else {
                    vec![key("done"), key("todo")]
                };
                let _guard = locks.write(keys).await.unwrap();
                tokio::task::yield_now().await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
