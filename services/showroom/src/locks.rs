use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-entity mutation locks.
///
/// Two mutations of the same `(collection, id)` never interleave: the
/// second waits for the first to finish. Different entities proceed in
/// parallel.
#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<(&'static str, String), Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one entity
    pub async fn acquire(&self, collection: &'static str, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map still holds are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((collection, id.to_string()))
                .or_default()
                .clone()
        };

        lock.lock_owned().await
    }

    /// Number of tracked entities
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_entity_is_serialized() {
        let locks = Arc::new(EntityLocks::new());
        let guard = locks.acquire("products", "p1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("products", "p1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_entities_do_not_block() {
        let locks = EntityLocks::new();
        let _a = locks.acquire("products", "p1").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("products", "p2"))
            .await
            .unwrap();
        let _c = tokio::time::timeout(Duration::from_secs(1), locks.acquire("portfolio", "p1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = EntityLocks::new();
        drop(locks.acquire("products", "p1").await);
        drop(locks.acquire("products", "p2").await);

        let _guard = locks.acquire("products", "p3").await;
        assert_eq!(locks.tracked(), 1);
    }
}
