use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Write sections keyed by account external key. Holding the guard gives the
/// holder exclusive right to mutate that account's row.
#[derive(Clone, Default)]
pub struct AccountLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

pub struct AccountGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, external_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(external_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, external_key: &str) -> AccountGuard {
        let guard = self.lock_for(external_key).lock_owned().await;

        AccountGuard {
            _guards: vec![guard],
        }
    }

    /// Locks two accounts in ascending key order. The same key twice takes one lock.
    pub async fn acquire_pair(&self, first: &str, second: &str) -> AccountGuard {
        if first == second {
            return self.acquire(first).await;
        }

        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };

        let low_guard = self.lock_for(low).lock_owned().await;
        let high_guard = self.lock_for(high).lock_owned().await;

        AccountGuard {
            _guards: vec![low_guard, high_guard],
        }
    }
}
