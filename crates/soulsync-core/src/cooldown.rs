//! Minimum interval between two alerts for the same user.
//!
//! `lastAlertAt` is stored as a big-endian `i64` and only ever moves forward through
//! `compare_and_swap`. The orchestrator additionally serialises check, send and record
//! per user with [`UserLocks`].

use crate::error::{EscalationError, EscalationResult};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Sled-backed cooldown ledger (`cooldown` tree, key = user id).
#[derive(Clone)]
pub struct CooldownLedger {
    tree: sled::Tree,
    window_ms: i64,
}

impl CooldownLedger {
    pub(crate) fn new(tree: sled::Tree, window_ms: i64) -> Self {
        Self { tree, window_ms }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn last_alert_at(&self, user_id: &str) -> EscalationResult<Option<i64>> {
        match self.tree.get(user_id.as_bytes())? {
            Some(raw) => decode_millis(user_id, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// True iff an alert was recorded at `t` with `now_ms - t < window`.
    pub fn is_on_cooldown(&self, user_id: &str, now_ms: i64) -> EscalationResult<bool> {
        Ok(match self.last_alert_at(user_id)? {
            Some(t) => now_ms.saturating_sub(t) < self.window_ms,
            None => false,
        })
    }

    /// Record a successful send. Returns the value now stored, which is the later of
    /// `sent_at_ms` and any concurrently recorded time.
    pub fn record_alert_sent(&self, user_id: &str, sent_at_ms: i64) -> EscalationResult<i64> {
        let key = user_id.as_bytes();
        loop {
            let current = self.tree.get(key)?;
            if let Some(raw) = current.as_ref() {
                let existing = decode_millis(user_id, raw)?;
                if existing >= sent_at_ms {
                    return Ok(existing);
                }
            }
            let next = sent_at_ms.to_be_bytes().to_vec();
            match self.tree.compare_and_swap(key, current, Some(next))? {
                Ok(()) => {
                    tracing::debug!(target: "soulsync::cooldown", at_ms = sent_at_ms, "Cooldown recorded");
                    return Ok(sent_at_ms);
                }
                Err(_) => continue,
            }
        }
    }
}

fn decode_millis(user_id: &str, raw: &[u8]) -> EscalationResult<i64> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| EscalationError::Corrupt {
        key: format!("{}/{}", crate::store::TREE_COOLDOWN, user_id),
    })?;
    Ok(i64::from_be_bytes(bytes))
}

/// Per-user async mutexes. Different users never contend.
///
/// An entry lives only while some caller holds or waits for it, so the map stays bounded
/// by the number of users with a dispatch in flight.
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s check-send-record section.
    pub async fn lock(&self, user_id: &str) -> UserLockGuard {
        let mutex = self.inner.entry(user_id.to_string()).or_default().clone();
        let guard = mutex.clone().lock_owned().await;
        UserLockGuard {
            guard: Some(guard),
            mutex,
            user_id: user_id.to_string(),
            locks: self.inner.clone(),
        }
    }

    /// Users with a holder or a waiter right now.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held for the duration of one user's critical section.
pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    user_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Map + this guard are the only owners: nobody is waiting.
        self.locks
            .remove_if(&self.user_id, |_, m| Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EscalationStore;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn no_record_means_not_on_cooldown() {
        let store = EscalationStore::temporary().unwrap();
        let ledger = store.cooldown_ledger(HOUR).unwrap();
        assert!(!ledger.is_on_cooldown("u1", 0).unwrap());
        assert_eq!(ledger.last_alert_at("u1").unwrap(), None);
    }

    #[test]
    fn window_is_half_open() {
        let store = EscalationStore::temporary().unwrap();
        let ledger = store.cooldown_ledger(HOUR).unwrap();
        ledger.record_alert_sent("u1", 10_000).unwrap();
        assert!(ledger.is_on_cooldown("u1", 10_000).unwrap());
        assert!(ledger.is_on_cooldown("u1", 10_000 + HOUR - 1).unwrap());
        assert!(!ledger.is_on_cooldown("u1", 10_000 + HOUR).unwrap());
        assert!(!ledger.is_on_cooldown("u2", 10_000).unwrap());
    }

    #[test]
    fn record_never_moves_backwards() {
        let store = EscalationStore::temporary().unwrap();
        let ledger = store.cooldown_ledger(HOUR).unwrap();
        assert_eq!(ledger.record_alert_sent("u1", 5_000).unwrap(), 5_000);
        assert_eq!(ledger.record_alert_sent("u1", 4_000).unwrap(), 5_000);
        assert_eq!(ledger.last_alert_at("u1").unwrap(), Some(5_000));
        assert_eq!(ledger.record_alert_sent("u1", 9_000).unwrap(), 9_000);
    }

    #[tokio::test]
    async fn user_locks_serialise_one_user() {
        let locks = UserLocks::new();
        let guard = locks.lock("u1").await;
        let other = locks.clone();
        let blocked = tokio::spawn(async move {
            let _g = other.lock("u1").await;
        });
        let _free = locks.lock("u2").await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        drop(guard);
        blocked.await.unwrap();
    }

    #[tokio::test]
    async fn user_locks_forget_idle_users() {
        let locks = UserLocks::new();
        for i in 0..100 {
            let _g = locks.lock(&format!("u{i}")).await;
        }
        assert!(locks.is_empty());

        let first = locks.lock("u1").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("u1").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(first);
        // The waiter still owns the entry until it finishes.
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn user_locks_stay_exclusive_while_entries_are_reclaimed() {
        let locks = UserLocks::new();
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                tokio::spawn(async move {
                    let _g = locks.lock("u1").await;
                    let n = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    assert_eq!(n, 0, "two holders at once");
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert!(locks.is_empty());
    }
}
