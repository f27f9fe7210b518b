use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use keylease::error::LockError;
use keylease::scripts::LockScript;
use keylease::store::{LockStore, ScriptInvocation};

/// Internal entry representing a held lock.
#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

impl LockEntry {
    /// Like Redis, a record is still present at its expiry instant and gone
    /// strictly after it.
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// In-memory [`LockStore`] backed by a [`DashMap`].
///
/// Each script runs while holding the map shard for its key, which gives the
/// same per-key atomicity Redis gives a Lua script. Expiry is lazy: an
/// expired entry is treated as absent and evicted the next time its key is
/// touched. Time comes from [`tokio::time`], so tests can drive expiry with a
/// paused clock.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryLockStore {
    /// Create an empty in-memory lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired lock records.
    pub fn len(&self) -> usize {
        self.locks.iter().filter(|e| !e.is_expired()).count()
    }

    /// Whether no unexpired lock records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired record.
    pub fn purge_expired(&self) {
        self.locks.retain(|_, entry| !entry.is_expired());
    }

    fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> i64 {
        match self.locks.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return 0;
                }
                occupied.insert(LockEntry {
                    owner: owner.to_owned(),
                    expires_at: Instant::now() + ttl,
                });
                1
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry {
                    owner: owner.to_owned(),
                    expires_at: Instant::now() + ttl,
                });
                1
            }
        }
    }

    fn release(&self, key: &str, owner: &str) -> i64 {
        let removed = self
            .locks
            .remove_if(key, |_, entry| entry.owner == owner && !entry.is_expired());
        if removed.is_some() {
            return 1;
        }
        // Evict a stale record left behind by a holder that never released.
        self.locks.remove_if(key, |_, entry| entry.is_expired());
        0
    }

    fn renew(&self, key: &str, owner: &str, ttl: Duration) -> i64 {
        let Some(mut entry) = self.locks.get_mut(key) else {
            return 0;
        };
        if entry.owner != owner || entry.is_expired() {
            return 0;
        }
        entry.expires_at = Instant::now() + ttl;
        1
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn eval_atomic(&self, invocation: &ScriptInvocation<'_>) -> Result<i64, LockError> {
        let reply = match invocation.script {
            LockScript::Acquire => {
                self.acquire(invocation.key, invocation.request_id, expire_ttl(invocation)?)
            }
            LockScript::Release => self.release(invocation.key, invocation.request_id),
            LockScript::Renew => {
                self.renew(invocation.key, invocation.request_id, expire_ttl(invocation)?)
            }
        };
        Ok(reply)
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.locks.get(key).is_some_and(|entry| !entry.is_expired()))
    }
}

/// The TTL of an acquire or renew, rejected where Redis rejects `PX`: not
/// positive, or so large that the absolute expiry overflows.
fn expire_ttl(invocation: &ScriptInvocation<'_>) -> Result<Duration, LockError> {
    invocation
        .ttl_ms
        .filter(|ms| *ms > 0 && *ms <= i64::MAX - unix_millis())
        .map(|ms| Duration::from_millis(ms.unsigned_abs()))
        .filter(|ttl| Instant::now().checked_add(*ttl).is_some())
        .ok_or_else(|| {
            LockError::Script(format!(
                "invalid expire time in '{}' command",
                invocation.script
            ))
        })
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| i64::try_from(since.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use keylease::testing::{run_expiry_conformance_tests, run_lock_conformance_tests};
    use keylease::{LockManager, RenewalState};

    use super::*;

    fn manager(store: &MemoryLockStore) -> LockManager {
        LockManager::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn conformance() {
        let store = MemoryLockStore::new();
        run_lock_conformance_tests(&manager(&store))
            .await
            .expect("lock conformance tests should pass");
        assert!(store.is_empty(), "suite should release every lock it takes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn conformance_multi_thread() {
        let store = MemoryLockStore::new();
        run_lock_conformance_tests(&manager(&store))
            .await
            .expect("lock conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_conformance() {
        let store = MemoryLockStore::new();
        run_expiry_conformance_tests(&manager(&store))
            .await
            .expect("expiry conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_contention() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_millis(100)).await);
        assert!(!m.acquire("job:1", "r2", Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_expiry() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_millis(100)).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_release_wrong_id() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_secs(1)).await);
        assert!(!m.release("job:1", "wrong-id").await);
        assert!(m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_release_owner() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_secs(1)).await);
        assert!(m.release("job:1", "r1").await);
        assert!(!m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_renew() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_millis(100)).await);
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(m.renew("job:1", "r1", Duration::from_millis(1000)).await);
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted_lazily() {
        let store = MemoryLockStore::new();
        let m = manager(&store);
        assert!(m.acquire("a", "r1", Duration::from_millis(10)).await);
        assert!(m.acquire("b", "r1", Duration::from_secs(10)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.locks.len(), 2, "expired record stays until touched");

        assert!(!m.release("a", "r1").await);
        assert_eq!(store.locks.len(), 1, "touching an expired key evicts it");

        assert!(m.acquire("c", "r1", Duration::from_millis(10)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.purge_expired();
        assert_eq!(store.locks.len(), 1);
    }

    #[tokio::test]
    async fn rejects_non_positive_ttl_like_redis() {
        let store = MemoryLockStore::new();
        let zero = ScriptInvocation::acquire("job:1", "r1", 0);
        assert!(matches!(
            store.eval_atomic(&zero).await,
            Err(LockError::Script(_))
        ));
        let negative = ScriptInvocation::renew("job:1", "r1", -5);
        assert!(matches!(
            store.eval_atomic(&negative).await,
            Err(LockError::Script(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejects_ttl_whose_expiry_overflows() {
        let store = MemoryLockStore::new();
        let acquire = ScriptInvocation::acquire("job:1", "r1", i64::MAX);
        assert!(matches!(
            store.eval_atomic(&acquire).await,
            Err(LockError::Script(_))
        ));
        assert!(store.is_empty());

        let m = manager(&store);
        assert!(m.acquire("job:1", "r1", Duration::from_secs(1)).await);
        let renew = ScriptInvocation::renew("job:1", "r1", i64::MAX);
        assert!(matches!(
            store.eval_atomic(&renew).await,
            Err(LockError::Script(_))
        ));
        assert!(matches!(
            m.try_acquire("job:2", "r1", Duration::MAX).await,
            Err(LockError::Script(_))
        ));

        let year = Duration::from_secs(365 * 24 * 60 * 60);
        assert!(m.renew("job:1", "r1", year).await, "long but finite ttl is fine");
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_present_until_strictly_after_expiry() {
        let m = manager(&MemoryLockStore::new());
        assert!(m.acquire("job:1", "r1", Duration::from_millis(100)).await);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(m.exists("job:1").await.unwrap(), "present at its expiry instant");
        assert!(!m.acquire("job:1", "r2", Duration::from_millis(100)).await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!m.exists("job:1").await.unwrap());
        assert!(m.acquire("job:1", "r2", Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_outlives_ttl() {
        let store = MemoryLockStore::new();
        let m = manager(&store);
        let ttl = Duration::from_millis(300);
        assert!(m.acquire("job:1", "r1", ttl).await);

        let handle = m.keep_alive_default("job:1", "r1", ttl).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(m.exists("job:1").await.unwrap(), "keep-alive should hold the lock");
        assert!(!m.acquire("job:1", "r2", ttl).await);

        assert_eq!(handle.stop().await, RenewalState::Stopped);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!m.exists("job:1").await.unwrap(), "lock expires once renewal stops");
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_detects_takeover() {
        let store = MemoryLockStore::new();
        let m = manager(&store);
        let ttl = Duration::from_millis(300);
        assert!(m.acquire("job:1", "r1", ttl).await);

        // Renew far less often than the TTL so the lock lapses in between.
        let handle = m
            .keep_alive("job:1", "r1", ttl, Duration::from_millis(500))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(m.acquire("job:1", "r2", Duration::from_secs(10)).await);

        assert_eq!(handle.wait().await, RenewalState::Lost);
        assert!(m.exists("job:1").await.unwrap(), "new holder keeps its lock");
        assert!(m.release("job:1", "r2").await);
    }
}
