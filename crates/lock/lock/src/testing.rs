//! Conformance suites shared by every [`LockStore`](crate::LockStore)
//! backend.
//!
//! Call these from a backend's test module with a manager wrapping a fresh
//! store. Each check uses its own lock key so the suites can run against a
//! shared server.

use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::LockError;
use crate::manager::LockManager;

const LONG_TTL: Duration = Duration::from_secs(10);

/// Run the ownership and mutual-exclusion conformance suite.
///
/// # Errors
///
/// Returns an error if the store fails during any check.
pub async fn run_lock_conformance_tests(manager: &LockManager) -> Result<(), LockError> {
    test_acquire_contention(manager).await?;
    test_same_caller_new_request_id(manager).await?;
    test_release_wrong_owner(manager).await?;
    test_release_owner(manager).await?;
    test_renew_gated_by_owner(manager).await?;
    test_absent_lock_is_noop(manager).await?;
    test_reacquire_after_release(manager).await?;
    test_concurrent_acquire(manager).await?;
    Ok(())
}

/// Run the TTL conformance suite.
///
/// Sleeps with [`tokio::time::sleep`]; in-memory backends should run it under
/// a paused clock.
///
/// # Errors
///
/// Returns an error if the store fails during any check.
pub async fn run_expiry_conformance_tests(manager: &LockManager) -> Result<(), LockError> {
    test_lock_expires(manager).await?;
    test_renew_extends_expiry(manager).await?;
    test_expired_lock_can_be_reacquired(manager).await?;
    Ok(())
}

async fn test_acquire_contention(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:contention";
    let ttl = Duration::from_millis(100);
    assert!(manager.try_acquire(key, "r1", ttl).await?, "first acquire should win");
    assert!(
        !manager.try_acquire(key, "r2", ttl).await?,
        "second acquire should fail while the lock is held"
    );
    manager.try_release(key, "r1").await?;
    Ok(())
}

async fn test_same_caller_new_request_id(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:same-caller";
    assert!(manager.try_acquire(key, "attempt-1", LONG_TTL).await?);
    assert!(
        !manager.try_acquire(key, "attempt-2", LONG_TTL).await?,
        "a new request id must not take over a held lock"
    );
    assert!(
        !manager.try_acquire(key, "attempt-1", LONG_TTL).await?,
        "acquire is not re-entrant"
    );
    manager.try_release(key, "attempt-1").await?;
    Ok(())
}

async fn test_release_wrong_owner(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:release-wrong";
    assert!(manager.try_acquire(key, "r1", Duration::from_secs(1)).await?);
    assert!(
        !manager.try_release(key, "wrong-id").await?,
        "release with a foreign request id should fail"
    );
    assert!(manager.exists(key).await?, "lock should survive a foreign release");
    manager.try_release(key, "r1").await?;
    Ok(())
}

async fn test_release_owner(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:release-owner";
    assert!(manager.try_acquire(key, "r1", Duration::from_secs(1)).await?);
    assert!(manager.try_release(key, "r1").await?, "owner release should succeed");
    assert!(!manager.exists(key).await?, "lock should be gone after release");
    assert!(
        !manager.try_release(key, "r1").await?,
        "second release should be a no-op"
    );
    Ok(())
}

async fn test_renew_gated_by_owner(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:renew-owner";
    assert!(manager.try_acquire(key, "r1", LONG_TTL).await?);
    assert!(
        !manager.try_renew(key, "wrong-id", LONG_TTL).await?,
        "renew with a foreign request id should fail"
    );
    assert!(manager.try_renew(key, "r1", LONG_TTL).await?, "owner renew should succeed");
    assert!(manager.exists(key).await?, "renew must not remove the lock");
    assert!(
        !manager.try_acquire(key, "r2", LONG_TTL).await?,
        "renewed lock stays exclusive"
    );
    manager.try_release(key, "r1").await?;
    Ok(())
}

async fn test_absent_lock_is_noop(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:never-acquired";
    assert!(!manager.try_release(key, "r1").await?);
    assert!(!manager.try_renew(key, "r1", LONG_TTL).await?);
    assert!(
        !manager.exists(key).await?,
        "renew on an absent key must not create it"
    );
    Ok(())
}

async fn test_reacquire_after_release(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:reacquire";
    assert!(manager.try_acquire(key, "r1", LONG_TTL).await?);
    assert!(manager.try_release(key, "r1").await?);
    assert!(
        manager.try_acquire(key, "r2", LONG_TTL).await?,
        "released lock should be free"
    );
    assert!(
        !manager.try_release(key, "r1").await?,
        "stale owner must not release the new holder's lock"
    );
    assert!(manager.try_release(key, "r2").await?);
    Ok(())
}

async fn test_concurrent_acquire(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:concurrent";
    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let manager = manager.clone();
        tasks.spawn(async move {
            let id = format!("contender-{i}");
            let won = manager.try_acquire(key, &id, LONG_TTL).await?;
            Ok::<_, LockError>((id, won))
        });
    }

    let mut winners = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (id, won) = joined.map_err(|e| LockError::Script(e.to_string()))??;
        if won {
            winners.push(id);
        }
    }

    assert_eq!(winners.len(), 1, "exactly one contender should win: {winners:?}");
    assert!(manager.try_release(key, &winners[0]).await?);
    Ok(())
}

async fn test_lock_expires(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:expires";
    assert!(manager.try_acquire(key, "r1", Duration::from_millis(100)).await?);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!manager.exists(key).await?, "lock should expire after its ttl");
    assert!(
        !manager.try_release(key, "r1").await?,
        "releasing an expired lock should fail"
    );
    Ok(())
}

async fn test_renew_extends_expiry(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:renew-extends";
    assert!(manager.try_acquire(key, "r1", Duration::from_millis(100)).await?);
    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(
        manager.try_renew(key, "r1", Duration::from_millis(1000)).await?,
        "renew before expiry should succeed"
    );
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(manager.exists(key).await?, "renewed lock should still exist");
    manager.try_release(key, "r1").await?;
    Ok(())
}

async fn test_expired_lock_can_be_reacquired(manager: &LockManager) -> Result<(), LockError> {
    let key = "conformance:expired-reacquire";
    assert!(manager.try_acquire(key, "r1", Duration::from_millis(50)).await?);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !manager.try_renew(key, "r1", Duration::from_secs(1)).await?,
        "renewing an expired lock should fail"
    );
    assert!(
        manager.try_acquire(key, "r2", Duration::from_secs(1)).await?,
        "expired lock should be free"
    );
    assert!(!manager.try_release(key, "r1").await?);
    manager.try_release(key, "r2").await?;
    Ok(())
}
