//! Distributed locks on top of atomic server-side scripts.
//!
//! A lock is a single record in a shared store: the key names the protected
//! resource and the value is the holder's [`RequestId`]. Every mutation goes
//! through one of three scripts that run atomically at the store:
//!
//! - **acquire**: `SET key id NX PX ttl`
//! - **release**: delete the key only if its value is still `id`
//! - **renew**: reset the key's expiry only if its value is still `id`
//!
//! The store is injected into [`LockManager`] as an [`Arc<dyn LockStore>`],
//! so the same manager runs against Redis (`keylease-redis`), an in-memory
//! map (`keylease-memory`), or a test fake.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use keylease::{LockManager, RequestId};
//!
//! let manager = LockManager::new(Arc::new(store));
//! let id = RequestId::generate();
//!
//! if manager.acquire("job:1", &id, Duration::from_secs(30)).await {
//!     let keep_alive = manager.keep_alive_default("job:1", &id, Duration::from_secs(30))?;
//!     // ... long running work ...
//!     keep_alive.stop().await;
//!     manager.release("job:1", &id).await;
//! }
//! ```
//!
//! [`Arc<dyn LockStore>`]: LockStore

pub mod error;
pub mod id;
pub mod manager;
pub mod renewal;
pub mod scripts;
pub mod store;
pub mod testing;

pub use error::LockError;
pub use id::RequestId;
pub use manager::LockManager;
pub use renewal::{RenewalHandle, RenewalState};
pub use scripts::LockScript;
pub use store::{LockStore, ScriptInvocation};
