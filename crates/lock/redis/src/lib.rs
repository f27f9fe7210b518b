//! Redis lock store for keylease.
//!
//! This crate provides a Redis-backed implementation of the [`LockStore`]
//! trait from `keylease`.
//!
//! # Features
//!
//! - **Atomic scripts**: acquire, release and renew run as Lua scripts via
//!   `EVALSHA`, falling back to `SCRIPT LOAD` on a cold server.
//! - **Single node or cluster**: one configured address selects a plain
//!   connection pool, several select a cluster pool.
//! - **Connection pooling**: uses `deadpool-redis`.
//!
//! # Lock Consistency
//!
//! | Deployment | Mutual Exclusion | Notes |
//! |------------|------------------|-------|
//! | Single instance | Strong | Full mutual exclusion guaranteed |
//! | Sentinel | Weak | Lock may be lost during failover |
//! | Cluster | Weak | Lock may be lost during failover |
//!
//! Replication is asynchronous: if a primary fails after granting a lock but
//! before the write reaches a replica, the promoted replica has no record of
//! it and a second caller can acquire the same key.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keylease::LockManager;
//! use keylease_redis::{RedisConfig, RedisLockStore};
//!
//! let store = RedisLockStore::new(&RedisConfig::new("127.0.0.1:6379"))?;
//! let manager = LockManager::new(Arc::new(store));
//! ```
//!
//! [`LockStore`]: keylease::LockStore

mod config;
mod key_render;
mod store;

pub use config::RedisConfig;
pub use store::RedisLockStore;
