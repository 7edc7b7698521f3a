//! Typed access to the shared key-value cache.
//!
//! This crate provides:
//! - [`KvStore`] over the cache server (Redis) or an in-process map
//! - [`KeyLayout`] for the stable reading / alarm-mirror / rule-state keys
//! - [`CacheGateway`] for fused readings and the active-alarm mirror
//! - [`StateStore`] for TTL-bounded rule state blobs

pub mod error;
pub mod gateway;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod redis_kv;
pub mod state;

pub use error::CacheError;
pub use gateway::CacheGateway;
pub use keys::{KeyLayout, StateKey};
pub use kv::KvStore;
pub use memory::MemoryKv;
pub use redis_kv::RedisKv;
pub use state::StateStore;
