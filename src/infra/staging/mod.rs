//! Staging store backends.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryStagingStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStagingStore;
