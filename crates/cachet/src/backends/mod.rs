//! Real cache backends.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::MemoryAdapter;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisAdapter;
