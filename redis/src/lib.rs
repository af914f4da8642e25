//! Redis adapters for stockguard.
//!
//! - [`RedisFastStore`]: counters, optimistic transactions and lease locks
//! - [`RedisTaskQueue`]: reliable stock-updates lane on Redis lists
//!
//! # Example
//!
//! ```no_run
//! use stockguard_redis::{RedisFastStore, RedisTaskQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisFastStore::new("redis://127.0.0.1:6379").await?;
//! let queue = RedisTaskQueue::new("redis://127.0.0.1:6379").await?;
//! queue.recover_in_flight().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod fast_store;
mod queue;

pub use fast_store::{DEFAULT_MAX_IDLE_SESSIONS, RedisFastStore, RedisSession};
pub use queue::RedisTaskQueue;
