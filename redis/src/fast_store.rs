//! Redis-backed fast store.
//!
//! # Keys
//!
//! - `item:{id}:stock` → integer count
//! - `item:{id}:lock` → `"1"` with a TTL while a reservation is in flight
//!
//! Plain commands share one [`ConnectionManager`]. Each [`RedisSession`]
//! holds a connection of its own because `WATCH` state is per connection; a
//! shared multiplexed connection would mix the read-sets of concurrent
//! reservations.
//!
//! Session connections are pooled. A dropped session returns its connection
//! unless a command on it failed, and checkout sends `UNWATCH` so a session
//! abandoned mid-attempt cannot leak its read-set into the next one.

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, RedisError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockguard_core::{DecrementResult, FastSession, FastStore, ItemId, StoreError};

/// Map a redis error onto the store taxonomy.
pub(crate) fn store_error(error: &RedisError) -> StoreError {
    if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() {
        StoreError::Connection(error.to_string())
    } else if error.kind() == redis::ErrorKind::TypeError {
        StoreError::Protocol(error.to_string())
    } else {
        StoreError::Command(error.to_string())
    }
}

/// Idle session connections kept by default.
pub const DEFAULT_MAX_IDLE_SESSIONS: usize = 32;

type IdleConnections = Arc<Mutex<Vec<MultiplexedConnection>>>;

/// [`FastStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisFastStore {
    client: Client,
    conn_manager: ConnectionManager,
    idle: IdleConnections,
    max_idle: usize,
}

impl RedisFastStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            client,
            conn_manager,
            idle: Arc::new(Mutex::new(Vec::new())),
            max_idle: DEFAULT_MAX_IDLE_SESSIONS,
        })
    }

    /// Keep at most `max_idle` session connections for reuse (default: 32).
    /// Zero disables pooling.
    #[must_use]
    pub const fn with_max_idle_sessions(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Session connections waiting for reuse.
    #[must_use]
    pub fn idle_sessions(&self) -> usize {
        self.idle.lock().map_or(0, |idle| idle.len())
    }

    async fn pooled_connection(&self) -> Option<MultiplexedConnection> {
        let mut conn = self.idle.lock().ok().and_then(|mut idle| idle.pop())?;
        let reset: Result<(), RedisError> = redis::cmd("UNWATCH").query_async(&mut conn).await;
        match reset {
            Ok(()) => Some(conn),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding broken pooled session connection");
                None
            }
        }
    }
}

impl std::fmt::Debug for RedisFastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFastStore").finish_non_exhaustive()
    }
}

impl FastStore for RedisFastStore {
    type Session = RedisSession;

    async fn session(&self) -> Result<Self::Session, StoreError> {
        let conn = match self.pooled_connection().await {
            Some(conn) => conn,
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| store_error(&e))?,
        };
        Ok(RedisSession {
            conn,
            healthy: true,
            idle: Arc::clone(&self.idle),
            max_idle: self.max_idle,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(())
    }

    async fn get_count(&self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.get(item_id.stock_key())
            .await
            .map_err(|e| store_error(&e))
    }

    async fn set_count(&self, item_id: ItemId, value: i64) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(item_id.stock_key(), value)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(())
    }

    async fn acquire_lock(&self, item_id: ItemId, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(item_id.lock_key())
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, item_id: ItemId) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(item_id.lock_key())
            .await
            .map_err(|e| store_error(&e))?;
        Ok(())
    }
}

/// Optimistic session on a dedicated Redis connection.
///
/// Dropping the session hands the connection back to the store's idle pool,
/// unless a command on it failed.
pub struct RedisSession {
    conn: MultiplexedConnection,
    healthy: bool,
    idle: IdleConnections,
    max_idle: usize,
}

impl RedisSession {
    fn fail(&mut self, error: &RedisError) -> StoreError {
        self.healthy = false;
        store_error(error)
    }
}

impl Drop for RedisSession {
    fn drop(&mut self) {
        if !self.healthy {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(self.conn.clone());
            }
        }
    }
}

impl FastSession for RedisSession {
    async fn watch(&mut self, item_id: ItemId) -> Result<(), StoreError> {
        let reply: Result<(), RedisError> = redis::cmd("WATCH")
            .arg(item_id.stock_key())
            .query_async(&mut self.conn)
            .await;
        reply.map_err(|e| self.fail(&e))
    }

    async fn unwatch(&mut self) -> Result<(), StoreError> {
        let reply: Result<(), RedisError> =
            redis::cmd("UNWATCH").query_async(&mut self.conn).await;
        reply.map_err(|e| self.fail(&e))
    }

    async fn get_count(&mut self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        let reply: Result<Option<i64>, RedisError> = self.conn.get(item_id.stock_key()).await;
        reply.map_err(|e| self.fail(&e))
    }

    async fn seed_count(&mut self, item_id: ItemId, value: i64) -> Result<bool, StoreError> {
        let reply: Result<bool, RedisError> = self.conn.set_nx(item_id.stock_key(), value).await;
        reply.map_err(|e| self.fail(&e))
    }

    async fn decrement_atomic(&mut self, item_id: ItemId, quantity: u32) -> DecrementResult {
        // EXEC replies nil when a watched key changed.
        let reply: Result<Option<(i64,)>, RedisError> = redis::pipe()
            .atomic()
            .decr(item_id.stock_key(), quantity)
            .query_async(&mut self.conn)
            .await;

        match reply {
            Ok(Some((remaining,))) => DecrementResult::Committed(remaining),
            Ok(None) => DecrementResult::Aborted,
            Err(e) => DecrementResult::Failed(self.fail(&e)),
        }
    }
}
