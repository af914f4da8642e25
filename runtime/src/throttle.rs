//! Per-key log throttling.
//!
//! Under heavy contention every caller fails to take the lock several times;
//! logging each failure would flood the log pipeline. [`LogThrottle`] lets at
//! most `budget` events through per key per window. It only gates logging;
//! nothing correctness-related reads it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window event budget keyed by `K`.
#[derive(Debug)]
pub struct LogThrottle<K> {
    budget: u32,
    window: Duration,
    windows: Mutex<HashMap<K, Window>>,
}

impl<K: Eq + Hash> LogThrottle<K> {
    /// Allow `budget` events per key every `window`.
    #[must_use]
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            budget,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record an event for `key` and report whether it should be logged.
    pub fn allow(&self, key: K) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: K, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // Poisoned: log everything.
            return true;
        };

        // Evict expired windows.
        let window = self.window;
        windows.retain(|_, w| now.duration_since(w.started) < window);

        let entry = windows.entry(key).or_insert(Window {
            started: now,
            hits: 0,
        });
        if entry.hits >= self.budget {
            return false;
        }
        entry.hits += 1;
        true
    }
}
