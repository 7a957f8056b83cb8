// Per-key cooldown rate limiter for control operations

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rejects a key's call when a prior call for the same key happened within
/// the cooldown window. A denied call mutates nothing.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        let mut last_call = self.last_call.lock().expect("limiter lock");
        let now = Instant::now();

        if let Some(previous) = last_call.get(key) {
            if now.duration_since(*previous) < self.cooldown {
                tracing::debug!("rate limiter rejecting '{}'", key);
                return false;
            }
        }

        last_call.insert(key.to_string(), now);
        true
    }
}
