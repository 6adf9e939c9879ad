use crate::models::Listing;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source for cache staleness checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry {
    stored_at: Instant,
    listings: Vec<Listing>,
}

/// Search results keyed by the raw query string.
///
/// Entries older than the TTL are never returned. When `max_entries` is set
/// and an insert goes over it, expired entries are purged first and then the
/// oldest ones.
pub struct QueryCache {
    ttl: Duration,
    max_entries: Option<usize>,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: Option<usize>) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: Option<usize>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            max_entries,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<Listing>> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let entry = entries.get(key)?;
        if now.duration_since(entry.stored_at) < self.ttl {
            return Some(entry.listings.clone());
        }

        entries.remove(key);
        None
    }

    pub fn put(&self, key: impl Into<String>, listings: Vec<Listing>) {
        let now = self.clock.now();
        let mut entries = self.lock();
        entries.insert(key.into(), Entry { stored_at: now, listings });

        let Some(max) = self.max_entries else {
            return;
        };
        if entries.len() <= max {
            return;
        }

        let ttl = self.ttl;
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < ttl);

        while entries.len() > max {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting cached query: {}", key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
