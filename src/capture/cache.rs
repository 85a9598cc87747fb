use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    output: String,
    stored_at: Instant,
}

/// TTL cache of pane captures keyed by session name. Mutated by concurrent
/// capture tasks; a plain mutex is enough, every operation is short.
pub struct PaneCache {
    inner: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl PaneCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh capture for a session, if any. Expired entries are deleted in
    /// place so the map never accumulates dead sessions between batches.
    pub fn get(&self, session: &str) -> Option<String> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match map.get(session) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.output.clone()),
            Some(_) => {
                map.remove(session);
                None
            }
            None => None,
        }
    }

    /// Store a whole batch under one timestamp, evicting every entry that
    /// has gone stale since the previous batch.
    pub fn set_all(&self, captures: HashMap<String, String>) {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        for (session, output) in captures {
            map.insert(
                session,
                Entry {
                    output,
                    stored_at: now,
                },
            );
        }
    }

    pub fn remove(&self, session: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(session);
    }
}
