use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// cached transcode result. the store hands out clones (`Bytes` clones are
/// refcounted views), never a mutable alias into the map.
#[derive(Clone)]
pub struct CachedImage {
    pub payload: Bytes,
    pub content_type: String,
    inserted_at: Instant,
}

impl CachedImage {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// in-memory store of transcoded images with a fixed per-entry ttl.
///
/// every `get` re-validates expiration on its own; the periodic sweep only
/// reclaims memory early and is never required for correctness.
pub struct ImageCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedImage>>,
}

impl ImageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedImage> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<CachedImage> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now, self.ttl) => return Some(entry.clone()),
                Some(_) => {} // expired, drop the read lock and purge below
            }
        }
        self.entries.write().unwrap().remove(key);
        None
    }

    /// inserts or overwrites; overwriting restarts the expiration clock.
    pub fn insert(&self, key: String, payload: Bytes, content_type: String) {
        self.insert_at(key, payload, content_type, Instant::now());
    }

    fn insert_at(&self, key: String, payload: Bytes, content_type: String, now: Instant) {
        let entry = CachedImage {
            payload,
            content_type,
            inserted_at: now,
        };
        self.entries.write().unwrap().insert(key, entry);
    }

    pub fn flush_all(&self) {
        self.entries.write().unwrap().clear();
    }

    /// number of live (unexpired) entries.
    pub fn entry_count(&self) -> usize {
        self.entry_count_at(Instant::now())
    }

    fn entry_count_at(&self, now: Instant) -> usize {
        let entries = self.entries.read().unwrap();
        entries
            .values()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .count()
    }

    /// drops every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        before - entries.len()
    }
}
