use crate::core::StoreMeta;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// LRU cache of catalog entries, keyed by store name.
///
/// A capacity of zero disables caching. Entries are only ever invalidated by
/// the driver that owns the cache, so a store deleted through another
/// connection is not noticed until it is evicted.
pub struct MetadataCache {
    inner: Option<Mutex<LruCache<String, StoreMeta>>>,
}

impl MetadataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn get(&self, store: &str) -> Option<StoreMeta> {
        let mut cache = self.inner.as_ref()?.lock().ok()?;
        cache.get(store).cloned()
    }

    pub fn put(&self, store: &str, meta: StoreMeta) {
        if let Some(mut cache) = self.inner.as_ref().and_then(|m| m.lock().ok()) {
            cache.put(store.to_string(), meta);
        }
    }

    pub fn invalidate(&self, store: &str) {
        if let Some(mut cache) = self.inner.as_ref().and_then(|m| m.lock().ok()) {
            cache.pop(store);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|m| m.lock().ok().map(|cache| cache.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
