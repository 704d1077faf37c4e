//! Conditional-request (ETag) cache contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type CacheError = Box<dyn std::error::Error + Send + Sync>;

/// URL-keyed ETag storage.
///
/// The client treats every error as a cache miss; an implementation never
/// needs to be infallible.
pub trait EtagCache: Send + Sync {
    fn get_etag(&self, url: &str) -> Result<Option<String>, CacheError>;

    fn set_etag(&self, url: &str, etag: &str) -> Result<(), CacheError>;
}

/// Never caches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl EtagCache for NoCache {
    fn get_etag(&self, _url: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set_etag(&self, _url: &str, _etag: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache, mostly for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EtagCache for MemoryCache {
    fn get_etag(&self, url: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().map_err(|e| e.to_string())?;
        Ok(entries.get(url).cloned())
    }

    fn set_etag(&self, url: &str, etag: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.insert(url.to_string(), etag.to_string());
        Ok(())
    }
}

impl<T: EtagCache + ?Sized> EtagCache for Arc<T> {
    fn get_etag(&self, url: &str) -> Result<Option<String>, CacheError> {
        (**self).get_etag(url)
    }

    fn set_etag(&self, url: &str, etag: &str) -> Result<(), CacheError> {
        (**self).set_etag(url, etag)
    }
}

impl<T: EtagCache + ?Sized> EtagCache for &T {
    fn get_etag(&self, url: &str) -> Result<Option<String>, CacheError> {
        (**self).get_etag(url)
    }

    fn set_etag(&self, url: &str, etag: &str) -> Result<(), CacheError> {
        (**self).set_etag(url, etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        cache.set_etag("https://a/x", "\"1\"").unwrap();
        cache.set_etag("https://a/x", "\"2\"").unwrap();
        assert_eq!(cache.get_etag("https://a/x").unwrap().as_deref(), Some("\"2\""));
        assert_eq!(cache.get_etag("https://a/y").unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_cache() {
        NoCache.set_etag("u", "e").unwrap();
        assert_eq!(NoCache.get_etag("u").unwrap(), None);
    }
}
