//! Name -> descriptor cache with throttled revalidation
//!
//! Lookups never take a lock shared by unrelated names: the map is a
//! sharded `DashMap` and guards are released before any provider I/O. A miss
//! reads the source outside the map and installs the new descriptor with an
//! insert-if-absent; a caller that loses that race drops its descriptor and
//! uses the winner's.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::descriptor::DocumentDescriptor;
use crate::error::DocumentError;
use crate::logging::{operations, status};
use crate::source::SourceProvider;

pub struct DocumentCache {
    provider: Arc<dyn SourceProvider>,
    entries: DashMap<String, Arc<DocumentDescriptor>>,
    min_validity_interval: Duration,
    epoch: Instant,
    generations: AtomicU64,
}

impl DocumentCache {
    pub fn new(provider: Arc<dyn SourceProvider>, min_validity_interval: Duration) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
            min_validity_interval,
            epoch: Instant::now(),
            generations: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<dyn SourceProvider> {
        &self.provider
    }

    pub fn min_validity_interval(&self) -> Duration {
        self.min_validity_interval
    }

    /// Current descriptor for `name`, reloading it if the source changed
    pub fn resolve(&self, name: &str) -> Result<Arc<DocumentDescriptor>, DocumentError> {
        let cached = self.entries.get(name).map(|entry| Arc::clone(entry.value()));

        let stale = match cached {
            Some(descriptor) if self.is_valid(&descriptor) => {
                debug!(
                    operation = operations::RESOLVE,
                    status = status::HIT,
                    document = name,
                    generation = descriptor.generation(),
                    "cache hit"
                );
                return Ok(descriptor);
            }
            Some(descriptor) => Some(descriptor),
            None => None,
        };

        let fresh = match self.load(name) {
            Ok(descriptor) => Arc::new(descriptor),
            Err(err) => {
                if let Some(stale) = &stale {
                    self.entries
                        .remove_if(name, |_, current| Arc::ptr_eq(current, stale));
                }
                return Err(err);
            }
        };

        let installed = match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                let replaces_stale = stale
                    .as_ref()
                    .is_some_and(|stale| Arc::ptr_eq(stale, occupied.get()));
                if replaces_stale {
                    occupied.insert(Arc::clone(&fresh));
                    fresh
                } else {
                    // Another caller installed a descriptor first.
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&fresh));
                fresh
            }
        };

        debug!(
            operation = operations::RESOLVE,
            status = if stale.is_some() { status::STALE } else { status::MISS },
            document = name,
            generation = installed.generation(),
            "cache miss"
        );
        Ok(installed)
    }

    /// Cached descriptor without any validation or loading
    pub fn peek(&self, name: &str) -> Option<Arc<DocumentDescriptor>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the cached descriptor; the next resolve reloads it
    pub fn invalidate(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn load(&self, name: &str) -> Result<DocumentDescriptor, DocumentError> {
        let source = self.provider.read_source(name)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(DocumentDescriptor::new(
            name,
            source,
            generation,
            self.now_ms(),
        ))
    }

    /// Throttled freshness check
    ///
    /// Within the minimum interval since the last check the descriptor is
    /// trusted without touching the provider. Past it, exactly one of the
    /// concurrent callers wins the timestamp update and consults the
    /// provider; the others keep trusting the descriptor meanwhile.
    fn is_valid(&self, descriptor: &DocumentDescriptor) -> bool {
        let now = self.now_ms();
        let seen = descriptor.last_checked();
        let interval = duration_ms(self.min_validity_interval);

        if now.saturating_sub(seen) < interval {
            return true;
        }
        if !descriptor.begin_check(seen, now) {
            return true;
        }

        match self.provider.freshness(descriptor.name()) {
            Ok(Some(current)) => current == descriptor.freshness(),
            Ok(None) => false,
            Err(err) => {
                warn!(
                    operation = operations::VALIDATE,
                    status = status::ERROR,
                    document = descriptor.name(),
                    "freshness check failed, keeping cached descriptor: {}",
                    err
                );
                true
            }
        }
    }

    fn now_ms(&self) -> u64 {
        duration_ms(self.epoch.elapsed())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::MemorySource;
    use std::thread;

    /// Reads work, freshness checks always fail
    struct BrokenFreshness(MemorySource);

    impl SourceProvider for BrokenFreshness {
        fn list_names(&self) -> Result<Vec<String>, DocumentError> {
            self.0.list_names()
        }

        fn read_source(&self, name: &str) -> Result<crate::source::SourceText, DocumentError> {
            self.0.read_source(name)
        }

        fn freshness(
            &self,
            name: &str,
        ) -> Result<Option<crate::source::Freshness>, DocumentError> {
            Err(DocumentError::source_unavailable(
                name,
                std::io::Error::new(std::io::ErrorKind::Other, "stat failed"),
            ))
        }
    }

    fn cache_with(source: &Arc<MemorySource>, interval: Duration) -> DocumentCache {
        let provider: Arc<dyn SourceProvider> = source.clone();
        DocumentCache::new(provider, interval)
    }

    #[test]
    fn test_resolve_hit_returns_same_descriptor() {
        let source = Arc::new(MemorySource::new().with("a", "tmpl", "one"));
        let cache = cache_with(&source, Duration::ZERO);

        let first = cache.resolve("a").unwrap();
        let second = cache.resolve("a").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_not_found() {
        let source = Arc::new(MemorySource::new());
        let cache = cache_with(&source, Duration::ZERO);

        let err = cache.resolve("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_throttle_trusts_cache_within_interval() {
        let source = Arc::new(MemorySource::new().with("a", "tmpl", "one"));
        let cache = cache_with(&source, Duration::from_secs(3600));

        let first = cache.resolve("a").unwrap();
        source.insert("a", "tmpl", "two");
        let second = cache.resolve("a").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "one");
    }

    #[test]
    fn test_reload_after_interval() {
        let source = Arc::new(MemorySource::new().with("a", "tmpl", "one"));
        let cache = cache_with(&source, Duration::from_millis(20));

        let first = cache.resolve("a").unwrap();
        source.insert("a", "tmpl", "two");
        thread::sleep(Duration::from_millis(40));
        let second = cache.resolve("a").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "two");
        assert!(second.generation() > first.generation());
        // The superseded descriptor is untouched.
        assert_eq!(first.source(), "one");
    }

    #[test]
    fn test_removed_source_evicts_entry() {
        let source = Arc::new(MemorySource::new().with("a", "tmpl", "one"));
        let cache = cache_with(&source, Duration::ZERO);

        cache.resolve("a").unwrap();
        source.remove("a");

        let err = cache.resolve("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(cache.peek("a").is_none());
    }

    #[test]
    fn test_freshness_error_keeps_descriptor() {
        let provider = Arc::new(BrokenFreshness(MemorySource::new().with("a", "tmpl", "one")));
        let cache = DocumentCache::new(provider.clone(), Duration::ZERO);

        let first = cache.resolve("a").unwrap();
        provider.0.insert("a", "tmpl", "two");
        let second = cache.resolve("a").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "one");
    }

    #[test]
    fn test_concurrent_miss_installs_one_descriptor() {
        let source = Arc::new(MemorySource::new().with("a", "tmpl", "one"));
        let cache = Arc::new(cache_with(&source, Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.resolve("a").unwrap())
            })
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let installed = cache.peek("a").unwrap();
        assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, &installed)));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let source = Arc::new(
            MemorySource::new()
                .with("a", "tmpl", "one")
                .with("b", "tmpl", "two"),
        );
        let cache = cache_with(&source, Duration::from_secs(60));

        let first = cache.resolve("a").unwrap();
        cache.resolve("b").unwrap();
        assert_eq!(cache.cached_names(), vec!["a", "b"]);

        assert!(cache.invalidate("a"));
        let reloaded = cache.resolve("a").unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));

        cache.clear();
        assert!(cache.is_empty());
    }
}
