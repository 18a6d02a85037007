//! Read-side cache for "list my backups"
//!
//! Listings are computed from the resolver and served for up to `ttl`.
//! This is where the bounded staleness of cluster share changes becomes
//! visible to callers: a disabled rule stops granting access immediately,
//! but a cached listing may still show the backups until it expires or is
//! invalidated.

use crate::clock::{elapsed, Clock};
use crate::error::Result;
use crate::model::{BackupUid, LifecycleState, PrincipalId};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// One row of a backup listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedBackup {
    pub uid: BackupUid,
    pub name: String,
    pub state: LifecycleState,
}

struct CachedListing {
    computed_at: DateTime<Utc>,
    backups: Vec<ListedBackup>,
}

pub struct ListingCache {
    cache: Mutex<LruCache<PrincipalId, CachedListing>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ListingCache {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        ListingCache {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    /// Cached listing for `principal`, recomputed once older than the TTL
    pub fn get_or_compute<F>(&self, principal: &PrincipalId, compute: F) -> Result<Vec<ListedBackup>>
    where
        F: FnOnce() -> Result<Vec<ListedBackup>>,
    {
        let now = self.clock.now();
        if let Some(entry) = self.cache.lock().get(principal) {
            if elapsed(entry.computed_at, now) < self.ttl {
                return Ok(entry.backups.clone());
            }
        }

        // Computed outside the lock; a concurrent recompute just overwrites
        let backups = compute()?;
        self.cache.lock().put(
            principal.clone(),
            CachedListing {
                computed_at: now,
                backups: backups.clone(),
            },
        );
        Ok(backups)
    }

    pub fn invalidate(&self, principal: &PrincipalId) {
        self.cache.lock().pop(principal);
    }

    pub fn invalidate_many<'a>(&self, principals: impl IntoIterator<Item = &'a PrincipalId>) {
        let mut cache = self.cache.lock();
        for principal in principals {
            cache.pop(principal);
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn row(name: &str) -> ListedBackup {
        ListedBackup {
            uid: BackupUid::new(name),
            name: name.to_string(),
            state: LifecycleState::Active,
        }
    }

    #[test]
    fn test_serves_cached_until_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = ListingCache::new(8, Duration::from_secs(10), clock.clone());
        let user = PrincipalId::new("u1");
        let calls = Cell::new(0);

        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![row("b1")])
        };

        cache.get_or_compute(&user, compute).unwrap();
        cache.get_or_compute(&user, compute).unwrap();
        assert_eq!(calls.get(), 1);

        clock.advance(Duration::from_secs(10));
        cache.get_or_compute(&user, compute).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let clock = Arc::new(ManualClock::default());
        let cache = ListingCache::new(8, Duration::from_secs(60), clock);
        let user = PrincipalId::new("u1");

        cache.get_or_compute(&user, || Ok(vec![row("b1")])).unwrap();
        cache.invalidate(&user);
        let fresh = cache.get_or_compute(&user, || Ok(vec![])).unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let clock = Arc::new(ManualClock::default());
        let cache = ListingCache::new(2, Duration::from_secs(60), clock);
        for n in 0..3 {
            let user = PrincipalId::new(format!("u{}", n));
            cache.get_or_compute(&user, || Ok(vec![])).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
