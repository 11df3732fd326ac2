// src/cache.rs

//! Time-bounded, single-flight memoization of upstream responses.
//!
//! Concurrent lookups of the same key share one in-flight populate call.
//! A stored value stays valid for its TTL, measured from the moment the
//! populate call finished; afterwards the key behaves like a miss. There is
//! no capacity-based eviction: keys are lesson and image identifiers of a
//! single session, so the key space stays bounded.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::error::{AppError, Result};

struct Stored<V> {
    value: V,
    expires_at: Instant,
}

type Slot<V> = Arc<OnceCell<Stored<V>>>;

/// Single-flight TTL cache.
pub struct TtlCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached value for `key`, or run `populate` to produce it.
    ///
    /// A failed populate stores nothing; the error is returned to the
    /// caller and the next lookup fetches again.
    pub async fn get_or_populate<F, Fut>(&self, key: K, ttl: Duration, populate: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = {
            let mut slots = self.slots();
            let now = Instant::now();
            match slots.get(&key) {
                Some(slot) if slot.get().is_none_or(|s| s.expires_at > now) => Arc::clone(slot),
                _ => {
                    let fresh: Slot<V> = Arc::new(OnceCell::new());
                    slots.insert(key.clone(), Arc::clone(&fresh));
                    fresh
                }
            }
        };

        let stored = slot
            .get_or_try_init(|| async {
                let value = populate().await?;
                Ok::<_, AppError>(Stored {
                    value,
                    expires_at: Instant::now() + ttl,
                })
            })
            .await;

        match stored {
            Ok(stored) => Ok(stored.value.clone()),
            Err(error) => {
                self.release_failed(&key, &slot);
                Err(error)
            }
        }
    }

    /// Forget an uninitialised slot after its populate failed, unless another
    /// caller is still waiting on it and will retry.
    fn release_failed(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.slots();
        let idle = slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.get().is_none() && Arc::strong_count(current) <= 2
        });
        if idle {
            slots.remove(key);
        }
    }

    /// Cached value for `key` if present and unexpired.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.slots()
            .get(key)
            .and_then(|slot| slot.get())
            .filter(|s| s.expires_at > now)
            .map(|s| s.value.clone())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots();
        let before = slots.len();
        // Uninitialised slots stay while someone still holds them.
        slots.retain(|_, slot| match slot.get() {
            Some(s) => s.expires_at > now,
            None => Arc::strong_count(slot) > 1,
        });
        before - slots.len()
    }

    /// Number of unexpired stored values.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots()
            .values()
            .filter(|slot| slot.get().is_some_and(|s| s.expires_at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots().clear();
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Caches shared by every fetch of a session: lesson page markup keyed by
/// lesson id, and image sizes keyed by image URL.
pub struct FetchCache {
    pub pages: TtlCache<String, String>,
    pub image_sizes: TtlCache<String, u64>,
    ttl: Duration,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pages: TtlCache::new(),
            image_sizes: TtlCache::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn purge_expired(&self) -> usize {
        self.pages.purge_expired() + self.image_sizes.purge_expired()
    }
}
