//! Bounded LRU map paired with a deadline index.
//!
//! The API separates the two kinds of mutation: [`ExpiringStore::touch`]
//! changes a value and its recency but can never move its deadline, while
//! [`ExpiringStore::renew`] is the only way to set one. Purges therefore see
//! every deadline change and never have to scan the whole table.

use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::hash::Hash;

use super::{BoundedMap, ConfigError, Entries, ExpiryIndex};

#[derive(Debug)]
pub struct ExpiringStore<K, V> {
    entries: BoundedMap<K, V>,
    expiry: ExpiryIndex<K>,
}

impl<K, V> ExpiringStore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: BoundedMap::new(capacity)?,
            expiry: ExpiryIndex::new(),
        })
    }

    #[must_use]
    pub fn with_eviction<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&K, &V) + Send + 'static,
    {
        self.entries = self.entries.with_eviction(hook);
        self
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `value` under `key` with a new deadline.
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn renew(&mut self, key: K, value: V, expires_at: DateTime<Utc>) -> Option<(K, V)> {
        let evicted = self.entries.set(key.clone(), value);
        if let Some((old, _)) = &evicted {
            self.expiry.cancel(old);
        }
        self.expiry.schedule(key, expires_at);
        evicted
    }

    /// Mutable access that refreshes recency and keeps the deadline.
    pub fn touch<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key)
    }

    pub fn deadline<Q>(&self, key: &Q) -> Option<DateTime<Utc>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.expiry.deadline(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.expiry.cancel(key);
        self.entries.remove(key)
    }

    /// Drop every entry whose deadline is before `now`; returns how many.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        while let Some((key, _)) = self.expiry.pop_expired(now) {
            if self.entries.delete(&key) {
                purged += 1;
            }
        }
        purged
    }

    #[must_use]
    pub fn entries(&self) -> Entries<'_, K, V> {
        self.entries.entries()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.expiry.clear();
    }
}
