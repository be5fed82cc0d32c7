//! Capacity-bounded map that iterates in recency order and evicts the least
//! recently used entry when a new key arrives at capacity.
//!
//! Entries live in a slab (`slots`) threaded by a doubly linked list from the
//! oldest (`head`) to the newest (`tail`) entry; `index` maps each key to its
//! slot, so lookups, refreshes, inserts and deletes are all O(1).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::error::ConfigError;

type EvictHook<K, V> = Box<dyn FnMut(&K, &V) + Send>;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct BoundedMap<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    on_evict: Option<EvictHook<K, V>>,
}

impl<K, V> BoundedMap<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty map holding at most `capacity` entries.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
            on_evict: None,
        })
    }

    /// Register a hook that sees every entry pushed out by capacity pressure.
    /// Explicit deletes do not trigger it.
    #[must_use]
    pub fn with_eviction<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&K, &V) + Send + 'static,
    {
        self.on_evict = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Look up `key` and mark it as the most recently used entry.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.move_to_back(slot);
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|node| &node.value)
    }

    /// Mutable variant of [`BoundedMap::get`]; also refreshes recency.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.move_to_back(slot);
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .map(|node| &mut node.value)
    }

    /// Look up `key` without touching its position.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|node| &node.value)
    }

    /// Insert or replace `key`, leaving it as the most recent entry.
    ///
    /// When `key` is new and the map is full, the oldest entry is evicted
    /// first: the eviction hook sees it and it is handed back to the caller.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(node) = self.slots.get_mut(slot).and_then(Option::as_mut) {
                node.value = value;
            }
            self.move_to_back(slot);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let slot = self.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_back(slot);
        self.index.insert(key, slot);

        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        self.release(slot).map(|node| node.value)
    }

    /// Remove `key`, reporting whether it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Entries from the oldest to the most recently used.
    #[must_use]
    pub fn entries(&self) -> Entries<'_, K, V> {
        Entries {
            slots: &self.slots,
            cursor: self.head,
            remaining: self.index.len(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries().map(|(key, _)| key)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let head = self.head?;
        let node = self.release(head)?;
        self.index.remove(&node.key);

        if let Some(hook) = self.on_evict.as_mut() {
            hook(&node.key, &node.value);
        }

        Some((node.key, node.value))
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(slot) = self.free.pop() {
            if let Some(entry) = self.slots.get_mut(slot) {
                *entry = Some(node);
                return slot;
            }
        }
        self.slots.push(Some(node));
        self.slots.len() - 1
    }

    fn release(&mut self, slot: usize) -> Option<Node<K, V>> {
        self.unlink(slot);
        let node = self.slots.get_mut(slot).and_then(Option::take);
        if node.is_some() {
            self.free.push(slot);
        }
        node
    }

    fn move_to_back(&mut self, slot: usize) {
        if self.tail == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_back(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let Some((prev, next)) = self
            .slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|node| (node.prev, node.next))
        else {
            return;
        };

        match prev.and_then(|p| self.slots.get_mut(p).and_then(Option::as_mut)) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.slots.get_mut(n).and_then(Option::as_mut)) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_back(&mut self, slot: usize) {
        let tail = self.tail;
        if let Some(node) = self.slots.get_mut(slot).and_then(Option::as_mut) {
            node.prev = tail;
            node.next = None;
        }
        match tail.and_then(|t| self.slots.get_mut(t).and_then(Option::as_mut)) {
            Some(node) => node.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}

impl<K, V> fmt::Debug for BoundedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedMap")
            .field("capacity", &self.capacity)
            .field("len", &self.index.len())
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

/// Iterator over a [`BoundedMap`], oldest entry first.
pub struct Entries<'a, K, V> {
    slots: &'a [Option<Node<K, V>>],
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Entries<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.slots.get(slot).and_then(Option::as_ref)?;
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
