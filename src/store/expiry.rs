//! Secondary index keeping keys in deadline order.
//!
//! Cleanup pops from the front while the earliest deadline has passed and
//! stops at the first live one, so a purge only pays for the entries it
//! removes. Ties on the same deadline keep scheduling order.

use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

type Slot = (DateTime<Utc>, u64);

#[derive(Debug)]
pub struct ExpiryIndex<K> {
    by_deadline: BTreeMap<Slot, K>,
    slots: HashMap<K, Slot>,
    sequence: u64,
}

impl<K> Default for ExpiryIndex<K> {
    fn default() -> Self {
        Self {
            by_deadline: BTreeMap::new(),
            slots: HashMap::new(),
            sequence: 0,
        }
    }
}

impl<K> ExpiryIndex<K>
where
    K: Hash + Eq + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Set (or move) the deadline of `key`.
    pub fn schedule(&mut self, key: K, expires_at: DateTime<Utc>) {
        self.cancel(&key);
        self.sequence = self.sequence.wrapping_add(1);
        let slot = (expires_at, self.sequence);
        self.by_deadline.insert(slot, key.clone());
        self.slots.insert(key, slot);
    }

    /// Forget `key`, returning the deadline it had.
    pub fn cancel<Q>(&mut self, key: &Q) -> Option<DateTime<Utc>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.slots.remove(key)?;
        self.by_deadline.remove(&slot);
        Some(slot.0)
    }

    pub fn deadline<Q>(&self, key: &Q) -> Option<DateTime<Utc>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.slots.get(key).map(|slot| slot.0)
    }

    /// Earliest deadline currently tracked.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.by_deadline.first_key_value().map(|(slot, _)| slot.0)
    }

    /// Remove and return the earliest key if its deadline is before `now`.
    pub fn pop_expired(&mut self, now: DateTime<Utc>) -> Option<(K, DateTime<Utc>)> {
        if self.next_deadline()? >= now {
            return None;
        }
        let ((expires_at, _), key) = self.by_deadline.pop_first()?;
        self.slots.remove(&key);
        Some((key, expires_at))
    }

    pub fn clear(&mut self) {
        self.by_deadline.clear();
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::minutes(minutes)
    }

    #[test]
    fn pops_in_deadline_order_and_stops_at_live_entry() {
        let mut index = ExpiryIndex::new();
        index.schedule("late", at(30));
        index.schedule("early", at(5));
        index.schedule("middle", at(10));

        assert_eq!(index.pop_expired(at(20)), Some(("early", at(5))));
        assert_eq!(index.pop_expired(at(20)), Some(("middle", at(10))));
        assert_eq!(index.pop_expired(at(20)), None);
        assert_eq!(index.len(), 1);
        assert_eq!(index.next_deadline(), Some(at(30)));
    }

    #[test]
    fn deadline_equal_to_now_is_still_live() {
        let mut index = ExpiryIndex::new();
        index.schedule("k", at(1));
        assert_eq!(index.pop_expired(at(1)), None);
        assert_eq!(index.pop_expired(at(2)), Some(("k", at(1))));
    }

    #[test]
    fn rescheduling_moves_the_key() {
        let mut index = ExpiryIndex::new();
        index.schedule("a", at(1));
        index.schedule("b", at(2));
        index.schedule("a", at(3));

        assert_eq!(index.len(), 2);
        assert_eq!(index.deadline("a"), Some(at(3)));
        assert_eq!(index.pop_expired(at(10)), Some(("b", at(2))));
        assert_eq!(index.pop_expired(at(10)), Some(("a", at(3))));
        assert!(index.is_empty());
    }

    #[test]
    fn rescheduling_earlier_is_honoured() {
        let mut index = ExpiryIndex::new();
        index.schedule("stale", at(60));
        index.schedule("locked", at(90));
        index.schedule("locked", at(15));

        assert_eq!(index.pop_expired(at(20)), Some(("locked", at(15))));
        assert_eq!(index.pop_expired(at(20)), None);
    }

    #[test]
    fn equal_deadlines_keep_scheduling_order() {
        let mut index = ExpiryIndex::new();
        index.schedule("first", at(1));
        index.schedule("second", at(1));

        assert_eq!(index.pop_expired(at(2)).map(|(k, _)| k), Some("first"));
        assert_eq!(index.pop_expired(at(2)).map(|(k, _)| k), Some("second"));
    }

    #[test]
    fn cancel_removes_deadline() {
        let mut index = ExpiryIndex::new();
        index.schedule("a", at(1));
        assert_eq!(index.cancel("a"), Some(at(1)));
        assert_eq!(index.cancel("a"), None);
        assert_eq!(index.pop_expired(at(5)), None);
    }
}
