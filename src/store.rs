use std::{
    collections::{hash_map, HashMap},
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;

use crate::{common::time::Instant, entry::Entry};

/// The entry storage of a timeout map.
///
/// Every method is atomic on its own. Sequences of calls are made atomic by the
/// map's `LockStrategy`.
pub(crate) struct Store<K, V> {
    entries: RwLock<HashMap<Arc<K>, Entry<K, V>>>,
    next_seq: AtomicU64,
}

impl<K, V> Store<K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            next_seq: AtomicU64::default(),
        }
    }

    /// Creates an entry with the next insertion sequence number.
    pub(crate) fn new_entry(&self, key: K, value: V, timeout: Duration) -> Entry<K, V> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Entry::new(Arc::new(key), value, timeout, seq)
    }

    /// Returns a clone of the value for `key` and restarts its expiration
    /// countdown from `now`.
    pub(crate) fn get_and_touch(&self, key: &K, now: Instant) -> Option<V>
    where
        V: Clone,
    {
        let mut entries = self.entries.write();
        entries.get_mut(key).map(|entry| {
            entry.touch(now);
            entry.value().clone()
        })
    }

    /// Inserts the entry, returning the value of the entry it replaced.
    pub(crate) fn insert(&self, entry: Entry<K, V>) -> Option<V> {
        let key = Arc::clone(entry.key_arc());
        self.entries
            .write()
            .insert(key, entry)
            .map(Entry::into_value)
    }

    /// Inserts the entry only if its key is absent. Otherwise returns a clone of
    /// the existing value and leaves the existing entry as it is.
    pub(crate) fn insert_if_absent(&self, entry: Entry<K, V>) -> Option<V>
    where
        V: Clone,
    {
        let key = Arc::clone(entry.key_arc());
        match self.entries.write().entry(key) {
            hash_map::Entry::Occupied(existing) => Some(existing.get().value().clone()),
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                None
            }
        }
    }

    pub(crate) fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(Entry::into_value)
    }

    /// Removes the entry for `key` only if it is still the entry with the given
    /// insertion sequence number.
    pub(crate) fn remove_if_same(&self, key: &K, seq: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.seq() == seq => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Returns snapshots of the entries that expired before `now`, in no
    /// particular order.
    pub(crate) fn expired_entries(&self, now: Instant) -> Vec<Entry<K, V>>
    where
        V: Clone,
    {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_expired(now))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use crate::common::time::Clock;

    use std::time::Duration;

    type TestStore = Store<&'static str, &'static str>;

    fn insert(
        store: &TestStore,
        clock: &Clock,
        key: &'static str,
        value: &'static str,
        secs: u64,
    ) -> Option<&'static str> {
        let mut entry = store.new_entry(key, value, Duration::from_secs(secs));
        entry.touch(clock.now());
        store.insert(entry)
    }

    #[test]
    fn insert_returns_replaced_value() {
        let (clock, _mock) = Clock::mock();
        let store = Store::with_capacity(4);

        assert_eq!(insert(&store, &clock, "a", "alice", 10), None);
        assert_eq!(insert(&store, &clock, "a", "alex", 10), Some("alice"));
        assert_eq!(store.get_and_touch(&"a", clock.now()), Some("alex"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_if_absent_keeps_existing_entry() {
        let (clock, mock) = Clock::mock();
        let store = Store::with_capacity(4);
        insert(&store, &clock, "a", "alice", 10);

        mock.increment(Duration::from_secs(5));
        let mut entry = store.new_entry("a", "alex", Duration::from_secs(10));
        entry.touch(clock.now());
        assert_eq!(store.insert_if_absent(entry), Some("alice"));

        // The existing entry was not touched, so it still expires at 10 secs.
        mock.increment(Duration::from_secs(6)); // 11 secs.
        let expired = store.expired_entries(clock.now());
        assert_eq!(expired.len(), 1);
        assert_eq!(*expired[0].value(), "alice");
    }

    #[test]
    fn get_and_touch_restarts_countdown() {
        let (clock, mock) = Clock::mock();
        let store = Store::with_capacity(4);
        insert(&store, &clock, "a", "alice", 10);

        mock.increment(Duration::from_secs(8));
        assert_eq!(store.get_and_touch(&"a", clock.now()), Some("alice"));

        mock.increment(Duration::from_secs(8)); // 16 secs.
        assert!(store.expired_entries(clock.now()).is_empty());

        mock.increment(Duration::from_secs(3)); // 19 secs.
        assert_eq!(store.expired_entries(clock.now()).len(), 1);
        assert_eq!(store.get_and_touch(&"b", clock.now()), None);
    }

    #[test]
    fn remove_if_same_skips_replaced_entry() {
        let (clock, _mock) = Clock::mock();
        let store = Store::with_capacity(4);
        insert(&store, &clock, "a", "alice", 10);
        let old_seq = store.expired_entries(clock.now() + Duration::from_secs(11))[0].seq();

        insert(&store, &clock, "a", "alex", 10);
        assert!(!store.remove_if_same(&"a", old_seq));
        assert_eq!(store.len(), 1);

        let new_seq = store.expired_entries(clock.now() + Duration::from_secs(11))[0].seq();
        assert!(store.remove_if_same(&"a", new_seq));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_and_clear() {
        let (clock, _mock) = Clock::mock();
        let store = Store::with_capacity(4);
        insert(&store, &clock, "a", "alice", 10);
        insert(&store, &clock, "b", "bob", 10);

        assert_eq!(store.remove(&"a"), Some("alice"));
        assert_eq!(store.remove(&"a"), None);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
