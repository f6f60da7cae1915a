use std::{fmt, sync::Arc, time::Duration};

use crate::common::time::{self, Instant};

/// A key-value pair stored in a [`TimeoutMap`][timeout-map], with its
/// expiration bookkeeping.
///
/// An `Entry` is handed to
/// [`EvictionPolicy::is_valid_for_eviction`][is-valid] during a purge pass. It
/// is a snapshot: changing the map from the hook does not change the entry.
///
/// [timeout-map]: ./struct.TimeoutMap.html
/// [is-valid]: ./trait.EvictionPolicy.html#method.is_valid_for_eviction
pub struct Entry<K, V> {
    key: Arc<K>,
    value: V,
    timeout: Duration,
    expire_at: Option<Instant>,
    seq: u64,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: Arc<K>, value: V, timeout: Duration, seq: u64) -> Self {
        Self {
            key,
            value,
            timeout,
            expire_at: None,
            seq,
        }
    }

    /// Returns a reference to the key of this entry.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns a reference to the value of this entry.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the timeout of this entry. Every access to the entry pushes its
    /// expiration this far into the future.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn key_arc(&self) -> &Arc<K> {
        &self.key
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }

    pub(crate) fn expire_at(&self) -> Option<Instant> {
        self.expire_at
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Restarts the expiration countdown from `now`.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.expire_at = time::expiration_after(now, self.timeout);
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(at) if at < now)
    }
}

impl<K, V: Clone> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            value: self.value.clone(),
            timeout: self.timeout,
            expire_at: self.expire_at,
            seq: self.seq,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("timeout", &self.timeout)
            .finish()
    }
}
