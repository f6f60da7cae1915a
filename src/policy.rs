use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::entry::Entry;

/// Extension points of a [`TimeoutMap`][timeout-map] that decide whether an
/// expired entry is actually evicted by a purge pass.
///
/// Both methods default to permissive behavior, so an implementation only
/// overrides what it needs.
///
/// # Example
///
/// ```rust
/// use timeout_map::{Entry, EvictionPolicy};
///
/// struct KeepInFlight;
///
/// impl EvictionPolicy<u64, String> for KeepInFlight {
///     fn is_valid_for_eviction(&self, entry: &Entry<u64, String>) -> bool {
///         entry.value() != "in-flight"
///     }
/// }
/// ```
///
/// [timeout-map]: ./struct.TimeoutMap.html
pub trait EvictionPolicy<K, V>: Send + Sync {
    /// Decides whether an entry found expired is a candidate for eviction.
    /// Return `false` to veto the eviction in this purge pass.
    ///
    /// Default: `true`.
    fn is_valid_for_eviction(&self, _entry: &Entry<K, V>) -> bool {
        true
    }

    /// Called once per eviction candidate, oldest expiration first, before the
    /// entry is removed. Return `false` to keep the entry.
    ///
    /// If this method panics, the panic is caught and logged, the entry is kept,
    /// and the purge pass continues with the next candidate.
    ///
    /// Default: `true`.
    fn on_eviction(&self, _key: &K, _value: &V) -> bool {
        true
    }
}

/// The eviction policy that evicts every expired entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEvictionPolicy;

impl<K, V> EvictionPolicy<K, V> for DefaultEvictionPolicy {}

/// Adapts a closure to `EvictionPolicy::on_eviction`.
pub(crate) struct EvictionListener<F>(pub(crate) F);

impl<K, V, F> EvictionPolicy<K, V> for EvictionListener<F>
where
    F: Fn(&K, &V) -> bool + Send + Sync,
{
    fn on_eviction(&self, key: &K, value: &V) -> bool {
        (self.0)(key, value)
    }
}

/// Calls `on_eviction` for the entry. A panicking hook counts as `false`.
pub(crate) fn notify_eviction<K, V>(
    policy: &dyn EvictionPolicy<K, V>,
    entry: &Entry<K, V>,
    _map_name: Option<&str>,
) -> bool {
    let hook = || policy.on_eviction(entry.key(), entry.value());

    // Safety: It is safe to assert unwind safety here because the entry is a
    // snapshot that is never evicted after the hook panicked.
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(evict) => evict,
        Err(_payload) => {
            #[cfg(feature = "logging")]
            log_panic(&*_payload, _map_name);
            false
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static), map_name: Option<&str>) {
    use crate::common::{name_prefix, panic_message};

    let pfx = name_prefix(map_name);
    if let Some(m) = panic_message(payload) {
        log::error!("{pfx}The eviction hook panicked at '{m}'. The entry will not be evicted");
    } else {
        log::error!("{pfx}The eviction hook panicked. The entry will not be evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::{notify_eviction, DefaultEvictionPolicy, EvictionListener, EvictionPolicy};
    use crate::entry::Entry;

    use std::{sync::Arc, time::Duration};

    fn entry(key: u32, value: &'static str) -> Entry<u32, &'static str> {
        Entry::new(Arc::new(key), value, Duration::from_secs(1), 0)
    }

    #[test]
    fn default_policy_is_permissive() {
        let policy: &dyn EvictionPolicy<u32, &str> = &DefaultEvictionPolicy;
        let e = entry(1, "a");
        assert!(policy.is_valid_for_eviction(&e));
        assert!(notify_eviction(policy, &e, None));
    }

    #[test]
    fn listener_decides_eviction() {
        let listener = EvictionListener(|k: &u32, _v: &&str| k % 2 == 0);
        let policy: &dyn EvictionPolicy<u32, &str> = &listener;
        assert!(notify_eviction(policy, &entry(2, "b"), None));
        assert!(!notify_eviction(policy, &entry(3, "c"), None));
    }

    #[test]
    fn panicking_hook_keeps_the_entry() {
        let listener = EvictionListener(|_k: &u32, v: &&str| {
            if *v == "boom" {
                panic!("Panic now!");
            }
            true
        });
        let policy: &dyn EvictionPolicy<u32, &str> = &listener;
        assert!(!notify_eviction(policy, &entry(1, "boom"), Some("test")));
        // The hook keeps working after a panic.
        assert!(notify_eviction(policy, &entry(2, "fine"), Some("test")));
    }
}
