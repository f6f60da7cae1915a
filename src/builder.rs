use crate::{
    common::time::Clock,
    lock::{LockStrategy, LockingMode},
    policy::{DefaultEvictionPolicy, EvictionListener, EvictionPolicy},
    scheduler::Scheduler,
    TimeoutMap,
};

use std::{hash::Hash, sync::Arc, time::Duration};

/// The default interval between two purge passes: 1 second.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_millis(1000);

/// Builds a [`TimeoutMap`][timeout-map] with various configuration knobs.
///
/// [timeout-map]: ./struct.TimeoutMap.html
///
/// # Examples
///
/// ```rust
/// use timeout_map::{LockingMode, ThreadPoolScheduler, TimeoutMap};
///
/// use std::{sync::Arc, time::Duration};
///
/// let scheduler = Arc::new(ThreadPoolScheduler::new(1));
///
/// let map = TimeoutMap::builder(scheduler)
///     // Look for expired entries every 250 milliseconds.
///     .purge_interval(Duration::from_millis(250))
///     .locking(LockingMode::Exclusive)
///     // Called before an expired entry is evicted.
///     .eviction_listener(|key: &u64, value: &String| {
///         println!("Request {key} timed out: {value}");
///         true
///     })
///     .build();
///
/// map.start().unwrap();
/// map.put(1, "GET /index.html".to_string(), Duration::from_secs(30));
/// ```
#[must_use]
pub struct TimeoutMapBuilder<K, V> {
    name: Option<String>,
    scheduler: Arc<dyn Scheduler>,
    purge_interval: Duration,
    lock: Box<dyn LockStrategy>,
    policy: Box<dyn EvictionPolicy<K, V>>,
    initial_capacity: Option<usize>,
    clock: Option<Clock>,
}

impl<K, V> TimeoutMapBuilder<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `TimeoutMapBuilder` for a map that schedules its purge
    /// passes on `scheduler`.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            name: None,
            scheduler,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            lock: LockingMode::default().into_strategy(),
            policy: Box::new(DefaultEvictionPolicy),
            initial_capacity: None,
            clock: None,
        }
    }

    /// Sets the name of the map. The name is used as a prefix in log messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the interval between the end of one purge pass and the start of the
    /// next. Default: 1 second.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn purge_interval(self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "purge interval must be positive");
        Self {
            purge_interval: interval,
            ..self
        }
    }

    /// Selects one of the built-in locking strategies. Default:
    /// `LockingMode::Exclusive`.
    pub fn locking(self, mode: LockingMode) -> Self {
        Self {
            lock: mode.into_strategy(),
            ..self
        }
    }

    /// Sets a custom locking strategy.
    pub fn lock_strategy(self, lock: impl LockStrategy + 'static) -> Self {
        Self {
            lock: Box::new(lock),
            ..self
        }
    }

    /// Sets the eviction policy whose hooks are consulted by purge passes.
    pub fn eviction_policy(self, policy: impl EvictionPolicy<K, V> + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            ..self
        }
    }

    /// Sets a closure called once per expired entry before it is evicted. The
    /// entry is only evicted if the closure returns `true`.
    ///
    /// This replaces any policy set by
    /// [`eviction_policy`](#method.eviction_policy).
    pub fn eviction_listener<F>(self, listener: F) -> Self
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        self.eviction_policy(EvictionListener(listener))
    }

    /// Sets the initial capacity (number of entries) of the map.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: Clock) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }

    /// Builds a `TimeoutMap<K, V>`. The map is stopped; call
    /// [`start`](./struct.TimeoutMap.html#method.start) to begin purging.
    pub fn build(self) -> TimeoutMap<K, V> {
        TimeoutMap::with_everything(
            self.name,
            self.scheduler,
            self.purge_interval,
            self.lock,
            self.policy,
            self.initial_capacity,
            self.clock.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{TimeoutMapBuilder, DEFAULT_PURGE_INTERVAL};
    use crate::{ServiceState, ThreadPoolScheduler};

    use std::{sync::Arc, time::Duration};

    #[test]
    fn build_with_defaults() {
        let scheduler = Arc::new(ThreadPoolScheduler::new(1));
        let map = TimeoutMapBuilder::<u32, char>::new(scheduler).build();

        assert_eq!(map.name(), None);
        assert_eq!(map.purge_interval(), DEFAULT_PURGE_INTERVAL);
        assert_eq!(map.state(), ServiceState::Stopped);
        assert!(map.is_empty());
    }

    #[test]
    fn build_with_knobs() {
        let scheduler = Arc::new(ThreadPoolScheduler::new(1));
        let map = TimeoutMapBuilder::<u32, char>::new(scheduler)
            .name("requests")
            .purge_interval(Duration::from_millis(50))
            .initial_capacity(16)
            .build();

        assert_eq!(map.name(), Some("requests"));
        assert_eq!(map.purge_interval(), Duration::from_millis(50));
        assert!(!map.scheduler().is_shutdown());
    }

    #[test]
    #[should_panic(expected = "purge interval must be positive")]
    fn zero_purge_interval() {
        let scheduler = Arc::new(ThreadPoolScheduler::new(1));
        let _ = TimeoutMapBuilder::<u32, char>::new(scheduler).purge_interval(Duration::ZERO);
    }
}
