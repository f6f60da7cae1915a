use crate::{
    builder::TimeoutMapBuilder,
    common::time::Clock,
    error::{Error, Result},
    lifecycle::{AtomicState, ServiceState},
    lock::{LockStrategy, StrategyGuard},
    policy::{self, EvictionPolicy},
    scheduler::{ScheduleHandle, ScheduledTask, Scheduler},
    store::Store,
};

use parking_lot::Mutex;
use std::{
    fmt,
    hash::Hash,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

/// A thread-safe key-value map whose entries expire after a sliding timeout.
///
/// Each entry is stored with its own timeout. Every `get` or `put` of the entry
/// restarts its expiration countdown, so an entry only expires after it has not
/// been accessed for its whole timeout.
///
/// Expired entries are not removed at the moment they expire. A purge pass,
/// scheduled every [`purge_interval`](#method.purge_interval) on the
/// [`Scheduler`][scheduler] given at construction, finds them and evicts them
/// after consulting the [`EvictionPolicy`][eviction-policy]. Call
/// [`start`](#method.start) to begin the scheduled purge passes.
///
/// `TimeoutMap` is a handle to shared state: cloning it is cheap and every clone
/// accesses the same map. The scheduled purge task is cancelled when the last
/// handle is dropped.
///
/// # Examples
///
/// ```rust
/// use timeout_map::{ThreadPoolScheduler, TimeoutMap};
///
/// use std::{sync::Arc, time::Duration};
///
/// let scheduler = Arc::new(ThreadPoolScheduler::new(1));
/// let map = TimeoutMap::new(scheduler);
/// map.start().unwrap();
///
/// map.put("request-1", "pending", Duration::from_secs(5));
/// assert_eq!(map.get(&"request-1"), Some("pending"));
///
/// // put_if_absent does not replace an existing entry.
/// assert_eq!(
///     map.put_if_absent("request-1", "done", Duration::from_secs(5)),
///     Some("pending")
/// );
///
/// assert_eq!(map.remove(&"request-1"), Some("pending"));
/// assert!(map.is_empty());
///
/// map.stop().unwrap();
/// ```
///
/// [scheduler]: ./trait.Scheduler.html
/// [eviction-policy]: ./trait.EvictionPolicy.html
pub struct TimeoutMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TimeoutMap<K, V> {
    /// Makes a clone of this shared map.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for TimeoutMap<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutMap")
            .field("name", &self.inner.name)
            .field("len", &self.inner.store.len())
            .field("purge_interval", &self.inner.purge_interval)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl<K, V> TimeoutMap<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `TimeoutMap<K, V>` with the default configuration: a
    /// purge interval of 1 second and an exclusive lock.
    ///
    /// To adjust the configuration, use the
    /// [`TimeoutMapBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.TimeoutMapBuilder.html
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::builder(scheduler).build()
    }

    /// Returns a [`TimeoutMapBuilder`][builder-struct], which can build a
    /// `TimeoutMap` with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.TimeoutMapBuilder.html
    pub fn builder(scheduler: Arc<dyn Scheduler>) -> TimeoutMapBuilder<K, V> {
        TimeoutMapBuilder::new(scheduler)
    }

    pub(crate) fn with_everything(
        name: Option<String>,
        scheduler: Arc<dyn Scheduler>,
        purge_interval: Duration,
        lock: Box<dyn LockStrategy>,
        policy: Box<dyn EvictionPolicy<K, V>>,
        initial_capacity: Option<usize>,
        clock: Clock,
    ) -> Self {
        let inner = Inner {
            name,
            store: Store::with_capacity(initial_capacity.unwrap_or_default()),
            lock,
            policy,
            clock,
            scheduler,
            purge_interval,
            state: AtomicState::default(),
            purge_job: Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the value corresponding to the key, and restarts the expiration
    /// countdown of the entry.
    ///
    /// The value is cloned. Use `Arc<V>` as the value type to make the clone
    /// cheap.
    pub fn get(&self, key: &K) -> Option<V> {
        let inner = &self.inner;
        let _guard = inner.guard();
        inner.store.get_and_touch(key, inner.clock.now())
    }

    /// Inserts a key-value pair that expires after `timeout` without access.
    ///
    /// Returns the value of the entry that was replaced, if any.
    pub fn put(&self, key: K, value: V, timeout: Duration) -> Option<V> {
        let inner = &self.inner;
        let _guard = inner.guard();
        // The sequence number is taken under the lock so that it follows the
        // order in which entries reach the store.
        let mut entry = inner.store.new_entry(key, value, timeout);
        entry.touch(inner.clock.now());
        inner.store.insert(entry)
    }

    /// Inserts a key-value pair only if the key is not present yet.
    ///
    /// If the key is present, returns a clone of its value and leaves the
    /// existing entry untouched: neither its value nor its expiration changes.
    pub fn put_if_absent(&self, key: K, value: V, timeout: Duration) -> Option<V> {
        let inner = &self.inner;
        let _guard = inner.guard();
        // The sequence number is taken under the lock so that it follows the
        // order in which entries reach the store.
        let mut entry = inner.store.new_entry(key, value, timeout);
        entry.touch(inner.clock.now());
        inner.store.insert_if_absent(entry)
    }

    /// Removes the entry for the key, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let inner = &self.inner;
        let _guard = inner.guard();
        inner.store.remove(key)
    }

    /// Returns the number of entries in the map, including expired entries that
    /// have not been purged yet.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Runs a purge pass now, on the calling thread.
    ///
    /// Expired entries accepted by
    /// [`EvictionPolicy::is_valid_for_eviction`][is-valid] are notified to
    /// [`EvictionPolicy::on_eviction`][on-eviction] oldest expiration first, and
    /// those confirmed by the hook are removed after all notifications have
    /// fired. Entries expiring at the same instant are notified in insertion
    /// order.
    ///
    /// Removal only takes out the entry that was notified. If the key was put
    /// again while the pass was running, for example by `on_eviction` itself,
    /// the new entry is kept.
    ///
    /// A panic in `on_eviction` is caught and the entry is kept. A panic in
    /// `is_valid_for_eviction` propagates to the caller.
    ///
    /// [is-valid]: ./trait.EvictionPolicy.html#method.is_valid_for_eviction
    /// [on-eviction]: ./trait.EvictionPolicy.html#method.on_eviction
    pub fn purge(&self) {
        self.inner.purge();
    }

    /// Starts the map: schedules purge passes on the scheduler, the first one
    /// immediately and the next ones `purge_interval` after the previous one
    /// has finished.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`][invalid-state] if the map is not stopped.
    /// - [`Error::SchedulerShutdown`][shutdown] if the scheduler cannot accept
    ///   new tasks. Nothing is scheduled, and the map stays stopped.
    ///
    /// Both are invalid-state errors:
    /// [`Error::is_invalid_state`](./enum.Error.html#method.is_invalid_state)
    /// returns `true` for them.
    ///
    /// [invalid-state]: ./enum.Error.html#variant.InvalidState
    /// [shutdown]: ./enum.Error.html#variant.SchedulerShutdown
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .state
            .transition("start", ServiceState::Stopped, ServiceState::Starting)?;

        if inner.scheduler.is_shutdown() {
            inner.state.set(ServiceState::Stopped);
            return Err(Error::SchedulerShutdown);
        }

        // The task only holds a weak reference, so it does not keep the map
        // alive.
        let weak = Arc::downgrade(inner);
        let task: ScheduledTask = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_scheduled_purge();
            }
        });

        match inner
            .scheduler
            .schedule_with_fixed_delay(Duration::ZERO, inner.purge_interval, task)
        {
            Ok(job) => {
                *inner.purge_job.lock() = Some(job);
                inner.state.set(ServiceState::Started);
                Ok(())
            }
            Err(e) => {
                inner.state.set(ServiceState::Stopped);
                Err(e)
            }
        }
    }

    /// Stops the map: cancels the scheduled purge passes and removes all
    /// entries, expired or not.
    ///
    /// A purge pass that is already running is allowed to finish. The map can
    /// be started again.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`][invalid-state] if the map is not started.
    ///
    /// [invalid-state]: ./enum.Error.html#variant.InvalidState
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .state
            .transition("stop", ServiceState::Started, ServiceState::Stopping)?;

        if let Some(job) = inner.purge_job.lock().take() {
            job.cancel();
        }

        {
            let _guard = inner.guard();
            inner.store.clear();
        }

        inner.state.set(ServiceState::Stopped);
        Ok(())
    }
}

// Accessors that need no bounds on K and V.
impl<K, V> TimeoutMap<K, V> {
    /// Returns the name of the map, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns the interval between two purge passes.
    pub fn purge_interval(&self) -> Duration {
        self.inner.purge_interval
    }

    /// Returns the scheduler the purge passes are scheduled on.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// Returns the current lifecycle state of the map.
    pub fn state(&self) -> ServiceState {
        self.inner.state.get()
    }
}

pub(crate) struct Inner<K, V> {
    name: Option<String>,
    store: Store<K, V>,
    lock: Box<dyn LockStrategy>,
    policy: Box<dyn EvictionPolicy<K, V>>,
    clock: Clock,
    scheduler: Arc<dyn Scheduler>,
    purge_interval: Duration,
    state: AtomicState,
    purge_job: Mutex<Option<Box<dyn ScheduleHandle>>>,
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        // Cancel the scheduled purge task. (This will not abort the task if it
        // is already running)
        if let Some(job) = self.purge_job.get_mut().take() {
            job.cancel();
        }
    }
}

impl<K, V> Inner<K, V> {
    fn guard(&self) -> StrategyGuard<'_> {
        StrategyGuard::acquire(&*self.lock)
    }
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn purge(&self) {
        let _guard = self.guard();

        #[cfg(feature = "logging")]
        log::trace!(
            "{}There are {} entries in the timeout map",
            crate::common::name_prefix(self.name.as_deref()),
            self.store.len()
        );

        if self.store.is_empty() {
            return;
        }

        let now = self.clock.now();
        let mut candidates = self.store.expired_entries(now);
        candidates.retain(|entry| self.policy.is_valid_for_eviction(entry));
        if candidates.is_empty() {
            return;
        }

        // Oldest expiration first. Sequence numbers are unique, so ties on the
        // expiration are broken by insertion order.
        candidates.sort_unstable_by_key(|entry| (entry.expire_at(), entry.seq()));

        let map_name = self.name.as_deref();
        let evicts: Vec<_> = candidates
            .iter()
            .filter(|entry| policy::notify_eviction(&*self.policy, entry, map_name))
            .collect();

        // Remove only after all notifications have fired.
        let _evicted = evicts
            .into_iter()
            .filter(|entry| self.store.remove_if_same(entry.key(), entry.seq()))
            .count();

        #[cfg(feature = "logging")]
        log::debug!(
            "{}Evicted {} of {} expired entries",
            crate::common::name_prefix(map_name),
            _evicted,
            candidates.len()
        );
    }

    /// The body of the scheduled purge task. Never panics, so that a failing
    /// pass does not end the schedule.
    fn run_scheduled_purge(&self) {
        if !self.state.get().is_run_allowed() {
            #[cfg(feature = "logging")]
            log::trace!(
                "{}The purge task is not allowed to run",
                crate::common::name_prefix(self.name.as_deref())
            );
            return;
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "{}Running the purge task to see if any entries have timed out",
            crate::common::name_prefix(self.name.as_deref())
        );

        let result = catch_unwind(AssertUnwindSafe(|| self.purge()));
        if let Err(_payload) = result {
            #[cfg(feature = "logging")]
            self.log_purge_panic(&*_payload);
        }
    }

    #[cfg(feature = "logging")]
    fn log_purge_panic(&self, payload: &(dyn std::any::Any + Send + 'static)) {
        let pfx = crate::common::name_prefix(self.name.as_deref());
        if let Some(m) = crate::common::panic_message(payload) {
            log::warn!("{pfx}A purge pass panicked at '{m}'. The next pass will run as scheduled");
        } else {
            log::warn!("{pfx}A purge pass panicked. The next pass will run as scheduled");
        }
    }
}
