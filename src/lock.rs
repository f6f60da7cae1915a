//! Pluggable mutual exclusion for the compound operations of a timeout map.

use std::marker::PhantomData;

use parking_lot::ReentrantMutex;

/// A lock that serializes the compound operations of a
/// [`TimeoutMap`][timeout-map], such as "look up and touch" or "scan and remove".
///
/// Two strategies are built in: [`ExclusiveLock`][exclusive] and
/// [`NoOpLock`][no-op]. Implement this trait to plug in other semantics.
///
/// The entry storage of the map is internally synchronized regardless of the
/// strategy, so a strategy only decides how much atomicity the compound
/// operations get. It never affects memory safety of the map.
///
/// [timeout-map]: ./struct.TimeoutMap.html
/// [exclusive]: ./struct.ExclusiveLock.html
/// [no-op]: ./struct.NoOpLock.html
pub trait LockStrategy: Send + Sync {
    /// Acquires the lock, blocking the current thread until it is available.
    fn acquire(&self);

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// This method must only be called by the thread that acquired the lock, and
    /// only once per call to [`acquire`](#tymethod.acquire).
    unsafe fn release(&self);
}

/// A real mutual exclusion lock. This is the default strategy.
///
/// The lock is reentrant: an eviction hook running inside a purge pass may call
/// back into the same map on the purging thread without deadlocking.
pub struct ExclusiveLock {
    inner: ReentrantMutex<()>,
}

impl Default for ExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusiveLock {
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(()),
        }
    }
}

impl LockStrategy for ExclusiveLock {
    fn acquire(&self) {
        // The guard is released in `release` with `force_unlock`.
        std::mem::forget(self.inner.lock());
    }

    unsafe fn release(&self) {
        self.inner.force_unlock();
    }
}

/// A lock whose acquire and release do nothing.
///
/// Use this strategy when the caller already guarantees external
/// synchronization, or when relaxed consistency between accessors and purge
/// passes is acceptable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLock;

impl LockStrategy for NoOpLock {
    fn acquire(&self) {}

    unsafe fn release(&self) {}
}

/// Selects one of the built-in [`LockStrategy`][lock-strategy]s.
///
/// [lock-strategy]: ./trait.LockStrategy.html
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LockingMode {
    /// Use an [`ExclusiveLock`](./struct.ExclusiveLock.html).
    #[default]
    Exclusive,
    /// Use a [`NoOpLock`](./struct.NoOpLock.html).
    NoOp,
}

impl LockingMode {
    pub(crate) fn into_strategy(self) -> Box<dyn LockStrategy> {
        match self {
            LockingMode::Exclusive => Box::new(ExclusiveLock::new()),
            LockingMode::NoOp => Box::new(NoOpLock),
        }
    }
}

/// Holds a `LockStrategy` acquired until dropped.
pub(crate) struct StrategyGuard<'a> {
    lock: &'a dyn LockStrategy,
    // Must be released by the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl<'a> StrategyGuard<'a> {
    pub(crate) fn acquire(lock: &'a dyn LockStrategy) -> Self {
        lock.acquire();
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for StrategyGuard<'_> {
    fn drop(&mut self) {
        // Safety: The guard is `!Send`, so it is dropped by the thread that
        // acquired the lock in `StrategyGuard::acquire`.
        unsafe { self.lock.release() }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExclusiveLock, LockingMode, NoOpLock, StrategyGuard};

    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn exclusive_lock_blocks_other_threads() {
        let lock = Arc::new(ExclusiveLock::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = StrategyGuard::acquire(&*lock);

        let handle = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _guard = StrategyGuard::acquire(&*lock);
                acquired.store(true, Ordering::Release);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::Acquire));

        drop(guard);
        handle.join().expect("Thread failed");
        assert!(acquired.load(Ordering::Acquire));
    }

    #[test]
    fn exclusive_lock_is_reentrant() {
        let lock = ExclusiveLock::new();
        let _outer = StrategyGuard::acquire(&lock);
        let _inner = StrategyGuard::acquire(&lock);
    }

    #[test]
    fn no_op_lock_never_blocks() {
        let lock = Arc::new(NoOpLock);
        let _guard = StrategyGuard::acquire(&*lock);

        let lock2 = Arc::clone(&lock);
        thread::spawn(move || {
            let _guard = StrategyGuard::acquire(&*lock2);
        })
        .join()
        .expect("Thread failed");
    }

    #[test]
    fn locking_mode_defaults_to_exclusive() {
        assert_eq!(LockingMode::default(), LockingMode::Exclusive);

        // Both strategies can be acquired and released.
        for mode in [LockingMode::Exclusive, LockingMode::NoOp] {
            let strategy = mode.into_strategy();
            strategy.acquire();
            unsafe { strategy.release() };
        }
    }
}
