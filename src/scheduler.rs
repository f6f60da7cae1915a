//! The scheduling facility that drives periodic purge passes.

use std::time::Duration;

use parking_lot::RwLock;
use scheduled_thread_pool::{JobHandle, ScheduledThreadPool};

use crate::error::{Error, Result};

/// A task run repeatedly by a [`Scheduler`](./trait.Scheduler.html).
pub type ScheduledTask = Box<dyn FnMut() + Send + 'static>;

/// A facility that runs tasks periodically on background threads.
///
/// A [`TimeoutMap`][timeout-map] borrows a scheduler: it only schedules and
/// cancels its own purge task, and never shuts the scheduler down. The owner of
/// the scheduler is responsible for its lifetime.
///
/// [timeout-map]: ./struct.TimeoutMap.html
pub trait Scheduler: Send + Sync {
    /// Returns `true` if the scheduler can no longer accept new tasks.
    fn is_shutdown(&self) -> bool;

    /// Schedules `task` to run first after `initial_delay`, then repeatedly with
    /// `delay` between the end of one run and the start of the next.
    ///
    /// Returns [`Error::SchedulerShutdown`][shutdown] if the scheduler cannot
    /// accept the task.
    ///
    /// [shutdown]: ./enum.Error.html#variant.SchedulerShutdown
    fn schedule_with_fixed_delay(
        &self,
        initial_delay: Duration,
        delay: Duration,
        task: ScheduledTask,
    ) -> Result<Box<dyn ScheduleHandle>>;
}

/// A handle to a task scheduled by a [`Scheduler`](./trait.Scheduler.html).
pub trait ScheduleHandle: Send + Sync {
    /// Cancels the future runs of the task. A run that is already executing is
    /// not interrupted.
    fn cancel(&self);
}

impl ScheduleHandle for JobHandle {
    fn cancel(&self) {
        JobHandle::cancel(self)
    }
}

/// A [`Scheduler`](./trait.Scheduler.html) backed by a pool of worker threads.
///
/// The pool can be shared by many timeout maps and other users. Call
/// [`shutdown`](#method.shutdown) to stop the workers; tasks scheduled on the
/// pool will not run anymore.
pub struct ThreadPoolScheduler {
    pool: RwLock<Option<ScheduledThreadPool>>,
}

impl Default for ThreadPoolScheduler {
    /// Creates a scheduler with one worker thread per CPU.
    fn default() -> Self {
        // NOTE: On some platforms, `num_cpus::get` may return 0. In that case,
        // use 1.
        Self::new(num_cpus::get().max(1))
    }
}

impl ThreadPoolScheduler {
    /// Creates a scheduler with `num_threads` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "num_threads must be greater than 0");
        let pool = ScheduledThreadPool::with_name("timeout-map-purger-{}", num_threads);
        Self {
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Shuts down the worker threads. Tasks already scheduled will not run
    /// anymore, and new tasks will be rejected.
    pub fn shutdown(&self) {
        // Dropping the pool signals its workers to exit.
        std::mem::drop(self.pool.write().take());
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn is_shutdown(&self) -> bool {
        self.pool.read().is_none()
    }

    fn schedule_with_fixed_delay(
        &self,
        initial_delay: Duration,
        delay: Duration,
        task: ScheduledTask,
    ) -> Result<Box<dyn ScheduleHandle>> {
        let pool = self.pool.read();
        let pool = pool.as_ref().ok_or(Error::SchedulerShutdown)?;
        let job = pool.execute_with_fixed_delay(initial_delay, delay, task);
        Ok(Box::new(job))
    }
}

#[cfg(test)]
mod tests {
    use super::{Scheduler, ThreadPoolScheduler};
    use crate::error::Error;

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    fn counting_task(counter: &Arc<AtomicUsize>) -> super::ScheduledTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::AcqRel);
        })
    }

    #[test]
    fn runs_repeatedly_until_cancelled() {
        let scheduler = ThreadPoolScheduler::new(1);
        let counter = Arc::new(AtomicUsize::default());

        let handle = scheduler
            .schedule_with_fixed_delay(
                Duration::ZERO,
                Duration::from_millis(10),
                counting_task(&counter),
            )
            .expect("Failed to schedule");

        thread::sleep(Duration::from_millis(200));
        handle.cancel();
        let runs = counter.load(Ordering::Acquire);
        assert!(runs >= 2, "runs: {runs}");

        // Let a run that was executing at the cancellation finish.
        thread::sleep(Duration::from_millis(50));
        let runs = counter.load(Ordering::Acquire);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::Acquire), runs);
    }

    #[test]
    fn rejects_tasks_after_shutdown() {
        let scheduler = ThreadPoolScheduler::new(1);
        assert!(!scheduler.is_shutdown());

        scheduler.shutdown();
        assert!(scheduler.is_shutdown());

        let counter = Arc::new(AtomicUsize::default());
        let result = scheduler.schedule_with_fixed_delay(
            Duration::ZERO,
            Duration::from_millis(10),
            counting_task(&counter),
        );
        assert_eq!(result.err(), Some(Error::SchedulerShutdown));
    }
}
