#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A thread-safe key-value map whose entries expire after a sliding timeout.
//!
//! `TimeoutMap` is built for correlating pending work, such as outstanding
//! request IDs awaiting asynchronous replies, and discarding the entries that
//! outlive their timeout.
//!
//! # Features
//!
//! - Per-entry timeouts with sliding expiration: every `get` or `put` of an entry
//!   restarts its countdown.
//! - Expired entries are evicted by periodic purge passes running on an injected
//!   [`Scheduler`][scheduler]. The map borrows the scheduler and never shuts it
//!   down. A [`ThreadPoolScheduler`][thread-pool-scheduler] is provided.
//! - Eviction hooks: an [`EvictionPolicy`][eviction-policy] can veto the eviction
//!   of an expired entry, and is notified of evictions oldest expiration first.
//!   A panicking hook does not stop a purge pass, and a panicking purge pass
//!   does not stop the schedule.
//! - Pluggable locking: compound operations are serialized by an
//!   [`ExclusiveLock`][exclusive-lock] by default, or left unserialized with a
//!   [`NoOpLock`][no-op-lock].
//!
//! Eviction is eventual: an expired entry stays in the map until the next
//! purge pass. Memory is not bounded; choose timeouts accordingly.
//!
//! # Example
//!
//! ```rust
//! use timeout_map::{ThreadPoolScheduler, TimeoutMap};
//!
//! use std::{sync::Arc, time::Duration};
//!
//! let scheduler = Arc::new(ThreadPoolScheduler::new(1));
//!
//! let map = TimeoutMap::builder(scheduler)
//!     .purge_interval(Duration::from_millis(10))
//!     .eviction_listener(|id: &u64, request: &String| {
//!         println!("Request {id} timed out: {request}");
//!         true
//!     })
//!     .build();
//! map.start().unwrap();
//!
//! map.put(1, "GET /slow".to_string(), Duration::from_millis(20));
//! std::thread::sleep(Duration::from_millis(200));
//! assert_eq!(map.get(&1), None);
//!
//! map.stop().unwrap();
//! ```
//!
//! # Logging
//!
//! With the `logging` feature (enabled by default), the map emits logs through
//! the [`log`](https://docs.rs/log) crate when a purge pass runs and when an
//! eviction hook or a scheduled purge pass panics.
//!
//! [scheduler]: ./trait.Scheduler.html
//! [thread-pool-scheduler]: ./struct.ThreadPoolScheduler.html
//! [eviction-policy]: ./trait.EvictionPolicy.html
//! [exclusive-lock]: ./struct.ExclusiveLock.html
//! [no-op-lock]: ./struct.NoOpLock.html

pub(crate) mod builder;
pub(crate) mod common;
pub(crate) mod entry;
pub(crate) mod error;
pub(crate) mod lifecycle;
pub(crate) mod lock;
pub(crate) mod map;
pub(crate) mod policy;
pub(crate) mod scheduler;
pub(crate) mod store;

pub use builder::{TimeoutMapBuilder, DEFAULT_PURGE_INTERVAL};
pub use entry::Entry;
pub use error::{Error, Result};
pub use lifecycle::ServiceState;
pub use lock::{ExclusiveLock, LockStrategy, LockingMode, NoOpLock};
pub use map::TimeoutMap;
pub use policy::{DefaultEvictionPolicy, EvictionPolicy};
pub use scheduler::{ScheduleHandle, ScheduledTask, Scheduler, ThreadPoolScheduler};
