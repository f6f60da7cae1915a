//! Correlates outstanding requests with their asynchronous replies. Requests
//! whose reply does not arrive in time are evicted and reported as timed out.

use timeout_map::{Entry, EvictionPolicy, ThreadPoolScheduler, TimeoutMap};

use std::{
    sync::{mpsc, Arc},
    thread::sleep,
    time::Duration,
};

#[derive(Clone, Debug)]
struct Request {
    path: String,
    retries_left: u32,
}

/// Reports timed out requests, and keeps requests that may still be retried.
struct TimeoutReporter {
    timed_out: mpsc::SyncSender<u64>,
}

impl EvictionPolicy<u64, Request> for TimeoutReporter {
    fn is_valid_for_eviction(&self, entry: &Entry<u64, Request>) -> bool {
        entry.value().retries_left == 0
    }

    fn on_eviction(&self, id: &u64, request: &Request) -> bool {
        println!("Request {id} ({}) timed out", request.path);
        self.timed_out.send(*id).is_ok()
    }
}

fn main() {
    let scheduler = Arc::new(ThreadPoolScheduler::new(1));
    let (snd, rcv) = mpsc::sync_channel(16);

    let pending = TimeoutMap::builder(scheduler.clone())
        .name("pending-requests")
        .purge_interval(Duration::from_millis(100))
        .eviction_policy(TimeoutReporter { timed_out: snd })
        .build();
    pending.start().expect("Failed to start the map");

    let timeout = Duration::from_millis(300);
    for (id, path, retries_left) in [(1, "/fast", 0), (2, "/slow", 0), (3, "/flaky", 2)] {
        let request = Request {
            path: path.to_string(),
            retries_left,
        };
        pending.put(id, request, timeout);
    }

    // The reply to request 1 arrives in time.
    sleep(Duration::from_millis(100));
    if let Some(request) = pending.remove(&1) {
        println!("Got the reply to request 1 ({})", request.path);
    }

    // Request 2 never gets a reply.
    let id = rcv
        .recv_timeout(Duration::from_secs(2))
        .expect("Request 2 did not time out");
    println!("Handled the timeout of request {id}");

    // Request 3 is expired but kept because it can still be retried.
    println!("Still pending: {} request(s)", pending.len());
    if let Some(mut request) = pending.remove(&3) {
        request.retries_left -= 1;
        println!("Retrying request 3 ({})", request.path);
        pending.put(3, request, timeout);
    }

    pending.stop().expect("Failed to stop the map");
    println!("Stopped. Pending requests: {}", pending.len());

    // The scheduler belongs to us, not to the map.
    scheduler.shutdown();
}
