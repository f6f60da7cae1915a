use std::time::Duration;

pub(crate) type Clock = quanta::Clock;
pub(crate) type Instant = quanta::Instant;

#[cfg(test)]
pub(crate) type Mock = quanta::Mock;

/// Returns the instant `timeout` after `now`, or `None` when the addition
/// overflows. `None` means the entry never expires by time.
pub(crate) fn expiration_after(now: Instant, timeout: Duration) -> Option<Instant> {
    now.checked_add(timeout)
}
