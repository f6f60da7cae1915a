use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use crate::error::{Error, Result};

/// The lifecycle state of a [`TimeoutMap`](./struct.TimeoutMap.html).
///
/// `Stopped` and `Started` are the steady states. `Starting` and `Stopping` are
/// only observed while `start` or `stop` is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Stopped = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
}

impl From<u8> for ServiceState {
    fn from(n: u8) -> Self {
        match n {
            0 => Self::Stopped,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Stopping,
            _ => panic!("No such ServiceState variant for {n}"),
        }
    }
}

impl ServiceState {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        }
    }

    /// Returns `true` if scheduled purge passes are allowed to run.
    pub fn is_run_allowed(self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) struct AtomicState(AtomicU8);

impl Default for AtomicState {
    fn default() -> Self {
        Self(AtomicU8::new(ServiceState::Stopped as u8))
    }
}

impl AtomicState {
    pub(crate) fn get(&self) -> ServiceState {
        self.0.load(Ordering::Acquire).into()
    }

    pub(crate) fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`. Fails with `Error::InvalidState` if the
    /// current state is not `from`.
    pub(crate) fn transition(
        &self,
        operation: &'static str,
        from: ServiceState,
        to: ServiceState,
    ) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| Error::InvalidState {
                operation,
                state: current.into(),
            })
    }
}
