use crate::lifecycle::ServiceState;

/// The error type for the lifecycle operations of a
/// [`TimeoutMap`][timeout-map] and for [`Scheduler`][scheduler] implementations.
///
/// Accessor operations such as `get` and `put` never return an error.
///
/// [timeout-map]: ./struct.TimeoutMap.html
/// [scheduler]: ./trait.Scheduler.html
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested lifecycle transition is not allowed from the current state.
    /// For example, calling `start` on a map that is already started.
    #[error("cannot {operation} the timeout map while it is {state}")]
    InvalidState {
        /// The rejected operation (`"start"` or `"stop"`).
        operation: &'static str,
        /// The state the map was in when the operation was rejected.
        state: ServiceState,
    },

    /// The scheduler has been shut down and cannot accept new tasks.
    ///
    /// `TimeoutMap::start` reports this when the scheduler it was built with is
    /// no longer usable. Like `InvalidState`, it means the map cannot be started
    /// in its current environment; see [`Error::is_invalid_state`].
    #[error("the scheduler is shut down and cannot accept new tasks")]
    SchedulerShutdown,
}

impl Error {
    /// Returns `true` if the operation was rejected because the map or its
    /// scheduler is in a state that does not allow it.
    ///
    /// This holds for every variant: a lifecycle call made from the wrong state
    /// (`InvalidState`) and a `start` on a shut down scheduler
    /// (`SchedulerShutdown`).
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. } | Error::SchedulerShutdown)
    }
}

/// A specialized `Result` type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::lifecycle::ServiceState;

    #[test]
    fn every_variant_is_an_invalid_state() {
        let err = Error::InvalidState {
            operation: "start",
            state: ServiceState::Started,
        };
        assert!(err.is_invalid_state());
        assert_eq!(
            err.to_string(),
            "cannot start the timeout map while it is started"
        );

        assert!(Error::SchedulerShutdown.is_invalid_state());
    }
}
