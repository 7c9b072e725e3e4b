//! Engine errors.

use thiserror::Error;

/// Violations of the engine invariants.
///
/// These indicate a bug in the model code rather than a recoverable condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// Event was scheduled at a time earlier than the current simulation clock.
    #[error("event scheduled at {time} which is before the current time {clock}")]
    InvalidTime {
        /// Requested event time.
        time: f64,
        /// Simulation clock at the moment of scheduling.
        clock: f64,
    },
}
