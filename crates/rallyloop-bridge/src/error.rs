//! Session-level error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::record::RecordError;

/// Errors that prevent a session from starting or end it early.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Fewer sensor channels than the estimator needs
    #[error("need at least {need} sensor channels, found {got}")]
    TooFewSensors {
        /// Channels available
        got: usize,
        /// Channels required
        need: usize,
    },

    /// No sensor responded
    #[error("no sensors present")]
    NoSensors,

    /// The actuator exposes no channels
    #[error("actuator has no channels")]
    NoActuatorChannels,

    /// Unrecoverable sensor fault while running
    #[error("sensor fault: {0}")]
    Sensor(String),

    /// Actuator could not be brought to a safe state
    #[error("actuator fault: {0}")]
    Actuator(String),

    /// Record sink failure
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A loop thread could not be started
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name
        name: &'static str,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// A loop thread panicked
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
