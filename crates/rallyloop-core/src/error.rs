//! Error types for the rallyloop controller
//!
//! These errors work in `no_std` environments. Hardware errors are generic
//! over the bus or pin error type of the underlying HAL, so drivers can
//! report failures without allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Sensor Errors
// ============================================================================

/// Errors from a sensor sample source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorError<E> {
    /// Bus communication failure on one device
    Bus {
        /// Channel whose device failed
        channel: u8,
        /// Underlying bus error
        error: E,
    },
    /// A sensor did not acknowledge its address at startup
    NotPresent {
        /// Channel that is missing
        channel: u8,
        /// Bus address probed
        address: u8,
    },
    /// No sensors are present at all
    NoSensors,
    /// Device returned a value that could not be interpreted
    InvalidValue {
        /// Channel that produced the value
        channel: u8,
    },
}

impl<E> SensorError<E> {
    /// Whether the sampler should skip this tick and keep running.
    ///
    /// Only [`SensorError::NoSensors`] is fatal.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::NoSensors)
    }

    /// Channel the error refers to, if any.
    #[must_use]
    pub const fn channel(&self) -> Option<u8> {
        match self {
            Self::Bus { channel, .. }
            | Self::NotPresent { channel, .. }
            | Self::InvalidValue { channel } => Some(*channel),
            Self::NoSensors => None,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for SensorError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus { channel, error } => {
                write!(f, "Sensor bus error on channel {channel}: {error:?}")
            }
            Self::NotPresent { channel, address } => {
                write!(f, "Sensor on channel {channel} not present at 0x{address:02X}")
            }
            Self::NoSensors => write!(f, "No sensors present"),
            Self::InvalidValue { channel } => {
                write!(f, "Invalid value from sensor on channel {channel}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for SensorError<E> {}

// ============================================================================
// Actuator Errors
// ============================================================================

/// Errors from an actuator sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorError<E> {
    /// Driving a channel's output failed
    Pin {
        /// Channel that failed
        channel: u8,
        /// Underlying pin error
        error: E,
    },
    /// The sink exposes no channels
    NoChannels,
    /// Stimulus width does not match the sink
    ChannelMismatch {
        /// Channels in the stimulus
        expected: u8,
        /// Channels the sink drives
        actual: u8,
    },
}

impl<E: fmt::Debug> fmt::Display for ActuatorError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin { channel, error } => {
                write!(f, "Actuator error on channel {channel}: {error:?}")
            }
            Self::NoChannels => write!(f, "Actuator has no channels"),
            Self::ChannelMismatch { expected, actual } => {
                write!(f, "Stimulus has {expected} channels, actuator drives {actual}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for ActuatorError<E> {}

// ============================================================================
// Estimation Errors
// ============================================================================

/// Reasons a position estimate could not be produced.
///
/// Every variant means "keep the previous paddle position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateError {
    /// Fewer channels than the quadratic model needs
    TooFewChannels {
        /// Channels supplied
        got: u8,
        /// Channels required
        need: u8,
    },
    /// A channel value is NaN or infinite
    NonFinite {
        /// Offending channel
        channel: u8,
    },
    /// The normal equations could not be inverted
    Singular,
    /// Every grid point evaluates to the same value
    FlatResponse,
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewChannels { got, need } => {
                write!(f, "Need at least {need} channels for estimate, got {got}")
            }
            Self::NonFinite { channel } => {
                write!(f, "Channel {channel} value is not finite")
            }
            Self::Singular => write!(f, "Curve fit is singular"),
            Self::FlatResponse => write!(f, "Fitted curve is flat"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EstimateError {}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_sensor_error_transience() {
        let bus: SensorError<()> = SensorError::Bus { channel: 1, error: () };
        assert!(bus.is_transient());
        assert_eq!(bus.channel(), Some(1));

        let fatal: SensorError<()> = SensorError::NoSensors;
        assert!(!fatal.is_transient());
        assert_eq!(fatal.channel(), None);
    }

    #[test]
    fn test_display_messages() {
        let err: SensorError<()> = SensorError::NotPresent { channel: 2, address: 0x44 };
        assert_eq!(err.to_string(), "Sensor on channel 2 not present at 0x44");

        let err = EstimateError::TooFewChannels { got: 2, need: 3 };
        assert!(err.to_string().contains("got 2"));
    }
}
