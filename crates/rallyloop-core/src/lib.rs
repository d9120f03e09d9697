//! Rallyloop Core - `no_std` compatible types and estimation
//!
//! This crate provides the data model shared by every part of the rallyloop
//! bio-feedback controller. It is designed to work in `no_std` environments
//! (sensor and electrode drivers) as well as `std` environments (control
//! loops and the command-line runner).
//!
//! # Modules
//!
//! - [`types`]: Readings, calibration, stimulus vectors and scheduler modes
//! - [`error`]: Error types for sensors, actuators and estimation
//! - [`io`]: Sample source and actuator sink traits
//! - [`estimator`]: Quadratic-peak paddle position estimator
//!
//! # Features
//!
//! - `std`: Enable standard library support (`std::error::Error` impls)
//!
//! # Example
//!
//! ```rust
//! use rallyloop_core::estimator::PositionEstimator;
//! use rallyloop_core::types::{ChannelCalibration, ChannelReading};
//!
//! let reading = ChannelReading::new(0, &[0.0, 4.9, 0.0]);
//! let normalized = reading.normalize(&ChannelCalibration::standard_array());
//!
//! let estimator = PositionEstimator::new(600, 200);
//! let position = estimator.estimate(&normalized).unwrap();
//! assert!(position.paddle_top > 150 && position.paddle_top < 250);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod estimator;
pub mod io;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ActuatorError, EstimateError, SensorError};
pub use estimator::{EstimatedPosition, PositionEstimator};
pub use io::{ActuatorSink, SampleSource};
pub use types::{
    ChannelCalibration, ChannelCommand, ChannelReading, DutyState, Mode, ModeLabel,
    NormalizedReading, RegionFlags, SimSummary, StimulusVector, WireFormat, SENSOR_CHANNELS,
    STIM_CHANNELS,
};
