//! Rallyloop Embedded - sensor and electrode drivers
//!
//! `embedded-hal` 1.0 drivers for the stimulation rig:
//! - INA219 current monitors on a shared I2C bus (one per sensing electrode)
//! - A bank of digital outputs, one per stimulation electrode
//!
//! Both implement the hardware seams from `rallyloop-core`, so the control
//! loops run unchanged against real hardware or the simulated devices.
//!
//! # Reference wiring
//!
//! ```text
//! I2C:        INA219 top=0x40, middle=0x41, bottom=0x44
//! Electrodes: BCM 21, 15, 18, 20, 8, 24 (regions 0..5), active high
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

pub mod drivers;

pub use drivers::current_array::{CurrentSensorArray, DEFAULT_ADDRESSES};
pub use drivers::electrodes::{ActiveLevel, ElectrodeBank, PinMap, REFERENCE_BCM_PINS};
pub use drivers::ina219::Ina219;
