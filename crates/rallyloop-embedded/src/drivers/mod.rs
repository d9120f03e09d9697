//! Hardware drivers
//!
//! - [`ina219`]: TI INA219 current monitor (I2C)
//! - [`current_array`]: INA219 array as a [`SampleSource`](rallyloop_core::io::SampleSource)
//! - [`electrodes`]: GPIO electrode bank as an [`ActuatorSink`](rallyloop_core::io::ActuatorSink)

pub mod current_array;
pub mod electrodes;
pub mod ina219;

#[cfg(test)]
mod fake;
