//! Hardware seams between the control loops and the outside world.
//!
//! The control loops only ever see these two traits. Real drivers live in
//! `rallyloop-embedded`, simulated ones in `rallyloop-bridge`.

use core::fmt;

use crate::error::{ActuatorError, SensorError};
use crate::types::{ChannelReading, StimulusVector};

/// A source of multi-channel sensor readings.
pub trait SampleSource {
    /// Underlying bus error type
    type Error: fmt::Debug;

    /// Number of channels each reading carries.
    fn channel_count(&self) -> usize;

    /// Number of channels with a responding device.
    ///
    /// Defaults to [`SampleSource::channel_count`] for sources without
    /// presence detection.
    fn present_count(&self) -> usize {
        self.channel_count()
    }

    /// Read every channel once.
    ///
    /// # Errors
    ///
    /// Returns a transient error when a device fails for this tick, or
    /// [`SensorError::NoSensors`] when nothing can be read at all.
    fn sample(&mut self, timestamp_us: u64) -> Result<ChannelReading, SensorError<Self::Error>>;
}

/// A sink that drives the stimulus channels.
pub trait ActuatorSink {
    /// Underlying output error type
    type Error: fmt::Debug;

    /// Number of channels this sink drives.
    fn channel_count(&self) -> usize;

    /// Drive every channel to the given commands.
    ///
    /// # Errors
    ///
    /// Returns an error if any channel could not be driven. Channels before
    /// the failing one may already have changed.
    fn apply(&mut self, stimulus: &StimulusVector) -> Result<(), ActuatorError<Self::Error>>;

    /// Drive every channel inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if any channel could not be released.
    fn release(&mut self) -> Result<(), ActuatorError<Self::Error>> {
        self.apply(&StimulusVector::all_inactive())
    }
}

impl<T: SampleSource + ?Sized> SampleSource for &mut T {
    type Error = T::Error;

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn present_count(&self) -> usize {
        (**self).present_count()
    }

    fn sample(&mut self, timestamp_us: u64) -> Result<ChannelReading, SensorError<Self::Error>> {
        (**self).sample(timestamp_us)
    }
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for &mut T {
    type Error = T::Error;

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn apply(&mut self, stimulus: &StimulusVector) -> Result<(), ActuatorError<Self::Error>> {
        (**self).apply(stimulus)
    }

    fn release(&mut self) -> Result<(), ActuatorError<Self::Error>> {
        (**self).release()
    }
}
