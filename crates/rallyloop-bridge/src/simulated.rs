//! Simulated sensors and electrodes.
//!
//! Used by the command-line runner when no hardware is attached and by the
//! tests. Both devices can inject faults on a schedule.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rallyloop_core::error::{ActuatorError, SensorError};
use rallyloop_core::io::{ActuatorSink, SampleSource};
use rallyloop_core::types::{ChannelCalibration, ChannelReading, StimulusVector, STIM_CHANNELS};

/// Injected fault of a simulated device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulatedFault;

// ============================================================================
// Sensors
// ============================================================================

/// Sensor array producing a Gaussian current bump that sweeps along the axis.
///
/// Channel `i` of `N` sits at `(2i + 1) / (2N)` of the axis. The bump moves
/// from the top of the axis to the bottom and back once per period.
#[derive(Clone, Debug)]
pub struct SimulatedSensorArray {
    calibration: Vec<ChannelCalibration>,
    period: Duration,
    width: f32,
    fault_every: Option<u64>,
    samples: u64,
    present: bool,
}

impl SimulatedSensorArray {
    /// Array of `channels` sensors with the standard calibration span.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        let standard = ChannelCalibration::standard_array();
        let calibration = (0..channels)
            .map(|i| standard.get(i).copied().unwrap_or(ChannelCalibration::UNIT))
            .collect();
        Self {
            calibration,
            period: Duration::from_secs(8),
            width: 0.2,
            fault_every: None,
            samples: 0,
            present: true,
        }
    }

    /// Array where no sensor responds.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(3)
        }
    }

    /// Scale output to the given calibration spans (one per channel).
    #[must_use]
    pub fn with_calibration(mut self, calibration: &[ChannelCalibration]) -> Self {
        self.calibration = calibration.to_vec();
        self
    }

    /// Set the sweep period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Fail every `n`th sample with a transient bus fault.
    #[must_use]
    pub fn with_fault_every(mut self, n: u64) -> Self {
        self.fault_every = (n > 0).then_some(n);
        self
    }

    /// Bump centre as a fraction of the axis at `timestamp_us`.
    #[must_use]
    pub fn bump_center(&self, timestamp_us: u64) -> f32 {
        let period_us = self.period.as_micros().max(1) as f64;
        let phase = (timestamp_us as f64 % period_us) / period_us;
        // 0 → 1 → 0 over one period
        (0.5 - 0.5 * (2.0 * PI * phase as f32).cos()).clamp(0.0, 1.0)
    }
}

impl SampleSource for SimulatedSensorArray {
    type Error = SimulatedFault;

    fn channel_count(&self) -> usize {
        self.calibration.len()
    }

    fn present_count(&self) -> usize {
        if self.present {
            self.calibration.len()
        } else {
            0
        }
    }

    fn sample(&mut self, timestamp_us: u64) -> Result<ChannelReading, SensorError<SimulatedFault>> {
        if !self.present {
            return Err(SensorError::NoSensors);
        }
        self.samples += 1;
        if let Some(n) = self.fault_every {
            if self.samples % n == 0 {
                return Err(SensorError::Bus {
                    channel: 0,
                    error: SimulatedFault,
                });
            }
        }

        let center = self.bump_center(timestamp_us);
        let n = self.calibration.len();
        let values: Vec<f32> = self
            .calibration
            .iter()
            .enumerate()
            .map(|(i, cal)| {
                let x = (2 * i + 1) as f32 / (2 * n) as f32;
                let d = (x - center) / self.width;
                let level = (-0.5 * d * d).exp();
                cal.min + (cal.max - cal.min) * level
            })
            .collect();
        Ok(ChannelReading::new(timestamp_us, &values))
    }
}

// ============================================================================
// Electrodes
// ============================================================================

#[derive(Debug)]
struct ElectrodeState {
    last: StimulusVector,
    applies: u64,
    failures_left: u32,
}

/// Electrode bank that remembers what it was driven to.
///
/// Clones share state, so a test can keep a probe while the loop owns the
/// sink.
#[derive(Clone, Debug)]
pub struct SimulatedElectrodes {
    channels: usize,
    state: Arc<Mutex<ElectrodeState>>,
}

impl SimulatedElectrodes {
    /// Bank with `channels` electrodes, all inactive.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            state: Arc::new(Mutex::new(ElectrodeState {
                last: StimulusVector::all_inactive(),
                applies: 0,
                failures_left: 0,
            })),
        }
    }

    /// Fail the next `n` applies.
    #[must_use]
    pub fn with_failures(self, n: u32) -> Self {
        self.lock().failures_left = n;
        self
    }

    /// Last successfully applied vector.
    #[must_use]
    pub fn last_applied(&self) -> StimulusVector {
        self.lock().last
    }

    /// Successful applies, releases included.
    #[must_use]
    pub fn apply_count(&self) -> u64 {
        self.lock().applies
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ElectrodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActuatorSink for SimulatedElectrodes {
    type Error = SimulatedFault;

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn apply(&mut self, stimulus: &StimulusVector) -> Result<(), ActuatorError<SimulatedFault>> {
        if self.channels == 0 {
            return Err(ActuatorError::NoChannels);
        }
        let mut state = self.lock();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            let channel = stimulus.first_active().unwrap_or(0) as u8;
            return Err(ActuatorError::Pin {
                channel,
                error: SimulatedFault,
            });
        }

        let mut applied = StimulusVector::all_inactive();
        for ch in 0..self.channels.min(STIM_CHANNELS) {
            if let Some(cmd) = stimulus.get(ch) {
                applied.set(ch, cmd);
            }
        }
        state.last = applied;
        state.applies += 1;
        Ok(())
    }
}
