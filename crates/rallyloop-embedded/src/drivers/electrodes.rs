//! Electrode bank: one digital output per stimulation electrode
//!
//! Region `r` of the stimulus vector drives pin `map[r]`. A pin at its
//! active level passes current through its electrode; at the inactive level
//! the electrode is idle.

use embedded_hal::digital::{OutputPin, PinState};

use rallyloop_core::error::ActuatorError;
use rallyloop_core::io::ActuatorSink;
use rallyloop_core::types::{ChannelCommand, StimulusVector, STIM_CHANNELS};

/// BCM GPIO numbers of the reference wiring, in region order.
///
/// ```text
/// region:  0    1    2    3    4    5
/// BCM:     21   15   18   20   8    24
/// ```
pub const REFERENCE_BCM_PINS: [u8; STIM_CHANNELS] = [21, 15, 18, 20, 8, 24];

/// Output level that activates an electrode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveLevel {
    /// Pin high drives current
    #[default]
    High,
    /// Pin low drives current
    Low,
}

impl ActiveLevel {
    /// Pin state for a command.
    #[must_use]
    pub const fn pin_state(self, command: ChannelCommand) -> PinState {
        match (self, command.is_active()) {
            (Self::High, true) | (Self::Low, false) => PinState::High,
            (Self::High, false) | (Self::Low, true) => PinState::Low,
        }
    }
}

/// Region to pin assignment; a permutation of `0..N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMap<const N: usize>([usize; N]);

impl<const N: usize> PinMap<N> {
    /// Region `r` drives pin `r`.
    #[must_use]
    pub fn identity() -> Self {
        let mut map = [0; N];
        for (r, slot) in map.iter_mut().enumerate() {
            *slot = r;
        }
        Self(map)
    }

    /// Custom assignment. Returns `None` unless every pin is used exactly
    /// once.
    #[must_use]
    pub fn new(map: [usize; N]) -> Option<Self> {
        let mut seen = [false; N];
        for &pin in &map {
            match seen.get_mut(pin) {
                Some(used) if !*used => *used = true,
                _ => return None,
            }
        }
        Some(Self(map))
    }

    /// Pin index driven by region `region`.
    #[must_use]
    pub fn pin(&self, region: usize) -> Option<usize> {
        self.0.get(region).copied()
    }
}

/// `N` electrodes on `N` output pins.
pub struct ElectrodeBank<P, const N: usize> {
    pins: [P; N],
    map: PinMap<N>,
    level: ActiveLevel,
}

impl<P: OutputPin, const N: usize> ElectrodeBank<P, N> {
    /// Bank with the identity map and active-high pins.
    ///
    /// Pins are not touched until the first `apply` or `release`.
    pub fn new(pins: [P; N]) -> Self {
        Self {
            pins,
            map: PinMap::identity(),
            level: ActiveLevel::High,
        }
    }

    /// Use a custom region to pin map.
    #[must_use]
    pub fn with_map(mut self, map: PinMap<N>) -> Self {
        self.map = map;
        self
    }

    /// Set the active level.
    #[must_use]
    pub fn with_active_level(mut self, level: ActiveLevel) -> Self {
        self.level = level;
        self
    }

    /// The pins, in pin order.
    pub fn pins(&self) -> &[P; N] {
        &self.pins
    }

    /// Take the pins back.
    pub fn into_pins(self) -> [P; N] {
        self.pins
    }

    /// Drive every region, continuing past failures. Returns the first
    /// failure.
    fn drive(&mut self, stimulus: &StimulusVector) -> Result<(), ActuatorError<P::Error>> {
        let mut first_error = None;
        for region in 0..N {
            let command = stimulus.get(region).unwrap_or(ChannelCommand::Inactive);
            let Some(pin) = self.map.pin(region).and_then(|p| self.pins.get_mut(p)) else {
                continue;
            };
            if let Err(error) = pin.set_state(self.level.pin_state(command)) {
                if first_error.is_none() {
                    first_error = Some(ActuatorError::Pin {
                        channel: region as u8,
                        error,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<P: OutputPin, const N: usize> ActuatorSink for ElectrodeBank<P, N> {
    type Error = P::Error;

    fn channel_count(&self) -> usize {
        N
    }

    fn apply(&mut self, stimulus: &StimulusVector) -> Result<(), ActuatorError<P::Error>> {
        if N == 0 {
            return Err(ActuatorError::NoChannels);
        }
        if N > STIM_CHANNELS {
            return Err(ActuatorError::ChannelMismatch {
                expected: STIM_CHANNELS as u8,
                actual: N as u8,
            });
        }
        self.drive(stimulus)
    }

    fn release(&mut self) -> Result<(), ActuatorError<P::Error>> {
        if N == 0 {
            return Err(ActuatorError::NoChannels);
        }
        // Regions past the stimulus width read as inactive, so every pin is
        // covered even on an oversized bank.
        self.drive(&StimulusVector::all_inactive())
    }
}
