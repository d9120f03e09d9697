//! Core data types for the rallyloop controller.
//!
//! This module defines the fundamental data structures used throughout the
//! control pipeline:
//! - Channel readings (raw and normalized sensor samples)
//! - Per-channel calibration
//! - Stimulus vectors and channel commands
//! - Scheduler modes and the simulation summary shared between loops
//!
//! All types are `Copy` or cheap to clone and allocation free, so they can
//! cross thread boundaries through the control bridge and be used on
//! embedded targets.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

// ============================================================================
// Channel Counts
// ============================================================================

/// Number of sensor channels in the standard three-electrode array.
pub const SENSOR_CHANNELS: usize = 3;

/// Upper bound on sensor channels a single reading can carry.
pub const MAX_SENSOR_CHANNELS: usize = 8;

/// Number of stimulus channels (one per field region).
pub const STIM_CHANNELS: usize = 6;

/// Per-region activation flags, indexed by region number.
pub type RegionFlags = [bool; STIM_CHANNELS];

// ============================================================================
// Sensor Readings
// ============================================================================

/// One raw sample from every sensor channel, captured at a single instant.
///
/// Channel values are in the sensor's native unit (mA for the INA219 array).
/// Created once per sampling tick and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// Capture time in microseconds since session start
    pub timestamp_us: u64,
    /// Raw value per channel
    values: Vec<f32, MAX_SENSOR_CHANNELS>,
}

impl ChannelReading {
    /// Create a reading from a slice of channel values.
    ///
    /// Values beyond [`MAX_SENSOR_CHANNELS`] are dropped.
    #[must_use]
    pub fn new(timestamp_us: u64, values: &[f32]) -> Self {
        let mut buf = Vec::new();
        for &v in values.iter().take(MAX_SENSOR_CHANNELS) {
            // Cannot overflow: bounded by take()
            let _ = buf.push(v);
        }
        Self { timestamp_us, values: buf }
    }

    /// Create an all-zero reading for `channels` channels.
    #[must_use]
    pub fn zeroed(timestamp_us: u64, channels: usize) -> Self {
        let mut buf = Vec::new();
        for _ in 0..channels.min(MAX_SENSOR_CHANNELS) {
            let _ = buf.push(0.0);
        }
        Self { timestamp_us, values: buf }
    }

    /// Raw channel values in channel order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of channels in this reading.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }

    /// Copy of this reading re-stamped with a new capture time.
    #[must_use]
    pub fn restamped(&self, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            values: self.values.clone(),
        }
    }

    /// Normalize every channel with its calibration pair.
    ///
    /// Channels without a calibration entry are passed through
    /// [`ChannelCalibration::UNIT`].
    #[must_use]
    pub fn normalize(&self, calibration: &[ChannelCalibration]) -> NormalizedReading {
        let mut buf = Vec::new();
        for (i, &raw) in self.values.iter().enumerate() {
            let cal = calibration.get(i).copied().unwrap_or(ChannelCalibration::UNIT);
            let _ = buf.push(cal.normalize(raw));
        }
        NormalizedReading {
            timestamp_us: self.timestamp_us,
            values: buf,
        }
    }
}

/// Linear calibration pair mapping a raw channel value into [0, 1].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    /// Raw value that maps to 0.0
    pub min: f32,
    /// Raw value that maps to 1.0
    pub max: f32,
}

impl ChannelCalibration {
    /// Identity calibration over [0, 1].
    pub const UNIT: Self = Self::new(0.0, 1.0);

    /// Create a calibration pair.
    #[inline]
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Create a calibration from a zero offset and the excursion either side.
    ///
    /// The lower excursion is given as a positive magnitude.
    #[inline]
    #[must_use]
    pub fn from_excursion(origin: f32, upper: f32, lower: f32) -> Self {
        Self::new(origin - lower, origin + upper)
    }

    /// Map a raw value into [0, 1], saturating at both ends.
    ///
    /// A non-finite value or a zero-width span maps to 0.0.
    #[must_use]
    pub fn normalize(&self, raw: f32) -> f32 {
        let span = self.max - self.min;
        if !raw.is_finite() || !span.is_finite() || span == 0.0 {
            return 0.0;
        }
        let t = (raw - self.min) / span;
        if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, 1.0)
        }
    }

    /// Default calibration for the top/middle/bottom electrode array.
    #[must_use]
    pub fn standard_array() -> [Self; SENSOR_CHANNELS] {
        [
            Self::from_excursion(0.0, 6.7, 3.7),
            Self::from_excursion(0.0, 4.9, 3.1),
            Self::from_excursion(0.0, 7.6, 4.4),
        ]
    }

    /// Calibration for freshly applied gel electrodes (wider negative swing).
    #[must_use]
    pub fn gel_array() -> [Self; SENSOR_CHANNELS] {
        [Self::new(-11.7, 5.0), Self::new(-10.7, 2.9), Self::new(-11.4, 4.0)]
    }
}

/// Sensor reading with every channel rescaled into [0, 1].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    /// Capture time of the underlying raw reading (µs since session start)
    pub timestamp_us: u64,
    values: Vec<f32, MAX_SENSOR_CHANNELS>,
}

impl NormalizedReading {
    /// Build a normalized reading directly, clamping every value into [0, 1].
    ///
    /// Non-finite values become 0.0.
    #[must_use]
    pub fn new(timestamp_us: u64, values: &[f32]) -> Self {
        let mut buf = Vec::new();
        for &v in values.iter().take(MAX_SENSOR_CHANNELS) {
            let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
            let _ = buf.push(v);
        }
        Self { timestamp_us, values: buf }
    }

    /// Normalized channel values in channel order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of channels.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Stimulus
// ============================================================================

/// Command for a single stimulus channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelCommand {
    /// Channel idle (no current)
    #[default]
    Inactive,
    /// Channel driven
    Active,
}

impl ChannelCommand {
    /// Command for a boolean drive flag.
    #[inline]
    #[must_use]
    pub const fn from_flag(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    /// Check if this command drives the channel.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Wire representation of a [`ChannelCommand`] for sinks and log files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Active = 1, inactive = 0
    #[default]
    Binary,
    /// Active = -1, inactive = 0 (relay boards driven by a negative sentinel)
    NegativeSentinel,
}

impl WireFormat {
    /// Encode a single command.
    #[inline]
    #[must_use]
    pub const fn encode(self, command: ChannelCommand) -> i8 {
        match (self, command) {
            (_, ChannelCommand::Inactive) => 0,
            (Self::Binary, ChannelCommand::Active) => 1,
            (Self::NegativeSentinel, ChannelCommand::Active) => -1,
        }
    }

    /// Decode a wire value. Any non-zero value is treated as active.
    #[inline]
    #[must_use]
    pub const fn decode(value: i8) -> ChannelCommand {
        ChannelCommand::from_flag(value != 0)
    }
}

/// Ordered command set for every stimulus channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StimulusVector([ChannelCommand; STIM_CHANNELS]);

impl StimulusVector {
    /// Every channel inactive.
    #[inline]
    #[must_use]
    pub const fn all_inactive() -> Self {
        Self([ChannelCommand::Inactive; STIM_CHANNELS])
    }

    /// Every channel active.
    #[inline]
    #[must_use]
    pub const fn all_active() -> Self {
        Self([ChannelCommand::Active; STIM_CHANNELS])
    }

    /// Create from explicit commands.
    #[inline]
    #[must_use]
    pub const fn new(commands: [ChannelCommand; STIM_CHANNELS]) -> Self {
        Self(commands)
    }

    /// Map region flags 1:1 onto channel commands.
    #[must_use]
    pub fn from_flags(flags: &RegionFlags) -> Self {
        let mut commands = [ChannelCommand::Inactive; STIM_CHANNELS];
        for (cmd, &flag) in commands.iter_mut().zip(flags.iter()) {
            *cmd = ChannelCommand::from_flag(flag);
        }
        Self(commands)
    }

    /// Exactly one channel active. Out-of-range channels yield all inactive.
    #[must_use]
    pub fn one_hot(channel: usize) -> Self {
        let mut v = Self::all_inactive();
        v.set(channel, ChannelCommand::Active);
        v
    }

    /// Command for a channel, `None` when out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, channel: usize) -> Option<ChannelCommand> {
        self.0.get(channel).copied()
    }

    /// Set a channel's command. Out-of-range channels are ignored.
    pub fn set(&mut self, channel: usize, command: ChannelCommand) {
        if let Some(slot) = self.0.get_mut(channel) {
            *slot = command;
        }
    }

    /// Commands in channel order.
    #[inline]
    #[must_use]
    pub const fn commands(&self) -> &[ChannelCommand; STIM_CHANNELS] {
        &self.0
    }

    /// Iterate over commands in channel order.
    pub fn iter(&self) -> impl Iterator<Item = ChannelCommand> + '_ {
        self.0.iter().copied()
    }

    /// Number of active channels.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|c| c.is_active()).count()
    }

    /// Index of the first active channel.
    #[must_use]
    pub fn first_active(&self) -> Option<usize> {
        self.0.iter().position(|c| c.is_active())
    }

    /// Check if any channel is driven.
    #[inline]
    #[must_use]
    pub fn any_active(&self) -> bool {
        self.active_count() > 0
    }

    /// Encode every channel with a wire format.
    #[must_use]
    pub fn encode(&self, format: WireFormat) -> [i8; STIM_CHANNELS] {
        let mut out = [0i8; STIM_CHANNELS];
        for (slot, cmd) in out.iter_mut().zip(self.0.iter()) {
            *slot = format.encode(*cmd);
        }
        out
    }

    /// Display adapter rendering `v0,v1,...` in the given wire format.
    #[must_use]
    pub fn display(&self, format: WireFormat) -> StimulusDisplay<'_> {
        StimulusDisplay {
            vector: self,
            format,
        }
    }
}

impl From<RegionFlags> for StimulusVector {
    fn from(flags: RegionFlags) -> Self {
        Self::from_flags(&flags)
    }
}

impl fmt::Display for StimulusVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(WireFormat::Binary).fmt(f)
    }
}

/// Comma-separated rendering of a [`StimulusVector`].
pub struct StimulusDisplay<'a> {
    vector: &'a StimulusVector,
    format: WireFormat,
}

impl fmt::Display for StimulusDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.vector.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", self.format.encode(cmd))?;
        }
        Ok(())
    }
}

// ============================================================================
// Modes
// ============================================================================

/// Stimulus source selected by the passthrough/override scheduler.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Stimulus follows the ball regions
    #[default]
    Sensed,
    /// Stimulus is a random one-hot pattern
    Randomized,
}

impl Mode {
    /// The other mode.
    #[inline]
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Sensed => Self::Randomized,
            Self::Randomized => Self::Sensed,
        }
    }
}

/// Output state of the single-channel duty-cycle scheduler.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DutyState {
    /// Output held off
    #[default]
    Inactive,
    /// Output driven
    Active,
}

impl DutyState {
    /// The other state.
    #[inline]
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Inactive => Self::Active,
            Self::Active => Self::Inactive,
        }
    }

    /// Channel command for this state.
    #[inline]
    #[must_use]
    pub const fn command(self) -> ChannelCommand {
        match self {
            Self::Inactive => ChannelCommand::Inactive,
            Self::Active => ChannelCommand::Active,
        }
    }
}

/// Scheduler state as it appears in log records.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeLabel {
    /// Passthrough of the encoded stimulus
    #[default]
    Normal,
    /// Randomized override
    Random,
    /// Duty cycle holding its output on
    DutyOn,
    /// Duty cycle holding its output off
    DutyOff,
    /// Duty cycle budget exhausted
    Halted,
}

impl ModeLabel {
    /// Column text for record files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Random => "Random",
            Self::DutyOn => "On",
            Self::DutyOff => "Off",
            Self::Halted => "Halted",
        }
    }
}

impl From<Mode> for ModeLabel {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sensed => Self::Normal,
            Mode::Randomized => Self::Random,
        }
    }
}

impl From<DutyState> for ModeLabel {
    fn from(state: DutyState) -> Self {
        match state {
            DutyState::Inactive => Self::DutyOff,
            DutyState::Active => Self::DutyOn,
        }
    }
}

impl fmt::Display for ModeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Simulation Summary
// ============================================================================

/// Snapshot of the simulation published once per frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSummary {
    /// Frame counter since the simulation started
    pub frame: u64,
    /// Ball top-left x (field units)
    pub ball_x: i32,
    /// Ball top-left y (field units)
    pub ball_y: i32,
    /// Consecutive paddle hits since the last miss
    pub rally: u32,
    /// Paddle top y (field units)
    pub paddle_y: i32,
}

// ============================================================================
// Tests
// ============================================================================
