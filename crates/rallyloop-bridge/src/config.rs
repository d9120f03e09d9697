//! Session configuration.
//!
//! Every field has a default, so a partial TOML or JSON document is a valid
//! configuration. Use the presets for the three experiment kinds and
//! [`SessionConfig::validate`] before starting a session.
//!
//! # Example
//!
//! ```rust
//! use rallyloop_bridge::config::SessionConfig;
//!
//! let config = SessionConfig::hybrid(120.0, 60.0).with_seed(7);
//! assert!(config.validate().is_ok());
//! ```

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rallyloop_core::estimator::MIN_FIT_CHANNELS;
use rallyloop_core::types::{ChannelCalibration, WireFormat, STIM_CHANNELS};
use rallyloop_physics::{FieldSize, RegionLayout, SimConfig};

use crate::scheduler::DutyCycle;

/// Configuration errors found by [`SessionConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Frame rate is zero, negative or not finite
    #[error("frame rate must be positive, got {0}")]
    FrameRate(f64),

    /// Sampling interval is zero
    #[error("sample interval must be at least 1 ms")]
    SampleInterval,

    /// Field has a zero dimension
    #[error("field must be non-empty, got {width}x{height}")]
    EmptyField {
        /// Configured width
        width: u32,
        /// Configured height
        height: u32,
    },

    /// Ball speed is zero, negative or not finite
    #[error("ball speed must be positive, got {0}")]
    BallSpeed(f32),

    /// Not enough calibration entries for the estimator
    #[error("need at least {need} channel calibrations, got {got}")]
    TooFewCalibrations {
        /// Entries configured
        got: usize,
        /// Entries required
        need: usize,
    },

    /// A calibration pair has zero or inverted span
    #[error("calibration for channel {0} has min >= max")]
    Calibration(usize),

    /// A hold duration is zero, negative or not finite
    #[error("{name} must be a positive number of seconds, got {value}")]
    Hold {
        /// Which duration
        name: &'static str,
        /// Configured value
        value: f64,
    },

    /// A duration is too long or too short to represent
    #[error("{name} of {value} s is outside the representable range")]
    Unrepresentable {
        /// Which duration
        name: &'static str,
        /// Configured value in seconds
        value: f64,
    },

    /// Duty-cycle channel does not exist
    #[error("duty-cycle channel {channel} out of range (6 channels)")]
    ChannelOutOfRange {
        /// Configured channel
        channel: usize,
    },
}

// ============================================================================
// Sections
// ============================================================================

/// Play field and simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Field width
    pub width: u32,
    /// Field height
    pub height: u32,
    /// Region partition
    pub layout: RegionLayout,
    /// Ball speed per frame
    pub ball_speed: f32,
    /// Reflecting margin at the right and bottom edges
    pub wall_margin: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        let sim = SimConfig::default();
        Self {
            width: sim.field.width,
            height: sim.field.height,
            layout: sim.layout,
            ball_speed: sim.ball_speed,
            wall_margin: sim.wall_margin,
        }
    }
}

/// Loop cadences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Simulation frames per second
    pub frame_rate_hz: f64,
    /// Period of the sampling/actuation loop in milliseconds
    pub sample_interval_ms: u64,
}

impl TimingConfig {
    /// Simulation frame period.
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        seconds(1.0 / self.frame_rate_hz)
    }

    /// Sampling/actuation period.
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
            sample_interval_ms: 100,
        }
    }
}

/// Experiment kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentConfig {
    /// Stimulus always follows the ball
    #[default]
    Feedback,
    /// Alternate sensed and randomized stimulus
    Hybrid {
        /// Seconds in sensed mode
        normal_s: f64,
        /// Seconds in randomized mode
        random_s: f64,
    },
    /// Single-channel on/off stimulation without the simulation
    DutyCycle {
        /// Seconds on
        on_s: f64,
        /// Seconds off
        off_s: f64,
        /// Total run time in seconds
        total_s: f64,
        /// Channel driven
        channel: usize,
    },
}

impl ExperimentConfig {
    /// Whether the simulation loop runs for this experiment.
    #[must_use]
    pub const fn runs_simulation(&self) -> bool {
        !matches!(self, Self::DutyCycle { .. })
    }

    /// Duty-cycle timing, if this is a duty-cycle experiment.
    #[must_use]
    pub fn duty_cycle(&self) -> Option<DutyCycle> {
        match *self {
            Self::DutyCycle {
                on_s,
                off_s,
                total_s,
                channel,
            } => Some(DutyCycle {
                on: seconds(on_s),
                off: seconds(off_s),
                total: seconds(total_s),
                channel,
            }),
            _ => None,
        }
    }

    /// Sensed and randomized hold times, if this is a hybrid experiment.
    #[must_use]
    pub fn override_holds(&self) -> Option<(Duration, Duration)> {
        match *self {
            Self::Hybrid { normal_s, random_s } => Some((seconds(normal_s), seconds(random_s))),
            _ => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Feedback => "feedback",
            Self::Hybrid { .. } => "hybrid",
            Self::DutyCycle { .. } => "duty",
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Complete configuration of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Play field
    pub field: FieldConfig,
    /// Loop cadences
    pub timing: TimingConfig,
    /// Experiment kind
    pub experiment: ExperimentConfig,
    /// Per-channel calibration, top to bottom
    pub calibration: Vec<ChannelCalibration>,
    /// Stimulus rendering in logs
    pub wire_format: WireFormat,
    /// RNG seed for launch angles and random patterns
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::feedback()
    }
}

impl SessionConfig {
    /// Closed-loop feedback: stimulus always follows the ball.
    ///
    /// Uses the interleaved 2×3 layout; the other presets use row-major.
    #[must_use]
    pub fn feedback() -> Self {
        Self {
            field: FieldConfig {
                layout: RegionLayout::Grid2x3Interleaved,
                ..FieldConfig::default()
            },
            timing: TimingConfig::default(),
            experiment: ExperimentConfig::Feedback,
            calibration: ChannelCalibration::standard_array().to_vec(),
            wire_format: WireFormat::Binary,
            seed: None,
        }
    }

    /// Alternating sensed/randomized stimulus on a 10 ms actuation cadence.
    #[must_use]
    pub fn hybrid(normal_s: f64, random_s: f64) -> Self {
        Self {
            experiment: ExperimentConfig::Hybrid { normal_s, random_s },
            field: FieldConfig::default(),
            timing: TimingConfig {
                sample_interval_ms: 10,
                ..TimingConfig::default()
            },
            calibration: ChannelCalibration::gel_array().to_vec(),
            wire_format: WireFormat::NegativeSentinel,
            ..Self::feedback()
        }
    }

    /// Bounded single-channel duty cycle.
    #[must_use]
    pub fn duty_cycle(on_s: f64, off_s: f64, total_s: f64, channel: usize) -> Self {
        Self {
            experiment: ExperimentConfig::DutyCycle {
                on_s,
                off_s,
                total_s,
                channel,
            },
            field: FieldConfig::default(),
            ..Self::feedback()
        }
    }

    /// Set the RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Simulation parameters derived from this configuration.
    #[must_use]
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            field: FieldSize::new(self.field.width, self.field.height),
            layout: self.field.layout,
            ball_speed: self.field.ball_speed,
            wall_margin: self.field.wall_margin,
            seed: self.seed,
        }
    }

    /// Check every field for values a session cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.timing.frame_rate_hz;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::FrameRate(rate));
        }
        representable("frame period", 1.0 / rate)?;
        if self.timing.sample_interval_ms == 0 {
            return Err(ConfigError::SampleInterval);
        }
        if self.field.width == 0 || self.field.height == 0 {
            return Err(ConfigError::EmptyField {
                width: self.field.width,
                height: self.field.height,
            });
        }
        let speed = self.field.ball_speed;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ConfigError::BallSpeed(speed));
        }
        if self.calibration.len() < MIN_FIT_CHANNELS {
            return Err(ConfigError::TooFewCalibrations {
                got: self.calibration.len(),
                need: MIN_FIT_CHANNELS,
            });
        }
        let inverted = |c: &ChannelCalibration| c.min.partial_cmp(&c.max) != Some(Ordering::Less);
        if let Some(i) = self.calibration.iter().position(inverted) {
            return Err(ConfigError::Calibration(i));
        }

        match self.experiment {
            ExperimentConfig::Feedback => {}
            ExperimentConfig::Hybrid { normal_s, random_s } => {
                hold("normal_s", normal_s)?;
                hold("random_s", random_s)?;
            }
            ExperimentConfig::DutyCycle {
                on_s,
                off_s,
                total_s,
                channel,
            } => {
                hold("on_s", on_s)?;
                hold("off_s", off_s)?;
                hold("total_s", total_s)?;
                if channel >= STIM_CHANNELS {
                    return Err(ConfigError::ChannelOutOfRange { channel });
                }
            }
        }
        Ok(())
    }
}

fn hold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::Hold { name, value });
    }
    representable(name, value)
}

/// Accepts seconds that convert to a non-zero `Duration`.
fn representable(name: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(()),
        _ => Err(ConfigError::Unrepresentable { name, value }),
    }
}

/// Seconds to a `Duration`.
///
/// Exact for any configuration that passed [`SessionConfig::validate`].
/// Anything else saturates: out-of-range values become `Duration::MAX`,
/// negative or NaN values become zero.
fn seconds(value: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(d) => d,
        Err(_) if value > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(SessionConfig::feedback().validate().is_ok());
        assert!(SessionConfig::hybrid(120.0, 60.0).validate().is_ok());
        assert!(SessionConfig::duty_cycle(2.0, 1.0, 10.0, 3).validate().is_ok());
    }

    #[test]
    fn test_hybrid_preset() {
        let config = SessionConfig::hybrid(5.0, 2.0);
        assert_eq!(config.timing.sample_interval(), Duration::from_millis(10));
        assert_eq!(config.wire_format, WireFormat::NegativeSentinel);
        assert!(config.experiment.runs_simulation());
        assert_eq!(
            config.experiment.override_holds(),
            Some((Duration::from_secs(5), Duration::from_secs(2)))
        );
    }

    #[test]
    fn test_duty_cycle_conversion() {
        let config = SessionConfig::duty_cycle(2.0, 1.0, 10.0, 3);
        let cycle = config.experiment.duty_cycle().unwrap();

        assert_eq!(cycle.on, Duration::from_secs(2));
        assert_eq!(cycle.off, Duration::from_secs(1));
        assert_eq!(cycle.total, Duration::from_secs(10));
        assert_eq!(cycle.channel, 3);
        assert!(!config.experiment.runs_simulation());
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = SessionConfig::feedback();
        config.timing.frame_rate_hz = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::FrameRate(0.0)));

        let mut config = SessionConfig::feedback();
        config.calibration.truncate(2);
        assert!(matches!(config.validate(), Err(ConfigError::TooFewCalibrations { got: 2, .. })));

        let mut config = SessionConfig::feedback();
        config.calibration[1] = ChannelCalibration::new(1.0, 1.0);
        assert_eq!(config.validate(), Err(ConfigError::Calibration(1)));

        let config = SessionConfig::duty_cycle(2.0, 1.0, 10.0, 6);
        assert_eq!(config.validate(), Err(ConfigError::ChannelOutOfRange { channel: 6 }));

        let config = SessionConfig::hybrid(0.0, 1.0);
        assert!(matches!(config.validate(), Err(ConfigError::Hold { name: "normal_s", .. })));

        let config = SessionConfig::duty_cycle(f64::NAN, 1.0, 10.0, 0);
        assert!(matches!(config.validate(), Err(ConfigError::Hold { name: "on_s", .. })));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        let config = SessionConfig::hybrid(1e20, 1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unrepresentable { name: "normal_s", .. })
        ));

        let config = SessionConfig::duty_cycle(2.0, 1.0, 1e20, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unrepresentable { name: "total_s", .. })
        ));

        let mut config = SessionConfig::feedback();
        config.timing.frame_rate_hz = 1e-20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unrepresentable { name: "frame period", .. })
        ));

        let config = SessionConfig::duty_cycle(1e-12, 1.0, 10.0, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unrepresentable { name: "on_s", .. })
        ));
    }

    #[test]
    fn test_huge_hold_never_collapses_to_zero() {
        let config = SessionConfig::hybrid(1e20, 1.0);
        let (normal, _) = config.experiment.override_holds().unwrap();
        assert_eq!(normal, Duration::MAX);

        let mut config = SessionConfig::feedback();
        config.timing.frame_rate_hz = 1e-20;
        assert!(!config.timing.frame_period().is_zero());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "experiment": { "kind": "hybrid", "normal_s": 3.0, "random_s": 1.5 }, "seed": 9 }"#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(9));
        assert_eq!(config.field, FieldConfig::default());
        assert_eq!(
            config.experiment,
            ExperimentConfig::Hybrid {
                normal_s: 3.0,
                random_s: 1.5
            }
        );
    }

    #[test]
    fn test_sim_config_carries_seed() {
        let sim = SessionConfig::feedback().with_seed(11).sim_config();
        assert_eq!(sim.seed, Some(11));
        assert_eq!(sim.field, FieldSize::new(1000, 1000));
    }

    #[test]
    fn test_preset_layouts() {
        assert_eq!(SessionConfig::feedback().field.layout, RegionLayout::Grid2x3Interleaved);
        assert_eq!(SessionConfig::hybrid(5.0, 2.0).field.layout, RegionLayout::Grid2x3);
        assert_eq!(SessionConfig::duty_cycle(2.0, 1.0, 10.0, 0).field.layout, RegionLayout::Grid2x3);
    }
}
