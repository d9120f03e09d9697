//! Configuration loading: TOML file, experiment presets, command-line
//! overrides.
//!
//! Without a file, the subcommand picks its preset. With a file, the file
//! supplies everything and the subcommand only replaces the experiment.

use std::path::Path;

use anyhow::Context;

use rallyloop_bridge::config::{ExperimentConfig, SessionConfig};

/// Experiment chosen on the command line.
#[derive(Clone, Debug, PartialEq)]
pub enum ExperimentChoice {
    /// Keep the file's experiment (or feedback without a file)
    FromConfig,
    /// Use this experiment
    Explicit(ExperimentConfig),
}

/// Read a TOML session configuration.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> anyhow::Result<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid config file {}", path.display()))
}

/// Parse a TOML session configuration.
///
/// # Errors
///
/// Fails on malformed TOML or unknown experiment kinds.
pub fn parse(text: &str) -> anyhow::Result<SessionConfig> {
    Ok(toml::from_str(text)?)
}

/// Preset for an experiment when no file is given.
pub fn preset(experiment: &ExperimentConfig) -> SessionConfig {
    match *experiment {
        ExperimentConfig::Feedback => SessionConfig::feedback(),
        ExperimentConfig::Hybrid { normal_s, random_s } => SessionConfig::hybrid(normal_s, random_s),
        ExperimentConfig::DutyCycle {
            on_s,
            off_s,
            total_s,
            channel,
        } => SessionConfig::duty_cycle(on_s, off_s, total_s, channel),
    }
}

/// Combine file, subcommand and seed into the session configuration.
pub fn resolve(
    file: Option<SessionConfig>,
    choice: ExperimentChoice,
    seed: Option<u64>,
) -> SessionConfig {
    let mut config = match (file, choice) {
        (Some(config), ExperimentChoice::FromConfig) => config,
        (Some(mut config), ExperimentChoice::Explicit(experiment)) => {
            config.experiment = experiment;
            config
        }
        (None, ExperimentChoice::FromConfig) => SessionConfig::feedback(),
        (None, ExperimentChoice::Explicit(experiment)) => preset(&experiment),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use rallyloop_core::types::WireFormat;

    const SAMPLE: &str = r#"
seed = 42
wire_format = "negative_sentinel"

[field]
width = 800
height = 600
layout = "grid2x3_interleaved"

[timing]
sample_interval_ms = 20

[experiment]
kind = "hybrid"
normal_s = 120.0
random_s = 60.0

[[calibration]]
min = -3.7
max = 6.7

[[calibration]]
min = -3.1
max = 4.9

[[calibration]]
min = -4.4
max = 7.6
"#;

    #[test]
    fn test_parse_full_file() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.field.width, 800);
        assert_eq!(config.timing.sample_interval_ms, 20);
        assert!((config.timing.frame_rate_hz - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.calibration.len(), 3);
        assert_eq!(config.wire_format, WireFormat::NegativeSentinel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_feedback() {
        let config = parse("").unwrap();
        assert_eq!(config, SessionConfig::feedback());
    }

    #[test]
    fn test_subcommand_replaces_experiment_only() {
        let file = parse(SAMPLE).unwrap();
        let duty = ExperimentConfig::DutyCycle {
            on_s: 2.0,
            off_s: 1.0,
            total_s: 30.0,
            channel: 4,
        };
        let config = resolve(Some(file), ExperimentChoice::Explicit(duty.clone()), None);

        assert_eq!(config.experiment, duty);
        assert_eq!(config.field.width, 800);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_preset_without_file() {
        let hybrid = ExperimentConfig::Hybrid {
            normal_s: 5.0,
            random_s: 5.0,
        };
        let config = resolve(None, ExperimentChoice::Explicit(hybrid), Some(3));

        assert_eq!(config.timing.sample_interval_ms, 10);
        assert_eq!(config.seed, Some(3));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(parse("[experiment]\nkind = \"replay\"\n").is_err());
    }
}
