//! Session lifecycle: startup checks, loop threads, shutdown.
//!
//! [`Session::begin`] validates the configuration and the hardware, drives
//! every actuator channel inactive, then starts the actuation loop and (for
//! experiments with a simulation) the simulation loop on named threads.
//! Whichever loop ends first raises the shared [`StopSignal`], so the other
//! follows within one period.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use rallyloop_core::estimator::MIN_FIT_CHANNELS;
use rallyloop_core::io::{ActuatorSink, SampleSource};
use rallyloop_physics::SimulationEngine;

use crate::actuation::{ActuationLoop, ActuationPlan, ActuationReport};
use crate::cells::{ControlBridge, StopSignal};
use crate::config::{ExperimentConfig, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::record::RecordSink;
use crate::scheduler::{DutyCycleScheduler, ModeScheduler};
use crate::simulation::{SimulationLoop, SimulationReport};

/// Name of the sampling/actuation thread.
pub const ACTUATION_THREAD: &str = "rallyloop-actuation";

/// Name of the simulation thread.
pub const SIMULATION_THREAD: &str = "rallyloop-simulation";

/// Counters from both loops of a finished session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Actuation loop counters
    pub actuation: ActuationReport,
    /// Simulation loop counters, absent for duty-cycle sessions
    pub simulation: Option<SimulationReport>,
}

/// Raises the stop signal when dropped, including during a panic.
struct RaiseOnExit(StopSignal);

impl Drop for RaiseOnExit {
    fn drop(&mut self) {
        self.0.raise();
    }
}

/// Session entry point.
pub struct Session;

impl Session {
    /// Check configuration and hardware, release the actuator and start the
    /// loops.
    ///
    /// # Errors
    ///
    /// Fails without starting any loop if the configuration is invalid,
    /// fewer than three sensors respond, the actuator has no channels or
    /// cannot be released, or a thread cannot be spawned.
    pub fn begin<S, A, R>(
        config: SessionConfig,
        source: S,
        mut sink: A,
        records: R,
    ) -> SessionResult<SessionHandle>
    where
        S: SampleSource + Send + 'static,
        A: ActuatorSink + Send + 'static,
        R: RecordSink + 'static,
    {
        config.validate()?;

        let present = source.present_count();
        if present == 0 {
            return Err(SessionError::NoSensors);
        }
        if present < MIN_FIT_CHANNELS {
            return Err(SessionError::TooFewSensors {
                got: present,
                need: MIN_FIT_CHANNELS,
            });
        }
        if sink.channel_count() == 0 {
            return Err(SessionError::NoActuatorChannels);
        }
        sink.release()
            .map_err(|e| SessionError::Actuator(e.to_string()))?;

        let bridge = ControlBridge::shared();
        let stop = StopSignal::new();
        let plan = build_plan(&config);

        info!(
            experiment = config.experiment.name(),
            sensors = present,
            electrodes = sink.channel_count(),
            seed = ?config.seed,
            "Session starting"
        );

        let epoch = Instant::now();
        let interval = config.timing.sample_interval();
        let actuation = ActuationLoop::new(
            source,
            sink,
            records,
            plan,
            Arc::clone(&bridge),
            config.calibration.clone(),
        )
        .with_wire_format(config.wire_format);

        let actuation_stop = stop.clone();
        let actuation_thread = thread::Builder::new()
            .name(ACTUATION_THREAD.to_string())
            .spawn(move || {
                let _raise = RaiseOnExit(actuation_stop.clone());
                actuation.run(epoch, interval, &actuation_stop)
            })
            .map_err(|source| SessionError::Spawn {
                name: ACTUATION_THREAD,
                source,
            })?;

        let simulation_thread = if config.experiment.runs_simulation() {
            let sim = SimulationLoop::new(
                SimulationEngine::new(config.sim_config()),
                Arc::clone(&bridge),
            );
            let frame_period = config.timing.frame_period();
            let sim_stop = stop.clone();
            let spawned = thread::Builder::new()
                .name(SIMULATION_THREAD.to_string())
                .spawn(move || {
                    let _raise = RaiseOnExit(sim_stop.clone());
                    sim.run(frame_period, &sim_stop)
                });
            match spawned {
                Ok(handle) => Some(handle),
                Err(source) => {
                    stop.raise();
                    if actuation_thread.join().is_err() {
                        error!("Actuation thread panicked during aborted startup");
                    }
                    return Err(SessionError::Spawn {
                        name: SIMULATION_THREAD,
                        source,
                    });
                }
            }
        } else {
            None
        };

        Ok(SessionHandle {
            bridge,
            stop,
            actuation: Some(actuation_thread),
            simulation: simulation_thread,
        })
    }
}

fn build_plan(config: &SessionConfig) -> ActuationPlan {
    match config.experiment {
        ExperimentConfig::Feedback => ActuationPlan::Passthrough,
        ExperimentConfig::Hybrid { .. } => {
            let (normal, random) = config.experiment.override_holds().unwrap_or_default();
            // Offset so the pattern stream differs from the launch-angle stream
            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
                None => StdRng::from_entropy(),
            };
            ActuationPlan::Override(ModeScheduler::new(normal, random, rng))
        }
        ExperimentConfig::DutyCycle { .. } => match config.experiment.duty_cycle() {
            Some(cycle) => ActuationPlan::DutyCycle(DutyCycleScheduler::new(cycle)),
            None => ActuationPlan::Passthrough,
        },
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Control surface of a running session.
///
/// Dropping the handle without joining raises the stop signal and waits for
/// the loops.
pub struct SessionHandle {
    bridge: Arc<ControlBridge>,
    stop: StopSignal,
    actuation: Option<JoinHandle<SessionResult<ActuationReport>>>,
    simulation: Option<JoinHandle<SimulationReport>>,
}

impl SessionHandle {
    /// Ask both loops to stop. Returns immediately.
    pub fn request_stop(&self) {
        info!("Session stop requested");
        self.stop.raise();
    }

    /// The session's stop signal.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// The cells the loops communicate through.
    #[must_use]
    pub fn bridge(&self) -> Arc<ControlBridge> {
        Arc::clone(&self.bridge)
    }

    /// Whether every loop thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.actuation.as_ref().map_or(true, JoinHandle::is_finished)
            && self.simulation.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for both loops to end.
    ///
    /// # Errors
    ///
    /// Returns the actuation loop's error, or [`SessionError::Panicked`] if
    /// a loop thread panicked.
    pub fn join(mut self) -> SessionResult<SessionReport> {
        let actuation = match self.actuation.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SessionError::Panicked(ACTUATION_THREAD))
                .and_then(|result| result),
            None => Ok(ActuationReport::default()),
        };
        let simulation = self
            .simulation
            .take()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| SessionError::Panicked(SIMULATION_THREAD))
            })
            .transpose();

        let report = SessionReport {
            actuation: actuation?,
            simulation: simulation?,
        };
        info!(
            ticks = report.actuation.ticks,
            frames = report.simulation.as_ref().map_or(0, |s| s.frames),
            "Session finished"
        );
        Ok(report)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.actuation.is_none() && self.simulation.is_none() {
            return;
        }
        warn!("Session handle dropped without join, stopping loops");
        self.stop.raise();
        if let Some(handle) = self.actuation.take() {
            if handle.join().is_err() {
                error!("Actuation thread panicked");
            }
        }
        if let Some(handle) = self.simulation.take() {
            if handle.join().is_err() {
                error!("Simulation thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::record::NullRecordSink;
    use crate::simulated::{SimulatedElectrodes, SimulatedSensorArray};
    use rallyloop_core::types::StimulusVector;

    fn begin_with(
        config: SessionConfig,
        sensors: SimulatedSensorArray,
        electrodes: SimulatedElectrodes,
    ) -> SessionResult<SessionHandle> {
        Session::begin(config, sensors, electrodes, NullRecordSink)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = SessionConfig::feedback();
        config.timing.sample_interval_ms = 0;
        let result = begin_with(config, SimulatedSensorArray::new(3), SimulatedElectrodes::new(6));
        assert!(matches!(result, Err(SessionError::Config(ConfigError::SampleInterval))));
    }

    #[test]
    fn test_rejects_missing_sensors() {
        let result = begin_with(
            SessionConfig::feedback(),
            SimulatedSensorArray::absent(),
            SimulatedElectrodes::new(6),
        );
        assert!(matches!(result, Err(SessionError::NoSensors)));
    }

    #[test]
    fn test_rejects_too_few_sensors() {
        let result = begin_with(
            SessionConfig::feedback(),
            SimulatedSensorArray::new(2),
            SimulatedElectrodes::new(6),
        );
        assert!(matches!(result, Err(SessionError::TooFewSensors { got: 2, need: 3 })));
    }

    #[test]
    fn test_rejects_no_electrodes() {
        let electrodes = SimulatedElectrodes::new(0);
        let result = begin_with(SessionConfig::feedback(), SimulatedSensorArray::new(3), electrodes);
        assert!(matches!(result, Err(SessionError::NoActuatorChannels)));
    }

    #[test]
    fn test_startup_failure_touches_nothing() {
        let electrodes = SimulatedElectrodes::new(6);
        let probe = electrodes.clone();
        let result = begin_with(SessionConfig::feedback(), SimulatedSensorArray::new(2), electrodes);

        assert!(result.is_err());
        assert_eq!(probe.apply_count(), 0);
        assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
    }

    #[test]
    fn test_plan_follows_experiment() {
        let plan = build_plan(&SessionConfig::feedback());
        assert!(matches!(plan, ActuationPlan::Passthrough));

        let plan = build_plan(&SessionConfig::hybrid(2.0, 1.0).with_seed(4));
        assert!(matches!(plan, ActuationPlan::Override(_)));

        let plan = build_plan(&SessionConfig::duty_cycle(2.0, 1.0, 10.0, 5));
        match plan {
            ActuationPlan::DutyCycle(s) => assert_eq!(s.cycle().channel, 5),
            other => panic!("unexpected plan {other:?}"),
        }
    }
}
