//! Sampling and actuation loop.
//!
//! Each tick the loop:
//!
//! 1. samples the sensors and publishes the raw and normalized reading,
//! 2. picks the stimulus according to its [`ActuationPlan`],
//! 3. applies it if it changed (or a previous apply failed),
//! 4. appends a [`LogRecord`].
//!
//! The actuator lives inside a [`ReleaseGuard`], so every channel is driven
//! inactive when the loop ends, whether it returns, fails or panics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use rallyloop_core::io::{ActuatorSink, SampleSource};
use rallyloop_core::types::{
    ChannelCalibration, ChannelReading, ModeLabel, StimulusVector, WireFormat,
};
use rallyloop_core::SensorError;

use crate::cells::{ControlBridge, StopSignal};
use crate::error::{SessionError, SessionResult};
use crate::record::{LogRecord, RecordSink};
use crate::scheduler::{DutyCycleScheduler, DutyStep, ModeScheduler};

// ============================================================================
// Hold-Last Sampler
// ============================================================================

/// Sample source wrapper that turns transient faults into the last good
/// reading.
///
/// Before the first good reading a fault yields an all-zero reading.
#[derive(Debug)]
pub struct HoldLastSampler<S> {
    source: S,
    last: Option<ChannelReading>,
    faults: u64,
}

/// Outcome of one [`HoldLastSampler::sample`].
#[derive(Clone, Debug, PartialEq)]
pub enum Sampled {
    /// The source produced a new reading
    Fresh(ChannelReading),
    /// The source failed transiently; carries the held reading
    Held(ChannelReading),
}

impl Sampled {
    /// The reading, fresh or held.
    #[must_use]
    pub fn reading(&self) -> &ChannelReading {
        match self {
            Self::Fresh(r) | Self::Held(r) => r,
        }
    }
}

impl<S: SampleSource> HoldLastSampler<S> {
    /// Wrap a source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            last: None,
            faults: 0,
        }
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Transient faults seen so far.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Sample once.
    ///
    /// # Errors
    ///
    /// Only non-transient sensor errors are returned.
    pub fn sample(&mut self, timestamp_us: u64) -> Result<Sampled, SensorError<S::Error>> {
        match self.source.sample(timestamp_us) {
            Ok(reading) => {
                self.last = Some(reading.clone());
                Ok(Sampled::Fresh(reading))
            }
            Err(e) if e.is_transient() => {
                self.faults += 1;
                warn!(error = %e, faults = self.faults, "Transient sensor fault, holding last reading");
                let held = match &self.last {
                    Some(last) => last.restamped(timestamp_us),
                    None => ChannelReading::zeroed(timestamp_us, self.source.channel_count()),
                };
                Ok(Sampled::Held(held))
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Release Guard
// ============================================================================

/// Owns an actuator and releases every channel when dropped.
#[derive(Debug)]
pub struct ReleaseGuard<A: ActuatorSink> {
    sink: A,
}

impl<A: ActuatorSink> ReleaseGuard<A> {
    /// Take ownership of a sink.
    pub fn new(sink: A) -> Self {
        Self { sink }
    }

    /// Drive the sink to `stimulus`.
    ///
    /// # Errors
    ///
    /// Passes through the sink's error.
    pub fn apply(&mut self, stimulus: &StimulusVector) -> Result<(), rallyloop_core::ActuatorError<A::Error>> {
        self.sink.apply(stimulus)
    }

    /// Drive every channel inactive now.
    ///
    /// # Errors
    ///
    /// Passes through the sink's error.
    pub fn release(&mut self) -> Result<(), rallyloop_core::ActuatorError<A::Error>> {
        self.sink.release()
    }

    /// The guarded sink.
    pub fn sink(&self) -> &A {
        &self.sink
    }
}

impl<A: ActuatorSink> Drop for ReleaseGuard<A> {
    fn drop(&mut self) {
        match self.sink.release() {
            Ok(()) => debug!("Actuator released"),
            Err(e) => error!(error = %e, "Failed to release actuator channels"),
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

/// How the actuation loop chooses its stimulus.
#[derive(Debug)]
pub enum ActuationPlan {
    /// Apply whatever the region encoder last published
    Passthrough,
    /// Alternate encoded and randomized stimulus
    Override(ModeScheduler),
    /// Drive one channel on a bounded duty cycle
    DutyCycle(DutyCycleScheduler),
}

/// Counters reported when the actuation loop ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActuationReport {
    /// Ticks run
    pub ticks: u64,
    /// Ticks with a fresh reading
    pub fresh_samples: u64,
    /// Ticks that held the previous reading
    pub held_samples: u64,
    /// Successful applies
    pub applies: u64,
    /// Failed applies
    pub apply_faults: u64,
    /// Releases forced after repeated apply failures
    pub forced_releases: u64,
    /// Scheduler transitions
    pub mode_switches: u64,
    /// Records written
    pub records: u64,
    /// Records that could not be written
    pub record_faults: u64,
    /// The duty-cycle budget ran out
    pub budget_exhausted: bool,
}

/// Whether the loop keeps going after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickFlow {
    /// Run another tick
    Continue,
    /// The plan has finished
    Finished,
}

// ============================================================================
// Loop
// ============================================================================

/// Sampling/actuation loop state.
pub struct ActuationLoop<S: SampleSource, A: ActuatorSink, R: RecordSink> {
    sampler: HoldLastSampler<S>,
    actuator: ReleaseGuard<A>,
    records: R,
    plan: ActuationPlan,
    bridge: Arc<ControlBridge>,
    calibration: Vec<ChannelCalibration>,
    wire_format: WireFormat,
    applied: StimulusVector,
    retry: bool,
    consecutive_failures: u32,
    report: ActuationReport,
}

impl<S, A, R> ActuationLoop<S, A, R>
where
    S: SampleSource,
    A: ActuatorSink,
    R: RecordSink,
{
    /// Create a loop. The actuator is assumed to be released already.
    pub fn new(
        source: S,
        actuator: A,
        records: R,
        plan: ActuationPlan,
        bridge: Arc<ControlBridge>,
        calibration: Vec<ChannelCalibration>,
    ) -> Self {
        Self {
            sampler: HoldLastSampler::new(source),
            actuator: ReleaseGuard::new(actuator),
            records,
            plan,
            bridge,
            calibration,
            wire_format: WireFormat::Binary,
            applied: StimulusVector::all_inactive(),
            retry: false,
            consecutive_failures: 0,
            report: ActuationReport::default(),
        }
    }

    /// Render stimulus columns in `format` in trace output.
    #[must_use]
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Counters so far.
    pub fn report(&self) -> &ActuationReport {
        &self.report
    }

    /// The guarded actuator.
    pub fn actuator(&self) -> &A {
        self.actuator.sink()
    }

    /// Run one tick at `now` since session start.
    ///
    /// # Errors
    ///
    /// Returns an error only for a non-transient sensor fault.
    pub fn tick(&mut self, now: Duration) -> SessionResult<TickFlow> {
        self.report.ticks += 1;
        let timestamp_us = u64::try_from(now.as_micros()).unwrap_or(u64::MAX);

        self.sample(timestamp_us)?;

        let (desired, mode, flow) = self.choose(now);
        self.bridge.mode.publish(mode);

        if desired != self.applied || self.retry {
            self.apply(desired);
        }

        let record = LogRecord::new(
            timestamp_us,
            &self.bridge.normalized.latest(),
            &self.bridge.sim.latest(),
            desired,
            mode,
        );
        trace!(
            stimulus = %record.stimulus.display(self.wire_format),
            mode = %record.mode,
            rally = record.rally,
            "Actuation tick"
        );
        match self.records.record(&record) {
            Ok(()) => self.report.records += 1,
            Err(e) => {
                self.report.record_faults += 1;
                warn!(error = %e, "Failed to write log record");
            }
        }

        Ok(flow)
    }

    fn sample(&mut self, timestamp_us: u64) -> SessionResult<()> {
        let sampled = match self.sampler.sample(timestamp_us) {
            Ok(s) => s,
            Err(SensorError::NoSensors) => return Err(SessionError::NoSensors),
            Err(e) => return Err(SessionError::Sensor(e.to_string())),
        };
        match sampled {
            Sampled::Fresh(reading) => {
                self.report.fresh_samples += 1;
                let normalized = reading.normalize(&self.calibration);
                self.bridge.reading.publish(Some(reading));
                self.bridge.normalized.publish(normalized);
            }
            Sampled::Held(_) => self.report.held_samples += 1,
        }
        Ok(())
    }

    fn choose(&mut self, now: Duration) -> (StimulusVector, ModeLabel, TickFlow) {
        match &mut self.plan {
            ActuationPlan::Passthrough => {
                (self.bridge.encoded.latest(), ModeLabel::Normal, TickFlow::Continue)
            }
            ActuationPlan::Override(scheduler) => {
                let step = scheduler.step(now, self.bridge.encoded.latest());
                if step.switched {
                    self.report.mode_switches += 1;
                    info!(mode = %ModeLabel::from(step.mode), elapsed_s = now.as_secs_f64(), "Mode switched");
                }
                (step.stimulus, step.mode.into(), TickFlow::Continue)
            }
            ActuationPlan::DutyCycle(scheduler) => match scheduler.step(now) {
                DutyStep::Running {
                    state,
                    stimulus,
                    switched,
                } => {
                    if switched {
                        self.report.mode_switches += 1;
                        info!(state = ?state, elapsed_s = now.as_secs_f64(), "Duty cycle switched");
                    }
                    (stimulus, state.into(), TickFlow::Continue)
                }
                DutyStep::Halted => {
                    if !self.report.budget_exhausted {
                        info!(elapsed_s = now.as_secs_f64(), "Duty-cycle budget exhausted");
                    }
                    self.report.budget_exhausted = true;
                    (StimulusVector::all_inactive(), ModeLabel::Halted, TickFlow::Finished)
                }
            },
        }
    }

    fn apply(&mut self, desired: StimulusVector) {
        match self.actuator.apply(&desired) {
            Ok(()) => {
                self.report.applies += 1;
                self.consecutive_failures = 0;
                self.retry = false;
                self.applied = desired;
                self.bridge.applied.publish(desired);
                debug!(stimulus = %desired.display(self.wire_format), "Stimulus applied");
            }
            Err(e) => {
                self.report.apply_faults += 1;
                self.consecutive_failures += 1;
                self.retry = true;
                warn!(error = %e, failures = self.consecutive_failures, "Failed to apply stimulus");

                if self.consecutive_failures >= 2 {
                    self.report.forced_releases += 1;
                    match self.actuator.release() {
                        Ok(()) => {
                            self.applied = StimulusVector::all_inactive();
                            self.bridge.applied.publish(self.applied);
                            warn!("Forced release after repeated apply failures");
                        }
                        Err(e) => error!(error = %e, "Forced release failed"),
                    }
                }
            }
        }
    }

    /// Run until the stop signal is raised or the plan finishes.
    ///
    /// `epoch` is the session start shared with the other loops.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-transient sensor fault. The actuator is
    /// released in every case; a failed release is reported only when the
    /// loop itself ended cleanly.
    pub fn run(
        mut self,
        epoch: Instant,
        interval: Duration,
        stop: &StopSignal,
    ) -> SessionResult<ActuationReport> {
        info!(interval_ms = interval.as_millis() as u64, "Actuation loop started");

        let result = loop {
            if stop.is_raised() {
                break Ok(());
            }
            let tick_start = Instant::now();
            match self.tick(tick_start.duration_since(epoch)) {
                Ok(TickFlow::Continue) => {}
                Ok(TickFlow::Finished) => break Ok(()),
                Err(e) => break Err(e),
            }
            if stop.wait_until(tick_start + interval) {
                break Ok(());
            }
        };

        if let Err(e) = self.records.flush() {
            warn!(error = %e, "Failed to flush log records");
        }
        let released = self.actuator.release();

        info!(
            ticks = self.report.ticks,
            applies = self.report.applies,
            apply_faults = self.report.apply_faults,
            "Actuation loop stopped"
        );
        match (result, released) {
            (Err(e), Err(release)) => {
                error!(error = %release, "Failed to release actuator after loop fault");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(release)) => Err(SessionError::Actuator(release.to_string())),
            (Ok(()), Ok(())) => Ok(self.report.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecordSink;
    use crate::scheduler::DutyCycle;
    use crate::simulated::{SimulatedElectrodes, SimulatedSensorArray};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn passthrough(
        sensors: SimulatedSensorArray,
        electrodes: SimulatedElectrodes,
    ) -> ActuationLoop<SimulatedSensorArray, SimulatedElectrodes, MemoryRecordSink> {
        ActuationLoop::new(
            sensors,
            electrodes,
            MemoryRecordSink::new(),
            ActuationPlan::Passthrough,
            ControlBridge::shared(),
            ChannelCalibration::standard_array().to_vec(),
        )
    }

    #[test]
    fn test_passthrough_applies_on_change_only() {
        let electrodes = SimulatedElectrodes::new(6);
        let probe = electrodes.clone();
        let mut lp = passthrough(SimulatedSensorArray::new(3), electrodes);

        lp.tick(ms(0)).unwrap();
        assert_eq!(probe.apply_count(), 0);

        lp.bridge.encoded.publish(StimulusVector::one_hot(2));
        lp.tick(ms(100)).unwrap();
        lp.tick(ms(200)).unwrap();
        assert_eq!(probe.apply_count(), 1);
        assert_eq!(probe.last_applied(), StimulusVector::one_hot(2));
        assert_eq!(lp.bridge.applied.latest(), StimulusVector::one_hot(2));
    }

    #[test]
    fn test_reading_published_and_recorded() {
        let records = MemoryRecordSink::new();
        let mut lp = ActuationLoop::new(
            SimulatedSensorArray::new(3),
            SimulatedElectrodes::new(6),
            records.clone(),
            ActuationPlan::Passthrough,
            ControlBridge::shared(),
            ChannelCalibration::standard_array().to_vec(),
        );

        lp.tick(ms(50)).unwrap();
        assert!(lp.bridge.reading.latest().is_some());
        assert_eq!(lp.bridge.normalized.latest().channel_count(), 3);

        let rec = &records.records()[0];
        assert_eq!(rec.timestamp_us, 50_000);
        assert_eq!(rec.normalized.len(), 3);
        assert_eq!(rec.mode, ModeLabel::Normal);
    }

    #[test]
    fn test_transient_fault_holds_reading() {
        let sensors = SimulatedSensorArray::new(3).with_fault_every(2);
        let mut lp = passthrough(sensors, SimulatedElectrodes::new(6));

        lp.tick(ms(0)).unwrap();
        let first = lp.bridge.normalized.snapshot();
        lp.tick(ms(100)).unwrap();
        let second = lp.bridge.normalized.snapshot();

        assert_eq!(lp.report().held_samples, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_second_failure_forces_release() {
        let electrodes = SimulatedElectrodes::new(6).with_failures(2);
        let probe = electrodes.clone();
        let mut lp = passthrough(SimulatedSensorArray::new(3), electrodes);

        lp.bridge.encoded.publish(StimulusVector::one_hot(0));
        lp.tick(ms(0)).unwrap();
        assert_eq!(lp.report().apply_faults, 1);
        assert_eq!(lp.report().forced_releases, 0);

        lp.tick(ms(100)).unwrap();
        assert_eq!(lp.report().forced_releases, 1);
        assert_eq!(probe.last_applied(), StimulusVector::all_inactive());

        // Retried on the next tick even though the stimulus is unchanged
        lp.tick(ms(200)).unwrap();
        assert_eq!(probe.last_applied(), StimulusVector::one_hot(0));
        assert_eq!(lp.report().applies, 1);
    }

    #[test]
    fn test_duty_cycle_plan_finishes_inactive() {
        let electrodes = SimulatedElectrodes::new(6);
        let probe = electrodes.clone();
        let scheduler = DutyCycleScheduler::new(DutyCycle {
            on: ms(2000),
            off: ms(1000),
            total: ms(10_000),
            channel: 1,
        });
        let mut lp = ActuationLoop::new(
            SimulatedSensorArray::new(3),
            electrodes,
            MemoryRecordSink::new(),
            ActuationPlan::DutyCycle(scheduler),
            ControlBridge::shared(),
            ChannelCalibration::standard_array().to_vec(),
        );

        let mut t = 0;
        let mut flow = TickFlow::Continue;
        while flow == TickFlow::Continue {
            flow = lp.tick(ms(t)).unwrap();
            if t == 1500 {
                assert_eq!(probe.last_applied(), StimulusVector::one_hot(1));
            }
            t += 100;
        }

        assert!(t > 10_000 && t <= 10_200);
        assert!(lp.report().budget_exhausted);
        assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
        assert_eq!(lp.bridge.mode.latest(), ModeLabel::Halted);
    }

    #[test]
    fn test_override_plan_randomizes() {
        let scheduler = ModeScheduler::new(ms(200), ms(5000), StdRng::seed_from_u64(3));
        let mut lp = ActuationLoop::new(
            SimulatedSensorArray::new(3),
            SimulatedElectrodes::new(6),
            MemoryRecordSink::new(),
            ActuationPlan::Override(scheduler),
            ControlBridge::shared(),
            ChannelCalibration::standard_array().to_vec(),
        );

        lp.tick(ms(0)).unwrap();
        assert_eq!(lp.bridge.mode.latest(), ModeLabel::Normal);

        lp.tick(ms(250)).unwrap();
        assert_eq!(lp.bridge.mode.latest(), ModeLabel::Random);
        assert_eq!(lp.bridge.applied.latest().active_count(), 1);
        assert_eq!(lp.report().mode_switches, 1);
    }

    #[test]
    fn test_drop_releases_actuator() {
        let electrodes = SimulatedElectrodes::new(6);
        let probe = electrodes.clone();
        let mut lp = passthrough(SimulatedSensorArray::new(3), electrodes);

        lp.bridge.encoded.publish(StimulusVector::all_active());
        lp.tick(ms(0)).unwrap();
        assert_eq!(probe.last_applied(), StimulusVector::all_active());

        drop(lp);
        assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
    }

    #[test]
    fn test_run_stops_on_signal() {
        let electrodes = SimulatedElectrodes::new(6);
        let probe = electrodes.clone();
        let lp = passthrough(SimulatedSensorArray::new(3), electrodes);
        let stop = StopSignal::new();
        stop.raise();

        let report = lp.run(Instant::now(), ms(10), &stop).unwrap();
        assert_eq!(report.ticks, 0);
        assert_eq!(probe.last_applied(), StimulusVector::all_inactive());
    }

    #[test]
    fn test_sensor_fault_outranks_release_failure() {
        // The first tick fails on sampling, so the one injected failure
        // hits the release at the end of the run.
        let electrodes = SimulatedElectrodes::new(6).with_failures(1);
        let lp = passthrough(SimulatedSensorArray::absent(), electrodes);
        let stop = StopSignal::new();

        let result = lp.run(Instant::now(), ms(10), &stop);
        assert!(matches!(result, Err(SessionError::NoSensors)));
    }

    #[test]
    fn test_release_failure_after_clean_stop() {
        let electrodes = SimulatedElectrodes::new(6).with_failures(1);
        let lp = passthrough(SimulatedSensorArray::new(3), electrodes);
        let stop = StopSignal::new();
        stop.raise();

        let result = lp.run(Instant::now(), ms(10), &stop);
        assert!(matches!(result, Err(SessionError::Actuator(_))));
    }

    #[test]
    fn test_no_sensors_is_fatal() {
        let mut lp = passthrough(SimulatedSensorArray::absent(), SimulatedElectrodes::new(6));
        assert!(matches!(lp.tick(ms(0)), Err(SessionError::NoSensors)));
    }
}
