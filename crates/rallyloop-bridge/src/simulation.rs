//! Fixed-frame simulation loop.
//!
//! Per frame: re-estimate the paddle if a new normalized reading was
//! published, advance the engine, publish the summary, and publish the
//! encoded stimulus when the region flags changed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use rallyloop_core::estimator::PositionEstimator;
use rallyloop_physics::{RallyEventKind, SimulationEngine, TickOutcome};

use crate::cells::{ControlBridge, StopSignal};
use crate::encoder::StimulusEncoder;

/// Counters reported when the simulation loop ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Frames simulated
    pub frames: u64,
    /// Paddle hits
    pub hits: u64,
    /// Misses
    pub misses: u64,
    /// Longest rally
    pub best_rally: u32,
    /// Successful paddle estimates
    pub estimates: u64,
    /// Readings that produced no estimate
    pub degenerate_estimates: u64,
    /// Frames that started late
    pub overruns: u64,
}

/// Simulation loop state.
pub struct SimulationLoop {
    engine: SimulationEngine,
    estimator: PositionEstimator,
    encoder: StimulusEncoder,
    bridge: Arc<ControlBridge>,
    reading_seen: u64,
    report: SimulationReport,
}

impl SimulationLoop {
    /// Create a loop around an engine.
    #[must_use]
    pub fn new(engine: SimulationEngine, bridge: Arc<ControlBridge>) -> Self {
        let estimator = engine.config().estimator();
        let reading_seen = bridge.normalized.version();
        Self {
            engine,
            estimator,
            encoder: StimulusEncoder::new(),
            bridge,
            reading_seen,
            report: SimulationReport::default(),
        }
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    /// Counters so far.
    #[must_use]
    pub fn report(&self) -> &SimulationReport {
        &self.report
    }

    /// Run one frame.
    pub fn step(&mut self) -> TickOutcome {
        if let Some((normalized, version)) = self.bridge.normalized.newer_than(self.reading_seen) {
            self.reading_seen = version;
            match self.estimator.estimate(&normalized) {
                Ok(position) => {
                    self.report.estimates += 1;
                    self.engine.set_paddle_y(position.paddle_top);
                }
                Err(e) => {
                    self.report.degenerate_estimates += 1;
                    debug!(error = %e, "No paddle update this frame");
                }
            }
        }

        let outcome = self.engine.tick();
        self.report.frames += 1;

        if let Some(event) = outcome.event {
            match event.kind {
                RallyEventKind::PaddleHit => {
                    self.report.hits += 1;
                    self.report.best_rally = self.report.best_rally.max(event.rally);
                }
                RallyEventKind::Miss => self.report.misses += 1,
            }
            info!(
                event = %self.engine.event_tag(&event),
                rally = event.rally,
                frame = event.frame,
                "Rally event"
            );
        }

        if let Some(stimulus) = self.encoder.update(&outcome.regions) {
            self.bridge.encoded.publish(stimulus);
        }
        self.bridge.sim.publish(outcome.summary);

        outcome
    }

    /// Run frames at `frame_period` until the stop signal is raised.
    pub fn run(mut self, frame_period: Duration, stop: &StopSignal) -> SimulationReport {
        info!(
            frame_ms = frame_period.as_secs_f64() * 1000.0,
            "Simulation loop started"
        );

        let mut next = Instant::now();
        loop {
            if stop.is_raised() {
                break;
            }
            self.step();

            next += frame_period;
            let now = Instant::now();
            if next < now {
                // Late: start the next frame now instead of bursting to catch up
                self.report.overruns += 1;
                next = now;
            }
            if stop.wait_until(next) {
                break;
            }
        }

        info!(
            frames = self.report.frames,
            hits = self.report.hits,
            misses = self.report.misses,
            best_rally = self.report.best_rally,
            "Simulation loop stopped"
        );
        self.report
    }
}
