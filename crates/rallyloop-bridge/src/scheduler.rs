//! Timed two-state schedulers.
//!
//! A [`TimedToggle`] alternates between two states with a fixed hold per
//! state. It is used in two forms:
//!
//! - [`ModeScheduler`]: Sensed ⇄ Randomized, unbounded. While Randomized, a
//!   [`RandomPatternGenerator`] replaces the encoded stimulus with a one-hot
//!   pattern redrawn once per second.
//! - [`DutyCycleScheduler`]: Inactive ⇄ Active on a single channel, bounded
//!   by a total budget after which it halts with every channel inactive.
//!
//! Schedulers never read a clock themselves. The owner passes the elapsed
//! time since the session started, which keeps them deterministic in tests.

use std::time::Duration;

use rallyloop_core::types::{DutyState, Mode, StimulusVector, STIM_CHANNELS};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Timed Toggle
// ============================================================================

/// A state with exactly one alternative.
pub trait TwoState: Copy + Eq + std::fmt::Debug {
    /// The alternative state.
    fn other(self) -> Self;
}

impl TwoState for Mode {
    fn other(self) -> Self {
        self.toggled()
    }
}

impl TwoState for DutyState {
    fn other(self) -> Self {
        self.toggled()
    }
}

/// Two-state toggle with a fixed hold per state.
#[derive(Clone, Debug)]
pub struct TimedToggle<S> {
    initial: S,
    state: S,
    initial_hold: Duration,
    other_hold: Duration,
    origin: Duration,
    transitions: u64,
}

impl<S: TwoState> TimedToggle<S> {
    /// Create a toggle starting in `initial` at time zero.
    ///
    /// `initial_hold` applies to `initial`, `other_hold` to its alternative.
    #[must_use]
    pub fn new(initial: S, initial_hold: Duration, other_hold: Duration) -> Self {
        Self {
            initial,
            state: initial,
            initial_hold,
            other_hold,
            origin: Duration::ZERO,
            transitions: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.state
    }

    /// Hold duration of `state`.
    #[must_use]
    pub fn hold(&self, state: S) -> Duration {
        if state == self.initial {
            self.initial_hold
        } else {
            self.other_hold
        }
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.origin)
    }

    /// Number of transitions so far.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Switch state if the current hold has run out.
    ///
    /// At most one transition happens per check. Returns the new state.
    pub fn check(&mut self, now: Duration) -> Option<S> {
        if self.elapsed(now) < self.hold(self.state) {
            return None;
        }
        self.state = self.state.other();
        self.origin = now;
        self.transitions += 1;
        Some(self.state)
    }
}

// ============================================================================
// Random Pattern Generator
// ============================================================================

/// Default redraw period of the randomized pattern.
pub const PATTERN_PERIOD: Duration = Duration::from_secs(1);

/// One-hot pattern generator with its own redraw cadence.
#[derive(Debug)]
pub struct RandomPatternGenerator {
    rng: StdRng,
    period: Duration,
    current: StimulusVector,
    drawn_at: Option<Duration>,
}

impl RandomPatternGenerator {
    /// Create a generator redrawing every `period`.
    #[must_use]
    pub fn new(rng: StdRng, period: Duration) -> Self {
        Self {
            rng,
            period,
            current: StimulusVector::all_inactive(),
            drawn_at: None,
        }
    }

    /// Forget the current pattern so the next call draws immediately.
    pub fn reset(&mut self) {
        self.drawn_at = None;
    }

    /// Pattern for time `now`, redrawn once the period has elapsed.
    pub fn pattern(&mut self, now: Duration) -> StimulusVector {
        let due = match self.drawn_at {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.period,
        };
        if due {
            self.current = StimulusVector::one_hot(self.rng.gen_range(0..STIM_CHANNELS));
            self.drawn_at = Some(now);
        }
        self.current
    }
}

// ============================================================================
// Mode Scheduler
// ============================================================================

/// Output of one [`ModeScheduler::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeStep {
    /// Mode after the step
    pub mode: Mode,
    /// Stimulus the actuator should carry
    pub stimulus: StimulusVector,
    /// Set when the mode changed during this step
    pub switched: bool,
}

/// Sensed ⇄ Randomized scheduler.
#[derive(Debug)]
pub struct ModeScheduler {
    toggle: TimedToggle<Mode>,
    generator: RandomPatternGenerator,
}

impl ModeScheduler {
    /// Create a scheduler starting in [`Mode::Sensed`].
    #[must_use]
    pub fn new(normal: Duration, random: Duration, rng: StdRng) -> Self {
        Self {
            toggle: TimedToggle::new(Mode::Sensed, normal, random),
            generator: RandomPatternGenerator::new(rng, PATTERN_PERIOD),
        }
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.toggle.state()
    }

    /// Advance to `now` and choose the stimulus source.
    ///
    /// In [`Mode::Sensed`] the encoded stimulus passes through unchanged.
    pub fn step(&mut self, now: Duration, encoded: StimulusVector) -> ModeStep {
        let switched = self.toggle.check(now).is_some();
        let mode = self.toggle.state();
        if switched && mode == Mode::Randomized {
            self.generator.reset();
        }

        let stimulus = match mode {
            Mode::Sensed => encoded,
            Mode::Randomized => self.generator.pattern(now),
        };
        ModeStep {
            mode,
            stimulus,
            switched,
        }
    }
}

// ============================================================================
// Duty-Cycle Scheduler
// ============================================================================

/// Duty-cycle timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycle {
    /// Active hold
    pub on: Duration,
    /// Inactive hold
    pub off: Duration,
    /// Total run budget
    pub total: Duration,
    /// Channel driven while active
    pub channel: usize,
}

/// Output of one [`DutyCycleScheduler::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DutyStep {
    /// Still alternating
    Running {
        /// Output state after the step
        state: DutyState,
        /// Stimulus the actuator should carry
        stimulus: StimulusVector,
        /// Set when the state changed during this step
        switched: bool,
    },
    /// Budget exhausted; every channel must be inactive
    Halted,
}

impl DutyStep {
    /// Stimulus for this step (all inactive once halted).
    #[must_use]
    pub fn stimulus(&self) -> StimulusVector {
        match self {
            Self::Running { stimulus, .. } => *stimulus,
            Self::Halted => StimulusVector::all_inactive(),
        }
    }
}

/// Single-channel Inactive ⇄ Active scheduler with a total budget.
#[derive(Debug)]
pub struct DutyCycleScheduler {
    toggle: TimedToggle<DutyState>,
    cycle: DutyCycle,
    halted: bool,
}

impl DutyCycleScheduler {
    /// Create a scheduler starting [`DutyState::Inactive`].
    #[must_use]
    pub fn new(cycle: DutyCycle) -> Self {
        Self {
            toggle: TimedToggle::new(DutyState::Inactive, cycle.off, cycle.on),
            cycle,
            halted: false,
        }
    }

    /// Timing the scheduler was built with.
    #[must_use]
    pub fn cycle(&self) -> DutyCycle {
        self.cycle
    }

    /// Whether the budget has been exhausted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Current output state (inactive once halted).
    #[must_use]
    pub fn state(&self) -> DutyState {
        if self.halted {
            DutyState::Inactive
        } else {
            self.toggle.state()
        }
    }

    /// Advance to `now`.
    ///
    /// The budget is checked before the hold, so a transition due at the same
    /// instant the budget runs out never happens.
    pub fn step(&mut self, now: Duration) -> DutyStep {
        if self.halted || now >= self.cycle.total {
            self.halted = true;
            return DutyStep::Halted;
        }

        let switched = self.toggle.check(now).is_some();
        let state = self.toggle.state();
        let mut stimulus = StimulusVector::all_inactive();
        stimulus.set(self.cycle.channel, state.command());
        DutyStep::Running {
            state,
            stimulus,
            switched,
        }
    }
}
