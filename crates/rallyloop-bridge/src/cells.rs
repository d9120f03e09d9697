//! Last-value-wins cells shared between the control loops.
//!
//! Every [`Slot`] has exactly one writer. Readers always get the most recent
//! complete value and never see a torn write. Nothing orders one slot
//! against another: a reader pairing the stimulus with the simulation
//! summary may see values from different ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rallyloop_core::types::{ChannelReading, ModeLabel, NormalizedReading, SimSummary, StimulusVector};

// ============================================================================
// Slot
// ============================================================================

/// A single last-value-wins cell with a publish counter.
#[derive(Debug, Default)]
pub struct Slot<T> {
    value: RwLock<T>,
    version: AtomicU64,
}

impl<T: Clone> Slot<T> {
    /// Create a slot holding an initial value at version 0.
    pub fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
            version: AtomicU64::new(0),
        }
    }

    /// Replace the value and bump the version.
    pub fn publish(&self, value: T) {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        *guard = value;
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Copy of the latest value.
    pub fn latest(&self) -> T {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Latest value together with the version it was published at.
    pub fn snapshot(&self) -> (T, u64) {
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        (guard.clone(), self.version.load(Ordering::Acquire))
    }

    /// Number of publishes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Latest value if it was published after `seen`.
    pub fn newer_than(&self, seen: u64) -> Option<(T, u64)> {
        if self.version() == seen {
            return None;
        }
        let snapshot = self.snapshot();
        (snapshot.1 != seen).then_some(snapshot)
    }
}

// ============================================================================
// Control Bridge
// ============================================================================

/// The fixed set of cells the loops communicate through.
///
/// | Slot | Writer |
/// |------|--------|
/// | `reading`, `normalized`, `applied`, `mode` | actuation loop |
/// | `encoded`, `sim` | simulation loop |
#[derive(Debug)]
pub struct ControlBridge {
    /// Latest raw reading (`None` until the first successful sample)
    pub reading: Slot<Option<ChannelReading>>,
    /// Latest normalized reading
    pub normalized: Slot<NormalizedReading>,
    /// Stimulus produced by the region encoder
    pub encoded: Slot<StimulusVector>,
    /// Stimulus last handed to the actuator
    pub applied: Slot<StimulusVector>,
    /// Latest simulation summary
    pub sim: Slot<SimSummary>,
    /// Scheduler state of the actuation loop
    pub mode: Slot<ModeLabel>,
}

impl ControlBridge {
    /// Create a bridge with every slot at its idle value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reading: Slot::new(None),
            normalized: Slot::new(NormalizedReading::default()),
            encoded: Slot::new(StimulusVector::all_inactive()),
            applied: Slot::new(StimulusVector::all_inactive()),
            sim: Slot::new(SimSummary::default()),
            mode: Slot::new(ModeLabel::default()),
        }
    }

    /// Create a bridge ready to be shared across threads.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for ControlBridge {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Stop Signal
// ============================================================================

/// Cooperative shutdown flag shared by every loop of a session.
///
/// Raising is one-way. Waiters wake immediately.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Create a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    pub fn raise(&self) {
        let (lock, cvar) = &*self.inner;
        let mut raised = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        cvar.notify_all();
    }

    /// Check whether the signal has been raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`, returning early if the signal is raised.
    ///
    /// Returns `true` if the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut raised = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = cvar
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            raised = guard;
        }
        *raised
    }

    /// Sleep until `deadline`, returning early if the signal is raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.wait_timeout(deadline.saturating_duration_since(Instant::now()))
    }
}
