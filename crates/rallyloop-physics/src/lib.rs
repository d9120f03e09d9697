//! Rallyloop Physics - rally simulation with stimulus regions
//!
//! This crate advances a bounded 2-D ball against a sensor-driven paddle and
//! reports which of the six field regions the ball occupies each tick.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       SimulationEngine                           │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌────────────────┐  │
//! │  │ Ball / Paddle│───►│ Bounds + Contact │───►│ Region Overlap │  │
//! │  │ (paddle y in)│    │ (edge-triggered) │    │ (6 flags)      │  │
//! │  └──────────────┘    └────────┬─────────┘    └───────┬────────┘  │
//! │                               ▼                      ▼           │
//! │                       ┌──────────────┐       ┌──────────────┐    │
//! │                       │ RallyEvent   │       │ TickOutcome  │    │
//! │                       └──────────────┘       └──────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use rallyloop_physics::{SimConfig, SimulationEngine};
//!
//! let mut sim = SimulationEngine::new(SimConfig { seed: Some(1), ..SimConfig::default() });
//! sim.set_paddle_y(300);
//!
//! let outcome = sim.tick();
//! assert_eq!(outcome.summary.frame, 1);
//! assert_eq!(outcome.regions.iter().filter(|r| **r).count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod collision;
pub mod engine;
pub mod region;
pub mod types;

pub use collision::Rect;
pub use engine::{
    Ball, Paddle, RallyEvent, RallyEventKind, SimConfig, SimState, SimulationEngine, TickOutcome,
};
pub use region::{Band, RegionLayout, RegionMap};
pub use types::{FieldSize, Vec2};
