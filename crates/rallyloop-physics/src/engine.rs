//! Fixed-step rally simulation.
//!
//! One [`SimulationEngine::tick`] advances the ball by its velocity, resolves
//! the field bounds and the paddle, and recomputes which regions the ball
//! overlaps. The paddle sits on the left edge and is moved only through
//! [`SimulationEngine::set_paddle_y`].
//!
//! # Tick order
//!
//! ```text
//! integrate ─► right/left/bottom/top bounds ─► paddle contact ─► regions ─► miss reset
//! ```
//!
//! Region flags and the rally event of a tick describe the ball where the
//! contact happened; a missed ball is recentred only afterwards.

use core::f32::consts::{FRAC_PI_3, FRAC_PI_6};

use rallyloop_core::estimator::PositionEstimator;
use rallyloop_core::types::{RegionFlags, SimSummary, STIM_CHANNELS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::collision::Rect;
use crate::region::{Band, RegionLayout, RegionMap};
use crate::types::{round_units, FieldSize, Vec2};

// ============================================================================
// Configuration
// ============================================================================

/// Ball side as a fraction of field height.
pub const BALL_SIZE_RATIO: f32 = 0.036_637_93;

/// Paddle width as a fraction of field width.
pub const PADDLE_WIDTH_RATIO: f32 = 0.015;

/// Paddle left edge as a fraction of field width.
pub const PADDLE_X_RATIO: f32 = 0.002;

/// Simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Play field dimensions
    pub field: FieldSize,
    /// Region partition
    pub layout: RegionLayout,
    /// Ball speed in field units per tick
    pub ball_speed: f32,
    /// Distance from the right and bottom edges at which the ball reflects
    pub wall_margin: f32,
    /// RNG seed for launch angles; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            field: FieldSize::default(),
            layout: RegionLayout::default(),
            ball_speed: 20.0,
            wall_margin: 40.0,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Paddle height (one third of the field).
    #[must_use]
    pub fn paddle_height(&self) -> f32 {
        round_units(self.field.h() / 3.0)
    }

    /// Paddle width.
    #[must_use]
    pub fn paddle_width(&self) -> f32 {
        round_units(self.field.w() * PADDLE_WIDTH_RATIO)
    }

    /// Paddle left edge.
    #[must_use]
    pub fn paddle_x(&self) -> f32 {
        round_units(self.field.w() * PADDLE_X_RATIO)
    }

    /// Ball side length.
    #[must_use]
    pub fn ball_size(&self) -> f32 {
        round_units(self.field.h() * BALL_SIZE_RATIO)
    }

    /// Position estimator matching this field's vertical axis and paddle.
    #[must_use]
    pub fn estimator(&self) -> PositionEstimator {
        PositionEstimator::new(self.field.height, self.paddle_height() as u32)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// The ball: a square moving by a fixed velocity each tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    /// Top-left corner
    pub position: Vec2,
    /// Displacement per tick
    pub velocity: Vec2,
    /// Side length
    pub size: f32,
}

impl Ball {
    /// Bounding rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::at(self.position, self.size, self.size)
    }
}

/// The paddle on the left edge of the field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height (extent along the estimator axis)
    pub height: f32,
}

impl Paddle {
    /// Bounding rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Kind of rally event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RallyEventKind {
    /// The paddle returned the ball
    PaddleHit,
    /// The ball passed the left edge
    Miss,
}

impl RallyEventKind {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaddleHit => "paddle",
            Self::Miss => "miss",
        }
    }
}

/// A scoring change produced by a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RallyEvent {
    /// What happened
    pub kind: RallyEventKind,
    /// Rally count after the event (0 after a miss)
    pub rally: u32,
    /// Region flags at the moment of contact
    pub regions: RegionFlags,
    /// Frame the event happened on
    pub frame: u64,
}

/// Mutable simulation state, owned by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Ball
    pub ball: Ball,
    /// Paddle
    pub paddle: Paddle,
    /// Consecutive paddle hits since the last miss
    pub rally: u32,
    /// Region activation of the last tick
    pub regions: RegionFlags,
    /// Frames advanced so far
    pub frame: u64,
    /// Ball was overlapping the paddle on the previous tick
    in_contact: bool,
}

impl SimState {
    /// Summary published to the other loops.
    #[must_use]
    pub fn summary(&self) -> SimSummary {
        SimSummary {
            frame: self.frame,
            ball_x: round_units(self.ball.position.x) as i32,
            ball_y: round_units(self.ball.position.y) as i32,
            rally: self.rally,
            paddle_y: round_units(self.paddle.y) as i32,
        }
    }
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    /// Region activation for this tick
    pub regions: RegionFlags,
    /// Scoring change, if any
    pub event: Option<RallyEvent>,
    /// State summary after the tick
    pub summary: SimSummary,
}

// ============================================================================
// Engine
// ============================================================================

/// Rally simulation engine.
pub struct SimulationEngine {
    config: SimConfig,
    regions: RegionMap,
    state: SimState,
    rng: StdRng,
}

impl SimulationEngine {
    /// Create an engine with the ball launched from the field centre.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let paddle_height = config.paddle_height();
        let paddle = Paddle {
            x: config.paddle_x(),
            y: clamp_top(round_units(config.field.h() / 2.0), config.field.h(), paddle_height),
            width: config.paddle_width(),
            height: paddle_height,
        };
        let ball = Ball {
            position: config.field.center(),
            velocity: launch_velocity(&mut rng, config.ball_speed),
            size: config.ball_size(),
        };

        Self {
            regions: RegionMap::new(config.layout, config.field),
            state: SimState {
                ball,
                paddle,
                rally: 0,
                regions: [false; STIM_CHANNELS],
                frame: 0,
                in_contact: false,
            },
            config,
            rng,
        }
    }

    /// Simulation parameters.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SimState {
        &self.state
    }

    /// Region partition.
    #[must_use]
    pub fn region_map(&self) -> &RegionMap {
        &self.regions
    }

    /// Move the paddle, clamping it inside the field.
    pub fn set_paddle_y(&mut self, y: i32) {
        self.state.paddle.y = clamp_top(y as f32, self.config.field.h(), self.state.paddle.height);
    }

    /// Place the ball explicitly.
    pub fn place_ball(&mut self, position: Vec2, velocity: Vec2) {
        self.state.ball.position = position;
        self.state.ball.velocity = velocity;
    }

    /// Advance the simulation by one frame.
    pub fn tick(&mut self) -> TickOutcome {
        let field = self.config.field;
        let margin = self.config.wall_margin;
        let state = &mut self.state;
        state.frame += 1;

        let ball = &mut state.ball;
        ball.position += ball.velocity;

        if ball.position.x >= field.w() - margin {
            ball.velocity.x = -ball.velocity.x.abs();
        }
        let missed = ball.position.x <= 0.0;
        if ball.position.y > field.h() - margin {
            ball.velocity.y = -ball.velocity.y.abs();
        }
        if ball.position.y < 0.0 {
            ball.velocity.y = ball.velocity.y.abs();
        }

        let mut event_kind = None;
        if missed {
            state.rally = 0;
            state.in_contact = false;
            event_kind = Some(RallyEventKind::Miss);
        } else {
            let touching = ball.bounds().intersects(&state.paddle.bounds());
            if touching && !state.in_contact {
                ball.velocity = launch_velocity(&mut self.rng, self.config.ball_speed);
                state.rally += 1;
                event_kind = Some(RallyEventKind::PaddleHit);
            }
            state.in_contact = touching;
        }

        let regions = self.regions.flags(&state.ball.bounds());
        state.regions = regions;

        let event = event_kind.map(|kind| RallyEvent {
            kind,
            rally: state.rally,
            regions,
            frame: state.frame,
        });

        if missed {
            state.ball.position = field.center();
            state.ball.velocity = launch_velocity(&mut self.rng, self.config.ball_speed);
        }

        TickOutcome {
            regions,
            event,
            summary: state.summary(),
        }
    }

    /// Human-readable tag for an event, e.g. `paddle_top_mid`.
    #[must_use]
    pub fn event_tag(&self, event: &RallyEvent) -> String {
        let mut tag = String::from(event.kind.as_str());
        for band in self.regions.paddle_side_bands(&event.regions) {
            tag.push('_');
            tag.push_str(Band::as_str(band));
        }
        tag
    }
}

/// Velocity at a random angle in [π/6, π/3] below or above horizontal,
/// always moving right.
fn launch_velocity(rng: &mut StdRng, speed: f32) -> Vec2 {
    let angle = rng.gen_range(FRAC_PI_6..=FRAC_PI_3);
    let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let v = Vec2::from_polar(speed, angle);
    Vec2::new(v.x.abs(), v.y.abs() * direction)
}

fn clamp_top(y: f32, axis: f32, extent: f32) -> f32 {
    y.clamp(0.0, (axis - extent).max(0.0))
}
