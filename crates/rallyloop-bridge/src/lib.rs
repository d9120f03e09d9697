//! Rallyloop Bridge - concurrent control loops
//!
//! This crate joins the sensor side and the simulation side of the
//! bio-feedback loop through a small set of shared cells:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Session                                    │
//! │                                                                         │
//! │  ┌───────────────────┐   normalized    ┌────────────────────────────┐   │
//! │  │ Actuation loop    │───────────────▶│ Simulation loop            │   │
//! │  │                   │                 │                            │   │
//! │  │ sample → normalize│   encoded, sim  │ estimate → tick → encode   │   │
//! │  │ schedule → apply  │◀───────────────│                            │   │
//! │  │ record            │                 │                            │   │
//! │  └─────────┬─────────┘                 └────────────────────────────┘   │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  ┌───────────────────┐        ┌───────────────┐                         │
//! │  │ Actuator (guard)  │        │ RecordSink    │                         │
//! │  └───────────────────┘        └───────────────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use rallyloop_bridge::config::SessionConfig;
//! use rallyloop_bridge::record::NullRecordSink;
//! use rallyloop_bridge::simulated::{SimulatedElectrodes, SimulatedSensorArray};
//! use rallyloop_bridge::Session;
//!
//! let handle = Session::begin(
//!     SessionConfig::feedback().with_seed(1),
//!     SimulatedSensorArray::new(3),
//!     SimulatedElectrodes::new(6),
//!     NullRecordSink,
//! )?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! handle.request_stop();
//! let report = handle.join()?;
//! println!("{} ticks", report.actuation.ticks);
//! # Ok::<(), rallyloop_bridge::SessionError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod actuation;
pub mod cells;
pub mod config;
pub mod encoder;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod simulated;
pub mod simulation;

pub use actuation::{ActuationLoop, ActuationPlan, ActuationReport, ReleaseGuard};
pub use cells::{ControlBridge, Slot, StopSignal};
pub use config::{ConfigError, ExperimentConfig, SessionConfig};
pub use encoder::StimulusEncoder;
pub use error::{SessionError, SessionResult};
pub use record::{LogRecord, MemoryRecordSink, NullRecordSink, RecordError, RecordSink};
pub use scheduler::{DutyCycle, DutyCycleScheduler, ModeScheduler, RandomPatternGenerator};
pub use session::{Session, SessionHandle, SessionReport};
pub use simulation::{SimulationLoop, SimulationReport};
