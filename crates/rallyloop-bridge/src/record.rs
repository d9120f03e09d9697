//! Per-tick log records.
//!
//! The actuation loop assembles one [`LogRecord`] per sampling tick from the
//! control bridge and hands it to a [`RecordSink`]. Field order is fixed;
//! replay tooling depends on it.
//!
//! `stimulus` and the simulation columns come from different bridge slots
//! and may belong to different simulation ticks.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rallyloop_core::types::{ModeLabel, NormalizedReading, SimSummary, StimulusVector, WireFormat};

/// Errors from a record sink.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying I/O failure
    #[error("record I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized
    #[error("record serialization failed: {0}")]
    Serialize(String),
}

/// Result type for record sinks.
pub type RecordResult<T> = Result<T, RecordError>;

/// One line of the session log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Microseconds since session start
    pub timestamp_us: u64,
    /// Normalized channel values
    pub normalized: Vec<f32>,
    /// Ball x
    pub ball_x: i32,
    /// Ball y
    pub ball_y: i32,
    /// Rally count
    pub rally: u32,
    /// Paddle top y
    pub paddle_y: i32,
    /// Stimulus handed to the actuator
    pub stimulus: StimulusVector,
    /// Scheduler state
    pub mode: ModeLabel,
}

impl LogRecord {
    /// Assemble a record from bridge values.
    #[must_use]
    pub fn new(
        timestamp_us: u64,
        normalized: &NormalizedReading,
        sim: &SimSummary,
        stimulus: StimulusVector,
        mode: ModeLabel,
    ) -> Self {
        Self {
            timestamp_us,
            normalized: normalized.values().to_vec(),
            ball_x: sim.ball_x,
            ball_y: sim.ball_y,
            rally: sim.rally,
            paddle_y: sim.paddle_y,
            stimulus,
            mode,
        }
    }

    /// Column names in record order for `channels` normalized channels.
    #[must_use]
    pub fn header(channels: usize) -> Vec<String> {
        let mut cols = vec!["timestamp_us".to_string()];
        cols.extend((0..channels).map(|i| format!("ch{i}")));
        cols.extend(
            ["ball_x", "ball_y", "rally", "paddle_y", "stimulus", "mode"]
                .iter()
                .map(|s| (*s).to_string()),
        );
        cols
    }

    /// Record flattened into text fields in header order, with the stimulus
    /// rendered in `format`.
    #[must_use]
    pub fn fields(&self, format: WireFormat) -> Vec<String> {
        let mut out = Vec::with_capacity(self.normalized.len() + 7);
        out.push(self.timestamp_us.to_string());
        out.extend(self.normalized.iter().map(|v| format!("{v:.4}")));
        out.push(self.ball_x.to_string());
        out.push(self.ball_y.to_string());
        out.push(self.rally.to_string());
        out.push(self.paddle_y.to_string());
        out.push(self.stimulus.display(format).to_string());
        out.push(self.mode.as_str().to_string());
        out
    }
}

/// Consumer of log records.
pub trait RecordSink: Send {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be stored.
    fn record(&mut self, record: &LogRecord) -> RecordResult<()>;

    /// Push buffered records to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing failed.
    fn flush(&mut self) -> RecordResult<()> {
        Ok(())
    }
}

/// Sink that drops every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRecordSink;

impl RecordSink for NullRecordSink {
    fn record(&mut self, _record: &LogRecord) -> RecordResult<()> {
        Ok(())
    }
}

/// Sink keeping records in memory, shareable with an observer.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryRecordSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of records so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no record has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemoryRecordSink {
    fn record(&mut self, record: &LogRecord) -> RecordResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn record(&mut self, record: &LogRecord) -> RecordResult<()> {
        (**self).record(record)
    }

    fn flush(&mut self) -> RecordResult<()> {
        (**self).flush()
    }
}
