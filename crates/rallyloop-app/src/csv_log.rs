//! CSV session log.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use rallyloop_bridge::record::{LogRecord, RecordError, RecordResult, RecordSink};
use rallyloop_core::types::WireFormat;

/// Writes one CSV row per record and flushes after each, so a crash loses
/// at most the row being written.
pub struct CsvRecordSink<W: Write> {
    writer: csv::Writer<W>,
    format: WireFormat,
}

impl CsvRecordSink<File> {
    /// Create (or truncate) `path` and write the header row.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created or the header cannot be written.
    pub fn create(path: &Path, channels: usize, format: WireFormat) -> RecordResult<Self> {
        Self::from_writer(File::create(path)?, channels, format)
    }
}

impl<W: Write> CsvRecordSink<W> {
    /// Wrap a writer and write the header row.
    ///
    /// # Errors
    ///
    /// Fails if the header cannot be written.
    pub fn from_writer(inner: W, channels: usize, format: WireFormat) -> RecordResult<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(LogRecord::header(channels)).map_err(csv_error)?;
        writer.flush()?;
        Ok(Self { writer, format })
    }

    /// Flush and return the writer.
    ///
    /// # Errors
    ///
    /// Fails if buffered rows cannot be flushed.
    pub fn into_inner(self) -> RecordResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| RecordError::Io(e.into_error()))
    }
}

impl<W: Write + Send> RecordSink for CsvRecordSink<W> {
    fn record(&mut self, record: &LogRecord) -> RecordResult<()> {
        self.writer
            .write_record(record.fields(self.format))
            .map_err(csv_error)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> RecordResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> RecordError {
    if e.is_io_error() {
        RecordError::Io(io::Error::from(e))
    } else {
        RecordError::Serialize(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rallyloop_core::types::{ModeLabel, NormalizedReading, SimSummary, StimulusVector};

    fn record(ts: u64, mode: ModeLabel) -> LogRecord {
        LogRecord::new(
            ts,
            &NormalizedReading::new(ts, &[0.5, 0.25, 0.0]),
            &SimSummary {
                frame: 3,
                ball_x: 500,
                ball_y: 480,
                rally: 2,
                paddle_y: 333,
            },
            StimulusVector::one_hot(4),
            mode,
        )
    }

    #[test]
    fn test_header_and_rows() {
        let mut sink = CsvRecordSink::from_writer(Vec::new(), 3, WireFormat::Binary).unwrap();
        sink.record(&record(0, ModeLabel::Normal)).unwrap();
        sink.record(&record(100_000, ModeLabel::Random)).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp_us,ch0,ch1,ch2,ball_x,ball_y,rally,paddle_y,stimulus,mode");
        assert_eq!(lines[1], "0,0.5000,0.2500,0.0000,500,480,2,333,\"0,0,0,0,1,0\",Normal");
        assert!(lines[2].ends_with(",Random"));
    }

    #[test]
    fn test_negative_sentinel_format() {
        let mut sink =
            CsvRecordSink::from_writer(Vec::new(), 3, WireFormat::NegativeSentinel).unwrap();
        sink.record(&record(0, ModeLabel::DutyOn)).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(text.contains("\"0,0,0,0,-1,0\",On"));
    }
}
