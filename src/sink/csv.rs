//! CSV traces of the detector signals.
//!
//! Each signal gets its own file. Values are appended as `value,` in
//! ascending index order with no line breaks, so a whole run is a single
//! CSV row per file.

use crate::error::{Result, VoxstateError};
use crate::signal::circular::{CircularBuffer, SampleRange};
use crate::signal::features::{FeatureEngine, SignalKind};
use crate::sink::{SignalRecorder, SignalSnapshot};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

fn sink_failure(sink: &str, e: io::Error) -> VoxstateError {
    VoxstateError::SinkFailure {
        sink: sink.to_string(),
        message: e.to_string(),
    }
}

/// Writes one signal's values as comma-terminated text.
pub struct CsvSink<W: Write> {
    writer: Option<W>,
    name: String,
}

impl CsvSink<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::create(path).map_err(|e| sink_failure(&name, e))?;
        Ok(Self::new(BufWriter::new(file), name))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes `signal` for every index of `range`.
    pub fn write(&mut self, signal: &CircularBuffer, range: SampleRange) -> Result<()> {
        self.write_values(range.map(|i| signal.read(i)))
    }

    /// Appends already extracted values.
    pub fn write_values<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = f64>,
    {
        let Some(writer) = self.writer.as_mut() else {
            return Err(VoxstateError::SinkFailure {
                sink: self.name.clone(),
                message: "write after close".to_string(),
            });
        };
        for value in values {
            write!(writer, "{:?},", value).map_err(|e| sink_failure(&self.name, e))?;
        }
        Ok(())
    }

    /// Flushes and releases the writer. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| sink_failure(&self.name, e))?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Returns the writer if the sink was not closed.
    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take()
    }
}

/// One [`CsvSink`] per signal.
pub struct CsvRecorder<W: Write> {
    sinks: Vec<(SignalKind, CsvSink<W>)>,
}

impl CsvRecorder<BufWriter<File>> {
    /// Creates `dir` if needed and opens the five trace files inside it.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| sink_failure(&dir.display().to_string(), e))?;
        let mut sinks = Vec::with_capacity(SignalKind::ALL.len());
        for kind in SignalKind::ALL {
            sinks.push((kind, CsvSink::create(&dir.join(kind.file_name()))?));
        }
        Ok(Self { sinks })
    }
}

impl<W: Write> CsvRecorder<W> {
    pub fn from_sinks<I>(sinks: I) -> Self
    where
        I: IntoIterator<Item = (SignalKind, CsvSink<W>)>,
    {
        Self {
            sinks: sinks.into_iter().collect(),
        }
    }

    /// Writes pre-extracted values, used by the background worker.
    pub fn write_snapshot(&mut self, snapshot: &SignalSnapshot) -> Result<()> {
        for (kind, sink) in &mut self.sinks {
            if let Some(values) = snapshot.values(*kind) {
                sink.write_values(values.iter().copied())?;
            }
        }
        Ok(())
    }

    pub fn into_sinks(self) -> Vec<(SignalKind, CsvSink<W>)> {
        self.sinks
    }

    /// Closes every sink even if one fails; returns the first failure.
    fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, sink) in &mut self.sinks {
            if let Err(e) = sink.close() {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::warn!("{}", e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<W: Write + Send> SignalRecorder for CsvRecorder<W> {
    fn record(&mut self, engine: &FeatureEngine, range: SampleRange) -> Result<()> {
        for (kind, sink) in &mut self.sinks {
            sink.write(engine.signal(*kind), range.clone())?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_all()
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}
