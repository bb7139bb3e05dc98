//! Recording of the per-sample signals.
//!
//! A [`SignalRecorder`] receives every newly processed index range right
//! after the feature engine has produced it, while the values are still
//! inside the circular buffers.

pub mod csv;
pub mod worker;

pub use csv::{CsvRecorder, CsvSink};
pub use worker::BackgroundRecorder;

use crate::error::{Result, VoxstateError};
use crate::signal::circular::SampleRange;
use crate::signal::features::{FeatureEngine, SignalKind};

/// Pluggable destination for the five signal traces.
/// Pairs with [`crate::activity::Actuator`], which handles state output.
pub trait SignalRecorder: Send {
    /// Acquire outputs. Called once, after the audio device has opened.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Record `range` of every signal. Called once per processed chunk.
    fn record(&mut self, engine: &FeatureEngine, range: SampleRange) -> Result<()>;

    /// Flush and release all outputs. Called exactly once during teardown.
    fn close(&mut self) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "recorder"
    }
}

impl<T: SignalRecorder + ?Sized> SignalRecorder for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn record(&mut self, engine: &FeatureEngine, range: SampleRange) -> Result<()> {
        (**self).record(engine, range)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

type RecorderFactory = Box<dyn FnOnce() -> Result<Box<dyn SignalRecorder>> + Send>;

/// Recorder built on [`SignalRecorder::open`], so a run whose device never
/// opens leaves existing traces untouched.
pub struct DeferredRecorder {
    factory: Option<RecorderFactory>,
    inner: Option<Box<dyn SignalRecorder>>,
}

impl DeferredRecorder {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn SignalRecorder>> + Send + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            inner: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl SignalRecorder for DeferredRecorder {
    fn open(&mut self) -> Result<()> {
        if let Some(factory) = self.factory.take() {
            let mut inner = factory()?;
            inner.open()?;
            self.inner = Some(inner);
        }
        Ok(())
    }

    fn record(&mut self, engine: &FeatureEngine, range: SampleRange) -> Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.record(engine, range),
            None => Err(VoxstateError::SinkFailure {
                sink: self.name().to_string(),
                message: "recording before open".to_string(),
            }),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.factory = None;
        match self.inner.as_mut() {
            Some(inner) => inner.close(),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        self.inner.as_ref().map_or("deferred", |inner| inner.name())
    }
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl SignalRecorder for NullRecorder {
    fn record(&mut self, _engine: &FeatureEngine, _range: SampleRange) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Owned copy of one processed range of every signal.
///
/// Needed when the values leave the pipeline thread, since the circular
/// buffers are overwritten as soon as capture continues.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSnapshot {
    pub range: SampleRange,
    columns: Vec<(SignalKind, Vec<f64>)>,
}

impl SignalSnapshot {
    pub fn capture(engine: &FeatureEngine, range: SampleRange) -> Self {
        let columns = SignalKind::ALL
            .into_iter()
            .map(|kind| (kind, engine.signal(kind).snapshot(range.clone())))
            .collect();
        Self { range, columns }
    }

    pub fn values(&self, kind: SignalKind) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, values)| values.as_slice())
    }

    pub fn len(&self) -> usize {
        (self.range.end - self.range.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}
