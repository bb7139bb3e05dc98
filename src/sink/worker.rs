//! Signal recording on a dedicated writer thread.
//!
//! The pipeline thread copies each processed range into a
//! [`SignalSnapshot`] and hands it over through a bounded channel, so slow
//! disks never stall capture until the queue fills. A write failure on the
//! worker is reported on the next `record` or on `close`.

use crate::error::{Result, VoxstateError};
use crate::signal::circular::SampleRange;
use crate::signal::features::FeatureEngine;
use crate::sink::csv::CsvRecorder;
use crate::sink::{SignalRecorder, SignalSnapshot};
use crossbeam_channel::{Sender, bounded};
use std::io::Write;
use std::thread::{self, JoinHandle};

/// [`SignalRecorder`] that forwards snapshots to a CSV writer thread.
pub struct BackgroundRecorder {
    tx: Option<Sender<SignalSnapshot>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl BackgroundRecorder {
    /// Spawn the writer thread owning `recorder`.
    ///
    /// `queue_depth` bounds the number of chunks in flight; zero is treated as one.
    pub fn spawn<W>(mut recorder: CsvRecorder<W>, queue_depth: usize) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = bounded::<SignalSnapshot>(queue_depth.max(1));

        let handle = thread::Builder::new()
            .name("voxstate-sinks".to_string())
            .spawn(move || {
                let mut outcome = Ok(());
                for snapshot in rx.iter() {
                    if let Err(e) = recorder.write_snapshot(&snapshot) {
                        tracing::error!("Signal writer stopped: {}", e);
                        outcome = Err(e);
                        break;
                    }
                }
                // Dropping the receiver here makes further sends fail fast.
                drop(rx);
                let closed = SignalRecorder::close(&mut recorder);
                outcome.and(closed)
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Wait for the worker and collect its result.
    fn join_worker(&mut self) -> Result<()> {
        self.tx.take();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(VoxstateError::SinkFailure {
                sink: "background".to_string(),
                message: "signal writer thread panicked".to_string(),
            }),
        }
    }
}

impl SignalRecorder for BackgroundRecorder {
    fn record(&mut self, engine: &FeatureEngine, range: SampleRange) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(VoxstateError::SinkFailure {
                sink: "background".to_string(),
                message: "record after close".to_string(),
            });
        };
        if range.is_empty() {
            return Ok(());
        }

        let snapshot = SignalSnapshot::capture(engine, range);
        if tx.send(snapshot).is_err() {
            // The worker exited; its result says why.
            return Err(self.join_worker().err().unwrap_or_else(|| {
                VoxstateError::SinkFailure {
                    sink: "background".to_string(),
                    message: "signal writer exited".to_string(),
                }
            }));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.join_worker()
    }

    fn name(&self) -> &'static str {
        "background"
    }
}

impl Drop for BackgroundRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.join_worker() {
            tracing::warn!("Signal writer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::features::SignalKind;
    use crate::signal::kernel::Kernel;
    use crate::sink::csv::CsvSink;
    use std::fs;
    use std::io;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn engine() -> FeatureEngine {
        FeatureEngine::new(32, 2, Kernel::gaussian(1.0, 4).unwrap()).unwrap()
    }

    #[test]
    fn test_background_writes_same_files_as_direct() {
        let direct_dir = tempfile::tempdir().unwrap();
        let background_dir = tempfile::tempdir().unwrap();

        let mut direct = CsvRecorder::create(direct_dir.path()).unwrap();
        let mut background =
            BackgroundRecorder::spawn(CsvRecorder::create(background_dir.path()).unwrap(), 2)
                .unwrap();

        let mut engine = engine();
        let chunks: [&[i16]; 4] = [&[100, -200, 300], &[5, 6], &[], &[7000, -7000, 1, 2]];
        for chunk in chunks {
            let range = engine.advance(chunk);
            direct.record(&engine, range.clone()).unwrap();
            background.record(&engine, range).unwrap();
        }
        direct.close().unwrap();
        background.close().unwrap();

        for kind in SignalKind::ALL {
            let a = fs::read_to_string(direct_dir.path().join(kind.file_name())).unwrap();
            let b = fs::read_to_string(background_dir.path().join(kind.file_name())).unwrap();
            assert_eq!(a, b, "{}", kind);
            assert_eq!(a.matches(',').count(), 9);
        }
    }

    #[test]
    fn test_worker_failure_surfaces_on_close() {
        let recorder = CsvRecorder::from_sinks(vec![(
            SignalKind::Raw,
            CsvSink::new(FailingWriter, "raw.csv"),
        )]);
        let mut background = BackgroundRecorder::spawn(recorder, 1).unwrap();
        let mut engine = engine();

        // The worker is still waiting on the channel, so this send succeeds.
        let range = engine.advance(&[1, 2, 3]);
        background.record(&engine, range).unwrap();

        assert!(matches!(
            background.close(),
            Err(VoxstateError::SinkFailure { .. })
        ));
    }

    #[test]
    fn test_worker_failure_surfaces_on_later_record() {
        let recorder = CsvRecorder::from_sinks(vec![(
            SignalKind::Raw,
            CsvSink::new(FailingWriter, "raw.csv"),
        )]);
        let mut background = BackgroundRecorder::spawn(recorder, 1).unwrap();
        let mut engine = engine();

        let mut saw_error = false;
        for _ in 0..1000 {
            let range = engine.advance(&[1]);
            if background.record(&engine, range).is_err() {
                saw_error = true;
                break;
            }
            thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(saw_error);
        // Already reported.
        assert!(background.close().is_ok());
    }

    #[test]
    fn test_record_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut background =
            BackgroundRecorder::spawn(CsvRecorder::create(dir.path()).unwrap(), 4).unwrap();
        background.close().unwrap();
        let mut engine = engine();
        let range = engine.advance(&[1]);
        assert!(background.record(&engine, range).is_err());
        assert!(background.close().is_ok());
    }
}
