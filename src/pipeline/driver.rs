//! The capture loop.
//!
//! One thread does everything: read a chunk from the audio source, advance
//! the feature engine, record the new range, step the activity machine and
//! notify the actuator. Teardown runs on every exit route.

use crate::activity::{ActivityMachine, ActivityState, Actuator, Transition};
use crate::audio::source::{AudioFormat, AudioSource};
use crate::config::DetectorParams;
use crate::error::{Result, VoxstateError};
use crate::pipeline::stop::StopSignal;
use crate::signal::features::FeatureEngine;
use crate::sink::SignalRecorder;
use serde::Serialize;

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub samples_processed: u64,
    pub transitions: Vec<Transition>,
    /// Silence threshold calibrated at the end of warm-up, if reached.
    pub rms_threshold: Option<f64>,
    pub final_state: ActivityState,
}

/// How far the device got, so teardown only undoes what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DeviceStage {
    Closed,
    Opened,
    Started,
}

/// Owns every piece of mutable state of one detection run.
pub struct Pipeline<A: AudioSource, T: Actuator> {
    source: A,
    actuator: T,
    recorder: Box<dyn SignalRecorder>,
    engine: FeatureEngine,
    machine: ActivityMachine,
    format: AudioFormat,
    read_buffer: Vec<i16>,
    transitions: Vec<Transition>,
    finished: bool,
}

impl<A: AudioSource, T: Actuator> Pipeline<A, T> {
    /// Build a pipeline for `params`.
    ///
    /// Nothing is opened yet; the device is acquired by [`Pipeline::run`].
    ///
    /// # Errors
    /// `ConfigInvalidValue` when `params` cannot drive the detector.
    pub fn new(
        params: &DetectorParams,
        source: A,
        actuator: T,
        recorder: Box<dyn SignalRecorder>,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            source,
            actuator,
            recorder,
            engine: FeatureEngine::from_params(params)?,
            machine: ActivityMachine::new(params),
            format: AudioFormat::pcm16_mono(params.sample_rate),
            read_buffer: vec![0; params.device_buffer_samples],
            transitions: Vec::new(),
            finished: false,
        })
    }

    /// Run until `stop` fires, the source is exhausted, or something fails.
    ///
    /// The device is stopped and closed and the recorder closed before this
    /// returns, whatever the outcome. The first failure is returned; later
    /// cleanup failures are only logged.
    pub fn run(&mut self, stop: &mut dyn StopSignal) -> Result<RunSummary> {
        if self.finished {
            return Err(VoxstateError::Other("pipeline has already run".to_string()));
        }
        self.finished = true;

        let mut stage = DeviceStage::Closed;
        let outcome = self.capture(&mut stage, stop);
        let cleanup = self.teardown(stage);

        match (outcome, cleanup) {
            (Err(e), Err(cleanup_err)) => {
                tracing::warn!("Cleanup after failure also failed: {}", cleanup_err);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(self.summary()),
        }
    }

    fn capture(&mut self, stage: &mut DeviceStage, stop: &mut dyn StopSignal) -> Result<()> {
        self.source.open(&self.format)?;
        *stage = DeviceStage::Opened;
        self.recorder.open()?;
        self.source.start()?;
        *stage = DeviceStage::Started;

        tracing::info!(
            "Capturing from {} at {} Hz, warm-up {} samples",
            self.source.name(),
            self.format.sample_rate,
            self.machine.warm_up_samples()
        );
        self.actuator.announce(self.machine.state());

        while !stop.should_stop() && !self.source.is_exhausted() {
            let n = self.source.read(&mut self.read_buffer)?;
            if n == 0 {
                continue;
            }
            self.process(n)?;
        }
        Ok(())
    }

    /// Handle the first `n` samples of the read buffer.
    fn process(&mut self, n: usize) -> Result<()> {
        let range = self.engine.advance(&self.read_buffer[..n]);
        tracing::debug!("Processed samples {}..{}", range.start, range.end);

        self.recorder.record(&self.engine, range.clone())?;

        let transitions =
            self.machine
                .update(self.engine.smoothed(), self.engine.derivative(), range);
        for transition in transitions {
            if transition.from == ActivityState::Startup
                && let Some(threshold) = self.machine.rms_threshold()
            {
                tracing::info!("Silence threshold calibrated: {:.6}", threshold);
            }
            tracing::info!(
                "{} -> {} at sample {}",
                transition.from,
                transition.to,
                transition.index
            );
            self.actuator.notify(transition.to);
            self.transitions.push(transition);
        }
        Ok(())
    }

    fn teardown(&mut self, stage: DeviceStage) -> Result<()> {
        let mut first_error = None;
        let mut keep = |result: Result<()>| {
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::warn!("Cleanup: {}", e);
                }
            }
        };

        if stage >= DeviceStage::Started {
            keep(self.source.stop());
        }
        if stage >= DeviceStage::Opened {
            keep(self.source.close());
        }
        keep(self.recorder.close());

        tracing::info!(
            "Stopped after {} samples in state {}",
            self.engine.processed(),
            self.machine.state()
        );
        first_error.map_or(Ok(()), Err)
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            samples_processed: self.engine.processed(),
            transitions: self.transitions.clone(),
            rms_threshold: self.machine.rms_threshold(),
            final_state: self.machine.state(),
        }
    }

    pub fn source(&self) -> &A {
        &self.source
    }

    pub fn actuator(&self) -> &T {
        &self.actuator
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    pub fn machine(&self) -> &ActivityMachine {
        &self.machine
    }

    /// Transitions seen so far, also after a failed run.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::CollectingActuator;
    use crate::audio::source::MockAudioSource;
    use crate::pipeline::stop::{IterationLimit, Never};
    use crate::signal::circular::SampleRange;
    use std::sync::{Arc, Mutex};

    fn params() -> DetectorParams {
        DetectorParams {
            sample_rate: 1000,
            device_buffer_samples: 8,
            rms_window_samples: 2,
            smooth_window_samples: 4,
            startup_window_samples: 3,
            pause_samples: 5,
            derivative_threshold: 0.01,
            threshold_multiplier: 1.5,
            kernel_sigma: 1.0,
        }
    }

    /// Recorder that remembers every range and can fail on demand.
    #[derive(Clone, Default)]
    struct ScriptedRecorder {
        ranges: Arc<Mutex<Vec<SampleRange>>>,
        closed: Arc<Mutex<usize>>,
        fail_record_at: Option<usize>,
        fail_close: bool,
    }

    impl SignalRecorder for ScriptedRecorder {
        fn record(&mut self, _engine: &FeatureEngine, range: SampleRange) -> Result<()> {
            let mut ranges = self.ranges.lock().unwrap();
            if self.fail_record_at == Some(ranges.len()) {
                return Err(VoxstateError::SinkFailure {
                    sink: "scripted".to_string(),
                    message: "write failed".to_string(),
                });
            }
            ranges.push(range);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() += 1;
            if self.fail_close {
                return Err(VoxstateError::SinkFailure {
                    sink: "scripted".to_string(),
                    message: "close failed".to_string(),
                });
            }
            Ok(())
        }
    }

    fn pipeline(
        source: MockAudioSource,
        recorder: &ScriptedRecorder,
    ) -> Pipeline<MockAudioSource, CollectingActuator> {
        Pipeline::new(
            &params(),
            source,
            CollectingActuator::new(),
            Box::new(recorder.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_run_processes_all_chunks_and_cleans_up() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_chunks(vec![vec![5; 3], vec![], vec![5; 8]]);
        let mut pipeline = pipeline(source, &recorder);

        let summary = pipeline.run(&mut Never).unwrap();

        assert_eq!(summary.samples_processed, 11);
        assert_eq!(*recorder.ranges.lock().unwrap(), vec![0..3, 3..11]);
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
        assert!(!pipeline.source().is_open());
        assert_eq!(pipeline.source().stop_count(), 1);
        assert_eq!(pipeline.source().close_count(), 1);
    }

    #[test]
    fn test_startup_is_announced_and_left_once() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_samples(&[5; 40], 8);
        let mut pipeline = pipeline(source, &recorder);

        let summary = pipeline.run(&mut Never).unwrap();

        assert_eq!(pipeline.actuator().announced(), Some(ActivityState::Startup));
        assert_eq!(summary.transitions[0].index, 6);
        assert_eq!(summary.transitions[0].from, ActivityState::Startup);
        assert_eq!(summary.transitions[0].to, ActivityState::Stopped);
        assert_eq!(
            summary
                .transitions
                .iter()
                .filter(|t| t.from == ActivityState::Startup)
                .count(),
            1
        );
        assert!(summary.rms_threshold.is_some());
        assert_eq!(
            pipeline.actuator().notified().len(),
            summary.transitions.len()
        );
    }

    #[test]
    fn test_short_run_stays_in_startup() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_samples(&[5; 6], 8);
        let mut pipeline = pipeline(source, &recorder);

        let summary = pipeline.run(&mut Never).unwrap();

        assert_eq!(summary.final_state, ActivityState::Startup);
        assert!(summary.transitions.is_empty());
        assert_eq!(summary.rms_threshold, None);
        assert!(pipeline.actuator().notified().is_empty());
    }

    #[test]
    fn test_open_failure_releases_sinks_but_not_device() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new()
            .with_samples(&[5; 16], 8)
            .with_open_failure();
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();

        assert!(matches!(err, VoxstateError::DeviceUnavailable { .. }));
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
        assert_eq!(pipeline.source().close_count(), 0);
        assert_eq!(pipeline.source().stop_count(), 0);
        assert_eq!(pipeline.actuator().announced(), None);
    }

    #[test]
    fn test_start_failure_closes_device() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_start_failure();
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();

        assert!(err.is_device_error());
        assert_eq!(pipeline.source().stop_count(), 0);
        assert_eq!(pipeline.source().close_count(), 1);
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_read_failure_ends_run_with_cleanup() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new()
            .with_samples(&[5; 32], 8)
            .with_read_failure_at(2);
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();

        assert!(matches!(err, VoxstateError::AudioCapture { .. }));
        assert_eq!(recorder.ranges.lock().unwrap().len(), 2);
        assert_eq!(pipeline.engine().processed(), 16);
        assert_eq!(pipeline.source().stop_count(), 1);
        assert_eq!(pipeline.source().close_count(), 1);
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_sink_failure_ends_run_with_cleanup() {
        let recorder = ScriptedRecorder {
            fail_record_at: Some(1),
            ..ScriptedRecorder::default()
        };
        let source = MockAudioSource::new().with_samples(&[5; 32], 8);
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();

        assert!(matches!(err, VoxstateError::SinkFailure { .. }));
        assert_eq!(pipeline.source().reads(), 2);
        assert_eq!(pipeline.source().close_count(), 1);
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_first_error_wins_over_cleanup_error() {
        let recorder = ScriptedRecorder {
            fail_close: true,
            ..ScriptedRecorder::default()
        };
        let source = MockAudioSource::new()
            .with_samples(&[5; 16], 8)
            .with_read_failure_at(0);
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();
        assert!(matches!(err, VoxstateError::AudioCapture { .. }));
    }

    #[test]
    fn test_cleanup_error_reported_after_clean_run() {
        let recorder = ScriptedRecorder {
            fail_close: true,
            ..ScriptedRecorder::default()
        };
        let source = MockAudioSource::new().with_samples(&[5; 16], 8);
        let mut pipeline = pipeline(source, &recorder);

        let err = pipeline.run(&mut Never).unwrap_err();
        assert!(matches!(err, VoxstateError::SinkFailure { .. }));
    }

    #[test]
    fn test_stop_signal_checked_before_each_read() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_samples(&[5; 64], 8);
        let mut pipeline = pipeline(source, &recorder);

        let summary = pipeline.run(&mut IterationLimit::new(3)).unwrap();

        assert_eq!(pipeline.source().reads(), 3);
        assert_eq!(summary.samples_processed, 24);
    }

    #[test]
    fn test_stop_before_first_read_still_announces() {
        let recorder = ScriptedRecorder::default();
        let source = MockAudioSource::new().with_samples(&[5; 8], 8);
        let mut pipeline = pipeline(source, &recorder);

        let summary = pipeline.run(&mut IterationLimit::new(0)).unwrap();

        assert_eq!(summary.samples_processed, 0);
        assert_eq!(pipeline.source().reads(), 0);
        assert_eq!(pipeline.actuator().announced(), Some(ActivityState::Startup));
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let recorder = ScriptedRecorder::default();
        let mut pipeline = pipeline(MockAudioSource::new(), &recorder);
        pipeline.run(&mut Never).unwrap();
        assert!(pipeline.run(&mut Never).is_err());
        assert_eq!(*recorder.closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut bad = params();
        bad.startup_window_samples = 10;
        let result = Pipeline::new(
            &bad,
            MockAudioSource::new(),
            CollectingActuator::new(),
            Box::new(ScriptedRecorder::default()),
        );
        assert!(matches!(
            result,
            Err(VoxstateError::ConfigInvalidValue { .. })
        ));
    }
}
