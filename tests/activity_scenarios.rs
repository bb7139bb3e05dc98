//! End-to-end detector behaviour at the production window sizes:
//! quiet warm-up, a loud utterance, silence, and resumed speech.

use voxstate::activity::{ActivityMachine, ActivityState, Transition};
use voxstate::config::DetectorParams;
use voxstate::signal::features::FeatureEngine;

const WARM_UP: usize = 4000 + 1800;
const QUIET: i16 = 5;
const LOUD: i16 = 20000;
const THRESHOLD: f64 = 0.00025;

fn params() -> DetectorParams {
    DetectorParams {
        sample_rate: 4000,
        device_buffer_samples: 1024,
        rms_window_samples: 1000,
        smooth_window_samples: 4000,
        startup_window_samples: 1800,
        pause_samples: 8000,
        derivative_threshold: THRESHOLD,
        threshold_multiplier: 1.5,
        kernel_sigma: 1.0,
    }
}

/// Feature engine plus activity machine, keeping the full signal history
/// that the circular buffers forget.
struct Detector {
    engine: FeatureEngine,
    machine: ActivityMachine,
    chunk: usize,
    transitions: Vec<Transition>,
    smoothed: Vec<f64>,
    derivative: Vec<f64>,
}

impl Detector {
    fn new(chunk: usize) -> Self {
        let params = params();
        assert!(chunk <= params.device_buffer_samples);
        Self {
            engine: FeatureEngine::from_params(&params).unwrap(),
            machine: ActivityMachine::new(&params),
            chunk,
            transitions: Vec::new(),
            smoothed: Vec::new(),
            derivative: Vec::new(),
        }
    }

    /// Feed `count` samples of a square wave with the given amplitude.
    fn feed(&mut self, amplitude: i16, count: usize) {
        let mut left = count;
        while left > 0 {
            let n = left.min(self.chunk);
            self.step(amplitude, n);
            left -= n;
        }
    }

    /// Feed chunks until `done` holds, at most `limit` samples.
    fn feed_until(&mut self, amplitude: i16, limit: usize, done: impl Fn(&Self) -> bool) {
        let mut fed = 0;
        while !done(self) {
            assert!(fed < limit, "condition not reached after {} samples", fed);
            self.step(amplitude, self.chunk);
            fed += self.chunk;
        }
    }

    fn step(&mut self, amplitude: i16, n: usize) {
        let start = self.engine.processed();
        let samples: Vec<i16> = (start..start + n as u64)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        let range = self.engine.advance(&samples);
        self.smoothed
            .extend(self.engine.smoothed().snapshot(range.clone()));
        self.derivative
            .extend(self.engine.derivative().snapshot(range.clone()));
        let new = self
            .machine
            .update(self.engine.smoothed(), self.engine.derivative(), range);
        self.transitions.extend(new);
    }

    fn states(&self) -> Vec<(ActivityState, ActivityState)> {
        self.transitions.iter().map(|t| (t.from, t.to)).collect()
    }

    fn find(&self, from: ActivityState, to: ActivityState) -> Option<Transition> {
        self.transitions
            .iter()
            .copied()
            .find(|t| t.from == from && t.to == to)
    }
}

#[test]
fn test_warm_up_calibrates_threshold_once() {
    let mut detector = Detector::new(1024);
    detector.feed(QUIET, WARM_UP - 1);
    assert_eq!(detector.machine.state(), ActivityState::Startup);
    assert!(detector.transitions.is_empty());

    detector.feed(QUIET, 1);
    assert_eq!(
        detector.transitions,
        vec![Transition {
            index: (WARM_UP - 1) as u64,
            from: ActivityState::Startup,
            to: ActivityState::Stopped,
        }]
    );

    // 1.5 times the steady smoothed level log10(5).
    let threshold = detector.machine.rms_threshold().unwrap();
    let peak = detector.smoothed[WARM_UP - 1 - 1800..WARM_UP - 1]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((threshold - 1.5 * peak).abs() < 1e-12);
    assert!((threshold - 1.5 * 5f64.log10()).abs() < 1e-6);

    detector.feed(QUIET, 10_000);
    assert_eq!(detector.transitions.len(), 1);
    assert_eq!(detector.machine.rms_threshold(), Some(threshold));
}

#[test]
fn test_loud_onset_starts_talking_at_first_steep_rise() {
    let mut detector = Detector::new(1024);
    detector.feed(QUIET, WARM_UP);
    detector.feed(LOUD, 4000);

    let talking = detector
        .find(ActivityState::Stopped, ActivityState::Talking)
        .expect("onset detected");
    let t = talking.index as usize;
    assert!(t >= WARM_UP);
    assert!(detector.derivative[t] > THRESHOLD);
    assert!(
        detector.derivative[WARM_UP - 1..t]
            .iter()
            .all(|&d| d <= THRESHOLD)
    );
    // Within the first second of speech.
    assert!(t < WARM_UP + 4000, "talking at {}", t);
}

#[test]
fn test_silence_pauses_then_stops_after_pause_window() {
    let mut detector = Detector::new(1024);
    detector.feed(QUIET, WARM_UP);
    detector.feed(LOUD, 12_000);
    let silence_start = detector.engine.processed() as usize;
    detector.feed(0, 20_000);

    assert_eq!(
        detector.states(),
        vec![
            (ActivityState::Startup, ActivityState::Stopped),
            (ActivityState::Stopped, ActivityState::Talking),
            (ActivityState::Talking, ActivityState::Paused),
            (ActivityState::Paused, ActivityState::Stopped),
        ]
    );

    let threshold = detector.machine.rms_threshold().unwrap();
    let paused = detector
        .find(ActivityState::Talking, ActivityState::Paused)
        .unwrap();
    let p = paused.index as usize;
    assert!(p > silence_start);
    assert!(detector.smoothed[p] < threshold);
    assert!(detector.derivative[p] < -THRESHOLD);

    let stopped = detector
        .find(ActivityState::Paused, ActivityState::Stopped)
        .unwrap();
    assert_eq!(stopped.index, paused.index + 8001);
    assert_eq!(detector.machine.state(), ActivityState::Stopped);
    assert_eq!(detector.machine.pause_start(), None);
}

#[test]
fn test_speech_resuming_during_pause_goes_straight_to_talking() {
    let mut detector = Detector::new(1024);
    detector.feed(QUIET, WARM_UP);
    detector.feed(LOUD, 12_000);
    detector.feed_until(0, 20_000, |d| d.machine.state() == ActivityState::Paused);
    let pause_start = detector.machine.pause_start().unwrap();

    detector.feed(LOUD, 6000);

    assert_eq!(
        detector.states(),
        vec![
            (ActivityState::Startup, ActivityState::Stopped),
            (ActivityState::Stopped, ActivityState::Talking),
            (ActivityState::Talking, ActivityState::Paused),
            (ActivityState::Paused, ActivityState::Talking),
        ]
    );
    let resumed = detector
        .find(ActivityState::Paused, ActivityState::Talking)
        .unwrap();
    assert!(resumed.index - pause_start <= 8000);
    assert!(detector.derivative[resumed.index as usize] > THRESHOLD);
}

#[test]
fn test_transitions_chain_and_never_repeat_a_state() {
    let mut detector = Detector::new(1024);
    detector.feed(QUIET, WARM_UP);
    for _ in 0..2 {
        detector.feed(LOUD, 8000);
        detector.feed(0, 16_000);
    }

    assert!(detector.transitions.len() >= 4);
    for pair in detector.transitions.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
        assert!(pair[0].index < pair[1].index);
    }
    for t in &detector.transitions {
        assert_ne!(t.from, t.to);
    }
    assert_eq!(
        detector
            .transitions
            .iter()
            .filter(|t| t.from == ActivityState::Startup)
            .count(),
        1
    );
}

#[test]
fn test_digitally_silent_warm_up_still_pauses_and_stops() {
    let mut detector = Detector::new(1000);
    detector.feed(0, WARM_UP);
    detector.feed(LOUD, 12_000);
    detector.feed(0, 40_000);

    let threshold = detector.machine.rms_threshold().unwrap();
    assert!(threshold <= 0.0);
    assert!(threshold.abs() < 1e-300, "threshold {}", threshold);

    assert_eq!(
        detector.states(),
        vec![
            (ActivityState::Startup, ActivityState::Stopped),
            (ActivityState::Stopped, ActivityState::Talking),
            (ActivityState::Talking, ActivityState::Paused),
            (ActivityState::Paused, ActivityState::Stopped),
        ]
    );
    let paused = detector
        .find(ActivityState::Talking, ActivityState::Paused)
        .unwrap();
    assert!(detector.smoothed[paused.index as usize] < 0.0);
    let stopped = detector
        .find(ActivityState::Paused, ActivityState::Stopped)
        .unwrap();
    assert_eq!(stopped.index, paused.index + 8001);
}

#[test]
fn test_chunking_does_not_change_the_outcome() {
    let run = |chunk: usize| {
        let mut detector = Detector::new(chunk);
        detector.feed(QUIET, WARM_UP);
        detector.feed(LOUD, 10_000);
        detector.feed(0, 16_000);
        (detector.transitions, detector.machine.rms_threshold())
    };

    let (reference, threshold) = run(1024);
    for chunk in [1000, 333, 97] {
        let (transitions, other) = run(chunk);
        assert_eq!(transitions, reference, "chunk size {}", chunk);
        assert_eq!(other, threshold, "chunk size {}", chunk);
    }
}
