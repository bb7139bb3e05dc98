//! Speech activity state machine.
//!
//! Reads the smoothed log-energy and its derivative and moves between four
//! states:
//!
//! ```text
//!            warm-up done                 rise > +d
//!  Startup ───────────────▶ Stopped ─────────────────▶ Talking
//!                              ▲                        │   ▲
//!              quiet > pause   │       fall < -d and    │   │ rise > +d
//!                              │       below threshold  ▼   │
//!                              └──────────────────── Paused ┘
//! ```
//!
//! The silence threshold is calibrated once, on leaving `Startup`, from the
//! smoothed signal of the warm-up span and never re-estimated.

use crate::config::DetectorParams;
use crate::signal::circular::{CircularBuffer, SampleIndex, SampleRange};
use serde::Serialize;
use std::fmt;

/// Inferred speech activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    /// Warming up, no threshold yet.
    Startup,
    /// Nobody is speaking.
    Stopped,
    /// Speech in progress.
    Talking,
    /// Speech paused, waiting to see if it resumes.
    Paused,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityState::Startup => "startup",
            ActivityState::Stopped => "stopped",
            ActivityState::Talking => "talking",
            ActivityState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// A state change at a given sample index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub index: SampleIndex,
    pub from: ActivityState,
    pub to: ActivityState,
}

/// Receives state change notifications (LED, robot, terminal, ...).
///
/// Failures inside `notify` are the actuator's own concern.
pub trait Actuator: Send {
    /// Called once per transition with the new state.
    fn notify(&mut self, state: ActivityState);

    /// Called once before processing starts with the initial state.
    fn announce(&mut self, _initial: ActivityState) {}

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "actuator"
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn notify(&mut self, state: ActivityState) {
        (**self).notify(state)
    }

    fn announce(&mut self, initial: ActivityState) {
        (**self).announce(initial)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Actuator that records every notification, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct CollectingActuator {
    announced: Option<ActivityState>,
    notified: Vec<ActivityState>,
}

impl CollectingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn announced(&self) -> Option<ActivityState> {
        self.announced
    }

    pub fn notified(&self) -> &[ActivityState] {
        &self.notified
    }
}

impl Actuator for CollectingActuator {
    fn notify(&mut self, state: ActivityState) {
        self.notified.push(state);
    }

    fn announce(&mut self, initial: ActivityState) {
        self.announced = Some(initial);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Internal state; `Paused` carries the index it was entered at.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Startup,
    Stopped,
    Talking,
    Paused { since: SampleIndex },
}

impl Phase {
    fn state(self) -> ActivityState {
        match self {
            Phase::Startup => ActivityState::Startup,
            Phase::Stopped => ActivityState::Stopped,
            Phase::Talking => ActivityState::Talking,
            Phase::Paused { .. } => ActivityState::Paused,
        }
    }
}

/// Starting value of the warm-up maximum, the negated smallest positive
/// `f64`. A warm-up spent on the log floor calibrates a threshold of zero.
pub const WARM_UP_PEAK_FLOOR: f64 = -f64::from_bits(1);

/// Threshold-driven activity state machine.
#[derive(Debug, Clone)]
pub struct ActivityMachine {
    startup_window: usize,
    first_index: SampleIndex,
    pause_samples: u64,
    derivative_threshold: f64,
    threshold_multiplier: f64,
    phase: Phase,
    rms_threshold: Option<f64>,
    next_index: SampleIndex,
}

impl ActivityMachine {
    pub fn new(params: &DetectorParams) -> Self {
        let warm_up = (params.smooth_window_samples + params.startup_window_samples) as u64;
        Self {
            startup_window: params.startup_window_samples,
            first_index: warm_up.saturating_sub(1),
            pause_samples: params.pause_samples as u64,
            derivative_threshold: params.derivative_threshold,
            threshold_multiplier: params.threshold_multiplier,
            phase: Phase::Startup,
            rms_threshold: None,
            next_index: 0,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.phase.state()
    }

    /// Calibrated silence threshold, `None` until warm-up completes.
    pub fn rms_threshold(&self) -> Option<f64> {
        self.rms_threshold
    }

    /// Index the current pause started at, only while `Paused`.
    pub fn pause_start(&self) -> Option<SampleIndex> {
        match self.phase {
            Phase::Paused { since } => Some(since),
            _ => None,
        }
    }

    /// Number of samples that must exist before the first evaluation.
    pub fn warm_up_samples(&self) -> u64 {
        self.first_index + 1
    }

    /// Evaluates every not-yet-seen index of `range` at or after warm-up.
    ///
    /// `smoothed` and `derivative` must already hold values for the whole
    /// range. Returns the transitions in index order.
    pub fn update(
        &mut self,
        smoothed: &CircularBuffer,
        derivative: &CircularBuffer,
        range: SampleRange,
    ) -> Vec<Transition> {
        let start = range.start.max(self.first_index).max(self.next_index);
        let mut transitions = Vec::new();

        for i in start..range.end {
            if let Some(transition) = self.step(i, smoothed, derivative) {
                transitions.push(transition);
            }
        }

        self.next_index = self.next_index.max(range.end);
        transitions
    }

    fn step(
        &mut self,
        i: SampleIndex,
        smoothed: &CircularBuffer,
        derivative: &CircularBuffer,
    ) -> Option<Transition> {
        let from = self.phase;
        let slope = derivative.read(i);

        let next = match from {
            Phase::Startup => {
                let peak = self.warm_up_peak(i, smoothed);
                self.rms_threshold = Some(peak * self.threshold_multiplier);
                Phase::Stopped
            }
            Phase::Stopped | Phase::Paused { .. } if slope > self.derivative_threshold => {
                Phase::Talking
            }
            Phase::Talking
                if slope < -self.derivative_threshold
                    && self
                        .rms_threshold
                        .is_some_and(|threshold| smoothed.read(i) < threshold) =>
            {
                Phase::Paused { since: i }
            }
            Phase::Paused { since } if i - since > self.pause_samples => Phase::Stopped,
            _ => return None,
        };

        self.phase = next;
        Some(Transition {
            index: i,
            from: from.state(),
            to: next.state(),
        })
    }

    /// Maximum of `smoothed` over the `startup_window` indices before `i`,
    /// never below [`WARM_UP_PEAK_FLOOR`].
    fn warm_up_peak(&self, i: SampleIndex, smoothed: &CircularBuffer) -> f64 {
        let end = i as i64;
        (end - self.startup_window as i64..end)
            .map(|j| smoothed.read_signed(j))
            .fold(WARM_UP_PEAK_FLOOR, f64::max)
    }
}
