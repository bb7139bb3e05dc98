//! Actuators that show the activity state to a person or another program.

use crate::activity::{ActivityState, Actuator};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::{self, Write};

/// Indicator colour for each state, matching the status LED palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Gray,
    Red,
    Green,
    Yellow,
}

pub fn indicator_color(state: ActivityState) -> IndicatorColor {
    match state {
        ActivityState::Startup => IndicatorColor::Gray,
        ActivityState::Stopped => IndicatorColor::Red,
        ActivityState::Talking => IndicatorColor::Green,
        ActivityState::Paused => IndicatorColor::Yellow,
    }
}

/// Render one status line, e.g. `● talking`.
pub fn render_state(state: ActivityState, color: bool) -> String {
    let line = format!("● {}", state);
    if !color {
        return line;
    }
    match indicator_color(state) {
        IndicatorColor::Gray => line.bright_black().to_string(),
        IndicatorColor::Red => line.red().to_string(),
        IndicatorColor::Green => line.green().to_string(),
        IndicatorColor::Yellow => line.yellow().to_string(),
    }
}

/// Prints a coloured status line for every state change.
pub struct TerminalActuator<W: Write + Send> {
    out: W,
    color: bool,
}

impl TerminalActuator<io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write + Send> TerminalActuator<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn show(&mut self, state: ActivityState) {
        let line = render_state(state, self.color);
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|()| self.out.flush()) {
            tracing::warn!("Failed to show state {}: {}", state, e);
        }
    }
}

impl<W: Write + Send> Actuator for TerminalActuator<W> {
    fn notify(&mut self, state: ActivityState) {
        self.show(state);
    }

    fn announce(&mut self, initial: ActivityState) {
        self.show(initial);
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum StateEvent {
    Initial { state: ActivityState },
    Change { seq: u64, state: ActivityState },
}

/// Emits one JSON object per line for every state change.
///
/// ```text
/// {"event":"initial","state":"startup"}
/// {"event":"change","seq":1,"state":"stopped"}
/// ```
pub struct JsonActuator<W: Write + Send> {
    out: W,
    seq: u64,
}

impl JsonActuator<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonActuator<W> {
    pub fn new(out: W) -> Self {
        Self { out, seq: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &StateEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to emit state event: {}", e);
        }
    }
}

impl<W: Write + Send> Actuator for JsonActuator<W> {
    fn notify(&mut self, state: ActivityState) {
        self.seq += 1;
        let event = StateEvent::Change {
            seq: self.seq,
            state,
        };
        self.emit(&event);
    }

    fn announce(&mut self, initial: ActivityState) {
        self.emit(&StateEvent::Initial { state: initial });
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
