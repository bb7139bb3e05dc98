//! Level-triggered stop conditions, polled once per pipeline iteration.

use crate::error::Result;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Tells the pipeline loop when to finish.
///
/// Checked at the top of every iteration, never in the middle of one.
pub trait StopSignal {
    fn should_stop(&mut self) -> bool;
}

impl<S: StopSignal + ?Sized> StopSignal for Box<S> {
    fn should_stop(&mut self) -> bool {
        (**self).should_stop()
    }
}

/// Never requests a stop; the run ends when the input is exhausted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Never;

impl StopSignal for Never {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Shared flag set from another thread (stdin watcher, Ctrl-C handler).
#[derive(Debug, Default, Clone)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
    interrupts: Arc<AtomicUsize>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trigger from an interrupt (Ctrl-C) and return how many interrupts
    /// have arrived so far, this one included.
    ///
    /// A blocked read only sees the flag once it returns, so callers treat
    /// a repeated interrupt as a request to exit at once.
    pub fn interrupt(&self) -> usize {
        self.trigger();
        self.interrupts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Trigger once a line (or end of input) arrives on `reader`.
    ///
    /// The watcher thread is detached; it ends with the input.
    pub fn trigger_on_line<R>(&self, reader: R) -> Result<()>
    where
        R: BufRead + Send + 'static,
    {
        let flag = self.clone();
        thread::Builder::new()
            .name("voxstate-stdin".to_string())
            .spawn(move || {
                let mut reader = reader;
                let mut line = String::new();
                if let Err(e) = reader.read_line(&mut line) {
                    tracing::debug!("Stop watcher input failed: {}", e);
                }
                flag.trigger();
            })?;
        Ok(())
    }

    /// Trigger when Enter is pressed on the terminal.
    pub fn trigger_on_enter(&self) -> Result<()> {
        self.trigger_on_line(std::io::BufReader::new(std::io::stdin()))
    }
}

impl StopSignal for StopFlag {
    fn should_stop(&mut self) -> bool {
        self.is_triggered()
    }
}

/// Stops once a wall-clock deadline has passed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }
}

impl StopSignal for Deadline {
    fn should_stop(&mut self) -> bool {
        Instant::now() >= self.at
    }
}

/// Stops after a fixed number of iterations.
#[derive(Debug, Clone, Copy)]
pub struct IterationLimit {
    remaining: usize,
}

impl IterationLimit {
    pub fn new(iterations: usize) -> Self {
        Self {
            remaining: iterations,
        }
    }
}

impl StopSignal for IterationLimit {
    fn should_stop(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(rest) => {
                self.remaining = rest;
                false
            }
            None => true,
        }
    }
}

/// Stops as soon as any of its members does.
#[derive(Default)]
pub struct AnyOf {
    signals: Vec<Box<dyn StopSignal + Send>>,
}

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, signal: impl StopSignal + Send + 'static) -> Self {
        self.signals.push(Box::new(signal));
        self
    }

    pub fn push(&mut self, signal: impl StopSignal + Send + 'static) {
        self.signals.push(Box::new(signal));
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl StopSignal for AnyOf {
    fn should_stop(&mut self) -> bool {
        // Poll every member so counters advance in step.
        self.signals
            .iter_mut()
            .fold(false, |stop, signal| signal.should_stop() || stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_never_stops() {
        let mut never = Never;
        assert!((0..100).all(|_| !never.should_stop()));
    }

    #[test]
    fn test_stop_flag_shared_between_clones() {
        let mut flag = StopFlag::new();
        let remote = flag.clone();
        assert!(!flag.should_stop());
        remote.trigger();
        assert!(flag.should_stop());
    }

    #[test]
    fn test_stop_flag_counts_interrupts() {
        let mut flag = StopFlag::new();
        let handler = flag.clone();
        flag.trigger();
        assert_eq!(handler.interrupt(), 1);
        assert!(flag.should_stop());
        assert_eq!(handler.interrupt(), 2);
        assert_eq!(flag.interrupt(), 3);
    }

    #[test]
    fn test_stop_flag_triggers_on_line() {
        let mut flag = StopFlag::new();
        flag.trigger_on_line(Cursor::new(b"\n".to_vec())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.should_stop() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(flag.is_triggered());
    }

    #[test]
    fn test_stop_flag_triggers_on_end_of_input() {
        let flag = StopFlag::new();
        flag.trigger_on_line(Cursor::new(Vec::new())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.is_triggered() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(flag.is_triggered());
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::after(Duration::ZERO).should_stop());
        assert!(!Deadline::after(Duration::from_secs(3600)).should_stop());
    }

    #[test]
    fn test_iteration_limit_allows_exact_count() {
        let mut limit = IterationLimit::new(3);
        let allowed = (0..10).take_while(|_| !limit.should_stop()).count();
        assert_eq!(allowed, 3);
        assert!(limit.should_stop());
    }

    #[test]
    fn test_any_of_stops_when_one_member_does() {
        let flag = StopFlag::new();
        let mut any = AnyOf::new().with(Never).with(flag.clone());
        assert_eq!(any.len(), 2);
        assert!(!any.should_stop());
        flag.trigger();
        assert!(any.should_stop());
    }

    #[test]
    fn test_any_of_polls_every_member() {
        let mut any = AnyOf::new()
            .with(IterationLimit::new(0))
            .with(IterationLimit::new(2));
        assert!(any.should_stop());
        assert!(any.should_stop());
        assert!(any.should_stop());

        let mut empty = AnyOf::new();
        assert!(empty.is_empty());
        assert!(!empty.should_stop());
    }
}
