//! Pipeline driver connecting audio source, feature engine, activity
//! machine, recorder and actuator.
//!
//! Everything runs synchronously on the calling thread. The only blocking
//! point is the audio read; sinks may optionally be moved to a worker with
//! [`crate::sink::BackgroundRecorder`].

pub mod driver;
pub mod stop;

pub use driver::{Pipeline, RunSummary};
pub use stop::{AnyOf, Deadline, IterationLimit, Never, StopFlag, StopSignal};
