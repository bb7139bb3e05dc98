//! Streaming signal processing.
//!
//! ```text
//! ┌─────────┐    ┌─────────┐    ┌─────────┐    ┌──────────┐    ┌────────────┐
//! │   raw   │───▶│   rms   │───▶│  log10  │───▶│ smoothed │───▶│ derivative │
//! └─────────┘    └─────────┘    └─────────┘    └──────────┘    └────────────┘
//!   circular       trailing                      gaussian         {-1, 1}
//!   buffers        window                        kernel           kernel
//! ```

pub mod circular;
pub mod features;
pub mod kernel;

pub use circular::{CircularBuffer, SampleIndex, SampleRange};
pub use features::{FeatureEngine, SignalKind};
pub use kernel::Kernel;
