//! Audio sources feeding the detector.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod pcm;
pub mod source;

pub use pcm::{PcmPathSource, PcmStreamSource};
pub use source::{AudioFormat, AudioSource, MockAudioSource};
