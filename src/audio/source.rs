use crate::defaults;
use crate::error::{Result, VoxstateError};
use std::collections::VecDeque;

/// Linear PCM stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub little_endian: bool,
}

impl AudioFormat {
    /// Signed 16-bit little-endian mono at `sample_rate`.
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
            little_endian: true,
        }
    }

    /// True for the only layout the detector consumes.
    pub fn is_pcm16_mono(&self) -> bool {
        self.bits_per_sample == 16 && self.channels == 1 && self.little_endian
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_mono(defaults::SAMPLE_RATE)
    }
}

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device, raw PCM
/// stream, mock).
pub trait AudioSource: Send {
    /// Acquire the device for the given format.
    fn open(&mut self, format: &AudioFormat) -> Result<()>;

    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Read whatever samples are available into `buffer`.
    ///
    /// # Returns
    /// Number of samples written, `0..=buffer.len()`
    fn read(&mut self, buffer: &mut [i16]) -> Result<usize>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;

    /// True once the source can never produce another sample.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Name for logging/debugging.
    fn name(&self) -> &str {
        "audio"
    }
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        (**self).open(format)
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock audio source for testing
///
/// Plays back a script of chunks, one per read. A chunk larger than the
/// read buffer is split across reads. Once the script is empty every read
/// returns 0 and the source reports itself exhausted.
#[derive(Debug, Clone, Default)]
pub struct MockAudioSource {
    chunks: VecDeque<Vec<i16>>,
    is_open: bool,
    is_started: bool,
    open_count: usize,
    close_count: usize,
    stop_count: usize,
    reads: usize,
    fail_open: bool,
    fail_start: bool,
    fail_read_at: Option<usize>,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with an empty script
    pub fn new() -> Self {
        Self {
            error_message: "mock audio error".to_string(),
            ..Self::default()
        }
    }

    /// Queue one chunk per read
    pub fn with_chunks<I>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<i16>>,
    {
        self.chunks.extend(chunks);
        self
    }

    /// Queue `samples` split into reads of `chunk_size`
    pub fn with_samples(mut self, samples: &[i16], chunk_size: usize) -> Self {
        self.chunks
            .extend(samples.chunks(chunk_size.max(1)).map(<[i16]>::to_vec));
        self
    }

    /// Configure the mock to fail on open
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Configure the mock to fail on the read with this zero-based number
    pub fn with_read_failure_at(mut self, read: usize) -> Self {
        self.fail_read_at = Some(read);
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count
    }

    /// Number of reads served, including empty ones
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl AudioSource for MockAudioSource {
    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        if self.fail_open {
            return Err(VoxstateError::DeviceUnavailable {
                device: "mock".to_string(),
                message: self.error_message.clone(),
            });
        }
        if !format.is_pcm16_mono() {
            return Err(VoxstateError::DeviceUnavailable {
                device: "mock".to_string(),
                message: format!("unsupported format {:?}", format),
            });
        }
        self.is_open = true;
        self.open_count += 1;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(VoxstateError::DeviceUnavailable {
                device: "mock".to_string(),
                message: self.error_message.clone(),
            });
        }
        self.is_started = true;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let read = self.reads;
        self.reads += 1;
        if self.fail_read_at == Some(read) {
            return Err(VoxstateError::AudioCapture {
                message: self.error_message.clone(),
            });
        }

        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        if chunk.len() > buffer.len() {
            let rest = chunk.split_off(buffer.len());
            self.chunks.push_front(rest);
        }
        buffer[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        self.stop_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.is_open = false;
        self.close_count += 1;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.chunks.is_empty()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
