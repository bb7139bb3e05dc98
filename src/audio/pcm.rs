//! Raw PCM stream source.
//!
//! Reads headerless signed 16-bit little-endian mono samples from any
//! reader, e.g. a FIFO fed by `arecord -t raw -f S16_LE -c 1 -r 4000`.

use crate::audio::source::{AudioFormat, AudioSource};
use crate::error::{Result, VoxstateError};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Decodes little-endian byte pairs into samples; a trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8], out: &mut [i16]) -> usize {
    let mut count = 0;
    for (pair, slot) in bytes.chunks_exact(2).zip(out.iter_mut()) {
        *slot = i16::from_le_bytes([pair[0], pair[1]]);
        count += 1;
    }
    count
}

/// Audio source over a raw s16le byte stream.
pub struct PcmStreamSource<R: Read + Send> {
    reader: Option<R>,
    label: String,
    bytes: Vec<u8>,
    pending: Option<u8>,
    started: bool,
    exhausted: bool,
}

impl<R: Read + Send> PcmStreamSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            label: label.into(),
            bytes: Vec::new(),
            pending: None,
            started: false,
            exhausted: false,
        }
    }
}

impl<R: Read + Send> AudioSource for PcmStreamSource<R> {
    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        if !format.is_pcm16_mono() {
            return Err(VoxstateError::DeviceUnavailable {
                device: self.label.clone(),
                message: format!("raw input only carries s16le mono, requested {:?}", format),
            });
        }
        if self.reader.is_none() {
            return Err(VoxstateError::DeviceUnavailable {
                device: self.label.clone(),
                message: "stream already closed".to_string(),
            });
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        if !self.started || self.exhausted || buffer.is_empty() {
            return Ok(0);
        }

        self.bytes.clear();
        self.bytes.extend(self.pending.take());
        let want = buffer.len() * 2;
        let have = self.bytes.len();
        self.bytes.resize(want, 0);

        let read = loop {
            match reader.read(&mut self.bytes[have..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(VoxstateError::AudioCapture {
                        message: format!("Failed to read {}: {}", self.label, e),
                    });
                }
            }
        };
        if read == 0 {
            self.exhausted = true;
        }

        let filled = have + read;
        if filled % 2 == 1 {
            self.pending = Some(self.bytes[filled - 1]);
        }
        Ok(decode_pcm16_le(&self.bytes[..filled], buffer))
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// [`PcmStreamSource`] over a path that is opened when the source is opened.
///
/// Opening a FIFO blocks until a writer connects, so this is deferred to
/// the pipeline's device-open step.
pub struct PcmPathSource {
    path: PathBuf,
    inner: Option<PcmStreamSource<File>>,
}

impl PcmPathSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            inner: None,
        }
    }

    fn inner(&mut self) -> Result<&mut PcmStreamSource<File>> {
        self.inner.as_mut().ok_or_else(|| VoxstateError::AudioCapture {
            message: format!("{} is not open", self.path.display()),
        })
    }
}

impl AudioSource for PcmPathSource {
    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| VoxstateError::DeviceUnavailable {
            device: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut inner = PcmStreamSource::new(file, self.path.display().to_string());
        inner.open(format)?;
        self.inner = Some(inner);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.inner()?.start()
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        self.inner()?.read(buffer)
    }

    fn stop(&mut self) -> Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.stop(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut inner) => inner.close(),
            None => Ok(()),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.is_exhausted())
    }

    fn name(&self) -> &str {
        "pcm"
    }
}
