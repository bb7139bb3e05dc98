//! Live microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::{AudioFormat, AudioSource};
use crate::error::{Result, VoxstateError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Restores file descriptor 2 when dropped.
struct StderrRedirect {
    saved_fd: libc::c_int,
}

impl StderrRedirect {
    /// Point stderr at /dev/null until the guard is dropped.
    ///
    /// # Safety
    /// Swaps file descriptor 2 with `libc::dup2`. No other thread may touch
    /// fd 2 while the guard is alive.
    unsafe fn to_devnull() -> Self {
        unsafe {
            let saved_fd = libc::dup(2);
            let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if saved_fd >= 0 && devnull >= 0 {
                libc::dup2(devnull, 2);
            }
            if devnull >= 0 {
                libc::close(devnull);
            }
            Self { saved_fd }
        }
    }
}

impl Drop for StderrRedirect {
    fn drop(&mut self) {
        if self.saved_fd >= 0 {
            // SAFETY: saved_fd was returned by dup and is closed exactly once.
            unsafe {
                libc::dup2(self.saved_fd, 2);
                libc::close(self.saved_fd);
            }
        }
    }
}

/// Run `f` with stderr silenced. CPAL backend probing prints ALSA and JACK
/// chatter that means nothing to the user.
fn quietly<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: device probing happens on the main thread before capture starts.
    let _redirect = unsafe { StderrRedirect::to_devnull() };
    f()
}

/// Environment that keeps JACK and PipeWire from starting servers or
/// logging while CPAL probes them.
const QUIET_BACKEND_ENV: &[(&str, &str)] = &[
    ("JACK_NO_START_SERVER", "1"),
    ("JACK_NO_AUDIO_RESERVATION", "1"),
    ("PIPEWIRE_DEBUG", "0"),
    ("ALSA_DEBUG", "0"),
    ("PW_LOG", "0"),
];

/// Silence audio backend logging for the rest of the process.
///
/// Must run before any thread is spawned.
pub fn quiet_backend_logging() {
    for (key, value) in QUIET_BACKEND_ENV {
        // SAFETY: single-threaded at this point.
        unsafe { std::env::set_var(key, value) };
    }
}

/// Sound-server devices that follow the desktop's microphone choice.
const SOUND_SERVERS: &[&str] = &["pipewire", "pulse"];

/// Name fragments of ALSA playback and multichannel endpoints.
const NOT_A_MICROPHONE: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "digital output",
    "hdmi",
    "s/pdif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DeviceRank {
    Hidden,
    Plain,
    SoundServer,
}

fn rank_device(name: &str) -> DeviceRank {
    let lower = name.to_lowercase();
    if NOT_A_MICROPHONE.iter().any(|p| lower.contains(p)) {
        DeviceRank::Hidden
    } else if SOUND_SERVERS.iter().any(|p| lower.contains(p)) {
        DeviceRank::SoundServer
    } else {
        DeviceRank::Plain
    }
}

/// An input device as shown by `voxstate devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub name: String,
    pub recommended: bool,
}

impl std::fmt::Display for InputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.recommended {
            write!(f, "{} [recommended]", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// List input devices, sound servers first, playback endpoints hidden.
pub fn list_devices() -> Result<Vec<InputDevice>> {
    let names = quietly(|| {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect::<Vec<_>>())
    })
    .map_err(|e| VoxstateError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut ranked: Vec<(DeviceRank, String)> = names
        .into_iter()
        .map(|name| (rank_device(&name), name))
        .filter(|(rank, _)| *rank != DeviceRank::Hidden)
        .collect();
    // Stable: keeps host order within a rank.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(ranked
        .into_iter()
        .map(|(rank, name)| InputDevice {
            name,
            recommended: rank == DeviceRank::SoundServer,
        })
        .collect())
}

/// Resolve the capture device: the named one, else a sound server, else the
/// host default.
fn find_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    let mut devices = host
        .input_devices()
        .map_err(|e| VoxstateError::AudioCapture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;

    match wanted {
        Some(name) => devices
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| VoxstateError::AudioDeviceNotFound {
                device: name.to_string(),
            }),
        None => devices
            .find(|d| {
                d.name()
                    .is_ok_and(|n| rank_device(&n) == DeviceRank::SoundServer)
            })
            .or_else(|| host.default_input_device())
            .ok_or_else(|| VoxstateError::AudioDeviceNotFound {
                device: "default".to_string(),
            }),
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched from the pipeline thread, behind the
/// Mutex in CpalAudioSource.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone source capturing 16-bit mono PCM through CPAL.
///
/// The CPAL callback appends to a shared buffer; [`AudioSource::read`]
/// drains up to one read buffer from it, waiting one poll interval when
/// nothing has arrived yet.
pub struct CpalAudioSource {
    device: cpal::Device,
    device_name: String,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    poll_interval: Duration,
}

impl CpalAudioSource {
    /// Look up the input device.
    ///
    /// # Errors
    /// `AudioDeviceNotFound` when the named device (or any default) is missing.
    pub fn new(device_name: Option<&str>, poll_interval: Duration) -> Result<Self> {
        let device = quietly(|| find_device(&cpal::default_host(), device_name))?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| device_name.unwrap_or("default").to_string());

        Ok(Self {
            device,
            device_name,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            poll_interval,
        })
    }

    fn unavailable(&self, message: String) -> VoxstateError {
        VoxstateError::DeviceUnavailable {
            device: self.device_name.clone(),
            message,
        }
    }

    /// Build a mono input stream at `sample_rate`, i16 first, then f32.
    fn build_stream(&self, sample_rate: u32) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| {
                self.unavailable(format!(
                    "no mono 16-bit or float stream at {} Hz: {}",
                    sample_rate, e
                ))
            })
    }

    fn lock_stream(&self) -> Result<std::sync::MutexGuard<'_, Option<SendableStream>>> {
        self.stream.lock().map_err(|e| VoxstateError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })
    }

    fn drain_into(&self, out: &mut [i16]) -> Result<usize> {
        let mut buffer = self.buffer.lock().map_err(|e| VoxstateError::AudioCapture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;
        let n = buffer.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(buffer.drain(..n)) {
            *slot = sample;
        }
        Ok(n)
    }
}

impl AudioSource for CpalAudioSource {
    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        if !format.is_pcm16_mono() {
            return Err(self.unavailable(format!("unsupported format {:?}", format)));
        }
        let mut guard = self.lock_stream()?;
        if guard.is_some() {
            return Ok(());
        }
        let stream = self.build_stream(format.sample_rate)?;
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let guard = self.lock_stream()?;
        let stream = guard
            .as_ref()
            .ok_or_else(|| self.unavailable("start before open".to_string()))?;
        stream
            .0
            .play()
            .map_err(|e| self.unavailable(format!("Failed to start audio stream: {}", e)))
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let n = self.drain_into(buffer)?;
        if n > 0 {
            return Ok(n);
        }
        std::thread::sleep(self.poll_interval);
        self.drain_into(buffer)
    }

    fn stop(&mut self) -> Result<()> {
        let guard = self.lock_stream()?;
        if let Some(stream) = guard.as_ref() {
            stream.0.pause().map_err(|e| VoxstateError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock_stream()?.take();
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}
