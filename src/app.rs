//! Detector application entry point.
//!
//! Wires configuration, audio source, recorder, actuator and stop signals
//! into a [`Pipeline`] and runs it.

use crate::activity::Actuator;
use crate::audio::pcm::PcmPathSource;
use crate::audio::source::AudioSource;
use crate::config::{Config, DetectorParams, OutputConfig};
use crate::error::{Result, VoxstateError};
use crate::output::{JsonActuator, TerminalActuator};
use crate::pipeline::driver::{Pipeline, RunSummary};
use crate::pipeline::stop::{AnyOf, Deadline, StopFlag};
use crate::sink::csv::CsvRecorder;
use crate::sink::worker::BackgroundRecorder;
use crate::sink::{DeferredRecorder, SignalRecorder};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Command line overrides for a detector run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub device: Option<String>,
    pub pcm_input: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub background_sinks: bool,
    pub duration: Option<Duration>,
    pub json: bool,
    pub quiet: bool,
}

/// Fold command line overrides into the loaded configuration.
pub fn apply_overrides(mut config: Config, options: &RunOptions) -> Config {
    if let Some(device) = &options.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(dir) = &options.output_dir {
        config.output.directory = dir.clone();
    }
    if options.background_sinks {
        config.output.background = true;
    }
    config
}

/// The five CSV traces, optionally behind a writer thread.
///
/// Files are created when the pipeline opens the recorder, after the
/// audio device has opened.
pub fn build_recorder(output: &OutputConfig) -> Result<Box<dyn SignalRecorder>> {
    let output = output.clone();
    Ok(Box::new(DeferredRecorder::new(move || {
        let csv = CsvRecorder::create(&output.directory)?;
        if output.background {
            Ok(Box::new(BackgroundRecorder::spawn(csv, output.queue_depth)?)
                as Box<dyn SignalRecorder>)
        } else {
            Ok(Box::new(csv) as Box<dyn SignalRecorder>)
        }
    })))
}

/// Pick the audio source: a PCM file/FIFO if given, otherwise a microphone.
pub fn build_source(config: &Config, pcm_input: Option<&PathBuf>) -> Result<Box<dyn AudioSource>> {
    if let Some(path) = pcm_input {
        return Ok(Box::new(PcmPathSource::new(path)));
    }
    open_microphone(config)
}

#[cfg(feature = "cpal-audio")]
fn open_microphone(config: &Config) -> Result<Box<dyn AudioSource>> {
    use crate::audio::capture::{CpalAudioSource, quiet_backend_logging};

    quiet_backend_logging();
    let source = CpalAudioSource::new(
        config.audio.device.as_deref(),
        Duration::from_millis(config.audio.poll_interval_ms),
    )?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "cpal-audio"))]
fn open_microphone(config: &Config) -> Result<Box<dyn AudioSource>> {
    Err(VoxstateError::DeviceUnavailable {
        device: config
            .audio
            .device
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        message: "built without microphone support, use --pcm-input".to_string(),
    })
}

pub fn build_actuator(json: bool) -> Box<dyn Actuator> {
    if json {
        Box::new(JsonActuator::stdout())
    } else {
        Box::new(TerminalActuator::stdout(std::io::stdout().is_terminal()))
    }
}

/// Stop on Enter (interactive stdin), Ctrl-C, or after `duration`.
fn build_stop_signal(duration: Option<Duration>) -> Result<AnyOf> {
    let flag = StopFlag::new();
    if std::io::stdin().is_terminal() {
        flag.trigger_on_enter()?;
    }
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || {
        if handler_flag.interrupt() > 1 {
            eprintln!("Interrupted again, exiting without cleanup");
            std::process::exit(130);
        }
    })
        .map_err(|e| VoxstateError::Other(format!("Failed to install Ctrl-C handler: {}", e)))?;

    let mut stop = AnyOf::new().with(flag);
    if let Some(duration) = duration {
        stop.push(Deadline::after(duration));
    }
    Ok(stop)
}

/// Run the detector until a stop signal fires or the input ends.
pub fn run_detector(config: Config, options: RunOptions) -> Result<RunSummary> {
    let config = apply_overrides(config, &options);
    let params = DetectorParams::from_config(&config)?;

    let source = build_source(&config, options.pcm_input.as_ref())?;
    let recorder = build_recorder(&config.output)?;
    let actuator = build_actuator(options.json);
    let mut stop = build_stop_signal(options.duration)?;

    if !options.quiet && !options.json && std::io::stdin().is_terminal() {
        eprintln!(
            "Listening on {}. Press Enter or Ctrl-C to stop.",
            source.name()
        );
    }
    tracing::info!(
        "Writing signal traces to {}",
        config.output.directory.display()
    );

    let mut pipeline = Pipeline::new(&params, source, actuator, recorder)?;
    pipeline.run(&mut stop)
}

/// Report the outcome of a run: JSON on stdout or a short text on stderr.
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        #[derive(serde::Serialize)]
        struct SummaryEvent<'a> {
            event: &'static str,
            #[serde(flatten)]
            summary: &'a RunSummary,
        }
        serde_json::to_writer(
            &mut *out,
            &SummaryEvent {
                event: "summary",
                summary,
            },
        )
        .map_err(|e| VoxstateError::Other(format!("Failed to write summary: {}", e)))?;
        writeln!(out)?;
        return Ok(());
    }

    match summary.rms_threshold {
        Some(threshold) => writeln!(out, "rmsThreshold: {}", threshold)?,
        None => writeln!(out, "rmsThreshold: not calibrated (run ended during warm-up)")?,
    }
    writeln!(
        out,
        "{} samples, {} state changes, final state {}",
        summary.samples_processed,
        summary.transitions.len(),
        summary.final_state
    )?;
    Ok(())
}
