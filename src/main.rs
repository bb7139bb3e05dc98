use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use voxstate::app::{RunOptions, run_detector, write_summary};
use voxstate::cli::{Cli, Commands, ConfigAction};
use voxstate::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    voxstate::logging::init(cli.verbose, cli.quiet)?;
    tracing::debug!("voxstate {}", voxstate::version_string());

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let json = cli.json;
            let quiet = cli.quiet;
            let summary = run_detector(
                config,
                RunOptions {
                    device: cli.device,
                    pcm_input: cli.pcm_input,
                    output_dir: cli.output_dir,
                    background_sinks: cli.background_sinks,
                    duration: cli.duration,
                    json,
                    quiet,
                },
            )?;
            if json {
                write_summary(&mut std::io::stdout(), &summary, true)?;
            } else if !quiet {
                write_summary(&mut std::io::stderr(), &summary, false)?;
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxstate",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Resolve the configuration file: `--config` if given, else the default path.
fn config_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::default_path()?),
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/voxstate/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load_or_default(&config_path(None)?)?,
    };

    Ok(config.with_env_overrides())
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = voxstate::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("built without microphone support (enable the `cpal-audio` feature)")
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let path = config_path(custom_path)?;

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let marker = if path.exists() {
                "exists".green().to_string()
            } else {
                "not created, using defaults".dimmed().to_string()
            };
            println!("{} ({})", path.display(), marker);
        }
    }
    Ok(())
}
