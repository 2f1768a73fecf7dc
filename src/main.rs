//! peakmeter - Real-time peak-hold audio level meter

use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use peakmeter::audio::{
    list_input_devices, meter_wav_file, DeviceId, InputMeter, MeterConfig, MeterEvent,
};
use peakmeter::meter::{MeterDisplay, MeterSnapshot};

/// Width of the terminal meter bar in characters
const BAR_COLUMNS: usize = 50;

#[derive(Parser)]
#[command(name = "peakmeter")]
#[command(about = "Real-time peak-hold audio level meter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available input devices
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },

    /// Meter an input device until Ctrl-C
    Monitor {
        /// Input device name (use 'devices list' to see available devices)
        #[arg(short, long, env = "PEAKMETER_DEVICE")]
        device: Option<String>,

        /// Sample rate in Hz (default: device default)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Number of input channels (default: device default)
        #[arg(long)]
        channels: Option<u16>,

        /// Frame size in samples (default: device default)
        #[arg(long)]
        frame_size: Option<u32>,

        /// Display refresh rate in Hz
        #[arg(long, default_value = "60")]
        refresh_rate: u32,

        /// Print one JSON snapshot per refresh instead of a bar
        #[arg(long)]
        json: bool,
    },

    /// Meter a WAV file
    File {
        /// Path to the WAV file
        path: String,

        /// Frame size in samples
        #[arg(long, default_value = "480")]
        frame_size: usize,

        /// Readings per second of audio
        #[arg(long, default_value = "10")]
        refresh_rate: u32,

        /// Print JSON readings instead of bars
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DevicesAction {
    /// List all input devices
    List,
}

/// `RUST_LOG` overrides the level picked by `--verbose`
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

fn setup_logging(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn list_devices() {
    println!("Input devices:");
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        let default_marker = if device.is_default { " (default)" } else { "" };
        println!("  - {}{}", device.name, default_marker);
        if !device.supported_sample_rates.is_empty() {
            println!(
                "      rates: {:?} Hz, channels: {:?}",
                device.supported_sample_rates, device.supported_channels
            );
        }
    }
}

fn meter_line(snapshot: MeterSnapshot) -> String {
    let display = MeterDisplay::from(snapshot);
    format!("[{}] {:>9}", display.render_bar(BAR_COLUMNS), display.peak_label())
}

async fn run_monitor(device: Option<String>, config: MeterConfig, json: bool) -> Result<()> {
    config.validate()?;
    debug!("Meter config: {}", serde_json::to_string(&config)?);

    let refresh = Duration::from_secs_f64(1.0 / f64::from(config.refresh_rate));
    let device_id = device.map(DeviceId);

    let (event_tx, event_rx) = mpsc::channel();
    let mut meter = InputMeter::new(config);
    meter.set_event_sender(event_tx);
    meter.start(device_id.as_ref()).context("Failed to start input meter")?;

    info!("Metering, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(refresh);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                loop {
                    match event_rx.try_recv() {
                        Ok(MeterEvent::InputDeviceDisconnected) => {
                            meter.reroute().context("Input lost after route change")?;
                        }
                        Ok(MeterEvent::StreamError(e)) => warn!("Stream error: {}", e),
                        Ok(MeterEvent::Lost) => bail!("Input lost"),
                        Err(_) => break,
                    }
                }

                let snapshot = meter.value();
                if json {
                    writeln!(stdout, "{}", serde_json::to_string(&snapshot)?)?;
                } else {
                    write!(stdout, "\r{}", meter_line(snapshot))?;
                }
                stdout.flush()?;
            }
        }
    }

    if !json {
        println!();
    }
    meter.stop();
    Ok(())
}

fn run_file(path: &str, frame_size: usize, refresh_rate: u32, json: bool) -> Result<()> {
    let frames = meter_wav_file(path, frame_size, refresh_rate)
        .with_context(|| format!("Failed to meter {}", path))?;

    for frame in frames {
        if json {
            println!("{}", serde_json::to_string(&frame)?);
        } else {
            println!("{:>8.2}s {}", frame.time, meter_line(frame.snapshot));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Devices { action } => match action {
            DevicesAction::List => list_devices(),
        },
        Commands::Monitor {
            device,
            sample_rate,
            channels,
            frame_size,
            refresh_rate,
            json,
        } => {
            let config = MeterConfig {
                sample_rate,
                channels,
                frame_size,
                refresh_rate,
            };
            run_monitor(device, config, json).await?;
        }
        Commands::File {
            path,
            frame_size,
            refresh_rate,
            json,
        } => run_file(&path, frame_size, refresh_rate, json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_verbose_picks_log_level() {
        assert_eq!(log_filter(false, None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(true, None).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_rust_log_overrides_verbose() {
        let filter = log_filter(false, Some("peakmeter=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));

        let filter = log_filter(true, Some("warn"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }
}
