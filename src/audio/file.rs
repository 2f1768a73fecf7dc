//! Offline metering of WAV files
//!
//! Feeds a file through a [`MeterKernel`] block by block, the same way a
//! capture callback would, and samples the meter at an observer refresh rate
//! measured in audio time.

use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use serde::Serialize;
use tracing::{debug, info};

use super::error::MeterError;
use super::input_meter::validate_frame_size;
use crate::meter::{MeterKernel, MeterSnapshot};

/// Meter reading at a position in the file
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterFrame {
    /// Audio time in seconds at the end of the block that produced the reading
    pub time: f64,
    #[serde(flatten)]
    pub snapshot: MeterSnapshot,
}

/// Meter a WAV file on disk
pub fn meter_wav_file(
    path: impl AsRef<Path>,
    frame_size: usize,
    refresh_rate: u32,
) -> Result<Vec<MeterFrame>, MeterError> {
    let path = path.as_ref();
    info!("Metering {}", path.display());
    let reader = WavReader::open(path)?;
    meter_wav(reader, frame_size, refresh_rate)
}

/// Meter an already opened WAV stream
///
/// Integer samples are normalized to [-1.0, 1.0]. One reading is taken every
/// `1 / refresh_rate` seconds of audio, plus a final one at the end.
/// `frame_size` must lie in the same range live metering accepts.
pub fn meter_wav<R: Read>(
    mut reader: WavReader<R>,
    frame_size: usize,
    refresh_rate: u32,
) -> Result<Vec<MeterFrame>, MeterError> {
    validate_frame_size(u32::try_from(frame_size).unwrap_or(u32::MAX))?;
    if refresh_rate == 0 {
        return Err(MeterError::InvalidConfig("Refresh rate must be positive".into()));
    }

    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(MeterError::UnsupportedConfig(format!(
            "{} Hz, {} channels",
            spec.sample_rate, spec.channels
        )));
    }
    debug!("WAV spec: {:?}", spec);

    let channels = usize::from(spec.channels);
    let sample_rate = f64::from(spec.sample_rate);

    let samples: Box<dyn Iterator<Item = Result<f32, hound::Error>> + '_> =
        match spec.sample_format {
            SampleFormat::Float => Box::new(reader.samples::<f32>()),
            SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                Box::new(
                    reader
                        .samples::<i32>()
                        .map(move |s| s.map(|s| s as f32 * scale)),
                )
            }
        };

    let mut kernel = MeterKernel::new();
    let mut block = Vec::with_capacity(frame_size * channels);
    let mut frames = Vec::new();
    // Reading schedule in whole frames, so report times don't drift
    let mut frames_done: u64 = 0;
    let mut reports: u64 = 0;

    let mut samples = samples.peekable();
    while samples.peek().is_some() {
        block.clear();
        for sample in samples.by_ref().take(frame_size * channels) {
            block.push(sample?);
        }

        kernel.update_level_interleaved(&block, channels, sample_rate);
        frames_done += (block.len() / channels) as u64;

        let due = frames_done * u64::from(refresh_rate) / u64::from(spec.sample_rate);
        if due > reports {
            frames.push(MeterFrame {
                time: frames_done as f64 / sample_rate,
                snapshot: kernel.value(),
            });
            reports = due;
        }
    }

    let elapsed = frames_done as f64 / sample_rate;
    if frames.last().map(|f| f.time) != Some(elapsed) {
        frames.push(MeterFrame {
            time: elapsed,
            snapshot: kernel.value(),
        });
    }

    info!("Metered {:.2} s of audio, {} readings", elapsed, frames.len());
    Ok(frames)
}
