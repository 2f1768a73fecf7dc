//! Peak-hold meter kernel
//!
//! The kernel is driven from the real-time audio callback and publishes a
//! [`MeterSnapshot`] that any number of observer threads can read through a
//! [`MeterReader`]. Level and peak are packed into a single `AtomicU64`, so a
//! reader always sees both values from the same update.
//!
//! Thread: `update_level*` on the real-time thread only; `value()` anywhere.
//! Blocking: never. Allocation: never (after construction).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::decibel::{decibel_from_linear, linear_from_decibel};

/// Level fall rate applied in the decibel domain
pub const DECAY_DECIBELS_PER_SECOND: f32 = 30.0;

/// How long the peak marker stays put before following the level again
pub const PEAK_HOLD_SECONDS: f64 = 1.0;

/// Displayable meter state at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MeterSnapshot {
    /// Decaying envelope of the input magnitude (0.0 - 1.0)
    pub level: f32,
    /// Held maximum of `level` (0.0 - 1.0)
    pub peak: f32,
}

impl MeterSnapshot {
    /// Pack into one word: level in the low 32 bits, peak in the high 32 bits
    #[inline]
    fn pack(self) -> u64 {
        u64::from(self.level.to_bits()) | (u64::from(self.peak.to_bits()) << 32)
    }

    #[inline]
    fn unpack(bits: u64) -> Self {
        Self {
            level: f32::from_bits(bits as u32),
            peak: f32::from_bits((bits >> 32) as u32),
        }
    }
}

/// Read-only handle to a kernel's published snapshot
///
/// Cheap to clone and safe to share with UI threads. A default reader is
/// silent until a kernel is attached to it with [`MeterKernel::attach`].
#[derive(Debug, Clone)]
pub struct MeterReader {
    cell: Arc<AtomicU64>,
}

impl Default for MeterReader {
    fn default() -> Self {
        Self {
            cell: Arc::new(AtomicU64::new(MeterSnapshot::default().pack())),
        }
    }
}

impl MeterReader {
    /// Latest published snapshot
    #[inline]
    pub fn value(&self) -> MeterSnapshot {
        MeterSnapshot::unpack(self.cell.load(Ordering::Acquire))
    }

    /// Publish silence; only valid while no kernel is attached
    pub(crate) fn clear(&self) {
        self.cell
            .store(MeterSnapshot::default().pack(), Ordering::Release);
    }
}

/// Peak-hold meter state machine
///
/// `update_level` takes `&mut self`, so there is exactly one producer. Hand
/// observers a [`MeterReader`] from [`MeterKernel::reader`].
#[derive(Debug)]
pub struct MeterKernel {
    cell: Arc<AtomicU64>,
    // Seconds since the peak was last refreshed
    peak_hold_duration: f64,
}

impl Default for MeterKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterKernel {
    /// Create a kernel at `{ level: 0, peak: 0 }`
    pub fn new() -> Self {
        Self::attach(&MeterReader::default())
    }

    /// Create a kernel that publishes to an existing reader's cell
    ///
    /// The cell restarts at `{ level: 0, peak: 0 }`, and every clone of
    /// `reader` sees this kernel's updates. The previous kernel on that cell
    /// must be dropped first, so there is still a single producer.
    pub fn attach(reader: &MeterReader) -> Self {
        reader.clear();
        Self {
            cell: reader.cell.clone(),
            peak_hold_duration: 0.0,
        }
    }

    /// Handle for observer threads
    pub fn reader(&self) -> MeterReader {
        MeterReader {
            cell: self.cell.clone(),
        }
    }

    /// Latest published snapshot
    #[inline]
    pub fn value(&self) -> MeterSnapshot {
        MeterSnapshot::unpack(self.cell.load(Ordering::Acquire))
    }

    /// Feed one block of non-interleaved channel buffers
    ///
    /// Each buffer contributes its first `frame_count` samples.
    /// `sample_rate` must be positive.
    pub fn update_level(&mut self, buffers: &[&[f32]], frame_count: usize, sample_rate: f64) {
        debug_assert!(!buffers.is_empty(), "meter fed an empty buffer list");
        debug_assert!(
            buffers.iter().all(|b| b.len() >= frame_count),
            "channel buffer shorter than frame count"
        );

        let current_linear = buffers
            .iter()
            .map(|buffer| max_magnitude(&buffer[..frame_count.min(buffer.len())]))
            .fold(0.0_f32, f32::max);

        self.advance(current_linear, frame_count, sample_rate);
    }

    /// Feed one block of interleaved frames, as delivered by cpal
    ///
    /// The frame count is `data.len() / channels`.
    pub fn update_level_interleaved(&mut self, data: &[f32], channels: usize, sample_rate: f64) {
        debug_assert!(channels > 0, "meter fed zero channels");

        let frame_count = data.len() / channels.max(1);
        self.advance(max_magnitude(data), frame_count, sample_rate);
    }

    fn advance(&mut self, current_linear: f32, frame_count: usize, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0, "sample rate must be positive");

        let current_linear = current_linear.min(1.0);

        let elapsed = frame_count as f64 / sample_rate;
        self.peak_hold_duration += elapsed;

        let prev = self.value();

        // Silence stays silent; never feed zero to the logarithm
        let decayed = if prev.level > 0.0 {
            let decibel =
                decibel_from_linear(prev.level) - elapsed as f32 * DECAY_DECIBELS_PER_SECOND;
            linear_from_decibel(decibel)
        } else {
            0.0
        };

        let level = decayed.max(current_linear);

        let refresh_peak = prev.peak < level || self.peak_hold_duration > PEAK_HOLD_SECONDS;
        if refresh_peak {
            self.peak_hold_duration = 0.0;
        }

        let next = MeterSnapshot {
            level,
            peak: if refresh_peak { level } else { prev.peak },
        };
        self.cell.store(next.pack(), Ordering::Release);
    }
}

/// Largest absolute sample value, 0.0 for an empty slice
#[inline]
fn max_magnitude(samples: &[f32]) -> f32 {
    samples.iter().copied().map(f32::abs).fold(0.0_f32, f32::max)
}
