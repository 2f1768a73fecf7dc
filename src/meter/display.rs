//! Meter presentation helpers
//!
//! Turns a [`MeterSnapshot`] into bar lengths and a peak label. Runs on the
//! observer side only.

use super::decibel::decibel_from_linear;
use super::kernel::MeterSnapshot;

/// What a meter view shows for one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterDisplay {
    snapshot: MeterSnapshot,
}

impl From<MeterSnapshot> for MeterDisplay {
    fn from(snapshot: MeterSnapshot) -> Self {
        Self { snapshot }
    }
}

impl MeterDisplay {
    /// Length of the level bar for a meter `max_width` wide
    pub fn level_width(&self, max_width: f32) -> f32 {
        self.snapshot.level.clamp(0.0, 1.0) * max_width
    }

    /// Position of the peak marker for a meter `max_width` wide
    pub fn peak_width(&self, max_width: f32) -> f32 {
        self.snapshot.peak.clamp(0.0, 1.0) * max_width
    }

    /// Peak in decibels, one decimal place (e.g. `-6.0 dB`)
    pub fn peak_label(&self) -> String {
        if self.snapshot.peak > 0.0 {
            format!("{:.1} dB", decibel_from_linear(self.snapshot.peak))
        } else {
            "-inf dB".to_string()
        }
    }

    /// Text bar `columns` characters wide with a `|` peak marker
    pub fn render_bar(&self, columns: usize) -> String {
        let filled = self.level_width(columns as f32).round() as usize;
        let peak = self.peak_width(columns as f32).round() as usize;

        let mut bar = String::with_capacity(columns * 3);
        for column in 0..columns {
            let c = if column < filled {
                '#'
            } else if peak > 0 && column + 1 == peak {
                '|'
            } else {
                ' '
            };
            bar.push(c);
        }
        bar
    }
}
