//! Level meter core
//!
//! Decibel conversion, the real-time peak-hold kernel, and display helpers.

mod decibel;
mod display;
mod kernel;

pub use decibel::{decibel_from_linear, linear_from_decibel};
pub use display::MeterDisplay;
pub use kernel::{
    MeterKernel, MeterReader, MeterSnapshot, DECAY_DECIBELS_PER_SECOND, PEAK_HOLD_SECONDS,
};
