//! peakmeter - Real-time peak-hold audio level meter
//!
//! The [`meter`] module holds the allocation-free kernel that runs on the
//! audio callback and publishes `{level, peak}` to observer threads without
//! locks. The [`audio`] module hosts it on a cpal input device or a WAV file.

pub mod audio;
pub mod meter;

pub use audio::{InputMeter, MeterConfig, MeterError};
pub use meter::{MeterDisplay, MeterKernel, MeterReader, MeterSnapshot};
