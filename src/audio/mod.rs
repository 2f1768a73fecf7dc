//! Audio host module
//!
//! Device enumeration, live input metering, and offline file metering.

mod device;
mod error;
mod file;
mod input_meter;

pub use device::{has_input, list_input_devices, AudioDevice, DeviceId};
pub use error::MeterError;
pub use file::{meter_wav, meter_wav_file, MeterFrame};
pub use input_meter::{InputMeter, MeterConfig, MeterEvent};
