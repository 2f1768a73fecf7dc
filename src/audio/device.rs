//! Input device enumeration

use cpal::traits::{DeviceTrait, HostTrait};

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

/// Information about an input device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier
    pub id: DeviceId,
    /// Display name
    pub name: String,
    /// Supported sample rates (Hz)
    pub supported_sample_rates: Vec<u32>,
    /// Supported channel counts
    pub supported_channels: Vec<u16>,
    /// Whether this is the default device
    pub is_default: bool,
}

/// List available input (capture) devices
pub fn list_input_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    host.input_devices()
        .map(|devices| {
            devices
                .filter_map(|device| {
                    let name = device.name().ok()?;
                    let is_default = default_name.as_ref() == Some(&name);
                    let (sample_rates, channels) = input_capabilities(&device);
                    Some(AudioDevice {
                        id: DeviceId(name.clone()),
                        name,
                        supported_sample_rates: sample_rates,
                        supported_channels: channels,
                        is_default,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// True if the default host has an input device with at least one channel
pub fn has_input() -> bool {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.default_input_config().ok())
        .map(|c| c.channels() > 0)
        .unwrap_or(false)
}

/// Common sample rates and channel counts the device can capture with
fn input_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    for config in device.supported_input_configs().into_iter().flatten() {
        for rate in [44100u32, 48000, 88200, 96000, 192000] {
            if rate >= config.min_sample_rate().0
                && rate <= config.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
        let ch = config.channels();
        if !channels.contains(&ch) {
            channels.push(ch);
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}
