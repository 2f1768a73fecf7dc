//! Input meter host
//!
//! Opens an input device through cpal and feeds every capture block to a
//! [`MeterKernel`]. The kernel lives inside the audio callback; this side only
//! keeps a [`MeterReader`].

use std::sync::mpsc::Sender;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::device::{has_input, DeviceId};
use super::error::MeterError;
use crate::meter::{MeterKernel, MeterReader, MeterSnapshot};

/// Default observer refresh rate in Hz (typical display refresh)
const DEFAULT_REFRESH_RATE: u32 = 60;

/// Smallest block size accepted from configuration
pub(crate) const MIN_FRAME_SIZE: u32 = 16;

/// Largest block size accepted from configuration
pub(crate) const MAX_FRAME_SIZE: u32 = 8192;

/// Stream errors tolerated before the input is reported lost
const STREAM_ERROR_LIMIT: u32 = 3;

/// Events raised by the input stream
#[derive(Debug, Clone, PartialEq)]
pub enum MeterEvent {
    /// Input device was disconnected
    InputDeviceDisconnected,
    /// Stream error occurred
    StreamError(String),
    /// Metering stopped and could not be restarted
    Lost,
}

/// Input meter configuration
///
/// `None` fields fall back to the device's default input configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Sample rate in Hz
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Number of channels
    #[serde(default)]
    pub channels: Option<u16>,
    /// Frame size in samples
    #[serde(default)]
    pub frame_size: Option<u32>,
    /// How often observers poll the meter, in Hz
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32,
}

fn default_refresh_rate() -> u32 {
    DEFAULT_REFRESH_RATE
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            channels: None,
            frame_size: None,
            refresh_rate: DEFAULT_REFRESH_RATE,
        }
    }
}

impl MeterConfig {
    /// Validate the configuration values
    pub fn validate(&self) -> Result<(), MeterError> {
        if self.sample_rate == Some(0) {
            return Err(MeterError::InvalidConfig("Sample rate must be positive".into()));
        }

        if self.channels == Some(0) {
            return Err(MeterError::InvalidConfig("Channel count must be positive".into()));
        }

        if let Some(frame_size) = self.frame_size {
            validate_frame_size(frame_size)?;
        }

        if !(1..=240).contains(&self.refresh_rate) {
            return Err(MeterError::InvalidConfig(format!(
                "Invalid refresh rate: {}. Valid range is 1-240 Hz",
                self.refresh_rate
            )));
        }

        Ok(())
    }
}

/// Check a block size against the accepted range
pub(crate) fn validate_frame_size(frame_size: u32) -> Result<(), MeterError> {
    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size) {
        return Err(MeterError::InvalidConfig(format!(
            "Invalid frame size: {}. Valid range is {}-{}",
            frame_size, MIN_FRAME_SIZE, MAX_FRAME_SIZE
        )));
    }
    Ok(())
}

/// Turns cpal stream errors into [`MeterEvent`]s
///
/// Runs on the stream's error callback. A disconnected device is reported
/// right away; other errors are reported individually until
/// `STREAM_ERROR_LIMIT` of them have arrived, then the input is reported lost.
struct StreamErrorHandler {
    event_tx: Option<Sender<MeterEvent>>,
    errors: u32,
}

impl StreamErrorHandler {
    fn new(event_tx: Option<Sender<MeterEvent>>) -> Self {
        Self {
            event_tx,
            errors: 0,
        }
    }

    fn handle(&mut self, err: cpal::StreamError) {
        error!("Input stream error: {:?}", err);
        let event = match err {
            cpal::StreamError::DeviceNotAvailable => {
                warn!("Input device disconnected");
                MeterEvent::InputDeviceDisconnected
            }
            _ => {
                self.errors += 1;
                match self.errors.cmp(&STREAM_ERROR_LIMIT) {
                    std::cmp::Ordering::Less => MeterEvent::StreamError(err.to_string()),
                    std::cmp::Ordering::Equal => {
                        warn!("Too many input stream errors, giving up");
                        MeterEvent::Lost
                    }
                    std::cmp::Ordering::Greater => return,
                }
            }
        };
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// Meters an input device
///
/// The reader stays the same across [`InputMeter::start`],
/// [`InputMeter::stop`] and [`InputMeter::reroute`]; each new stream
/// attaches a fresh kernel to it.
pub struct InputMeter {
    config: MeterConfig,
    stream: Option<Stream>,
    stream_config: Option<StreamConfig>,
    reader: MeterReader,
    // Device the stream was opened on (None = default device)
    current_device: Option<DeviceId>,
    event_tx: Option<Sender<MeterEvent>>,
}

impl InputMeter {
    /// Create a stopped input meter
    pub fn new(config: MeterConfig) -> Self {
        Self {
            config,
            stream: None,
            stream_config: None,
            reader: MeterReader::default(),
            current_device: None,
            event_tx: None,
        }
    }

    /// Set event sender for stream and device notifications
    pub fn set_event_sender(&mut self, tx: Sender<MeterEvent>) {
        self.event_tx = Some(tx);
    }

    /// Get current configuration
    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Get current input device ID
    pub fn current_device(&self) -> Option<&DeviceId> {
        self.current_device.as_ref()
    }

    /// Stream configuration negotiated with the device, while running
    pub fn stream_config(&self) -> Option<&StreamConfig> {
        self.stream_config.as_ref()
    }

    /// Latest meter snapshot; silent while stopped
    pub fn value(&self) -> MeterSnapshot {
        self.reader.value()
    }

    /// Reader for other observer threads
    ///
    /// Keeps following the meter through restarts and reroutes.
    pub fn reader(&self) -> MeterReader {
        self.reader.clone()
    }

    /// Check if metering is currently running
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Start metering `device_id` (None = default input device)
    ///
    /// Thread: Must be called from non-realtime thread
    /// Blocking: Yes (until the stream is playing)
    pub fn start(&mut self, device_id: Option<&DeviceId>) -> Result<(), MeterError> {
        self.config.validate()?;

        if device_id.is_none() && !has_input() {
            return Err(MeterError::InputUnavailable);
        }

        self.stop();
        self.start_stream(device_id)
    }

    /// Stop metering and release the device
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("Input meter stopped");
        }
        self.stream_config = None;
        // The stream and its kernel are gone, so nothing else writes the cell
        self.reader.clear();
    }

    /// Reopen the current device after a route change
    ///
    /// The meter restarts from silence. If the device cannot be reopened a
    /// [`MeterEvent::Lost`] is sent and the error returned.
    pub fn reroute(&mut self) -> Result<(), MeterError> {
        let device_id = self.current_device.clone();
        info!("Rerouting input meter: {:?}", device_id.as_ref().map(|d| &d.0));

        self.stop();

        self.start_stream(device_id.as_ref()).inspect_err(|e| {
            warn!("Input meter lost: {}", e);
            if let Some(ref tx) = self.event_tx {
                let _ = tx.send(MeterEvent::Lost);
            }
        })
    }

    fn start_stream(&mut self, device_id: Option<&DeviceId>) -> Result<(), MeterError> {
        let host = cpal::default_host();

        let device = match device_id {
            Some(id) => host
                .input_devices()
                .map_err(|e| MeterError::DeviceOpenFailed(e.to_string()))?
                .find(|d| d.name().ok().as_ref() == Some(&id.0))
                .ok_or_else(|| MeterError::DeviceNotFound(id.0.clone()))?,
            None => host
                .default_input_device()
                .ok_or(MeterError::InputUnavailable)?,
        };

        let device_name = device.name().unwrap_or_default();

        let default_config = device
            .default_input_config()
            .map_err(|e| MeterError::UnsupportedConfig(e.to_string()))?;

        let stream_config = StreamConfig {
            channels: self.config.channels.unwrap_or(default_config.channels()),
            sample_rate: self
                .config
                .sample_rate
                .map(cpal::SampleRate)
                .unwrap_or(default_config.sample_rate()),
            buffer_size: match self.config.frame_size {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let channels = usize::from(stream_config.channels);
        let sample_rate = f64::from(stream_config.sample_rate.0);

        let mut errors = StreamErrorHandler::new(self.event_tx.clone());
        let err_fn = move |err: cpal::StreamError| errors.handle(err);

        // Any previous stream was dropped in stop(), so this is the only producer
        let mut kernel = MeterKernel::attach(&self.reader);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    kernel.update_level_interleaved(data, channels, sample_rate);
                },
                err_fn,
                None,
            )
            .map_err(|e| MeterError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MeterError::StreamError(e.to_string()))?;

        info!(
            "Input meter started on {}: sample rate {} Hz, {} input channels",
            device_name, stream_config.sample_rate.0, stream_config.channels
        );
        debug!("Input stream config: {:?}", stream_config);

        self.stream = Some(stream);
        self.stream_config = Some(stream_config);
        self.current_device = device_id.cloned();
        Ok(())
    }
}

impl Drop for InputMeter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_config_default() {
        let config = MeterConfig::default();
        assert_eq!(config.sample_rate, None);
        assert_eq!(config.channels, None);
        assert_eq!(config.frame_size, None);
        assert_eq!(config.refresh_rate, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_meter_config_validation() {
        let bad_frames = MeterConfig {
            frame_size: Some(4),
            ..Default::default()
        };
        assert!(matches!(bad_frames.validate(), Err(MeterError::InvalidConfig(_))));

        let bad_refresh = MeterConfig {
            refresh_rate: 0,
            ..Default::default()
        };
        assert!(bad_refresh.validate().is_err());

        let no_channels = MeterConfig {
            channels: Some(0),
            ..Default::default()
        };
        assert!(no_channels.validate().is_err());

        let zero_rate = MeterConfig {
            sample_rate: Some(0),
            ..Default::default()
        };
        assert!(zero_rate.validate().is_err());

        let ok = MeterConfig {
            sample_rate: Some(48000),
            channels: Some(2),
            frame_size: Some(480),
            refresh_rate: 30,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_meter_config_deserialize_defaults() {
        let config: MeterConfig = serde_json::from_str(r#"{"frame_size": 256}"#).unwrap();
        assert_eq!(config.frame_size, Some(256));
        assert_eq!(config.refresh_rate, 60);
    }

    #[test]
    fn test_stopped_meter_is_silent() {
        let mut meter = InputMeter::new(MeterConfig::default());
        assert!(!meter.is_running());
        assert_eq!(meter.reader().value(), MeterSnapshot::default());
        meter.stop();
        assert_eq!(meter.value(), MeterSnapshot::default());
    }

    #[test]
    fn test_reader_follows_restarted_kernels() {
        let mut meter = InputMeter::new(MeterConfig::default());
        let early = meter.reader();

        // What start_stream does for each new stream
        let mut kernel = MeterKernel::attach(&meter.reader);
        kernel.update_level_interleaved(&[0.4, -0.2], 2, 48000.0);
        assert_eq!(early.value().level, 0.4);

        // stop() + start_stream() on reroute
        drop(kernel);
        meter.stop();
        assert_eq!(early.value(), MeterSnapshot::default());
        let mut kernel = MeterKernel::attach(&meter.reader);
        kernel.update_level_interleaved(&[0.0, 0.7], 2, 48000.0);

        assert_eq!(early.value().level, 0.7);
        assert_eq!(early.value(), meter.value());
    }

    fn backend_error() -> cpal::StreamError {
        cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".into(),
            },
        }
    }

    #[test]
    fn test_disconnect_is_reported() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut handler = StreamErrorHandler::new(Some(tx));

        handler.handle(cpal::StreamError::DeviceNotAvailable);

        assert_eq!(rx.try_recv(), Ok(MeterEvent::InputDeviceDisconnected));
    }

    #[test]
    fn test_repeated_stream_errors_report_lost_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut handler = StreamErrorHandler::new(Some(tx));

        for _ in 0..STREAM_ERROR_LIMIT + 2 {
            handler.handle(backend_error());
        }

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), STREAM_ERROR_LIMIT as usize);
        assert!(events[..events.len() - 1]
            .iter()
            .all(|e| matches!(e, MeterEvent::StreamError(_))));
        assert_eq!(events.last(), Some(&MeterEvent::Lost));
    }

    #[test]
    fn test_stream_errors_without_listener_do_not_panic() {
        let mut handler = StreamErrorHandler::new(None);
        for _ in 0..STREAM_ERROR_LIMIT + 1 {
            handler.handle(backend_error());
        }
        handler.handle(cpal::StreamError::DeviceNotAvailable);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_opening_device() {
        let mut meter = InputMeter::new(MeterConfig {
            refresh_rate: 1000,
            ..Default::default()
        });
        assert!(matches!(meter.start(None), Err(MeterError::InvalidConfig(_))));
        assert!(!meter.is_running());
    }
}
