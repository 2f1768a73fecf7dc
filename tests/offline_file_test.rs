//! Offline metering tests
//!
//! Meter WAV files written to the temp directory.

use std::path::PathBuf;

use hound::{SampleFormat, WavSpec, WavWriter};
use peakmeter::audio::{meter_wav_file, MeterError};

fn fixture_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("peakmeter-{}-{}.wav", std::process::id(), name))
}

/// Test: A burst followed by silence shows hold then release
/// Given a 2 s mono file starting with a 0.5 s square burst at 0.5
/// When it is metered at 10 readings per second
/// Then the peak is held for one second after it was set and then falls
#[test]
fn test_square_burst_then_silence() {
    let path = fixture_path("burst");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for i in 0..96000 {
        let sample = match i {
            i if i >= 24000 => 0.0,
            i if i % 2 == 0 => 0.5,
            _ => -0.5,
        };
        writer.write_sample(sample as f32).unwrap();
    }
    writer.finalize().unwrap();

    let frames = meter_wav_file(&path, 480, 10).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(frames.len(), 20);
    assert!((frames[19].time - 2.0).abs() < 1e-9);

    // 0.1 s .. 0.5 s: burst
    for frame in &frames[..5] {
        assert_eq!(frame.snapshot.level, 0.5, "at {:.2}s", frame.time);
        assert_eq!(frame.snapshot.peak, 0.5, "at {:.2}s", frame.time);
    }

    // 0.6 s .. 1.0 s: level falls, peak held since the first block
    for frame in &frames[5..10] {
        assert!(frame.snapshot.level < 0.5, "at {:.2}s", frame.time);
        assert_eq!(frame.snapshot.peak, 0.5, "at {:.2}s", frame.time);
    }

    // 1.1 s onwards: released onto the decaying level
    for frame in &frames[10..] {
        assert!(frame.snapshot.peak < 0.5, "at {:.2}s", frame.time);
        assert!(frame.snapshot.peak >= frame.snapshot.level);
    }
}

/// Test: Missing files surface as WAV errors
#[test]
fn test_missing_file() {
    let result = meter_wav_file(fixture_path("missing"), 480, 10);
    assert!(matches!(result, Err(MeterError::File(_))));
}
