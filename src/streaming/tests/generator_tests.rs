//! Tests for signal generator streaming sources.

use super::super::sources::generator::*;
use super::super::traits::*;
use std::time::Duration;

fn peak(samples: &[i16]) -> i16 {
    samples.iter().map(|s| s.saturating_abs()).max().unwrap_or(0)
}

#[test]
fn test_sine_wave_generator_basic() {
    let mut generator = GeneratorSource::sine(440.0, 48000, 2);
    assert_eq!(generator.channel_count(), 2);
    assert_eq!(generator.sample_rate(), 48000);

    let mut buffer = vec![0i16; 48000 * 2];
    assert_eq!(generator.read(&mut buffer), buffer.len());

    // Interleaved channels carry the same tone
    assert!(buffer.chunks(2).all(|frame| frame[0] == frame[1]));
    assert_eq!(buffer[0], 0);

    // Default amplitude is half scale
    let peak = peak(&buffer);
    assert!(peak > 16000 && peak <= i16::MAX / 2 + 1, "peak {peak}");
    assert_eq!(generator.generated_time(), Duration::from_secs(1));
}

#[test]
fn test_partial_frames_are_not_written() {
    let mut generator = GeneratorSource::sine(440.0, 8000, 2);
    let mut buffer = [0i16; 5];
    assert_eq!(generator.read(&mut buffer), 4);
}

#[test]
fn test_duration_limits_output() {
    let mut generator =
        GeneratorSource::sine(100.0, 1000, 1).with_duration(Duration::from_millis(200));
    let mut buffer = vec![0i16; 150];

    assert_eq!(generator.read(&mut buffer), 150);
    assert_eq!(generator.read(&mut buffer), 50);
    assert_eq!(generator.read(&mut buffer), 0);
}

#[test]
fn test_seek_is_exact_and_clamped() {
    let mut generator =
        GeneratorSource::sine(3.0, 1000, 1).with_duration(Duration::from_secs(1));
    let mut first = vec![0i16; 300];
    generator.read(&mut first);

    generator.seek(Duration::from_millis(100)).unwrap();
    let mut again = vec![0i16; 200];
    generator.read(&mut again);
    assert_eq!(&first[100..], &again[..]);

    generator.seek(Duration::from_secs(5)).unwrap();
    assert_eq!(generator.generated_time(), Duration::from_secs(1));
    assert_eq!(generator.read(&mut again), 0);

    // The default loop hook rewinds to the start
    assert_eq!(generator.on_loop(), Some(0));
    assert_eq!(generator.generated_time(), Duration::ZERO);
}

#[test]
fn test_white_noise_is_deterministic() {
    let mut a = GeneratorSource::white_noise(44100, 2);
    let mut b = GeneratorSource::white_noise(44100, 2);
    let mut left = vec![0i16; 1024];
    let mut right = vec![0i16; 1024];
    a.read(&mut left);
    b.read(&mut right);

    assert_eq!(left, right);
    assert!(left.iter().any(|&s| s != left[0]));
    // Channels are decorrelated
    assert!(left.chunks(2).any(|frame| frame[0] != frame[1]));
}

#[test]
fn test_silence_and_amplitude() {
    let mut silence = GeneratorSource::silence(8000, 1);
    let mut buffer = vec![1i16; 64];
    silence.read(&mut buffer);
    assert!(buffer.iter().all(|&s| s == 0));

    let mut square = GeneratorSource::new(GeneratorConfig {
        signal_type: SignalType::Square {
            frequency: 10.0,
            duty_cycle: 0.5,
        },
        sample_rate: 1000,
        channels: 1,
        ..Default::default()
    });
    square.set_amplitude(1.0);
    let mut buffer = vec![0i16; 100];
    square.read(&mut buffer);
    assert_eq!(buffer[0], i16::MAX);
    assert_eq!(buffer[60], -i16::MAX);

    square.set_amplitude(2.0);
    square.read(&mut buffer);
    assert_eq!(peak(&buffer), i16::MAX);
}

#[test]
fn test_chirp_sweeps_for_its_duration() {
    let mut chirp = GeneratorSource::chirp(100.0, 1000.0, Duration::from_millis(500), 8000, 1);
    assert_eq!(chirp.config().duration, Some(Duration::from_millis(500)));

    let mut buffer = vec![0i16; 8000];
    assert_eq!(chirp.read(&mut buffer), 4000);
}

#[test]
fn test_signal_type_can_change() {
    let mut generator = GeneratorSource::sine(440.0, 8000, 1);
    generator.set_signal_type(SignalType::Silence);
    assert_eq!(generator.config().signal_type, SignalType::Silence);

    let mut buffer = vec![5i16; 16];
    generator.read(&mut buffer);
    assert!(buffer.iter().all(|&s| s == 0));
}
