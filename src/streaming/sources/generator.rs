//! Signal generator source for streaming audio.

use crate::streaming::{error::StreamResult, traits::DataSource};
use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Types of signals that can be generated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SignalType {
    /// Pure sine wave
    Sine { frequency: f64 },
    /// Square wave
    Square { frequency: f64, duty_cycle: f64 },
    /// Sawtooth wave
    Sawtooth { frequency: f64 },
    /// Triangle wave
    Triangle { frequency: f64 },
    /// White noise
    WhiteNoise,
    /// Linear frequency sweep over `duration`
    Chirp {
        start_freq: f64,
        end_freq: f64,
        duration: Duration,
    },
    /// Silence (zeros)
    Silence,
}

/// Configuration for the signal generator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct GeneratorConfig {
    pub signal_type: SignalType,
    /// Peak level, 0.0 to 1.0 of full scale
    pub amplitude: f64,
    pub sample_rate: u32,
    pub channels: u32,
    /// Length of the signal; `None` runs forever
    pub duration: Option<Duration>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            signal_type: SignalType::Sine { frequency: 440.0 },
            amplitude: 0.5,
            sample_rate: 44100,
            channels: 2,
            duration: None, // Infinite
        }
    }
}

/// A data source that synthesizes a signal on demand.
///
/// Every sample is computed from its frame index, so seeking is exact and
/// costs nothing.
#[derive(Debug, Clone)]
pub struct GeneratorSource {
    config: GeneratorConfig,
    current_frame: u64,
}

impl GeneratorSource {
    /// Create a new signal generator with the given configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            current_frame: 0,
        }
    }

    /// Create a sine wave generator.
    pub fn sine(frequency: f64, sample_rate: u32, channels: u32) -> Self {
        Self::new(GeneratorConfig {
            signal_type: SignalType::Sine { frequency },
            sample_rate,
            channels,
            ..Default::default()
        })
    }

    /// Create a white noise generator.
    pub fn white_noise(sample_rate: u32, channels: u32) -> Self {
        Self::new(GeneratorConfig {
            signal_type: SignalType::WhiteNoise,
            sample_rate,
            channels,
            ..Default::default()
        })
    }

    /// Create a silence generator.
    pub fn silence(sample_rate: u32, channels: u32) -> Self {
        Self::new(GeneratorConfig {
            signal_type: SignalType::Silence,
            sample_rate,
            channels,
            ..Default::default()
        })
    }

    /// Create a chirp generator (frequency sweep).
    pub fn chirp(
        start_freq: f64,
        end_freq: f64,
        duration: Duration,
        sample_rate: u32,
        channels: u32,
    ) -> Self {
        Self::new(GeneratorConfig {
            signal_type: SignalType::Chirp {
                start_freq,
                end_freq,
                duration,
            },
            sample_rate,
            channels,
            duration: Some(duration),
            ..Default::default()
        })
    }

    /// Limit the signal to `duration`.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.config.duration = Some(duration);
        self
    }

    /// Set the signal amplitude.
    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.config.amplitude = amplitude;
    }

    /// Set the signal type.
    pub fn set_signal_type(&mut self, signal_type: SignalType) {
        self.config.signal_type = signal_type;
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Get the current generated time.
    pub fn generated_time(&self) -> Duration {
        if self.config.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.current_frame as f64 / self.config.sample_rate as f64)
    }

    fn total_frames(&self) -> Option<u64> {
        self.config
            .duration
            .map(|duration| (duration.as_secs_f64() * self.config.sample_rate as f64) as u64)
    }

    /// Generate the value of `frame` on `channel`, in -1.0..=1.0.
    fn generate_sample(&self, frame: u64, channel: u32) -> f64 {
        let rate = self.config.sample_rate as f64;
        let time = frame as f64 / rate;

        let raw_value = match &self.config.signal_type {
            SignalType::Sine { frequency } => (2.0 * PI * (frequency * time).fract()).sin(),

            SignalType::Square {
                frequency,
                duty_cycle,
            } => {
                if (frequency * time).fract() < *duty_cycle {
                    1.0
                } else {
                    -1.0
                }
            }

            SignalType::Sawtooth { frequency } => 2.0 * (frequency * time).fract() - 1.0,

            SignalType::Triangle { frequency } => {
                let phase = (frequency * time).fract();
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }

            SignalType::WhiteNoise => {
                let mut hasher = DefaultHasher::new();
                (frame, channel).hash(&mut hasher);
                let hash = hasher.finish();

                // Convert hash to -1.0..1.0 range
                (hash as f64 / u64::MAX as f64) * 2.0 - 1.0
            }

            SignalType::Chirp {
                start_freq,
                end_freq,
                duration,
            } => {
                let sweep = duration.as_secs_f64();
                let t = time.min(sweep);
                let rate_of_change = if sweep > 0.0 {
                    (end_freq - start_freq) / sweep
                } else {
                    0.0
                };
                // Integral of the instantaneous frequency
                let mut phase = start_freq * t + 0.5 * rate_of_change * t * t;
                if time > sweep {
                    phase += end_freq * (time - sweep);
                }
                (2.0 * PI * phase.fract()).sin()
            }

            SignalType::Silence => 0.0,
        };

        raw_value * self.config.amplitude
    }
}

impl DataSource for GeneratorSource {
    fn read(&mut self, buffer: &mut [i16]) -> usize {
        let channels = self.config.channels;
        if channels == 0 || self.config.sample_rate == 0 {
            return 0;
        }

        let mut frames = (buffer.len() / channels as usize) as u64;
        if let Some(total) = self.total_frames() {
            frames = frames.min(total.saturating_sub(self.current_frame));
        }

        let mut written = 0;
        for _ in 0..frames {
            for channel in 0..channels {
                let value = self.generate_sample(self.current_frame, channel);
                buffer[written] = (value.clamp(-1.0, 1.0) * i16::MAX as f64) as i16;
                written += 1;
            }
            self.current_frame += 1;
        }
        written
    }

    fn seek(&mut self, offset: Duration) -> StreamResult<()> {
        let frame = (offset.as_secs_f64() * self.config.sample_rate as f64) as u64;
        self.current_frame = match self.total_frames() {
            Some(total) => frame.min(total),
            None => frame,
        };
        Ok(())
    }

    fn channel_count(&self) -> u32 {
        self.config.channels
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
