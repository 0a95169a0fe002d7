//! Streamed playback of in-memory audio with loop points.

use crate::playback::{
    devices::AudioContext,
    error::PlaybackResult,
    traits::{PlaybackState, VoiceId},
};
use crate::streaming::{
    error::StreamResult,
    sources::MemorySource,
    stream::{EngineConfig, SoundStream},
    traits::TimeSpan,
};
use std::sync::Arc;
use std::time::Duration;

/// A piece of music streamed from memory.
///
/// Loops over the whole data by default; [`set_loop_points`](Self::set_loop_points)
/// narrows the loop to a region, which is handy for tracks with an intro.
///
/// ```rust,ignore
/// use audio_streamer::{AudioContext, Music, TimeSpan};
/// use std::time::Duration;
///
/// let context = AudioContext::virtual_output();
/// let music = Music::from_wav(&context, "theme.wav")?;
/// music.set_loop_points(TimeSpan::new(Duration::from_secs(4), Duration::from_secs(30)))?;
/// music.set_loop(true);
/// music.play();
/// ```
#[derive(Debug)]
pub struct Music {
    stream: SoundStream<MemorySource>,
}

impl Music {
    /// Stream interleaved samples already in memory.
    pub fn from_samples(
        context: &AudioContext,
        samples: impl Into<Arc<[i16]>>,
        channel_count: u32,
        sample_rate: u32,
    ) -> PlaybackResult<Self> {
        let source = MemorySource::new(samples, channel_count, sample_rate)?;
        Self::from_source(context, source)
    }

    /// Decode a WAV file into memory and stream it.
    #[cfg(feature = "wav")]
    pub fn from_wav(context: &AudioContext, path: impl AsRef<std::path::Path>) -> PlaybackResult<Self> {
        let source = MemorySource::from_wav(path)?;
        Self::from_source(context, source)
    }

    pub fn from_source(context: &AudioContext, source: MemorySource) -> PlaybackResult<Self> {
        Self::with_config(context, source, EngineConfig::default())
    }

    /// Like [`Music::from_source`] with custom worker tuning.
    pub fn with_config(
        context: &AudioContext,
        source: MemorySource,
        engine: EngineConfig,
    ) -> PlaybackResult<Self> {
        let looping = source.is_looping();
        let stream = SoundStream::with_config(context, source, engine)?;
        stream.set_loop(looping);
        Ok(Self { stream })
    }

    /// Total length of the music
    pub fn duration(&self) -> Duration {
        self.stream.with_source(|source| source.duration())
    }

    /// Current loop region
    pub fn loop_points(&self) -> TimeSpan {
        self.stream.with_source(|source| source.loop_points())
    }

    /// Change the loop region.
    ///
    /// Offset and length are rounded up to whole frames and the length is
    /// clamped to the end of the data. An offset past the end or an empty
    /// length is rejected and leaves the current region in place.
    ///
    /// Applying a new region restarts the stream: it keeps its playing
    /// offset and its playing or paused state.
    pub fn set_loop_points(&self, points: TimeSpan) -> StreamResult<()> {
        let (span, current) = self.stream.with_source(|source| {
            source
                .resolve_loop_points(points)
                .map(|span| (span, source.loop_span()))
        })?;
        if span == current {
            return Ok(());
        }

        let old_status = self.stream.status();
        let old_offset = self.stream.playing_offset();

        self.stream.stop();
        self.stream
            .with_source(|source| source.set_loop_points(points))?;
        tracing::debug!(
            "Loop points set to {:?} + {:?}",
            points.offset,
            points.length
        );

        if old_status != PlaybackState::Stopped {
            self.stream.restart_at(old_offset, old_status);
        }
        Ok(())
    }

    /// Restart at the loop start when the loop end is reached.
    pub fn set_loop(&self, looping: bool) {
        self.stream.with_source(|source| source.set_looping(looping));
        self.stream.set_loop(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.stream.is_looping()
    }

    pub fn play(&self) {
        self.stream.play();
    }

    pub fn pause(&self) {
        self.stream.pause();
    }

    pub fn stop(&self) {
        self.stream.stop();
    }

    pub fn status(&self) -> PlaybackState {
        self.stream.status()
    }

    pub fn playing_offset(&self) -> Duration {
        self.stream.playing_offset()
    }

    pub fn set_playing_offset(&self, offset: Duration) {
        self.stream.set_playing_offset(offset);
    }

    pub fn set_volume(&self, volume: f64) {
        self.stream.set_volume(volume);
    }

    pub fn volume(&self) -> f64 {
        self.stream.volume()
    }

    pub fn set_pan(&self, pan: f64) {
        self.stream.set_pan(pan);
    }

    pub fn pan(&self) -> f64 {
        self.stream.pan()
    }

    pub fn set_pitch(&self, pitch: f64) {
        self.stream.set_pitch(pitch);
    }

    pub fn pitch(&self) -> f64 {
        self.stream.pitch()
    }

    pub fn channel_count(&self) -> u32 {
        self.stream.channel_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream.sample_rate()
    }

    pub fn voice(&self) -> Option<VoiceId> {
        self.stream.voice()
    }

    /// The underlying stream
    pub fn stream(&self) -> &SoundStream<MemorySource> {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::error::PlaybackError;
    use crate::playback::virtual_device::{VirtualBackend, VirtualDeviceConfig};
    use crate::streaming::error::StreamError;
    use std::time::Instant;

    fn ramp(seconds: usize) -> Vec<i16> {
        (0..seconds * 1000).map(|i| i as i16).collect()
    }

    fn fast_context() -> AudioContext {
        AudioContext::new(VirtualBackend::new(
            VirtualDeviceConfig::default().with_time_scale(20.0),
        ))
    }

    fn fast_engine() -> EngineConfig {
        EngineConfig::default()
            .with_slot_duration(Duration::from_millis(100))
            .with_processing_interval(Duration::from_millis(1))
    }

    fn music(context: &AudioContext, seconds: usize) -> Music {
        let source = MemorySource::new(ramp(seconds), 1, 1000).expect("valid source");
        Music::with_config(context, source, fast_engine()).expect("virtual voice")
    }

    #[test]
    fn test_invalid_samples_are_rejected() {
        let context = AudioContext::virtual_output();
        assert!(matches!(
            Music::from_samples(&context, vec![0i16; 8], 0, 44100),
            Err(PlaybackError::Stream(StreamError::InvalidConfig(_)))
        ));
        assert!(matches!(
            Music::from_samples(&context, vec![0i16; 3], 2, 44100),
            Err(PlaybackError::Stream(StreamError::FormatMismatch { .. }))
        ));
    }

    #[test]
    fn test_defaults_cover_the_whole_data() {
        let context = AudioContext::virtual_output();
        let music = Music::from_samples(&context, ramp(2), 1, 1000).unwrap();

        assert_eq!(music.duration(), Duration::from_secs(2));
        assert_eq!(
            music.loop_points(),
            TimeSpan::new(Duration::ZERO, Duration::from_secs(2))
        );
        assert_eq!(music.channel_count(), 1);
        assert_eq!(music.sample_rate(), 1000);
        assert!(music.voice().is_some());
        assert!(!music.is_looping());
        assert_eq!(music.status(), PlaybackState::Stopped);
    }

    #[test]
    fn test_loop_points_change_while_stopped() {
        let context = AudioContext::virtual_output();
        let music = Music::from_samples(&context, ramp(2), 1, 1000).unwrap();
        let points = TimeSpan::new(Duration::from_millis(250), Duration::from_millis(500));

        music.set_loop_points(points).unwrap();
        assert_eq!(music.loop_points(), points);
        assert_eq!(music.status(), PlaybackState::Stopped);

        assert!(
            music
                .set_loop_points(TimeSpan::new(Duration::from_secs(3), Duration::from_secs(1)))
                .is_err()
        );
        assert!(
            music
                .set_loop_points(TimeSpan::new(Duration::ZERO, Duration::ZERO))
                .is_err()
        );
        assert_eq!(music.loop_points(), points);
    }

    #[test]
    fn test_paused_music_stays_paused_across_loop_change() {
        let context = AudioContext::virtual_output();
        let music = music(&context, 10);
        music.play();
        std::thread::sleep(Duration::from_millis(30));
        music.pause();
        assert_eq!(music.status(), PlaybackState::Paused);
        let before = music.playing_offset();

        music
            .set_loop_points(TimeSpan::new(Duration::from_secs(1), Duration::from_secs(2)))
            .unwrap();
        assert_eq!(music.status(), PlaybackState::Paused);

        let after = music.playing_offset();
        let drift = after.abs_diff(before);
        assert!(drift < Duration::from_millis(5), "{before:?} -> {after:?}");
        music.stop();
    }

    #[test]
    fn test_unchanged_loop_points_do_not_restart() {
        let context = AudioContext::virtual_output();
        let music = music(&context, 10);
        music.play();
        std::thread::sleep(Duration::from_millis(20));

        let whole = music.loop_points();
        music.set_loop_points(whole).unwrap();
        assert_eq!(music.status(), PlaybackState::Playing);
        assert!(music.playing_offset() > Duration::ZERO);
        music.stop();
    }

    #[test]
    fn test_looping_stays_inside_the_loop_region() {
        let context = fast_context();
        let music = music(&context, 1);
        music
            .set_loop_points(TimeSpan::new(
                Duration::from_millis(200),
                Duration::from_millis(300),
            ))
            .unwrap();
        music.set_loop(true);
        assert!(music.is_looping());
        music.play();

        let deadline = Instant::now() + Duration::from_millis(300);
        let mut highest = Duration::ZERO;
        while Instant::now() < deadline {
            highest = highest.max(music.playing_offset());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(music.status(), PlaybackState::Playing);
        music.stop();

        assert!(highest >= Duration::from_millis(200), "never reached the loop");
        assert!(highest <= Duration::from_millis(510), "ran past the loop: {highest:?}");
    }

    #[test]
    fn test_voice_controls_reach_the_voice() {
        let context = AudioContext::virtual_output();
        let music = music(&context, 1);
        assert_eq!(music.volume(), 1.0);
        assert_eq!(music.pan(), 0.0);
        assert_eq!(music.pitch(), 1.0);

        music.set_volume(0.25);
        music.set_pan(0.5);
        music.set_pitch(1.5);
        assert_eq!(music.volume(), 0.25);
        assert_eq!(music.pan(), 0.5);
        assert_eq!(music.pitch(), 1.5);
        assert_eq!(music.stream().volume(), 0.25);
    }

    #[cfg(feature = "wav")]
    #[test]
    fn test_from_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8000i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();

        let context = AudioContext::virtual_output();
        let music = Music::from_wav(&context, &path).unwrap();
        assert_eq!(music.channel_count(), 2);
        assert_eq!(music.duration(), Duration::from_millis(500));
    }
}
