//! Transport controller for a streamed sound.

use super::{
    buffers::BUFFER_COUNT,
    traits::{DataSource, samples_to_time, time_to_samples},
    worker::{self, StreamShared, WorkerParams},
};
use crate::playback::{
    devices::AudioContext,
    error::PlaybackResult,
    traits::{HardwareFormat, PlaybackDevice, PlaybackState, VoiceControls, VoiceId},
};
use crate::stream_error;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Tuning for the streaming worker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Amount of audio requested from the source for each buffer
    pub slot_duration: Duration,

    /// Sleep between polls of the device
    pub processing_interval: Duration,

    /// Re-reads allowed after rewinding a looping source that returned no
    /// data, before the stream gives up
    pub loop_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_duration: Duration::from_secs(1),
            processing_interval: Duration::from_millis(10),
            loop_retries: 1,
        }
    }
}

impl EngineConfig {
    /// Small buffers and a tight poll for interactive use
    pub fn low_latency() -> Self {
        Self {
            slot_duration: Duration::from_millis(50),
            processing_interval: Duration::from_millis(2),
            loop_retries: 1,
        }
    }

    /// Hardware buffers each stream rotates through
    pub const fn buffer_count(&self) -> usize {
        BUFFER_COUNT
    }

    pub fn with_slot_duration(mut self, slot_duration: Duration) -> Self {
        self.slot_duration = slot_duration;
        self
    }

    pub fn with_processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval = interval;
        self
    }

    pub fn with_loop_retries(mut self, retries: usize) -> Self {
        self.loop_retries = retries;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.slot_duration.is_zero() {
            return Err(stream_error!(InvalidConfig, "slot duration must be non-zero").into());
        }
        if self.loop_retries == 0 {
            return Err(stream_error!(
                InvalidConfig,
                "loop_retries must be at least 1 for looping to work"
            )
            .into());
        }
        Ok(())
    }

    /// Interleaved samples requested per buffer fill.
    fn chunk_samples(&self, sample_rate: u32, channel_count: u32) -> usize {
        let frames = (self.slot_duration.as_secs_f64() * sample_rate as f64) as usize;
        frames.max(1) * channel_count as usize
    }
}

/// Sound parameters set by [`SoundStream::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct StreamConfig {
    pub channel_count: u32,
    pub sample_rate: u32,
    /// `None` until a supported channel count has been set
    pub format: Option<HardwareFormat>,
}

/// A sound whose audio is read from a [`DataSource`] while it plays.
///
/// A background worker keeps a ring of [`BUFFER_COUNT`] device buffers full.
/// Transport calls are made from one owning thread; status and position can
/// be queried from anywhere. Failures are logged through `tracing` and
/// resolved into state rather than returned.
///
/// # Example
///
/// ```rust,ignore
/// use audio_streamer::{AudioContext, GeneratorSource, SoundStream};
///
/// let context = AudioContext::virtual_output();
/// let stream = SoundStream::new(&context, GeneratorSource::sine(440.0, 44100, 2))?;
/// stream.set_loop(true);
/// stream.play();
/// ```
pub struct SoundStream<S: DataSource + 'static> {
    shared: Arc<StreamShared<S>>,
    voice: Option<VoiceId>,
    config: StreamConfig,
    engine: EngineConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: DataSource + 'static> SoundStream<S> {
    /// Open a voice on `context` and initialize from the source's format.
    pub fn new(context: &AudioContext, source: S) -> PlaybackResult<Self> {
        Self::with_config(context, source, EngineConfig::default())
    }

    /// Like [`SoundStream::new`] with custom worker tuning.
    pub fn with_config(
        context: &AudioContext,
        source: S,
        engine: EngineConfig,
    ) -> PlaybackResult<Self> {
        let (voice, device) = context.open_voice()?;
        let channel_count = source.channel_count();
        let sample_rate = source.sample_rate();

        let mut stream = Self::from_device(device, source, engine)?;
        stream.voice = Some(voice);
        stream.initialize(channel_count, sample_rate);
        Ok(stream)
    }

    /// Build an idle, uninitialized stream over an already open device.
    pub fn from_device(
        device: Arc<dyn PlaybackDevice>,
        source: S,
        engine: EngineConfig,
    ) -> PlaybackResult<Self> {
        engine.validate()?;
        Ok(Self {
            shared: Arc::new(StreamShared::new(source, device)),
            voice: None,
            config: StreamConfig::default(),
            engine,
            worker: Mutex::new(None),
        })
    }

    /// Set the channel count and sample rate of the audio to stream.
    ///
    /// Must be called before [`play`](Self::play) and never while streaming.
    /// An unsupported channel count is logged and leaves the stream unable
    /// to play.
    pub fn initialize(&mut self, channel_count: u32, sample_rate: u32) {
        let format = HardwareFormat::from_channel_count(channel_count);
        match format {
            Some(format) if sample_rate > 0 => {
                self.config = StreamConfig {
                    channel_count,
                    sample_rate,
                    format: Some(format),
                };
            }
            Some(_) => {
                tracing::error!("Unsupported sample rate ({}) for audio stream", sample_rate);
                self.config = StreamConfig::default();
            }
            None => {
                tracing::error!(
                    "Unsupported number of channels ({}) for audio stream",
                    channel_count
                );
                self.config = StreamConfig::default();
            }
        }
    }

    /// Start or resume playback.
    ///
    /// A paused stream resumes where it left off; a playing stream is left
    /// alone. Otherwise the source is rewound and a worker is launched.
    pub fn play(&self) {
        if self.config.format.is_none() {
            tracing::error!(
                "Failed to play audio stream: sound parameters have not been initialized (call initialize() first)"
            );
            return;
        }

        if self.shared.is_streaming() {
            let transport = self.shared.transport.lock();
            match self.shared.start_state() {
                PlaybackState::Paused => {
                    self.shared.set_start_state(PlaybackState::Playing);
                    if let Err(err) = self.shared.device.play() {
                        tracing::warn!("Failed to resume stream: {}", err);
                    }
                    return;
                }
                PlaybackState::Playing => return,
                PlaybackState::Stopped => {}
            }
            drop(transport);
        }

        // A worker that ended on its own still has to be joined
        self.join_worker();

        if let Err(err) = self.shared.source.lock().seek(Duration::ZERO) {
            tracing::warn!("Failed to rewind stream source: {}", err);
        }
        self.shared.samples_processed.store(0, Ordering::Relaxed);
        self.launch(PlaybackState::Playing);
    }

    /// Pause playback; a later [`play`](Self::play) resumes it.
    pub fn pause(&self) {
        if !self.shared.is_streaming() {
            return;
        }
        let _transport = self.shared.transport.lock();
        self.shared.set_start_state(PlaybackState::Paused);
        if let Err(err) = self.shared.device.pause() {
            tracing::warn!("Failed to pause stream: {}", err);
        }
    }

    /// Stop playback and wait for the worker to exit.
    ///
    /// Once this returns nothing touches the device or the source until the
    /// next [`play`](Self::play) or [`set_playing_offset`](Self::set_playing_offset).
    pub fn stop(&self) {
        self.shared.is_streaming.store(false, Ordering::Release);
        self.shared.wake();
        self.join_worker();
        self.shared.set_start_state(PlaybackState::Stopped);
    }

    /// Jump to `offset` from the start of the data.
    ///
    /// Restarts the worker, so output briefly stops. A paused stream stays
    /// paused at the new position.
    pub fn set_playing_offset(&self, offset: Duration) {
        if self.config.format.is_none() {
            tracing::error!(
                "Failed to set playing offset: sound parameters have not been initialized"
            );
            return;
        }

        let resume_state = match self.status() {
            PlaybackState::Paused => PlaybackState::Paused,
            _ => PlaybackState::Playing,
        };
        self.restart_at(offset, resume_state);
    }

    /// Stop, seek the source to `offset` and launch a worker in `state`.
    pub(crate) fn restart_at(&self, offset: Duration, state: PlaybackState) {
        self.stop();
        if self.config.format.is_none() {
            return;
        }

        if let Err(err) = self.shared.source.lock().seek(offset) {
            tracing::warn!("Failed to seek stream source: {}", err);
        }
        let samples = time_to_samples(offset, self.config.sample_rate, self.config.channel_count);
        self.shared
            .samples_processed
            .store(samples, Ordering::Relaxed);
        self.launch(state);
    }

    /// Current position in the data.
    pub fn playing_offset(&self) -> Duration {
        if self.config.format.is_none() {
            return Duration::ZERO;
        }

        let _position = self.shared.position.lock();
        let processed = samples_to_time(
            self.shared.samples_processed.load(Ordering::Relaxed),
            self.config.sample_rate,
            self.config.channel_count,
        );
        self.shared.device.elapsed_in_current_buffer() + processed
    }

    /// Current playback state.
    ///
    /// Right after `play` the device may not have started yet; while the
    /// worker is running a stopped device reports the requested state.
    pub fn status(&self) -> PlaybackState {
        let status = self.shared.device.status();
        if status == PlaybackState::Stopped && self.shared.is_streaming() {
            self.shared.start_state()
        } else {
            status
        }
    }

    /// Restart from the beginning when the data ends.
    pub fn set_loop(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::Relaxed)
    }

    /// Set the volume from 0.0 (mute) to 1.0 (full, the default).
    ///
    /// Values outside that range are clamped. Takes effect immediately and
    /// survives stop and restart.
    pub fn set_volume(&self, volume: f64) {
        self.update_controls(|controls| controls.with_volume(volume));
    }

    pub fn volume(&self) -> f64 {
        self.shared.device.controls().volume
    }

    /// Balance output between left (-1.0) and right (1.0); 0.0 is centred.
    pub fn set_pan(&self, pan: f64) {
        self.update_controls(|controls| controls.with_pan(pan));
    }

    pub fn pan(&self) -> f64 {
        self.shared.device.controls().pan
    }

    /// Play `pitch` times faster, which also raises the pitch.
    ///
    /// 1.0 is the default; zero, negative or non-finite factors are ignored.
    /// The playing offset keeps counting in data time.
    pub fn set_pitch(&self, pitch: f64) {
        self.update_controls(|controls| controls.with_pitch(pitch));
    }

    pub fn pitch(&self) -> f64 {
        self.shared.device.controls().pitch
    }

    /// Channel count, 0 until successfully initialized
    pub const fn channel_count(&self) -> u32 {
        self.config.channel_count
    }

    /// Sample rate, 0 until successfully initialized
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub const fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    /// Set how long the worker sleeps between device polls.
    ///
    /// Applies from the next worker launch.
    pub fn set_processing_interval(&mut self, interval: Duration) {
        self.engine.processing_interval = interval;
    }

    pub const fn processing_interval(&self) -> Duration {
        self.engine.processing_interval
    }

    /// Voice this stream plays on, when opened through an [`AudioContext`]
    pub const fn voice(&self) -> Option<VoiceId> {
        self.voice
    }

    /// Interleaved samples known to have finished playing.
    pub fn samples_processed(&self) -> u64 {
        self.shared.samples_processed.load(Ordering::Relaxed)
    }

    /// Run `f` with exclusive access to the data source.
    ///
    /// Blocks the worker's reads while `f` runs.
    pub fn with_source<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.source.lock())
    }

    fn update_controls(&self, change: impl FnOnce(VoiceControls) -> VoiceControls) {
        let controls = change(self.shared.device.controls());
        if let Err(err) = self.shared.device.set_controls(controls) {
            tracing::warn!("Failed to apply voice controls: {}", err);
        }
    }

    fn launch(&self, state: PlaybackState) {
        let Some(format) = self.config.format else {
            return;
        };
        let params = WorkerParams {
            format,
            sample_rate: self.config.sample_rate,
            chunk_samples: self
                .engine
                .chunk_samples(self.config.sample_rate, self.config.channel_count),
            processing_interval: self.engine.processing_interval,
            loop_retries: self.engine.loop_retries,
        };

        self.shared.is_streaming.store(true, Ordering::Release);
        self.shared.set_start_state(state);
        match worker::spawn(Arc::clone(&self.shared), params) {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(err) => {
                tracing::error!("Failed to spawn stream worker: {}", err);
                self.shared.is_streaming.store(false, Ordering::Release);
                self.shared.set_start_state(PlaybackState::Stopped);
            }
        }
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Stream worker panicked");
            }
        }
    }
}

impl<S: DataSource + 'static> Drop for SoundStream<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: DataSource + 'static> std::fmt::Debug for SoundStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundStream")
            .field("voice", &self.voice)
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("is_streaming", &self.shared.is_streaming())
            .field("looping", &self.is_looping())
            .finish()
    }
}
