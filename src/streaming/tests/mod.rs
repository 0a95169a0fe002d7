//! Tests for streaming functionality.
//!
//! The engine is driven against a scripted device that finishes one queued
//! buffer per poll and records every call made to it, and against sources
//! that count what is asked of them.

use crate::playback::{
    error::{PlaybackError, PlaybackResult},
    traits::{BufferHandle, HardwareFormat, PlaybackDevice, PlaybackState, VoiceControls},
};
use crate::streaming::{
    error::StreamResult,
    stream::{EngineConfig, SoundStream},
    traits::DataSource,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

mod generator_tests;

/// Install a test subscriber once; later calls are no-ops.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Fast worker tuning for tests.
pub(crate) fn test_engine() -> EngineConfig {
    EngineConfig::default().with_processing_interval(Duration::from_millis(1))
}

/// One call made against [`ScriptedDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeviceCall {
    CreateBuffers(usize),
    Queue { handle: BufferHandle, samples: usize },
    UnqueueFinished,
    UnqueueAll,
    Release(usize),
    Play,
    Pause,
    Stop,
    Status,
    Elapsed,
}

#[derive(Debug, Clone, Copy)]
struct ScriptedBuffer {
    handle: BufferHandle,
    samples: usize,
    channels: usize,
    /// Interleaved samples per second
    rate: u64,
}

#[derive(Debug, Default)]
struct ScriptState {
    next_handle: u32,
    pending: VecDeque<ScriptedBuffer>,
    finished: Vec<BufferHandle>,
    /// Samples of the head buffer reported as played so far
    head_played: usize,
    state: PlaybackState,
    calls: Vec<DeviceCall>,
    samples_played: usize,
    double_queued: bool,
    controls: VoiceControls,
}

impl ScriptState {
    fn finish_head(&mut self) {
        if let Some(head) = self.pending.pop_front() {
            self.samples_played += head.samples;
            self.finished.push(head.handle);
        }
        self.head_played = 0;
    }
}

/// Device double: each `unqueue_finished` while playing finishes the oldest
/// queued buffer. Each position query while playing moves one frame further
/// into the head buffer, stopping one frame short of its end.
#[derive(Debug, Default)]
pub(crate) struct ScriptedDevice {
    inner: Mutex<ScriptState>,
    fail_queue: AtomicBool,
}

impl ScriptedDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn count(&self, matches: impl Fn(&DeviceCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| matches(call)).count()
    }

    /// Sizes of every buffer queued so far, in order
    pub fn queued_sizes(&self) -> Vec<usize> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Queue { samples, .. } => Some(*samples),
                _ => None,
            })
            .collect()
    }

    pub fn samples_played(&self) -> usize {
        self.inner.lock().samples_played
    }

    pub fn controls(&self) -> VoiceControls {
        self.inner.lock().controls
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether a buffer was ever queued while already queued
    pub fn double_queued(&self) -> bool {
        self.inner.lock().double_queued
    }

    pub fn set_fail_queue(&self, fail: bool) {
        self.fail_queue.store(fail, Ordering::SeqCst);
    }

    /// Finish everything queued at once, as a starved device would.
    pub fn run_dry(&self) {
        let mut inner = self.inner.lock();
        while !inner.pending.is_empty() {
            inner.finish_head();
        }
        if inner.state == PlaybackState::Playing {
            inner.state = PlaybackState::Stopped;
        }
    }

    fn record(&self, call: DeviceCall) -> parking_lot::MutexGuard<'_, ScriptState> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        inner
    }
}

impl PlaybackDevice for ScriptedDevice {
    fn create_buffers(&self, count: usize) -> PlaybackResult<Vec<BufferHandle>> {
        let mut inner = self.record(DeviceCall::CreateBuffers(count));
        let first = inner.next_handle + 1;
        inner.next_handle += count as u32;
        Ok((first..first + count as u32).map(BufferHandle).collect())
    }

    fn queue(
        &self,
        buffer: BufferHandle,
        samples: &[i16],
        format: HardwareFormat,
        sample_rate: u32,
    ) -> PlaybackResult<()> {
        let mut inner = self.record(DeviceCall::Queue {
            handle: buffer,
            samples: samples.len(),
        });
        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(PlaybackError::device("scripted queue failure"));
        }
        if inner.pending.iter().any(|queued| queued.handle == buffer) {
            inner.double_queued = true;
            return Err(PlaybackError::device("buffer already queued"));
        }
        inner.pending.push_back(ScriptedBuffer {
            handle: buffer,
            samples: samples.len(),
            channels: format.channel_count() as usize,
            rate: sample_rate as u64 * format.channel_count() as u64,
        });
        Ok(())
    }

    fn unqueue_finished(&self) -> PlaybackResult<Vec<BufferHandle>> {
        let mut inner = self.record(DeviceCall::UnqueueFinished);
        if inner.state == PlaybackState::Playing {
            inner.finish_head();
        }
        Ok(std::mem::take(&mut inner.finished))
    }

    fn unqueue_all(&self) -> PlaybackResult<Vec<BufferHandle>> {
        let mut inner = self.record(DeviceCall::UnqueueAll);
        let mut handles = std::mem::take(&mut inner.finished);
        handles.extend(inner.pending.drain(..).map(|queued| queued.handle));
        inner.head_played = 0;
        Ok(handles)
    }

    fn release_buffers(&self, buffers: &[BufferHandle]) -> PlaybackResult<()> {
        self.record(DeviceCall::Release(buffers.len()));
        Ok(())
    }

    fn play(&self) -> PlaybackResult<()> {
        let mut inner = self.record(DeviceCall::Play);
        inner.state = if inner.pending.is_empty() {
            PlaybackState::Stopped
        } else {
            PlaybackState::Playing
        };
        Ok(())
    }

    fn pause(&self) -> PlaybackResult<()> {
        let mut inner = self.record(DeviceCall::Pause);
        if inner.state == PlaybackState::Playing {
            inner.state = PlaybackState::Paused;
        }
        Ok(())
    }

    fn stop(&self) -> PlaybackResult<()> {
        let mut inner = self.record(DeviceCall::Stop);
        let drained: Vec<_> = inner.pending.drain(..).map(|queued| queued.handle).collect();
        inner.finished.extend(drained);
        inner.head_played = 0;
        inner.state = PlaybackState::Stopped;
        Ok(())
    }

    fn status(&self) -> PlaybackState {
        let mut inner = self.record(DeviceCall::Status);
        if inner.state == PlaybackState::Playing && inner.pending.is_empty() {
            inner.state = PlaybackState::Stopped;
        }
        inner.state
    }

    fn elapsed_in_current_buffer(&self) -> Duration {
        let mut inner = self.record(DeviceCall::Elapsed);
        let Some(head) = inner.pending.front().copied() else {
            return Duration::ZERO;
        };
        if inner.state == PlaybackState::Playing {
            let last_frame = head.samples.saturating_sub(head.channels);
            inner.head_played = (inner.head_played + head.channels).min(last_frame);
        }
        Duration::from_secs_f64(inner.head_played as f64 / head.rate.max(1) as f64)
    }

    fn set_controls(&self, controls: VoiceControls) -> PlaybackResult<()> {
        self.inner.lock().controls = controls;
        Ok(())
    }

    fn controls(&self) -> VoiceControls {
        self.inner.lock().controls
    }
}

/// Source producing fixed-size chunks of a ramp, `chunks_per_pass` at a time.
///
/// `None` for the pass length means the data never ends.
#[derive(Debug)]
pub(crate) struct ChunkSource {
    pub chunk: usize,
    pub chunks_per_pass: Option<usize>,
    pub channels: u32,
    pub sample_rate: u32,
    served: usize,
    pub reads: usize,
    pub seeks: Vec<Duration>,
    pub loops: usize,
    /// Stall the first read by this long, as a slow decoder would
    first_read_delay: Option<Duration>,
}

impl ChunkSource {
    pub fn new(chunk: usize, chunks_per_pass: Option<usize>) -> Self {
        Self {
            chunk,
            chunks_per_pass,
            channels: 1,
            sample_rate: 1000,
            served: 0,
            reads: 0,
            seeks: Vec::new(),
            loops: 0,
            first_read_delay: None,
        }
    }

    pub fn with_first_read_delay(mut self, delay: Duration) -> Self {
        self.first_read_delay = Some(delay);
        self
    }

    pub fn with_format(mut self, channels: u32, sample_rate: u32) -> Self {
        self.channels = channels;
        self.sample_rate = sample_rate;
        self
    }

    /// Length of one pass in interleaved samples
    pub fn pass_samples(&self) -> Option<usize> {
        self.chunks_per_pass.map(|chunks| chunks * self.chunk)
    }
}

impl DataSource for ChunkSource {
    fn read(&mut self, buffer: &mut [i16]) -> usize {
        if let Some(delay) = self.first_read_delay.take() {
            std::thread::sleep(delay);
        }
        self.reads += 1;
        if self.chunks_per_pass.is_some_and(|chunks| self.served >= chunks) {
            return 0;
        }
        let count = self.chunk.min(buffer.len());
        for (i, sample) in buffer[..count].iter_mut().enumerate() {
            *sample = (self.served * self.chunk + i) as i16;
        }
        self.served += 1;
        count
    }

    fn seek(&mut self, offset: Duration) -> StreamResult<()> {
        self.seeks.push(offset);
        let samples = (offset.as_secs_f64() * self.sample_rate as f64) as usize
            * self.channels as usize;
        self.served = samples / self.chunk.max(1);
        Ok(())
    }

    fn channel_count(&self) -> u32 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn on_loop(&mut self) -> Option<u64> {
        self.loops += 1;
        self.served = 0;
        Some(0)
    }
}

/// A stream over a fresh scripted device, initialized from the source.
pub(crate) fn scripted_stream(
    source: ChunkSource,
) -> (SoundStream<ChunkSource>, Arc<ScriptedDevice>) {
    init_tracing();
    let device = ScriptedDevice::new();
    let channels = source.channels;
    let rate = source.sample_rate;
    let mut stream = SoundStream::from_device(device.clone(), source, test_engine())
        .expect("valid engine config");
    stream.initialize(channels, rate);
    (stream, device)
}
