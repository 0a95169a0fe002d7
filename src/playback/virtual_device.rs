//! Software-clocked output that plays into nothing.
//!
//! Used for headless runs and tests. Queued audio is consumed at its own
//! sample rate against the wall clock, optionally sped up with
//! [`VirtualDeviceConfig::time_scale`].

use super::{
    devices::EventSink,
    error::{PlaybackError, PlaybackResult},
    traits::{
        AudioBackend, BufferHandle, DeviceInfo, HardwareFormat, PlaybackDevice, PlaybackState,
        VoiceControls,
    },
    voice_queue::VoiceQueue,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Name the virtual backend reports for its only device.
pub const VIRTUAL_DEVICE_NAME: &str = "virtual";

/// Configuration for [`VirtualDevice`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct VirtualDeviceConfig {
    /// Playback speed relative to the wall clock (1.0 = real time)
    pub time_scale: f64,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

impl VirtualDeviceConfig {
    /// Play `factor` times faster than real time.
    pub fn with_time_scale(mut self, factor: f64) -> Self {
        self.time_scale = factor;
        self
    }

    pub(crate) fn validate(&self) -> PlaybackResult<()> {
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(PlaybackError::device(format!(
                "time scale must be positive, got {}",
                self.time_scale
            )));
        }
        Ok(())
    }
}

struct Clocked {
    queue: VoiceQueue,
    last_tick: Instant,
}

/// A voice that consumes its queue against the wall clock.
pub struct VirtualDevice {
    inner: Mutex<Clocked>,
    time_scale: f64,
}

impl VirtualDevice {
    /// Create a voice reporting events to `events`.
    pub fn new(config: VirtualDeviceConfig, events: EventSink) -> PlaybackResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(Clocked {
                queue: VoiceQueue::new(events),
                last_tick: Instant::now(),
            }),
            time_scale: config.time_scale,
        })
    }

    /// Total frames played since creation.
    pub fn frames_consumed(&self) -> u64 {
        let mut inner = self.inner.lock();
        self.tick(&mut inner);
        inner.queue.frames_consumed()
    }

    fn tick(&self, inner: &mut Clocked) {
        let now = Instant::now();
        let elapsed = now
            .saturating_duration_since(inner.last_tick)
            .mul_f64(self.time_scale);
        let carry = inner.queue.advance(elapsed);
        inner.last_tick = now
            .checked_sub(carry.div_f64(self.time_scale))
            .unwrap_or(now);
    }

    fn with_queue<R>(&self, f: impl FnOnce(&mut VoiceQueue) -> R) -> R {
        let mut inner = self.inner.lock();
        self.tick(&mut inner);
        f(&mut inner.queue)
    }
}

impl PlaybackDevice for VirtualDevice {
    fn create_buffers(&self, count: usize) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.with_queue(|queue| queue.create_buffers(count)))
    }

    fn queue(
        &self,
        buffer: BufferHandle,
        samples: &[i16],
        format: HardwareFormat,
        sample_rate: u32,
    ) -> PlaybackResult<()> {
        self.with_queue(|queue| queue.queue(buffer, samples, format, sample_rate))
    }

    fn unqueue_finished(&self) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.with_queue(VoiceQueue::unqueue_finished))
    }

    fn unqueue_all(&self) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.with_queue(VoiceQueue::unqueue_all))
    }

    fn release_buffers(&self, buffers: &[BufferHandle]) -> PlaybackResult<()> {
        self.with_queue(|queue| queue.release(buffers))
    }

    fn play(&self) -> PlaybackResult<()> {
        let mut inner = self.inner.lock();
        self.tick(&mut inner);
        inner.queue.play();
        inner.last_tick = Instant::now();
        Ok(())
    }

    fn pause(&self) -> PlaybackResult<()> {
        self.with_queue(VoiceQueue::pause);
        Ok(())
    }

    fn stop(&self) -> PlaybackResult<()> {
        self.with_queue(VoiceQueue::stop);
        Ok(())
    }

    fn status(&self) -> PlaybackState {
        self.with_queue(|queue| queue.status())
    }

    fn elapsed_in_current_buffer(&self) -> Duration {
        self.with_queue(|queue| queue.elapsed_in_current_buffer())
    }

    fn set_controls(&self, controls: VoiceControls) -> PlaybackResult<()> {
        // Time up to now is consumed at the old pitch
        self.with_queue(|queue| queue.set_controls(controls));
        Ok(())
    }

    fn controls(&self) -> VoiceControls {
        self.inner.lock().queue.controls()
    }
}

/// Backend offering a single [`VirtualDevice`] output.
#[derive(Debug, Clone, Default)]
pub struct VirtualBackend {
    config: VirtualDeviceConfig,
}

impl VirtualBackend {
    pub fn new(config: VirtualDeviceConfig) -> Self {
        Self { config }
    }
}

impl AudioBackend for VirtualBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn devices(&self) -> PlaybackResult<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            name: VIRTUAL_DEVICE_NAME.to_string(),
            is_default: true,
        }])
    }

    fn open_voice(
        &self,
        device: Option<&str>,
        events: EventSink,
    ) -> PlaybackResult<Arc<dyn PlaybackDevice>> {
        if let Some(name) = device {
            if name != VIRTUAL_DEVICE_NAME {
                return Err(PlaybackError::device_not_found(name));
            }
        }
        Ok(Arc::new(VirtualDevice::new(self.config.clone(), events)?))
    }
}
