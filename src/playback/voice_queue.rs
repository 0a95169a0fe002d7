//! Buffer queue shared by the device bindings.
//!
//! Models an OpenAL-style source: buffers are queued in order, the head
//! buffer is consumed through a read cursor, and consumed buffers move to a
//! finished list until the owner unqueues them.
//!
//! The reported position counts from the start of the oldest buffer the owner
//! has not unqueued yet, so it only moves back when buffers leave the queue.

use super::{
    devices::{DeviceEventKind, EventSink},
    error::{PlaybackError, PlaybackResult},
    traits::{BufferHandle, HardwareFormat, PlaybackState, VoiceControls},
};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

#[derive(Debug)]
struct QueuedBuffer {
    handle: BufferHandle,
    samples: Vec<i16>,
    channels: usize,
    sample_rate: u32,
}

impl QueuedBuffer {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Queue state behind one voice.
#[derive(Debug)]
pub struct VoiceQueue {
    allocated: HashSet<BufferHandle>,
    next_handle: u32,
    pending: VecDeque<QueuedBuffer>,
    /// Frames consumed from the head buffer
    cursor: usize,
    /// Fractional frame position used when the output rate differs
    phase: f64,
    finished: Vec<BufferHandle>,
    /// Play time of the buffers in `finished`
    finished_time: Duration,
    state: PlaybackState,
    frames_consumed: u64,
    controls: VoiceControls,
    events: EventSink,
}

impl VoiceQueue {
    pub fn new(events: EventSink) -> Self {
        Self {
            allocated: HashSet::new(),
            next_handle: 1,
            pending: VecDeque::new(),
            cursor: 0,
            phase: 0.0,
            finished: Vec::new(),
            finished_time: Duration::ZERO,
            state: PlaybackState::Stopped,
            frames_consumed: 0,
            controls: VoiceControls::default(),
            events,
        }
    }

    pub fn create_buffers(&mut self, count: usize) -> Vec<BufferHandle> {
        (0..count)
            .map(|_| {
                let handle = BufferHandle(self.next_handle);
                self.next_handle += 1;
                self.allocated.insert(handle);
                handle
            })
            .collect()
    }

    pub fn queue(
        &mut self,
        handle: BufferHandle,
        samples: &[i16],
        format: HardwareFormat,
        sample_rate: u32,
    ) -> PlaybackResult<()> {
        if !self.allocated.contains(&handle) {
            return Err(PlaybackError::UnknownBuffer(handle));
        }
        if self.is_resident(handle) {
            return Err(PlaybackError::device(format!(
                "buffer {:?} is already queued",
                handle
            )));
        }
        if sample_rate == 0 {
            return Err(PlaybackError::device("sample rate must be non-zero"));
        }

        let channels = format.channel_count() as usize;
        let usable = samples.len() - samples.len() % channels;
        self.pending.push_back(QueuedBuffer {
            handle,
            samples: samples[..usable].to_vec(),
            channels,
            sample_rate,
        });
        Ok(())
    }

    pub fn unqueue_finished(&mut self) -> Vec<BufferHandle> {
        self.finished_time = Duration::ZERO;
        std::mem::take(&mut self.finished)
    }

    pub fn unqueue_all(&mut self) -> Vec<BufferHandle> {
        self.finished_time = Duration::ZERO;
        let mut handles = std::mem::take(&mut self.finished);
        handles.extend(self.pending.drain(..).map(|buffer| buffer.handle));
        self.cursor = 0;
        self.phase = 0.0;
        handles
    }

    pub fn release(&mut self, handles: &[BufferHandle]) -> PlaybackResult<()> {
        for handle in handles {
            if self.is_resident(*handle) {
                return Err(PlaybackError::device(format!(
                    "buffer {:?} is still queued",
                    handle
                )));
            }
        }
        for handle in handles {
            if !self.allocated.remove(handle) {
                return Err(PlaybackError::UnknownBuffer(*handle));
            }
        }
        Ok(())
    }

    pub fn play(&mut self) {
        self.discard_empty_head();
        if self.pending.is_empty() {
            self.state = PlaybackState::Stopped;
            return;
        }
        if self.state != PlaybackState::Playing {
            self.state = PlaybackState::Playing;
            self.events.emit(DeviceEventKind::Started);
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            self.events.emit(DeviceEventKind::Paused);
        }
    }

    pub fn stop(&mut self) {
        self.finished
            .extend(self.pending.drain(..).map(|buffer| buffer.handle));
        self.finished_time = Duration::ZERO;
        self.cursor = 0;
        self.phase = 0.0;
        if self.state != PlaybackState::Stopped {
            self.state = PlaybackState::Stopped;
            self.events.emit(DeviceEventKind::Stopped);
        }
    }

    pub const fn status(&self) -> PlaybackState {
        self.state
    }

    pub fn elapsed_in_current_buffer(&self) -> Duration {
        let in_head = match self.pending.front() {
            Some(head) => Duration::from_secs_f64(self.cursor as f64 / head.sample_rate as f64),
            None => Duration::ZERO,
        };
        self.finished_time + in_head
    }

    pub const fn controls(&self) -> VoiceControls {
        self.controls
    }

    pub fn set_controls(&mut self, controls: VoiceControls) {
        self.controls = controls;
    }

    /// Total frames played since the voice was created.
    pub const fn frames_consumed(&self) -> u64 {
        self.frames_consumed
    }

    pub fn report_error(&self, details: impl Into<String>) {
        self.events.emit(DeviceEventKind::Error {
            details: details.into(),
        });
    }

    /// Consume queued audio for `elapsed` wall time, sped up by the pitch.
    ///
    /// Returns the part of `elapsed` too short to make up a whole frame,
    /// which the caller carries over to the next call.
    pub fn advance(&mut self, mut elapsed: Duration) -> Duration {
        let pitch = self.controls.pitch;
        while self.state == PlaybackState::Playing {
            let Some(head) = self.pending.front() else {
                self.drained();
                return Duration::ZERO;
            };

            let rate = head.sample_rate as f64 * pitch;
            let remaining = head.frames() - self.cursor;
            let wanted = (elapsed.as_secs_f64() * rate).floor() as usize;
            if wanted < remaining {
                self.cursor += wanted;
                self.frames_consumed += wanted as u64;
                return elapsed.saturating_sub(Duration::from_secs_f64(wanted as f64 / rate));
            }

            elapsed = elapsed.saturating_sub(Duration::from_secs_f64(remaining as f64 / rate));
            self.frames_consumed += remaining as u64;
            self.finish_head();
        }
        Duration::ZERO
    }

    /// Fill an interleaved f32 output buffer of `out_channels` channels
    /// running at `out_rate`.
    ///
    /// Channel counts are matched by duplicating mono, averaging down to
    /// mono, or copying the shared channels. Buffers at another rate or
    /// pitch are stepped nearest-frame. Volume scales every channel and pan
    /// weights the first two. Paused or starved voices produce silence.
    pub fn render(&mut self, out: &mut [f32], out_channels: usize, out_rate: u32) {
        if out_channels == 0 {
            return;
        }
        let (left, right) = self.controls.channel_gains();
        let step_scale = self.controls.pitch / out_rate.max(1) as f64;

        for frame in out.chunks_mut(out_channels) {
            if self.state != PlaybackState::Playing {
                frame.fill(0.0);
                continue;
            }
            let Some(head) = self.pending.front() else {
                self.drained();
                frame.fill(0.0);
                continue;
            };

            let start = self.cursor * head.channels;
            let source = &head.samples[start..start + head.channels];
            mix_frame(source, frame);
            apply_gains(frame, left, right);

            self.phase += head.sample_rate as f64 * step_scale;
            while self.phase >= 1.0 {
                self.phase -= 1.0;
                if !self.step_frame() {
                    self.phase = 0.0;
                    break;
                }
            }
        }
    }

    fn step_frame(&mut self) -> bool {
        let Some(head) = self.pending.front() else {
            return false;
        };
        self.cursor += 1;
        self.frames_consumed += 1;
        if self.cursor >= head.frames() {
            self.finish_head();
        }
        true
    }

    fn finish_head(&mut self) {
        if let Some(head) = self.pending.pop_front() {
            self.finished_time += head.duration();
            self.finished.push(head.handle);
        }
        self.cursor = 0;
        self.discard_empty_head();
        if self.pending.is_empty() {
            self.drained();
        }
    }

    fn discard_empty_head(&mut self) {
        while self.pending.front().is_some_and(|head| head.frames() == 0) {
            if let Some(head) = self.pending.pop_front() {
                self.finished.push(head.handle);
            }
        }
    }

    fn drained(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Stopped;
            self.events.emit(DeviceEventKind::Drained);
        }
    }

    fn is_resident(&self, handle: BufferHandle) -> bool {
        self.pending.iter().any(|buffer| buffer.handle == handle)
            || self.finished.contains(&handle)
    }
}

fn mix_frame(source: &[i16], out: &mut [f32]) {
    const SCALE: f32 = 1.0 / 32768.0;
    match (source.len(), out.len()) {
        (1, _) => out.fill(source[0] as f32 * SCALE),
        (n, 1) => {
            let sum: f32 = source.iter().map(|&s| s as f32 * SCALE).sum();
            out[0] = sum / n as f32;
        }
        _ => {
            for (index, sample) in out.iter_mut().enumerate() {
                *sample = source.get(index).map_or(0.0, |&s| s as f32 * SCALE);
            }
        }
    }
}

fn apply_gains(frame: &mut [f32], left: f32, right: f32) {
    // The louder side always carries the plain volume
    let volume = left.max(right);
    match frame {
        [l, r, rest @ ..] => {
            *l *= left;
            *r *= right;
            for sample in rest {
                *sample *= volume;
            }
        }
        other => {
            for sample in other {
                *sample *= volume;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::traits::VoiceId;
    use approx_eq::assert_approx_eq;

    fn queue_with(buffers: usize) -> (VoiceQueue, Vec<BufferHandle>) {
        let mut queue = VoiceQueue::new(EventSink::detached(VoiceId(0)));
        let handles = queue.create_buffers(buffers);
        (queue, handles)
    }

    #[test]
    fn test_play_on_empty_queue_stays_stopped() {
        let (mut queue, _) = queue_with(1);
        queue.play();
        assert_eq!(queue.status(), PlaybackState::Stopped);
    }

    #[test]
    fn test_double_queue_is_rejected() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[1; 10], HardwareFormat::Mono16, 10)
            .unwrap();
        assert!(
            queue
                .queue(handles[0], &[1; 10], HardwareFormat::Mono16, 10)
                .is_err()
        );
        assert!(matches!(
            queue.queue(BufferHandle(999), &[1; 10], HardwareFormat::Mono16, 10),
            Err(PlaybackError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_advance_moves_buffers_to_finished() {
        let (mut queue, handles) = queue_with(2);
        queue
            .queue(handles[0], &[0; 100], HardwareFormat::Mono16, 100)
            .unwrap();
        queue
            .queue(handles[1], &[0; 100], HardwareFormat::Mono16, 100)
            .unwrap();
        queue.play();

        let carry = queue.advance(Duration::from_millis(1500));
        assert_eq!(carry, Duration::ZERO);
        assert_eq!(queue.unqueue_finished(), vec![handles[0]]);
        assert_approx_eq!(
            queue.elapsed_in_current_buffer().as_secs_f64(),
            0.5,
            1e-9
        );
        assert_eq!(queue.status(), PlaybackState::Playing);

        queue.advance(Duration::from_secs(1));
        assert_eq!(queue.unqueue_finished(), vec![handles[1]]);
        assert_eq!(queue.status(), PlaybackState::Stopped);
        assert_eq!(queue.frames_consumed(), 200);
    }

    #[test]
    fn test_paused_queue_does_not_advance() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[0; 100], HardwareFormat::Mono16, 100)
            .unwrap();
        queue.play();
        queue.pause();
        queue.advance(Duration::from_secs(5));
        assert_eq!(queue.status(), PlaybackState::Paused);
        assert!(queue.unqueue_finished().is_empty());
    }

    #[test]
    fn test_stop_marks_everything_finished() {
        let (mut queue, handles) = queue_with(3);
        for handle in &handles {
            queue
                .queue(*handle, &[0; 8], HardwareFormat::Stereo16, 4)
                .unwrap();
        }
        queue.play();
        queue.stop();
        assert_eq!(queue.unqueue_finished(), handles);
        assert_eq!(queue.elapsed_in_current_buffer(), Duration::ZERO);
        queue.release(&handles).unwrap();
    }

    #[test]
    fn test_release_of_queued_buffer_fails() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[0; 4], HardwareFormat::Mono16, 4)
            .unwrap();
        assert!(queue.release(&handles).is_err());
        assert_eq!(queue.unqueue_all(), handles);
        queue.release(&handles).unwrap();
    }

    #[test]
    fn test_render_upmixes_mono_and_goes_silent_when_drained() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[16384, -16384], HardwareFormat::Mono16, 48000)
            .unwrap();
        queue.play();

        let mut out = [1.0f32; 6];
        queue.render(&mut out, 2, 48000);
        assert_approx_eq!(out[0] as f64, 0.5, 1e-6);
        assert_approx_eq!(out[1] as f64, 0.5, 1e-6);
        assert_approx_eq!(out[2] as f64, -0.5, 1e-6);
        assert_approx_eq!(out[3] as f64, -0.5, 1e-6);
        assert_eq!(&out[4..], &[0.0, 0.0]);
        assert_eq!(queue.status(), PlaybackState::Stopped);
        assert_eq!(queue.unqueue_finished(), handles);
    }

    #[test]
    fn test_elapsed_counts_finished_buffers_until_unqueued() {
        let (mut queue, handles) = queue_with(2);
        for handle in &handles {
            queue
                .queue(*handle, &[0; 100], HardwareFormat::Mono16, 100)
                .unwrap();
        }
        queue.play();

        queue.advance(Duration::from_millis(1250));
        assert_approx_eq!(
            queue.elapsed_in_current_buffer().as_secs_f64(),
            1.25,
            1e-9
        );
        assert_eq!(queue.unqueue_finished(), vec![handles[0]]);
        assert_approx_eq!(
            queue.elapsed_in_current_buffer().as_secs_f64(),
            0.25,
            1e-9
        );
    }

    #[test]
    fn test_volume_and_pan_weight_the_output() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[16384; 4], HardwareFormat::Mono16, 100)
            .unwrap();
        queue.set_controls(VoiceControls::default().with_volume(0.5));
        queue.play();

        let mut out = [0.0f32; 2];
        queue.render(&mut out, 2, 100);
        assert_approx_eq!(out[0] as f64, 0.25, 1e-6);
        assert_approx_eq!(out[1] as f64, 0.25, 1e-6);

        queue.set_controls(VoiceControls::default().with_pan(-1.0));
        queue.render(&mut out, 2, 100);
        assert_approx_eq!(out[0] as f64, 0.5, 1e-6);
        assert_eq!(out[1], 0.0);

        queue.set_controls(VoiceControls::default().with_pan(0.5));
        queue.render(&mut out, 2, 100);
        assert_approx_eq!(out[0] as f64, 0.25, 1e-6);
        assert_approx_eq!(out[1] as f64, 0.5, 1e-6);
    }

    #[test]
    fn test_pitch_changes_consumption_speed() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[1, 2, 3, 4, 5, 6, 7, 8], HardwareFormat::Mono16, 100)
            .unwrap();
        queue.set_controls(VoiceControls::default().with_pitch(2.0));
        queue.play();

        let mut out = [0.0f32; 2];
        queue.render(&mut out, 1, 100);
        assert_approx_eq!(out[1] as f64, 3.0 / 32768.0, 1e-9);
        assert_eq!(queue.frames_consumed(), 4);

        // 20 ms at 100 Hz and double speed is another four frames
        let carry = queue.advance(Duration::from_millis(20));
        assert_eq!(carry, Duration::ZERO);
        assert_eq!(queue.status(), PlaybackState::Stopped);
        assert_eq!(queue.frames_consumed(), 8);
    }

    #[test]
    fn test_render_downmixes_to_mono() {
        let (mut queue, handles) = queue_with(1);
        queue
            .queue(handles[0], &[16384, 0], HardwareFormat::Stereo16, 44100)
            .unwrap();
        queue.play();

        let mut out = [0.0f32; 1];
        queue.render(&mut out, 1, 44100);
        assert_approx_eq!(out[0] as f64, 0.25, 1e-6);
    }
}
