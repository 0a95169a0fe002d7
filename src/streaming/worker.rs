//! The streaming worker: a dedicated thread that keeps the device fed.
//!
//! Each pass of the loop asks the device which buffers it has finished,
//! reclaims them into the ring, refills them from the data source and queues
//! them again. The loop ends when the controller clears `is_streaming` or
//! when the data runs out without looping and the device has played
//! everything that was queued.

use super::{
    buffers::{BUFFER_COUNT, BufferRing, Reclaimed},
    traits::DataSource,
};
use crate::playback::{
    error::PlaybackResult,
    traits::{HardwareFormat, PlaybackDevice, PlaybackState},
};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Name given to worker threads.
pub const WORKER_THREAD_NAME: &str = "audio-stream-worker";

/// State shared between a stream's controller and its worker.
pub(crate) struct StreamShared<S> {
    pub source: Mutex<S>,
    pub device: Arc<dyn PlaybackDevice>,
    pub is_streaming: AtomicBool,
    pub looping: AtomicBool,
    /// Interleaved samples known to have finished playing
    pub samples_processed: AtomicU64,
    /// Held while finished buffers move from the device clock into
    /// `samples_processed`, so readers never see one without the other
    pub position: Mutex<()>,
    /// Serialises start-state changes with the matching device call
    pub transport: Mutex<()>,
    start_state: AtomicU8,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl<S> StreamShared<S> {
    pub fn new(source: S, device: Arc<dyn PlaybackDevice>) -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            source: Mutex::new(source),
            device,
            is_streaming: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            samples_processed: AtomicU64::new(0),
            position: Mutex::new(()),
            transport: Mutex::new(()),
            start_state: AtomicU8::new(PlaybackState::Stopped.as_u8()),
            wake_tx,
            wake_rx,
        }
    }

    pub fn start_state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.start_state.load(Ordering::Acquire))
    }

    pub fn set_start_state(&self, state: PlaybackState) {
        self.start_state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Acquire)
    }

    /// Interrupt the worker's sleep so it sees a cleared `is_streaming` now.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn sleep(&self, interval: Duration) {
        let _ = self.wake_rx.recv_timeout(interval);
    }

    fn clear_wakeups(&self) {
        while self.wake_rx.try_recv().is_ok() {}
    }
}

/// Fixed parameters for one worker run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WorkerParams {
    pub format: HardwareFormat,
    pub sample_rate: u32,
    /// Interleaved samples requested per slot fill
    pub chunk_samples: usize,
    pub processing_interval: Duration,
    pub loop_retries: usize,
}

/// Launch a worker thread.
pub(crate) fn spawn<S: DataSource + 'static>(
    shared: Arc<StreamShared<S>>,
    params: WorkerParams,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(&shared, params))
}

fn run<S: DataSource>(shared: &StreamShared<S>, params: WorkerParams) {
    if shared.start_state() == PlaybackState::Stopped {
        shared.is_streaming.store(false, Ordering::Release);
        return;
    }
    shared.clear_wakeups();

    let device = shared.device.as_ref();
    let handles = match device.create_buffers(BUFFER_COUNT) {
        Ok(handles) => handles,
        Err(err) => {
            tracing::error!("Failed to create stream buffers: {}", err);
            shared.is_streaming.store(false, Ordering::Release);
            return;
        }
    };
    let ring = match BufferRing::new(handles.clone()) {
        Ok(ring) => ring,
        Err(err) => {
            tracing::error!("{}", err);
            log_failure(device.release_buffers(&handles), "release buffers");
            shared.is_streaming.store(false, Ordering::Release);
            return;
        }
    };

    tracing::debug!(
        "Stream worker started ({} Hz, {:?}, {} samples per slot)",
        params.sample_rate,
        params.format,
        params.chunk_samples
    );

    let mut worker = Worker {
        shared,
        device,
        params,
        idle: (0..ring.len()).collect(),
        ring,
        scratch: vec![0; params.chunk_samples],
        request_stop: false,
    };

    worker.refill_idle();
    {
        // The controller may have paused while the first buffers were filling
        let _transport = shared.transport.lock();
        log_failure(device.play(), "start playback");
        if shared.start_state() == PlaybackState::Paused {
            log_failure(device.pause(), "pause playback");
        }
    }

    worker.stream();
    worker.finish();
}

struct Worker<'a, S> {
    shared: &'a StreamShared<S>,
    device: &'a dyn PlaybackDevice,
    params: WorkerParams,
    ring: BufferRing,
    /// Slots not queued to the device, in the order they should be filled
    idle: VecDeque<usize>,
    scratch: Vec<i16>,
    request_stop: bool,
}

impl<S: DataSource> Worker<'_, S> {
    fn stream(&mut self) {
        while self.shared.is_streaming() {
            if self.device.status() == PlaybackState::Stopped {
                if self.request_stop {
                    // Everything queued has played
                    self.shared.is_streaming.store(false, Ordering::Release);
                    break;
                }
                tracing::warn!("Stream underrun: device ran dry, resuming playback");
                log_failure(self.device.play(), "resume playback");
            }

            self.reclaim_finished();
            self.refill_idle();

            let draining =
                self.request_stop && self.device.status() == PlaybackState::Stopped;
            if !draining {
                self.shared.sleep(self.params.processing_interval);
            }
        }
    }

    fn reclaim_finished(&mut self) {
        let _position = self.shared.position.lock();
        let finished = match self.device.unqueue_finished() {
            Ok(finished) => finished,
            Err(err) => {
                tracing::warn!("Failed to unqueue finished buffers: {}", err);
                return;
            }
        };
        for handle in finished {
            let Some(index) = self.ring.index_of(handle) else {
                tracing::warn!("Device returned unknown buffer {:?}", handle);
                continue;
            };
            self.reclaim(index);
        }
    }

    fn reclaim(&mut self, index: usize) {
        let processed = &self.shared.samples_processed;
        match self.ring.reclaim(index) {
            Reclaimed::Played(count) => {
                processed.fetch_add(count as u64, Ordering::Relaxed);
            }
            Reclaimed::FinalSlice(offset) => {
                tracing::trace!("Final slice reclaimed, position reset to {}", offset);
                processed.store(offset, Ordering::Relaxed);
            }
        }
        tracing::trace!("Reclaimed slot {}", index);
        self.idle.push_back(index);
    }

    /// Give every idle slot one fill attempt.
    fn refill_idle(&mut self) {
        for _ in 0..self.idle.len() {
            if self.request_stop {
                break;
            }
            let Some(index) = self.idle.pop_front() else {
                break;
            };
            if self.fill_and_push(index) {
                self.request_stop = true;
            }
        }
    }

    /// Record where the data ends: the position resets to `offset` once the
    /// slot holding the tail comes back.
    fn mark_tail(&mut self, index: usize, offset: u64) {
        let tail = self.ring.tail_index(index);
        if tail == index {
            // Nothing is queued, so the position can move now
            self.shared.samples_processed.store(offset, Ordering::Relaxed);
        } else {
            self.ring.mark_final(tail, offset);
        }
    }

    /// Refill slot `index` and queue it. Returns true when the stream
    /// should stop.
    fn fill_and_push(&mut self, index: usize) -> bool {
        let mut wraps = 0;
        loop {
            let count = self.shared.source.lock().read(&mut self.scratch);
            if count > 0 {
                self.push(index, count);
                return false;
            }

            let looping = self.shared.looping.load(Ordering::Relaxed);
            if !looping || wraps >= self.params.loop_retries {
                if wraps == 0 {
                    self.mark_tail(index, 0);
                } else {
                    tracing::warn!("Looping source produced no data after rewinding");
                }
                tracing::debug!("End of stream data");
                self.idle.push_back(index);
                return true;
            }

            let resume = self.shared.source.lock().on_loop();
            match resume {
                Some(offset) => {
                    tracing::debug!("Looping stream back to sample {}", offset);
                    self.mark_tail(index, offset);
                    wraps += 1;
                }
                None => {
                    tracing::debug!("Source cannot loop, ending stream");
                    self.mark_tail(index, 0);
                    self.idle.push_back(index);
                    return true;
                }
            }
        }
    }

    fn push(&mut self, index: usize, count: usize) {
        let handle = self.ring.slot(index).handle;
        let samples = &self.scratch[..count];
        match self
            .device
            .queue(handle, samples, self.params.format, self.params.sample_rate)
        {
            Ok(()) => {
                if let Err(err) = self.ring.mark_queued(index, count) {
                    tracing::warn!("{}", err);
                }
                tracing::trace!("Queued {} samples from slot {}", count, index);
            }
            Err(err) => {
                tracing::warn!("Failed to queue slot {}: {}", index, err);
                self.idle.push_back(index);
            }
        }
    }

    fn finish(&mut self) {
        log_failure(self.device.stop(), "stop playback");
        if let Err(err) = self.device.unqueue_all() {
            tracing::warn!("Failed to drain device queue: {}", err);
        }
        self.ring.reset();
        log_failure(
            self.device.release_buffers(&self.ring.handles()),
            "release buffers",
        );
        self.shared.samples_processed.store(0, Ordering::Relaxed);
        tracing::debug!("Stream worker exited");
    }
}

fn log_failure(result: PlaybackResult<()>, action: &str) {
    if let Err(err) = result {
        tracing::warn!("Failed to {}: {}", action, err);
    }
}
