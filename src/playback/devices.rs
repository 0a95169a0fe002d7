//! Audio context: backend selection, voice creation and device events.
//!
//! There is no process-wide "current device". An [`AudioContext`] is built
//! once, handed to every stream that should play through it, and dropped
//! when the application is done with audio.
//!
//! Device threads never call back into application code. They push
//! [`DeviceEvent`]s onto a bounded queue that the application drains on its
//! own schedule with [`AudioContext::poll_event`].

use super::{
    error::{PlaybackError, PlaybackResult},
    traits::{AudioBackend, DeviceInfo, PlaybackDevice, VoiceId},
    virtual_device::VirtualBackend,
};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Default capacity of the device event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What happened on a voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEventKind {
    /// Voice started consuming its queue
    Started,
    /// Voice was paused
    Paused,
    /// Voice was stopped explicitly
    Stopped,
    /// Voice ran out of queued audio while playing
    Drained,
    /// Output moved to another device
    Rerouted { device: String },
    /// Backend reported an error
    Error { details: String },
}

/// A tagged notification from a voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub voice: VoiceId,
    pub kind: DeviceEventKind,
}

/// Sending half of the event queue, handed to each voice.
///
/// Sending never blocks: when the queue is full the event is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    voice: VoiceId,
    tx: Sender<DeviceEvent>,
}

impl EventSink {
    pub(crate) const fn new(voice: VoiceId, tx: Sender<DeviceEvent>) -> Self {
        Self { voice, tx }
    }

    /// A sink whose events go nowhere, for voices used outside a context.
    pub fn detached(voice: VoiceId) -> Self {
        let (tx, _rx) = channel::bounded(1);
        Self { voice, tx }
    }

    /// Voice this sink reports for
    pub const fn voice(&self) -> VoiceId {
        self.voice
    }

    /// Push an event without blocking.
    pub fn emit(&self, kind: DeviceEventKind) {
        let event = DeviceEvent {
            voice: self.voice,
            kind,
        };
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!("Device event queue full, dropping {:?}", event);
            }
        }
    }
}

/// Explicit audio context shared by any number of streams.
pub struct AudioContext {
    backend: Arc<dyn AudioBackend>,
    selected_device: RwLock<Option<String>>,
    events_tx: Sender<DeviceEvent>,
    events_rx: Receiver<DeviceEvent>,
    next_voice: AtomicU32,
}

impl AudioContext {
    /// Create a context over `backend` with the default event capacity.
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        Self::with_event_capacity(backend, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a context with a custom event queue capacity.
    pub fn with_event_capacity(backend: impl AudioBackend + 'static, capacity: usize) -> Self {
        Self::from_backend(Arc::new(backend), capacity)
    }

    /// Create a context over an already shared backend.
    pub fn from_backend(backend: Arc<dyn AudioBackend>, capacity: usize) -> Self {
        let (events_tx, events_rx) = channel::bounded(capacity.max(1));
        tracing::debug!("Audio context created on backend '{}'", backend.name());
        Self {
            backend,
            selected_device: RwLock::new(None),
            events_tx,
            events_rx,
            next_voice: AtomicU32::new(0),
        }
    }

    /// Context over the software-clocked virtual device.
    pub fn virtual_output() -> Self {
        Self::new(VirtualBackend::default())
    }

    /// Context over the host's default audio API.
    #[cfg(feature = "playback")]
    pub fn default_output() -> Self {
        Self::new(super::cpal_device::CpalBackend::new())
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// All output devices the backend offers.
    pub fn devices(&self) -> PlaybackResult<Vec<DeviceInfo>> {
        self.backend.devices()
    }

    /// The backend's default output device, if it has one.
    pub fn default_device(&self) -> PlaybackResult<Option<DeviceInfo>> {
        Ok(self.devices()?.into_iter().find(|device| device.is_default))
    }

    /// Route voices opened from now on to the device called `name`.
    ///
    /// Voices that are already open keep their device.
    pub fn select_device(&self, name: &str) -> PlaybackResult<()> {
        let found = self.devices()?.into_iter().any(|device| device.name == name);
        if !found {
            return Err(PlaybackError::device_not_found(name));
        }

        tracing::info!("Selected output device '{}'", name);
        *self.selected_device.write() = Some(name.to_string());
        Ok(())
    }

    /// Go back to the backend's default device for new voices.
    pub fn select_default_device(&self) {
        *self.selected_device.write() = None;
    }

    /// Device new voices open on (`None` = backend default)
    pub fn selected_device(&self) -> Option<String> {
        self.selected_device.read().clone()
    }

    /// Open a new voice on the selected device.
    pub fn open_voice(&self) -> PlaybackResult<(VoiceId, Arc<dyn PlaybackDevice>)> {
        let id = VoiceId(self.next_voice.fetch_add(1, Ordering::Relaxed));
        let device = self.selected_device();
        let voice = self
            .backend
            .open_voice(device.as_deref(), EventSink::new(id, self.events_tx.clone()))?;
        tracing::debug!(
            "Opened voice {:?} on '{}'",
            id,
            device.as_deref().unwrap_or("default device")
        );
        Ok((id, voice))
    }

    /// Take the next pending device event, if any.
    pub fn poll_event(&self) -> Option<DeviceEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Take every pending device event.
    pub fn drain_events(&self) -> Vec<DeviceEvent> {
        self.events_rx.try_iter().collect()
    }
}
