//! Buffer ring shared between the streaming worker and the device.
//!
//! The engine owns exactly [`BUFFER_COUNT`] hardware buffers and rotates them:
//! a slot is filled, queued to the device, reclaimed once the device reports
//! it finished, then filled again. The ring maps the raw handles the device
//! returns back to slots and keeps the per-slot bookkeeping needed to track
//! the playing position.

use crate::playback::{
    error::{PlaybackError, PlaybackResult},
    traits::BufferHandle,
};

/// Number of hardware buffers a stream rotates through.
pub const BUFFER_COUNT: usize = 3;

/// One hardware buffer and what was last put into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    /// Device handle backing this slot
    pub handle: BufferHandle,
    /// Set when the last fill hit the end of the data; holds the sample
    /// offset the position counter resets to once the slot is reclaimed.
    pub final_slice: Option<u64>,
    /// Samples submitted by the last fill
    pub sample_count: usize,
    /// Whether the slot currently sits in the device queue
    pub queued: bool,
}

impl BufferSlot {
    const fn new(handle: BufferHandle) -> Self {
        Self {
            handle,
            final_slice: None,
            sample_count: 0,
            queued: false,
        }
    }
}

/// What reclaiming a slot means for the position counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaimed {
    /// The slot played `n` samples; add them to the counter
    Played(usize),
    /// The slot held the tail of the data; reset the counter to this offset
    FinalSlice(u64),
}

/// Fixed ring of [`BUFFER_COUNT`] slots.
#[derive(Debug, Clone)]
pub struct BufferRing {
    slots: Vec<BufferSlot>,
    last_filled: Option<usize>,
}

impl BufferRing {
    /// Build the ring over handles created by the device.
    pub fn new(handles: Vec<BufferHandle>) -> PlaybackResult<Self> {
        if handles.len() != BUFFER_COUNT {
            return Err(PlaybackError::resource(
                "buffer ring",
                format!(
                    "device created {} buffers, expected {}",
                    handles.len(),
                    BUFFER_COUNT
                ),
            ));
        }
        Ok(Self {
            slots: handles.into_iter().map(BufferSlot::new).collect(),
            last_filled: None,
        })
    }

    /// Slot index for a device handle
    pub fn index_of(&self, handle: BufferHandle) -> Option<usize> {
        self.slots.iter().position(|slot| slot.handle == handle)
    }

    pub fn slot(&self, index: usize) -> &BufferSlot {
        &self.slots[index]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All device handles, in slot order
    pub fn handles(&self) -> Vec<BufferHandle> {
        self.slots.iter().map(|slot| slot.handle).collect()
    }

    /// Number of slots currently queued to the device.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.queued).count()
    }

    /// Record that `sample_count` samples were queued from slot `index`.
    ///
    /// Fails if the slot is still queued: a slot is only refilled after the
    /// device has handed it back.
    pub fn mark_queued(&mut self, index: usize, sample_count: usize) -> PlaybackResult<()> {
        let slot = &mut self.slots[index];
        if slot.queued {
            return Err(PlaybackError::device(format!(
                "slot {} ({:?}) is already queued",
                index, slot.handle
            )));
        }
        slot.queued = true;
        slot.sample_count = sample_count;
        self.last_filled = Some(index);
        Ok(())
    }

    /// Slot holding the tail of the data when a refill of `current` found
    /// nothing left to read.
    ///
    /// That is the most recently queued slot while it is still queued;
    /// otherwise the tail has already played and `current` is used.
    pub fn tail_index(&self, current: usize) -> usize {
        match self.last_filled {
            Some(index) if index != current && self.slots[index].queued => index,
            _ => current,
        }
    }

    /// Flag slot `index` as holding the tail of the data.
    pub fn mark_final(&mut self, index: usize, resume_offset: u64) {
        self.slots[index].final_slice = Some(resume_offset);
    }

    /// Take slot `index` back from the device.
    ///
    /// Clears the final-slice mark, so a loop boundary resets the position
    /// exactly once.
    pub fn reclaim(&mut self, index: usize) -> Reclaimed {
        let slot = &mut self.slots[index];
        slot.queued = false;
        match slot.final_slice.take() {
            Some(offset) => Reclaimed::FinalSlice(offset),
            None => Reclaimed::Played(slot.sample_count),
        }
    }

    /// Forget all queue state after the device queue was drained.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.queued = false;
            slot.final_slice = None;
            slot.sample_count = 0;
        }
        self.last_filled = None;
    }
}
