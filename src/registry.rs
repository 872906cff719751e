//! Integer handle table for objects shared across the API boundary.
//!
//! A handle packs a slot index (low bits) and the slot's generation (high
//! bits). Released slots are reused oldest first, and each reuse bumps the
//! generation, so a stale handle never resolves to the slot's new occupant.
//! It stays recognisable as released, which makes a repeated close a no-op.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::channels::ChannelInfoBuilder;
use crate::error::{CntError, Result};
use crate::metadata::RecordingInfoBuilder;
use crate::session::FileSession;

/// Opaque handle returned by the API layer.
pub type Handle = i32;

/// Returned in place of a handle when an operation fails.
pub const INVALID_HANDLE: Handle = -1;

const INDEX_BITS: u32 = 20;
const INDEX_MASK: i32 = (1 << INDEX_BITS) - 1;
const MAX_SLOTS: usize = 1 << INDEX_BITS;
// 31 位正数中剩余的高位
const GENERATION_MASK: u32 = (1 << (31 - INDEX_BITS)) - 1;

/// Kind of object behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    File,
    ChannelInfo,
    RecordingInfo,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::File => write!(f, "file session"),
            HandleKind::ChannelInfo => write!(f, "channel info builder"),
            HandleKind::RecordingInfo => write!(f, "recording info builder"),
        }
    }
}

/// Object owned by the registry.
#[derive(Debug)]
pub enum Entry {
    File(Arc<FileSession>),
    ChannelInfo(ChannelInfoBuilder),
    RecordingInfo(RecordingInfoBuilder),
}

impl Entry {
    pub fn kind(&self) -> HandleKind {
        match self {
            Entry::File(_) => HandleKind::File,
            Entry::ChannelInfo(_) => HandleKind::ChannelInfo,
            Entry::RecordingInfo(_) => HandleKind::RecordingInfo,
        }
    }
}

#[derive(Debug)]
enum State {
    Occupied(Entry),
    /// Taken out by an operation that either retires or restores it.
    CheckedOut,
    Released,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: State,
}

#[derive(Debug, Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: VecDeque<usize>,
    live: usize,
}

fn encode(index: usize, generation: u32) -> Handle {
    ((generation as i32) << INDEX_BITS) | index as i32
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles, checked-out ones included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn alloc(&mut self, entry: Entry) -> Result<Handle> {
        let handle = match self.free.pop_front() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = (slot.generation + 1) & GENERATION_MASK;
                slot.state = State::Occupied(entry);
                encode(index, slot.generation)
            }
            None => {
                let index = self.slots.len();
                if index >= MAX_SLOTS {
                    return Err(CntError::InvalidArgument("handle table exhausted".to_string()));
                }
                self.slots.push(Slot { generation: 0, state: State::Occupied(entry) });
                encode(index, 0)
            }
        };
        self.live += 1;
        Ok(handle)
    }

    /// Slot index of `handle`, if it was ever issued for a slot in the table.
    fn slot(&self, handle: Handle) -> Option<(usize, &Slot)> {
        if handle < 0 {
            return None;
        }
        let index = (handle & INDEX_MASK) as usize;
        self.slots.get(index).map(|slot| (index, slot))
    }

    fn generation_of(handle: Handle) -> u32 {
        (handle >> INDEX_BITS) as u32
    }

    /// Index of the slot `handle` currently names, if its generation matches.
    fn current(&self, handle: Handle) -> Result<usize> {
        match self.slot(handle) {
            Some((index, slot)) if slot.generation == Self::generation_of(handle) => Ok(index),
            _ => Err(CntError::InvalidHandle(handle)),
        }
    }

    pub fn get(&self, handle: Handle) -> Result<&Entry> {
        match &self.slots[self.current(handle)?].state {
            State::Occupied(entry) => Ok(entry),
            _ => Err(CntError::InvalidHandle(handle)),
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Entry> {
        let index = self.current(handle)?;
        match &mut self.slots[index].state {
            State::Occupied(entry) => Ok(entry),
            _ => Err(CntError::InvalidHandle(handle)),
        }
    }

    /// True if `handle` was issued and has since been released, whether or
    /// not its slot has been reused.
    pub fn is_released(&self, handle: Handle) -> bool {
        match self.slot(handle) {
            Some((_, slot)) if slot.generation == Self::generation_of(handle) => {
                matches!(slot.state, State::Released)
            }
            // 旧代次: 该槽位已被复用
            Some((_, slot)) => Self::generation_of(handle) < slot.generation,
            None => false,
        }
    }

    /// Fails with `TypeMismatch` unless `handle` holds a `kind` object.
    pub fn check(&self, handle: Handle, kind: HandleKind) -> Result<()> {
        let actual = self.get(handle)?.kind();
        if actual != kind {
            return Err(CntError::TypeMismatch { handle, expected: kind, actual });
        }
        Ok(())
    }

    pub fn file(&self, handle: Handle) -> Result<Arc<FileSession>> {
        match self.get(handle)? {
            Entry::File(session) => Ok(Arc::clone(session)),
            other => Err(mismatch(handle, HandleKind::File, other)),
        }
    }

    pub fn channel_info_mut(&mut self, handle: Handle) -> Result<&mut ChannelInfoBuilder> {
        match self.get_mut(handle)? {
            Entry::ChannelInfo(builder) => Ok(builder),
            other => Err(mismatch(handle, HandleKind::ChannelInfo, other)),
        }
    }

    pub fn recording_info_mut(&mut self, handle: Handle) -> Result<&mut RecordingInfoBuilder> {
        match self.get_mut(handle)? {
            Entry::RecordingInfo(builder) => Ok(builder),
            other => Err(mismatch(handle, HandleKind::RecordingInfo, other)),
        }
    }

    /// Takes a `kind` entry out while keeping its handle reserved. Until
    /// [`restore`](Self::restore) or [`retire`](Self::retire), the handle
    /// resolves to `InvalidHandle`.
    pub fn checkout(&mut self, handle: Handle, kind: HandleKind) -> Result<Entry> {
        self.check(handle, kind)?;
        let index = self.current(handle)?;
        match std::mem::replace(&mut self.slots[index].state, State::CheckedOut) {
            State::Occupied(entry) => Ok(entry),
            other => {
                self.slots[index].state = other;
                Err(CntError::InvalidHandle(handle))
            }
        }
    }

    /// Puts a checked-out entry back under its original handle.
    pub fn restore(&mut self, handle: Handle, entry: Entry) -> Result<()> {
        let index = self.current(handle)?;
        let slot = &mut self.slots[index];
        if !matches!(slot.state, State::CheckedOut) {
            return Err(CntError::InvalidHandle(handle));
        }
        slot.state = State::Occupied(entry);
        Ok(())
    }

    /// Releases a checked-out handle for good.
    pub fn retire(&mut self, handle: Handle) -> Result<()> {
        let index = self.current(handle)?;
        if !matches!(self.slots[index].state, State::CheckedOut) {
            return Err(CntError::InvalidHandle(handle));
        }
        self.slots[index].state = State::Released;
        self.free.push_back(index);
        self.live -= 1;
        Ok(())
    }

    /// Removes the entry behind `handle` and queues the slot for reuse.
    pub fn release(&mut self, handle: Handle) -> Result<Entry> {
        let index = self.current(handle)?;
        match std::mem::replace(&mut self.slots[index].state, State::Released) {
            State::Occupied(entry) => {
                self.free.push_back(index);
                self.live -= 1;
                Ok(entry)
            }
            other => {
                self.slots[index].state = other;
                Err(CntError::InvalidHandle(handle))
            }
        }
    }

    /// Releases every live entry, lowest slot first. Checked-out entries are
    /// left to their owners.
    pub fn drain(&mut self) -> Vec<(Handle, Entry)> {
        let mut out = Vec::with_capacity(self.live);
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if let State::Occupied(_) = slot.state {
                if let State::Occupied(entry) = std::mem::replace(&mut slot.state, State::Released) {
                    out.push((encode(index, slot.generation), entry));
                    self.free.push_back(index);
                    self.live -= 1;
                }
            }
        }
        out
    }
}

fn mismatch(handle: Handle, expected: HandleKind, actual: &Entry) -> CntError {
    CntError::TypeMismatch { handle, expected, actual: actual.kind() }
}
