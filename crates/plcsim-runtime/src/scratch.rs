//! Per-frame scratch (local stack) allocation and the buffer pool behind it

use crate::error::AddressError;
use crate::memory::{read_bits, write_bits};
use crate::operand::{Area, Offset, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Identity of one machine, used to scope pooled buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineId(u64);

impl MachineId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        MachineId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScratchError {
    #[error("{requested} bytes of temporaries do not fit the {capacity}-byte local stack")]
    ReservationTooLarge { requested: u32, capacity: u32 },

    #[error("no room for {width} bits: {used} of {capacity} bytes in use")]
    Exhausted { width: u32, used: u32, capacity: u32 },
}

/// Restore point for [`ScratchAllocator::rewind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchMark {
    next_byte: u32,
    bit_cursor: Option<Offset>,
}

/// Bump allocator over one frame's local stack
///
/// The first `reserved` bytes belong to the block's declared temporaries.
/// Single bits pack into a shared byte, 8-bit slots are byte aligned and
/// anything wider starts on an even byte.
#[derive(Debug)]
pub struct ScratchAllocator {
    data: Vec<u8>,
    next_byte: u32,
    bit_cursor: Option<Offset>,
}

impl ScratchAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            data: vec![0; capacity as usize],
            next_byte: 0,
            bit_cursor: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    /// Bytes consumed so far, temporaries included
    pub fn used(&self) -> u32 {
        self.next_byte
    }

    /// Prepare the buffer for a new frame
    pub fn reset(&mut self, capacity: u32, reserved: u32) -> Result<(), ScratchError> {
        if reserved > capacity {
            return Err(ScratchError::ReservationTooLarge {
                requested: reserved,
                capacity,
            });
        }
        if self.data.len() != capacity as usize {
            self.data.resize(capacity as usize, 0);
        }
        self.next_byte = reserved;
        self.bit_cursor = None;
        Ok(())
    }

    pub fn allocate(&mut self, width: u32) -> Result<Offset, ScratchError> {
        if width == 1 {
            if let Some(cursor) = self.bit_cursor {
                if cursor.bit < 7 {
                    let next = Offset::new(cursor.byte, cursor.bit + 1);
                    self.bit_cursor = Some(next);
                    return Ok(next);
                }
            }
            let offset = Offset::bytes(self.take(width, 1, 1)?);
            self.bit_cursor = Some(offset);
            return Ok(offset);
        }

        let len = (width + 7) / 8;
        let align = if width > 8 { 2 } else { 1 };
        Ok(Offset::bytes(self.take(width, len, align)?))
    }

    fn take(&mut self, width: u32, len: u32, align: u32) -> Result<u32, ScratchError> {
        let start = (self.next_byte + align - 1) / align * align;
        let exhausted = ScratchError::Exhausted {
            width,
            used: self.next_byte,
            capacity: self.capacity(),
        };
        let end = start.checked_add(len).ok_or(exhausted.clone())?;
        if end > self.capacity() {
            return Err(exhausted);
        }
        self.next_byte = end;
        Ok(start)
    }

    pub fn mark(&self) -> ScratchMark {
        ScratchMark {
            next_byte: self.next_byte,
            bit_cursor: self.bit_cursor,
        }
    }

    /// Give back everything allocated after `mark`
    pub fn rewind(&mut self, mark: ScratchMark) {
        self.next_byte = mark.next_byte;
        self.bit_cursor = mark.bit_cursor;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn fetch(&self, area: Area, offset: Offset, width: u32) -> Result<Value, AddressError> {
        read_bits(area, &self.data, offset, width)
    }

    pub fn store(&mut self, area: Area, offset: Offset, width: u32, value: &Value) -> Result<(), AddressError> {
        write_bits(area, &mut self.data, offset, width, value)
    }
}

/// Free list of scratch buffers owned by one machine
///
/// Buffers are only handed back to the machine that owns the pool and only
/// retained while their capacity matches the configured one.
#[derive(Debug)]
pub struct ScratchPool {
    owner: MachineId,
    capacity: u32,
    free: Vec<ScratchAllocator>,
}

impl ScratchPool {
    pub fn new(owner: MachineId, capacity: u32) -> Self {
        Self {
            owner,
            capacity,
            free: Vec::new(),
        }
    }

    pub fn owner(&self) -> MachineId {
        self.owner
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of buffers waiting for reuse
    pub fn retained(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self, machine: MachineId) -> ScratchAllocator {
        if machine != self.owner {
            log::warn!(
                "scratch pool of {:?} asked for a buffer by {:?}; handing out an unpooled one",
                self.owner,
                machine
            );
            return ScratchAllocator::new(self.capacity);
        }
        match self.free.pop() {
            Some(buffer) => buffer,
            None => {
                log::trace!("scratch pool: allocating {}-byte buffer", self.capacity);
                ScratchAllocator::new(self.capacity)
            }
        }
    }

    pub fn release(&mut self, machine: MachineId, buffer: ScratchAllocator) {
        if machine != self.owner {
            log::debug!("dropping scratch buffer returned by foreign machine {:?}", machine);
            return;
        }
        if buffer.capacity() != self.capacity {
            log::debug!(
                "dropping stale {}-byte scratch buffer (configured {})",
                buffer.capacity(),
                self.capacity
            );
            return;
        }
        self.free.push(buffer);
    }

    /// Adopt a new capacity and flush every retained buffer
    pub fn reconfigure(&mut self, capacity: u32) {
        self.capacity = capacity;
        self.free.clear();
    }
}
