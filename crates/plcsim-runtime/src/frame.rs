//! Call frames

use crate::block::{Block, Field};
use crate::operand::{Offset, Operand};
use crate::scratch::{ScratchAllocator, ScratchMark};
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of the address registers touched by calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    /// Number of the open shared data block
    pub db: u16,
    /// Number of the open instance data block
    pub di: u16,
    /// Area-pointer form of the current instance base
    pub ar2: u32,
}

impl Registers {
    pub fn instance_base(&self) -> Offset {
        Offset::from_pointer(self.ar2)
    }

    pub fn set_instance_base(&mut self, base: Offset) {
        self.ar2 = (0x84 << 24) | base.to_pointer();
    }
}

/// Instance data of a stateful frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRef {
    pub db: u16,
    pub base: Offset,
}

/// Where an outbound parameter's final value is read from on return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBackSource {
    /// Field in the callee's instance data
    Instance { db: u16, offset: Offset },
    /// Copy slot in the caller's local stack
    CallerScratch { offset: Offset },
}

/// Output parameter queued for copy-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundBinding {
    pub field: Field,
    /// Actual in the caller's context, interface slots already resolved
    pub actual: Operand,
    pub source: WriteBackSource,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Active,
    Exiting,
    Destroyed,
}

/// One activation of a block
///
/// Owns its scratch buffer until destroyed; the buffer then goes back to
/// the machine's pool.
#[derive(Debug)]
pub struct Frame {
    block: Arc<Block>,
    /// Instruction pointer to resume at
    pub ip: usize,
    raw: bool,
    saved: Registers,
    instance: Option<InstanceRef>,
    pub(crate) scratch: ScratchAllocator,
    outbound: Vec<OutboundBinding>,
    interface_slots: Option<HashMap<u32, Operand>>,
    caller_mark: Option<ScratchMark>,
    state: FrameState,
}

impl Frame {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        block: Arc<Block>,
        raw: bool,
        saved: Registers,
        instance: Option<InstanceRef>,
        scratch: ScratchAllocator,
        outbound: Vec<OutboundBinding>,
        interface_slots: Option<HashMap<u32, Operand>>,
        caller_mark: Option<ScratchMark>,
    ) -> Self {
        Self {
            block,
            ip: 0,
            raw,
            saved,
            instance,
            scratch,
            outbound,
            interface_slots,
            caller_mark,
            state: FrameState::Active,
        }
    }

    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Registers as they were in the caller before this frame was entered
    pub fn saved_registers(&self) -> Registers {
        self.saved
    }

    pub fn instance(&self) -> Option<InstanceRef> {
        self.instance
    }

    pub fn scratch(&self) -> &ScratchAllocator {
        &self.scratch
    }

    pub fn outbound(&self) -> &[OutboundBinding] {
        &self.outbound
    }

    /// Translated actual for interface slot `index`, if the frame has a
    /// binding map at all
    pub fn interface_slot(&self, index: u32) -> Option<&Operand> {
        self.interface_slots.as_ref()?.get(&index)
    }

    pub fn has_interface_slots(&self) -> bool {
        self.interface_slots.is_some()
    }

    pub(crate) fn caller_mark(&self) -> Option<ScratchMark> {
        self.caller_mark
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub(crate) fn begin_exit(&mut self) {
        debug_assert_eq!(self.state, FrameState::Active);
        self.state = FrameState::Exiting;
    }

    /// Tear the frame down and hand back its scratch buffer
    pub(crate) fn destroy(mut self) -> ScratchAllocator {
        debug_assert_eq!(self.state, FrameState::Exiting);
        self.state = FrameState::Destroyed;
        log::trace!("frame {} {:?}", self.block.label(), self.state);
        self.scratch
    }
}

/// Read-only view of one frame for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub block: String,
    pub ip: usize,
    pub raw: bool,
    pub instance: Option<InstanceRef>,
    pub scratch_used: u32,
}

impl From<&Frame> for FrameInfo {
    fn from(frame: &Frame) -> Self {
        Self {
            block: frame.block.label(),
            ip: frame.ip,
            raw: frame.raw,
            instance: frame.instance,
            scratch_used: frame.scratch.used(),
        }
    }
}
