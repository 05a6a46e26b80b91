//! Machine state: registers, memory, the call stack and frame push/pop

use crate::binding::{BindingPlan, StagedWrite};
use crate::block::{Block, CallSite, Field};
use crate::error::{AddressError, CallError, CallSiteInfo, WriteBackFailure};
use crate::frame::{Frame, FrameInfo, InstanceRef, OutboundBinding, Registers, WriteBackSource};
use crate::memory::{AddressSpace, MemoryMap};
use crate::operand::{Area, MemRef, Operand, Value};
use crate::pointer::{PointerDescriptor, POINTER_WIDTH};
use crate::scratch::{MachineId, ScratchAllocator, ScratchMark, ScratchPool};
use plcsim_config::{ConfigResult, CpuSpecs};
use std::sync::Arc;

/// One simulated CPU
///
/// Owns the call stack, the address registers, global memory and the pool
/// of scratch buffers frames are built from.
#[derive(Debug)]
pub struct MachineState {
    id: MachineId,
    specs: CpuSpecs,
    pub(crate) registers: Registers,
    pub(crate) frames: Vec<Frame>,
    pub(crate) memory: MemoryMap,
    pool: ScratchPool,
}

impl MachineState {
    pub fn new(specs: CpuSpecs) -> Self {
        let id = MachineId::next();
        Self {
            id,
            specs,
            registers: Registers::default(),
            frames: Vec::new(),
            memory: MemoryMap::new(&specs),
            pool: ScratchPool::new(id, specs.local_bytes),
        }
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn specs(&self) -> &CpuSpecs {
        &self.specs
    }

    pub fn registers(&self) -> Registers {
        self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Open a shared data block (load the DB register)
    pub fn open_data_block(&mut self, index: u16) -> Result<(), AddressError> {
        self.memory.data_block(index)?;
        self.registers.db = index;
        Ok(())
    }

    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryMap {
        &mut self.memory
    }

    pub fn pool(&self) -> &ScratchPool {
        &self.pool
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Frames from the root to the active one
    pub fn call_stack(&self) -> Vec<FrameInfo> {
        self.frames.iter().map(FrameInfo::from).collect()
    }

    /// Start a scan cycle: drop any leftover frames, clear the registers and
    /// enter `block` as the root frame
    pub fn begin_cycle(&mut self, block: Arc<Block>) -> Result<(), CallError> {
        if !self.frames.is_empty() {
            log::debug!("discarding {} frame(s) left from the previous cycle", self.frames.len());
        }
        while let Some(mut frame) = self.frames.pop() {
            frame.begin_exit();
            let scratch = frame.destroy();
            self.pool.release(self.id, scratch);
        }
        self.registers = Registers::default();
        log::debug!("cycle start: {}", block.label());
        self.push_frame(&CallSite::raw(block))
    }

    /// Adopt new CPU dimensions
    ///
    /// Flushes the scratch pool; buffers of frames still on the stack are
    /// dropped instead of pooled when those frames return.
    pub fn reconfigure(&mut self, specs: CpuSpecs) -> ConfigResult<()> {
        specs.validate()?;
        log::info!(
            "reconfiguring: {} local bytes, call depth {}",
            specs.local_bytes,
            specs.max_call_depth
        );
        self.pool.reconfigure(specs.local_bytes);
        self.memory.resize(&specs);
        self.specs = specs;
        Ok(())
    }

    fn site_info(&self, site: &CallSite) -> CallSiteInfo {
        let caller = self.frames.last();
        CallSiteInfo {
            caller: caller.map(|f| f.block().label()),
            ip: caller.map_or(0, |f| f.ip),
            callee: site.callee.label(),
        }
    }

    fn instance_for(&self, site: &CallSite, info: &CallSiteInfo) -> Result<Option<InstanceRef>, CallError> {
        if !site.callee.is_stateful() {
            return Ok(None);
        }
        if site.raw {
            return Ok(Some(InstanceRef {
                db: self.registers.di,
                base: self.registers.instance_base(),
            }));
        }
        let instance = match (site.instance_db, site.nested_base) {
            (Some(db), base) => InstanceRef {
                db,
                base: base.unwrap_or_default(),
            },
            (None, Some(offset)) => InstanceRef {
                db: self.registers.di,
                base: self.registers.instance_base() + offset,
            },
            (None, None) => {
                return Err(CallError::MissingInstance { site: info.clone() });
            }
        };
        if !instance.base.fits_pointer() {
            return Err(CallError::Address {
                site: info.clone(),
                field: None,
                source: AddressError::InvalidPointer(format!(
                    "instance base {} is beyond the area pointer range",
                    instance.base
                )),
            });
        }
        if !self.memory.has_data_block(instance.db) {
            return Err(CallError::Address {
                site: info.clone(),
                field: None,
                source: AddressError::NoSuchDataBlock(instance.db),
            });
        }
        Ok(Some(instance))
    }

    /// Undo the caller-side effects of a push that did not complete
    fn abort_push(&mut self, caller_mark: Option<ScratchMark>, scratch: ScratchAllocator) {
        if let (Some(mark), Some(caller)) = (caller_mark, self.frames.last_mut()) {
            caller.scratch.rewind(mark);
        }
        self.pool.release(self.id, scratch);
    }

    fn apply(&mut self, write: StagedWrite) -> Result<(), AddressError> {
        match write {
            StagedWrite::CallerScratch { offset, width, value } => self
                .frames
                .last_mut()
                .ok_or(AddressError::NoActiveFrame)?
                .scratch
                .store(Area::Local, offset, width, &value),
            StagedWrite::Instance {
                db,
                offset,
                width,
                value,
            } => self.memory.store(Area::DataBlock(db), offset, width, &value),
        }
    }

    /// Enter the block named by `site`
    ///
    /// Either the new frame is on top of the stack with every parameter
    /// bound, or an error is returned and the machine is as it was.
    pub fn push_frame(&mut self, site: &CallSite) -> Result<(), CallError> {
        let info = self.site_info(site);
        if self.frames.len() >= self.specs.max_call_depth {
            return Err(CallError::CallDepthExceeded {
                site: info,
                limit: self.specs.max_call_depth,
            });
        }
        let instance = self.instance_for(site, &info)?;

        let mut scratch = self.pool.acquire(self.id);
        if let Err(source) = scratch.reset(self.specs.local_bytes, site.callee.temp_bytes) {
            self.pool.release(self.id, scratch);
            return Err(CallError::OutOfScratchSpace {
                site: info,
                field: None,
                source,
            });
        }

        let caller_mark = self.frames.last().map(|f| f.scratch.mark());
        let planned = match (site.raw, instance) {
            (true, _) => Ok(BindingPlan::default()),
            (false, Some(instance)) => self.plan_instance_call(site, &info, instance),
            (false, None) => self.plan_function_call(site, &info),
        };
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                self.abort_push(caller_mark, scratch);
                return Err(e);
            }
        };

        let saved = self.registers;
        if !site.raw {
            if let Some(instance) = instance {
                self.registers.db = saved.di;
                self.registers.di = instance.db;
                self.registers.set_instance_base(instance.base);
            }
            if let Some(db) = plan.open_db {
                self.registers.db = db;
            }
        }

        // Ranges and value widths were checked while planning
        for write in plan.writes {
            if let Err(source) = self.apply(write) {
                self.registers = saved;
                self.abort_push(caller_mark, scratch);
                return Err(CallError::Address {
                    site: info,
                    field: None,
                    source,
                });
            }
        }

        let slots = (!site.raw && instance.is_none()).then_some(plan.slots);
        log::trace!("{} (depth {})", info, self.frames.len() + 1);
        self.frames.push(Frame::new(
            Arc::clone(&site.callee),
            site.raw,
            saved,
            instance,
            scratch,
            plan.outbound,
            slots,
            caller_mark,
        ));
        Ok(())
    }

    fn read_outbound(&self, outbound: &OutboundBinding) -> Result<Value, AddressError> {
        match outbound.source {
            WriteBackSource::Instance { db, offset } => {
                self.memory.data_block(db)?.fetch(offset, outbound.width)
            }
            WriteBackSource::CallerScratch { offset } => self
                .frames
                .last()
                .ok_or(AddressError::NoActiveFrame)?
                .scratch
                .fetch(Area::Local, offset, outbound.width),
        }
    }

    /// Leave the active frame
    ///
    /// Outbound values are collected from the callee side, the caller's
    /// registers are restored and then each value is stored into its actual.
    /// A failed store does not stop the others or the teardown; all failures
    /// are reported together once the frame is gone.
    pub fn pop_frame(&mut self) -> Result<(), CallError> {
        let mut frame = self.frames.pop().ok_or(CallError::EmptyCallStack)?;
        frame.begin_exit();
        let block = frame.block().label();

        let mut failures = Vec::new();
        if !frame.is_raw() {
            let values: Vec<_> = frame
                .outbound()
                .iter()
                .map(|outbound| self.read_outbound(outbound))
                .collect();
            self.registers = frame.saved_registers();

            for (outbound, value) in frame.outbound().iter().zip(values) {
                if let Err(source) = value.and_then(|v| self.store(&outbound.actual, &v)) {
                    log::warn!(
                        "{}: write-back of {} to {} failed: {}",
                        block,
                        outbound.field.name,
                        outbound.actual,
                        source
                    );
                    failures.push(WriteBackFailure {
                        field: outbound.field.name.clone(),
                        actual: outbound.actual.to_string(),
                        source,
                    });
                }
            }
        }

        if let (Some(mark), Some(caller)) = (frame.caller_mark(), self.frames.last_mut()) {
            caller.scratch.rewind(mark);
        }
        let scratch = frame.destroy();
        self.pool.release(self.id, scratch);
        log::trace!("return from {} (depth {})", block, self.frames.len());

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CallError::WriteBackFailed { block, failures })
        }
    }

    /// Translated actual bound to parameter `index` of the active frame
    pub fn resolve_interface_slot(&self, index: u32) -> Result<Operand, CallError> {
        let frame = self.frames.last().ok_or(CallError::EmptyCallStack)?;
        frame
            .interface_slot(index)
            .cloned()
            .ok_or_else(|| CallError::UnresolvedInterfaceSlot {
                block: frame.block().label(),
                ip: frame.ip,
                index,
            })
    }

    /// The active instance's copy of `field`
    pub fn field_operand(&self, field: &Field) -> Operand {
        Operand::Memory(MemRef {
            area: Area::DataBlock(self.registers.di),
            offset: self.registers.instance_base() + field.offset,
            width: field.width,
            compound: field.compound,
        })
    }

    pub fn fetch_field(&self, field: &Field) -> Result<Value, AddressError> {
        self.fetch(&self.field_operand(field))
    }

    pub fn store_field(&mut self, field: &Field, value: &Value) -> Result<(), AddressError> {
        let operand = self.field_operand(field);
        self.store(&operand, value)
    }

    /// Location reached through the pointer slot of a compound in-out field
    pub fn field_pointer(&self, field: &Field) -> Result<Operand, AddressError> {
        let slot = Operand::memory(
            Area::DataBlock(self.registers.di),
            self.registers.instance_base() + field.offset,
            POINTER_WIDTH,
        );
        self.deref_pointer(&slot, field.width, field.compound)
    }

    /// Follow the pointer stored at `pointer`
    pub fn deref_pointer(&self, pointer: &Operand, width: u32, compound: bool) -> Result<Operand, AddressError> {
        let value = self.fetch(pointer)?;
        PointerDescriptor::from_value(&value)?.target(width, compound)
    }

    fn outer_frame(&self) -> Result<&Frame, AddressError> {
        match self.frames.len() {
            0 => Err(AddressError::NoActiveFrame),
            1 => Err(AddressError::NoOuterFrame),
            n => Ok(&self.frames[n - 2]),
        }
    }

    fn outer_frame_mut(&mut self) -> Result<&mut Frame, AddressError> {
        match self.frames.len() {
            0 => Err(AddressError::NoActiveFrame),
            1 => Err(AddressError::NoOuterFrame),
            n => Ok(&mut self.frames[n - 2]),
        }
    }

    fn slot_operand(&self, index: u32) -> Result<Operand, AddressError> {
        self.frames
            .last()
            .and_then(|f| f.interface_slot(index))
            .cloned()
            .ok_or(AddressError::UnboundInterfaceSlot(index))
    }

    fn fetch_memory(&self, m: &MemRef) -> Result<Value, AddressError> {
        match m.area {
            Area::Local => self
                .frames
                .last()
                .ok_or(AddressError::NoActiveFrame)?
                .scratch
                .fetch(Area::Local, m.offset, m.width),
            Area::OuterLocal => self
                .outer_frame()?
                .scratch
                .fetch(Area::OuterLocal, m.offset, m.width),
            Area::InstanceData => {
                self.memory
                    .fetch(Area::DataBlock(self.registers.di), m.offset, m.width)
            }
            area => self.memory.fetch(area, m.offset, m.width),
        }
    }

    fn store_memory(&mut self, m: &MemRef, value: &Value) -> Result<(), AddressError> {
        match m.area {
            Area::Local => self
                .frames
                .last_mut()
                .ok_or(AddressError::NoActiveFrame)?
                .scratch
                .store(Area::Local, m.offset, m.width, value),
            Area::OuterLocal => self
                .outer_frame_mut()?
                .scratch
                .store(Area::OuterLocal, m.offset, m.width, value),
            Area::InstanceData => {
                let di = self.registers.di;
                self.memory.store(Area::DataBlock(di), m.offset, m.width, value)
            }
            area => self.memory.store(area, m.offset, m.width, value),
        }
    }
}

impl AddressSpace for MachineState {
    fn fetch(&self, operand: &Operand) -> Result<Value, AddressError> {
        match operand {
            Operand::Immediate { value, .. } => Ok(value.clone()),
            Operand::BlockRef { index, .. } => Ok(Value::Scalar(u32::from(*index))),
            Operand::InterfaceSlot(index) => {
                let resolved = self.slot_operand(*index)?;
                self.fetch(&resolved)
            }
            Operand::Memory(m) => self.fetch_memory(m),
        }
    }

    fn store(&mut self, operand: &Operand, value: &Value) -> Result<(), AddressError> {
        match operand {
            Operand::Immediate { .. } | Operand::BlockRef { .. } => Err(AddressError::ImmediateStore),
            Operand::InterfaceSlot(index) => {
                let resolved = self.slot_operand(*index)?;
                self.store(&resolved, value)
            }
            Operand::Memory(m) => self.store_memory(m, value),
        }
    }
}
