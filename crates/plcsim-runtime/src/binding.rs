//! Parameter translation
//!
//! A call is bound in two steps. Planning resolves every actual in the
//! caller's context, allocates copy slots in the caller's local stack and
//! stages all writes; nothing observable changes yet. Committing (in
//! [`crate::machine`]) applies the staged writes and switches registers.
//! A failed plan is undone by rewinding the caller's local stack.

use crate::block::{CallSite, Direction, Field, ParameterBinding};
use crate::error::{AddressError, CallError, CallSiteInfo};
use crate::frame::{InstanceRef, OutboundBinding, WriteBackSource};
use crate::machine::MachineState;
use crate::operand::{Area, MemRef, Offset, Operand, Value};
use crate::pointer::{PointerArea, PointerDescriptor, POINTER_WIDTH};
use crate::scratch::ScratchError;
use std::collections::HashMap;

/// How an actual reaches a stateless callee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// The callee addresses the actual itself
    Direct,
    /// The caller's `L` location, seen as `V` from the callee
    AliasOuterLocal(MemRef),
    /// Value copied into a fresh slot of the caller's local stack
    Copy,
    /// Value copied, the callee receives a pointer to the copy
    CopyBehindPointer,
    /// The callee receives a pointer to the actual
    Pointer(MemRef),
    /// The actual is the caller's own parameter; resolve and translate again
    Forward(u32),
    Unsupported(&'static str),
}

/// Translation table for stateless callees
pub fn function_translation(actual: &Operand) -> Translation {
    match actual {
        Operand::Immediate {
            compound: false, ..
        } => Translation::Copy,
        Operand::Immediate { compound: true, .. } => Translation::CopyBehindPointer,
        Operand::BlockRef { .. } => Translation::Direct,
        Operand::InterfaceSlot(index) => Translation::Forward(*index),
        Operand::Memory(m) => match (m.area, m.compound) {
            (
                Area::Input
                | Area::Output
                | Area::Flag
                | Area::Timer
                | Area::Counter
                | Area::PeripheralIn
                | Area::PeripheralOut,
                _,
            ) => Translation::Direct,
            (Area::Local, false) => Translation::AliasOuterLocal(m.retag(Area::OuterLocal)),
            (Area::Local, true) => Translation::Pointer(*m),
            (Area::OuterLocal, false) => Translation::Copy,
            (Area::OuterLocal, true) => {
                Translation::Unsupported("compound outer local data cannot be forwarded")
            }
            (Area::DataBlock(_) | Area::InstanceData, false) => Translation::Copy,
            (Area::DataBlock(_) | Area::InstanceData, true) => Translation::Pointer(*m),
        },
    }
}

/// How an inbound actual lands in a stateful callee's instance data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceTransfer {
    /// Value copied into the field
    Value,
    /// Timer, counter or block number stored in the field
    Reference,
    /// Pointer to the actual stored in the field's pointer slot
    Pointer,
    Unsupported(&'static str),
}

/// Translation table for stateful callees
pub fn instance_transfer(field: &Field, direction: Direction, actual: &Operand) -> InstanceTransfer {
    if field.compound && direction == Direction::InOut {
        return match actual {
            Operand::Memory(m) if PointerDescriptor::for_caller_location(m, 0).is_some() => {
                InstanceTransfer::Pointer
            }
            _ => InstanceTransfer::Unsupported("compound in-out parameters need an addressable actual"),
        };
    }
    if field.by_reference {
        return match actual {
            Operand::Memory(MemRef {
                area: Area::Timer | Area::Counter,
                ..
            })
            | Operand::BlockRef { .. } => InstanceTransfer::Reference,
            _ => InstanceTransfer::Unsupported("reference parameters need a timer, counter or block"),
        };
    }
    InstanceTransfer::Value
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StagedWrite {
    CallerScratch {
        offset: Offset,
        width: u32,
        value: Value,
    },
    Instance {
        db: u16,
        offset: Offset,
        width: u32,
        value: Value,
    },
}

/// Everything a call will change, computed before anything is changed
#[derive(Debug, Default)]
pub(crate) struct BindingPlan {
    pub(crate) writes: Vec<StagedWrite>,
    pub(crate) outbound: Vec<OutboundBinding>,
    pub(crate) slots: HashMap<u32, Operand>,
    /// Shared data block to open on entry
    pub(crate) open_db: Option<u16>,
}

fn unsupported(
    site: &CallSiteInfo,
    binding: &ParameterBinding,
    actual: &Operand,
    reason: &str,
) -> CallError {
    CallError::UnsupportedBindingCombination {
        site: site.clone(),
        field: binding.field.name.clone(),
        actual: actual.to_string(),
        reason: reason.to_string(),
    }
}

fn address(site: &CallSiteInfo, binding: &ParameterBinding, source: AddressError) -> CallError {
    CallError::Address {
        site: site.clone(),
        field: Some(binding.field.name.clone()),
        source,
    }
}

fn out_of_scratch(site: &CallSiteInfo, binding: &ParameterBinding, source: ScratchError) -> CallError {
    CallError::OutOfScratchSpace {
        site: site.clone(),
        field: Some(binding.field.name.clone()),
        source,
    }
}

/// Bindings in declaration order, each carrying the callee's own
/// declaration of its formal
fn ordered_bindings(site: &CallSite, info: &CallSiteInfo) -> Result<Vec<ParameterBinding>, CallError> {
    let mut ordered = Vec::with_capacity(site.bindings.len());
    for binding in &site.bindings {
        let declared = site.callee.field(&binding.field.name).ok_or_else(|| {
            unsupported(
                info,
                binding,
                &binding.actual,
                "not a parameter of the called block",
            )
        })?;
        ordered.push(ParameterBinding::new(
            declared.clone(),
            binding.actual.clone(),
            binding.direction,
        ));
    }
    ordered.sort_by_key(|b| b.field.index);
    if let Some(pair) = ordered
        .windows(2)
        .find(|pair| pair[0].field.index == pair[1].field.index)
    {
        return Err(unsupported(
            info,
            &pair[1],
            &pair[1].actual,
            "parameter is bound more than once",
        ));
    }
    Ok(ordered)
}

fn reference_number(actual: &Operand) -> u32 {
    match actual {
        Operand::BlockRef { index, .. } => u32::from(*index),
        Operand::Memory(m) => m.offset.byte,
        _ => 0,
    }
}

impl MachineState {
    pub(crate) fn plan_function_call(
        &mut self,
        site: &CallSite,
        info: &CallSiteInfo,
    ) -> Result<BindingPlan, CallError> {
        let mut plan = BindingPlan::default();
        for binding in &ordered_bindings(site, info)? {
            let translated = self.translate_for_function(info, binding, &binding.actual, &mut plan)?;
            log::trace!("  {} <- {}", binding.field.name, translated);
            plan.slots.insert(binding.field.index, translated);
        }
        Ok(plan)
    }

    fn translate_for_function(
        &mut self,
        info: &CallSiteInfo,
        binding: &ParameterBinding,
        actual: &Operand,
        plan: &mut BindingPlan,
    ) -> Result<Operand, CallError> {
        match function_translation(actual) {
            Translation::Direct => Ok(actual.clone()),
            Translation::AliasOuterLocal(target) => Ok(Operand::Memory(target)),
            Translation::Copy => {
                let copy = self.copy_to_caller_scratch(info, binding, actual, plan)?;
                Ok(Operand::Memory(copy))
            }
            Translation::CopyBehindPointer => {
                let copy = self.copy_to_caller_scratch(info, binding, actual, plan)?;
                let pointer = PointerDescriptor {
                    db: 0,
                    area: PointerArea::OuterLocal,
                    offset: copy.offset,
                };
                self.pointer_in_caller_scratch(info, binding, pointer, plan)
            }
            Translation::Pointer(target) => {
                let pointer = PointerDescriptor::for_caller_location(&target, self.registers.di)
                    .ok_or_else(|| unsupported(info, binding, actual, "location cannot be forwarded"))?;
                self.pointer_in_caller_scratch(info, binding, pointer, plan)
            }
            Translation::Forward(index) => {
                let resolved = self.resolve_interface_slot(index)?;
                if matches!(resolved, Operand::InterfaceSlot(_)) {
                    return Err(unsupported(info, binding, actual, "interface slot resolves to another slot"));
                }
                self.translate_for_function(info, binding, &resolved, plan)
            }
            Translation::Unsupported(reason) => Err(unsupported(info, binding, actual, reason)),
        }
    }

    fn allocate_in_caller(
        &mut self,
        info: &CallSiteInfo,
        binding: &ParameterBinding,
        width: u32,
    ) -> Result<Offset, CallError> {
        let caller = self
            .frames
            .last_mut()
            .ok_or_else(|| address(info, binding, AddressError::NoActiveFrame))?;
        caller
            .scratch
            .allocate(width)
            .map_err(|e| out_of_scratch(info, binding, e))
    }

    fn copy_to_caller_scratch(
        &mut self,
        info: &CallSiteInfo,
        binding: &ParameterBinding,
        actual: &Operand,
        plan: &mut BindingPlan,
    ) -> Result<MemRef, CallError> {
        let value = actual
            .resolve(&*self)
            .map_err(|e| address(info, binding, e))?;
        let width = actual.width().unwrap_or(binding.field.width);
        let offset = self.allocate_in_caller(info, binding, width)?;

        plan.writes.push(StagedWrite::CallerScratch {
            offset,
            width,
            value,
        });
        if binding.direction.is_outbound() && !actual.is_immediate() {
            plan.outbound.push(OutboundBinding {
                field: binding.field.clone(),
                actual: actual.clone(),
                source: WriteBackSource::CallerScratch { offset },
                width,
            });
        }
        if let Operand::Memory(MemRef {
            area: Area::DataBlock(db),
            ..
        }) = actual
        {
            plan.open_db = Some(*db);
        }

        Ok(MemRef {
            area: Area::OuterLocal,
            offset,
            width,
            compound: false,
        })
    }

    fn pointer_in_caller_scratch(
        &mut self,
        info: &CallSiteInfo,
        binding: &ParameterBinding,
        pointer: PointerDescriptor,
        plan: &mut BindingPlan,
    ) -> Result<Operand, CallError> {
        let offset = self.allocate_in_caller(info, binding, POINTER_WIDTH)?;
        plan.writes.push(StagedWrite::CallerScratch {
            offset,
            width: POINTER_WIDTH,
            value: pointer.to_value(),
        });
        Ok(Operand::memory(Area::OuterLocal, offset, POINTER_WIDTH))
    }

    pub(crate) fn plan_instance_call(
        &mut self,
        site: &CallSite,
        info: &CallSiteInfo,
        instance: InstanceRef,
    ) -> Result<BindingPlan, CallError> {
        let mut plan = BindingPlan::default();
        for binding in &ordered_bindings(site, info)? {
            let actual = match &binding.actual {
                Operand::InterfaceSlot(index) => self.resolve_interface_slot(*index)?,
                other => other.clone(),
            };
            let field = &binding.field;
            let field_offset = instance.base + field.offset;

            let transfer = instance_transfer(field, binding.direction, &actual);
            let staged = match transfer {
                InstanceTransfer::Unsupported(reason) => {
                    return Err(unsupported(info, binding, &actual, reason))
                }
                InstanceTransfer::Value => {
                    if actual.width() != Some(field.width) {
                        return Err(unsupported(
                            info,
                            binding,
                            &actual,
                            "width differs from the formal parameter",
                        ));
                    }
                    if binding.direction.is_inbound() {
                        let value = actual.resolve(&*self).map_err(|e| address(info, binding, e))?;
                        Some((field.width, value))
                    } else {
                        None
                    }
                }
                InstanceTransfer::Reference => binding
                    .direction
                    .is_inbound()
                    .then(|| (field.width, Value::Scalar(reference_number(&actual)))),
                InstanceTransfer::Pointer => {
                    let pointer = actual
                        .as_memory()
                        .and_then(|m| PointerDescriptor::for_caller_location(m, self.registers.di))
                        .ok_or_else(|| unsupported(info, binding, &actual, "location cannot be forwarded"))?;
                    Some((POINTER_WIDTH, pointer.to_value()))
                }
            };

            if let Some((width, value)) = staged {
                self.memory
                    .check_data_block(instance.db, field_offset, width)
                    .map_err(|e| address(info, binding, e))?;
                if !value.fits(width) {
                    return Err(address(info, binding, AddressError::ValueMismatch { width }));
                }
                plan.writes.push(StagedWrite::Instance {
                    db: instance.db,
                    offset: field_offset,
                    width,
                    value,
                });
            }

            if binding.direction.is_outbound() && transfer == InstanceTransfer::Value {
                if !matches!(actual, Operand::Memory(_)) {
                    return Err(unsupported(
                        info,
                        binding,
                        &actual,
                        "output parameters need a writable actual",
                    ));
                }
                self.memory
                    .check_data_block(instance.db, field_offset, field.width)
                    .map_err(|e| address(info, binding, e))?;
                plan.outbound.push(OutboundBinding {
                    field: field.clone(),
                    actual,
                    source: WriteBackSource::Instance {
                        db: instance.db,
                        offset: field_offset,
                    },
                    width: field.width,
                });
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use rstest::rstest;

    fn mem(area: Area, compound: bool) -> Operand {
        Operand::Memory(MemRef {
            area,
            offset: Offset::bytes(4),
            width: 16,
            compound,
        })
    }

    #[rstest]
    #[case(mem(Area::Input, false), Translation::Direct)]
    #[case(mem(Area::Flag, true), Translation::Direct)]
    #[case(mem(Area::Timer, false), Translation::Direct)]
    #[case(mem(Area::PeripheralOut, false), Translation::Direct)]
    #[case(Operand::block(BlockKind::DataBlock, 4), Translation::Direct)]
    #[case(Operand::immediate(7, 16), Translation::Copy)]
    #[case(Operand::immediate_bytes(vec![1, 2]), Translation::CopyBehindPointer)]
    #[case(mem(Area::OuterLocal, false), Translation::Copy)]
    #[case(mem(Area::DataBlock(3), false), Translation::Copy)]
    #[case(mem(Area::InstanceData, false), Translation::Copy)]
    #[case(Operand::InterfaceSlot(2), Translation::Forward(2))]
    fn test_function_translation(#[case] actual: Operand, #[case] expected: Translation) {
        assert_eq!(function_translation(&actual), expected);
    }

    #[test]
    fn test_local_scalar_is_aliased_as_outer_local() {
        match function_translation(&mem(Area::Local, false)) {
            Translation::AliasOuterLocal(target) => {
                assert_eq!(target.area, Area::OuterLocal);
                assert_eq!(target.offset, Offset::bytes(4));
            }
            other => panic!("unexpected translation {:?}", other),
        }
    }

    #[rstest]
    #[case(Area::Local)]
    #[case(Area::DataBlock(9))]
    #[case(Area::InstanceData)]
    fn test_compound_memory_goes_by_pointer(#[case] area: Area) {
        assert!(matches!(function_translation(&mem(area, true)), Translation::Pointer(_)));
    }

    #[test]
    fn test_compound_outer_local_is_rejected() {
        assert!(matches!(
            function_translation(&mem(Area::OuterLocal, true)),
            Translation::Unsupported(_)
        ));
    }

    #[test]
    fn test_instance_transfer() {
        let inout = Field::compound("BUF", 0, Offset::bytes(0), 64);
        let timer = Field::by_reference("TMR", 1, Offset::bytes(6));
        let word = Field::scalar("W", 2, Offset::bytes(8), 16);

        assert_eq!(
            instance_transfer(&inout, Direction::InOut, &mem(Area::DataBlock(1), true)),
            InstanceTransfer::Pointer
        );
        assert!(matches!(
            instance_transfer(&inout, Direction::InOut, &Operand::immediate(1, 16)),
            InstanceTransfer::Unsupported(_)
        ));
        assert!(matches!(
            instance_transfer(&inout, Direction::InOut, &mem(Area::OuterLocal, true)),
            InstanceTransfer::Unsupported(_)
        ));
        assert_eq!(
            instance_transfer(&timer, Direction::In, &mem(Area::Timer, false)),
            InstanceTransfer::Reference
        );
        assert!(matches!(
            instance_transfer(&timer, Direction::In, &mem(Area::Flag, false)),
            InstanceTransfer::Unsupported(_)
        ));
        assert_eq!(
            instance_transfer(&word, Direction::InOut, &mem(Area::Flag, false)),
            InstanceTransfer::Value
        );
    }
}
