//! Shared test utilities
//!
//! Builds a machine with a running root frame and a few data blocks so that
//! call tests can focus on the call itself.

#![allow(dead_code)]

use plcsim_runtime::{
    AddressSpace, Block, BlockKind, CpuSpecs, Field, MachineState, Offset, Operand, Registers,
    Value,
};
use std::sync::Arc;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

/// Shared data block present in every test machine
pub const SHARED_DB: u16 = 3;
/// First of three instance data blocks (20, 21, 22)
pub const INSTANCE_DB: u16 = 20;
/// Declared temporaries of the root block
pub const ROOT_TEMP: u32 = 32;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Machine with default dimensions, inside OB 1
pub fn machine() -> MachineState {
    machine_with(CpuSpecs::default(), ROOT_TEMP)
}

pub fn machine_with(specs: CpuSpecs, root_temp: u32) -> MachineState {
    init_logging();
    let mut machine = MachineState::new(specs);
    machine.memory_mut().add_data_block(SHARED_DB, 64);
    for db in INSTANCE_DB..INSTANCE_DB + 3 {
        machine.memory_mut().add_data_block(db, 64);
    }
    machine
        .begin_cycle(Arc::new(
            Block::new(BlockKind::Organization, 1).with_temp_bytes(root_temp),
        ))
        .unwrap();
    machine
}

pub fn function(index: u16, fields: Vec<Field>) -> Arc<Block> {
    fields
        .into_iter()
        .fold(Block::new(BlockKind::Function, index), Block::with_field)
        .into()
}

pub fn function_block(index: u16, fields: Vec<Field>) -> Arc<Block> {
    fields
        .into_iter()
        .fold(Block::new(BlockKind::FunctionBlock, index), Block::with_field)
        .into()
}

/// 16-bit scalar parameter at byte `byte` of the instance data
pub fn word(name: &str, index: u32, byte: u32) -> Field {
    Field::scalar(name, index, Offset::bytes(byte), 16)
}

pub fn fetch(machine: &MachineState, operand: &Operand) -> Value {
    machine
        .fetch(operand)
        .unwrap_or_else(|e| panic!("fetch of {} failed: {}", operand, e))
}

pub fn store(machine: &mut MachineState, operand: &Operand, value: u32) {
    machine
        .store(operand, &Value::Scalar(value))
        .unwrap_or_else(|e| panic!("store to {} failed: {}", operand, e));
}

/// Everything a call is allowed to change, as seen from the active frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub registers: Registers,
    pub depth: usize,
    pub scratch_used: u32,
    pub scratch: Vec<u8>,
    pub shared: Vec<u8>,
    pub instances: Vec<Vec<u8>>,
}

pub fn snapshot(machine: &MachineState) -> Snapshot {
    let frame = machine.current_frame().expect("no active frame");
    let memory = machine.memory();
    Snapshot {
        registers: machine.registers(),
        depth: machine.depth(),
        scratch_used: frame.scratch().used(),
        scratch: frame.scratch().bytes().to_vec(),
        shared: memory.data_block(SHARED_DB).unwrap().bytes().to_vec(),
        instances: (INSTANCE_DB..INSTANCE_DB + 3)
            .map(|db| memory.data_block(db).unwrap().bytes().to_vec())
            .collect(),
    }
}
