//! plcsim Runtime - call frames and parameter binding for an S7-style VM
//!
//! This library provides the call machinery of the simulated CPU:
//! - Operands and the address spaces they resolve against
//! - Per-frame local stacks with a reusable buffer pool
//! - Parameter translation for stateless and stateful callees
//! - Transactional frame push and pop with output write-back

/// plcsim runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod binding;
pub mod block;
pub mod error;
pub mod frame;
pub mod machine;
pub mod memory;
pub mod operand;
pub mod pointer;
pub mod scratch;

// Re-export commonly used types
pub use block::{Block, BlockKind, CallSite, Direction, Field, ParameterBinding};
pub use error::{AddressError, CallError, CallSiteInfo, WriteBackFailure};
pub use frame::{Frame, FrameInfo, FrameState, InstanceRef, Registers};
pub use machine::MachineState;
pub use memory::{AddressSpace, DataBlock, MemoryMap};
pub use operand::{Area, MemRef, Offset, Operand, Value};
pub use pointer::{PointerArea, PointerDescriptor, POINTER_WIDTH};
pub use plcsim_config::CpuSpecs;
pub use scratch::{MachineId, ScratchAllocator, ScratchError, ScratchPool};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
