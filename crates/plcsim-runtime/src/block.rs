//! Code blocks, their interfaces and call sites

use crate::operand::{Offset, Operand};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Organization,
    Function,
    FunctionBlock,
    SystemFunction,
    SystemFunctionBlock,
    DataBlock,
}

impl BlockKind {
    /// Stateful blocks keep their parameters in an instance data block
    pub fn is_stateful(self) -> bool {
        matches!(self, BlockKind::FunctionBlock | BlockKind::SystemFunctionBlock)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BlockKind::Organization => "OB",
            BlockKind::Function => "FC",
            BlockKind::FunctionBlock => "FB",
            BlockKind::SystemFunction => "SFC",
            BlockKind::SystemFunctionBlock => "SFB",
            BlockKind::DataBlock => "DB",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn is_inbound(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn is_outbound(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// One formal parameter of a block interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Declaration index, also the interface slot number
    pub index: u32,
    /// Offset within the instance data of a stateful block
    pub offset: Offset,
    /// Width in bits
    pub width: u32,
    pub compound: bool,
    /// Timer, counter and block parameters hold the referent's number
    pub by_reference: bool,
}

impl Field {
    pub fn scalar(name: impl Into<String>, index: u32, offset: Offset, width: u32) -> Self {
        Self {
            name: name.into(),
            index,
            offset,
            width,
            compound: false,
            by_reference: false,
        }
    }

    pub fn compound(name: impl Into<String>, index: u32, offset: Offset, width: u32) -> Self {
        Self {
            compound: true,
            ..Self::scalar(name, index, offset, width)
        }
    }

    pub fn by_reference(name: impl Into<String>, index: u32, offset: Offset) -> Self {
        Self {
            by_reference: true,
            ..Self::scalar(name, index, offset, 16)
        }
    }
}

/// A compiled block as far as calls are concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub index: u16,
    /// Symbolic name, empty when the block has none
    pub name: String,
    /// Bytes of declared temporaries at the bottom of the local stack
    pub temp_bytes: u32,
    pub interface: Vec<Field>,
}

impl Block {
    pub fn new(kind: BlockKind, index: u16) -> Self {
        Self {
            kind,
            index,
            name: String::new(),
            temp_bytes: 0,
            interface: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temp_bytes(mut self, bytes: u32) -> Self {
        self.temp_bytes = bytes;
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.interface.push(field);
        self
    }

    pub fn is_stateful(&self) -> bool {
        self.kind.is_stateful()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.interface.iter().find(|f| f.name == name)
    }

    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.kind, self.index)
        } else {
            format!("{} {} \"{}\"", self.kind, self.index, self.name)
        }
    }
}

/// Formal-to-actual association at one call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub field: Field,
    pub actual: Operand,
    pub direction: Direction,
}

impl ParameterBinding {
    pub fn new(field: Field, actual: Operand, direction: Direction) -> Self {
        Self {
            field,
            actual,
            direction,
        }
    }

    pub fn input(field: Field, actual: Operand) -> Self {
        Self::new(field, actual, Direction::In)
    }

    pub fn output(field: Field, actual: Operand) -> Self {
        Self::new(field, actual, Direction::Out)
    }

    pub fn in_out(field: Field, actual: Operand) -> Self {
        Self::new(field, actual, Direction::InOut)
    }
}

/// Fully described call instruction
#[derive(Debug, Clone)]
pub struct CallSite {
    pub callee: Arc<Block>,
    /// Unconditional call: no bindings, no register changes
    pub raw: bool,
    /// Instance data block for a stateful callee
    pub instance_db: Option<u16>,
    /// Offset of a nested instance; relative to the current instance base
    /// when `instance_db` is `None`
    pub nested_base: Option<Offset>,
    pub bindings: Vec<ParameterBinding>,
}

impl CallSite {
    /// Call of a stateless block
    pub fn function(callee: Arc<Block>, bindings: Vec<ParameterBinding>) -> Self {
        Self {
            callee,
            raw: false,
            instance_db: None,
            nested_base: None,
            bindings,
        }
    }

    /// Call of a stateful block with its own instance data block
    pub fn instance(callee: Arc<Block>, db: u16, bindings: Vec<ParameterBinding>) -> Self {
        Self {
            instance_db: Some(db),
            ..Self::function(callee, bindings)
        }
    }

    /// Call of a stateful block embedded in the caller's instance data
    pub fn nested(callee: Arc<Block>, offset: Offset, bindings: Vec<ParameterBinding>) -> Self {
        Self {
            nested_base: Some(offset),
            ..Self::function(callee, bindings)
        }
    }

    pub fn raw(callee: Arc<Block>) -> Self {
        Self {
            raw: true,
            ..Self::function(callee, Vec::new())
        }
    }
}
