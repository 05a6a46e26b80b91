//! Operands: tagged references into the machine's address spaces
//!
//! An [`Operand`] is an immutable value object. It never touches memory by
//! itself; [`Operand::resolve`] goes through an [`AddressSpace`].

use crate::block::BlockKind;
use crate::error::AddressError;
use crate::memory::AddressSpace;
use std::fmt;
use std::ops::Add;

/// Bit-granular address within one area
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset {
    pub byte: u32,
    pub bit: u8,
}

impl Offset {
    pub const fn new(byte: u32, bit: u8) -> Self {
        Self { byte, bit }
    }

    /// Byte-aligned offset
    pub const fn bytes(byte: u32) -> Self {
        Self { byte, bit: 0 }
    }

    /// Byte offsets an area pointer can carry (`0..POINTER_BYTES`)
    pub const POINTER_BYTES: u32 = 1 << 21;

    pub const fn fits_pointer(self) -> bool {
        self.byte < Self::POINTER_BYTES
    }

    /// Address part of an area pointer (`byte << 3 | bit`)
    pub const fn to_pointer(self) -> u32 {
        ((self.byte << 3) | (self.bit as u32 & 7)) & 0x00FF_FFFF
    }

    /// Inverse of [`Offset::to_pointer`]; the area byte is ignored
    pub const fn from_pointer(pointer: u32) -> Self {
        let address = pointer & 0x00FF_FFFF;
        Self {
            byte: address >> 3,
            bit: (address & 7) as u8,
        }
    }

    fn total_bits(self) -> u64 {
        u64::from(self.byte) * 8 + u64::from(self.bit)
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        let bits = self.total_bits() + rhs.total_bits();
        Offset {
            byte: (bits / 8) as u32,
            bit: (bits % 8) as u8,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.byte, self.bit)
    }
}

/// A fetched or to-be-stored datum
///
/// Widths 1, 8, 16 and 32 travel as `Scalar`; everything else (compound
/// data, 48-bit pointers) as raw big-endian `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(u32),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<u32> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Scalar(_) => None,
            Value::Bytes(b) => Some(b),
        }
    }

    /// Whether this value can be stored into a location `width` bits wide
    pub fn fits(&self, width: u32) -> bool {
        match self {
            Value::Scalar(v) => match width {
                1 => *v <= 1,
                8 => *v <= 0xFF,
                16 => *v <= 0xFFFF,
                32 => true,
                _ => false,
            },
            Value::Bytes(b) => width % 8 == 0 && b.len() as u64 * 8 == u64::from(width),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Bytes(bytes) => {
                write!(f, "B#(")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:02X}", b)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Disjoint address spaces of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Input,
    Output,
    Flag,
    /// Scratch of the active frame
    Local,
    /// Scratch of the frame that called the active frame
    OuterLocal,
    /// A global data block, always qualified with its number
    DataBlock(u16),
    /// The data block held in the DI register
    InstanceData,
    Timer,
    Counter,
    PeripheralIn,
    PeripheralOut,
}

impl Area {
    /// Areas whose meaning depends on which frame is active
    pub fn is_frame_relative(self) -> bool {
        matches!(self, Area::Local | Area::OuterLocal)
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Input => write!(f, "I"),
            Area::Output => write!(f, "Q"),
            Area::Flag => write!(f, "M"),
            Area::Local => write!(f, "L"),
            Area::OuterLocal => write!(f, "V"),
            Area::DataBlock(n) => write!(f, "DB{}", n),
            Area::InstanceData => write!(f, "DI"),
            Area::Timer => write!(f, "T"),
            Area::Counter => write!(f, "C"),
            Area::PeripheralIn => write!(f, "PI"),
            Area::PeripheralOut => write!(f, "PQ"),
        }
    }
}

/// A sized location in one area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRef {
    pub area: Area,
    pub offset: Offset,
    /// Width in bits
    pub width: u32,
    /// Referent is a struct, array, string or other multi-element type
    pub compound: bool,
}

impl MemRef {
    pub fn retag(self, area: Area) -> MemRef {
        MemRef { area, ..self }
    }
}

/// Tagged reference into one address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Immediate {
        value: Value,
        width: u32,
        compound: bool,
    },
    Memory(MemRef),
    BlockRef {
        kind: BlockKind,
        index: u16,
    },
    /// A formal parameter of the active stateless block, by declaration index
    InterfaceSlot(u32),
}

impl Operand {
    /// Scalar immediate
    pub fn immediate(value: u32, width: u32) -> Self {
        Operand::Immediate {
            value: Value::Scalar(value),
            width,
            compound: false,
        }
    }

    /// Compound immediate such as a string or date-and-time literal
    pub fn immediate_bytes(bytes: Vec<u8>) -> Self {
        let width = bytes.len() as u32 * 8;
        Operand::Immediate {
            value: Value::Bytes(bytes),
            width,
            compound: true,
        }
    }

    /// Scalar memory reference
    pub fn memory(area: Area, offset: Offset, width: u32) -> Self {
        Operand::Memory(MemRef {
            area,
            offset,
            width,
            compound: false,
        })
    }

    /// Compound memory reference
    pub fn compound(area: Area, offset: Offset, width: u32) -> Self {
        Operand::Memory(MemRef {
            area,
            offset,
            width,
            compound: true,
        })
    }

    pub fn block(kind: BlockKind, index: u16) -> Self {
        Operand::BlockRef { kind, index }
    }

    /// Whether the referent must be forwarded by pointer rather than copied
    pub fn is_compound(&self) -> bool {
        match self {
            Operand::Immediate { compound, .. } => *compound,
            Operand::Memory(m) => m.compound,
            Operand::BlockRef { .. } | Operand::InterfaceSlot(_) => false,
        }
    }

    /// Width in bits, unknown for unresolved interface slots
    pub fn width(&self) -> Option<u32> {
        match self {
            Operand::Immediate { width, .. } => Some(*width),
            Operand::Memory(m) => Some(m.width),
            Operand::BlockRef { .. } => Some(16),
            Operand::InterfaceSlot(_) => None,
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Operand::Immediate { .. })
    }

    pub fn as_memory(&self) -> Option<&MemRef> {
        match self {
            Operand::Memory(m) => Some(m),
            _ => None,
        }
    }

    /// Check the static shape of the operand
    ///
    /// Only 1-bit accesses may carry a bit offset; widths other than 1 must be
    /// byte multiples; immediates must fit their declared width.
    pub fn validate(&self) -> Result<(), AddressError> {
        match self {
            Operand::Immediate { value, width, .. } => {
                if value.fits(*width) {
                    Ok(())
                } else {
                    Err(AddressError::ValueMismatch { width: *width })
                }
            }
            Operand::Memory(m) => {
                if m.width == 0 || (m.width != 1 && m.width % 8 != 0) {
                    return Err(AddressError::InvalidWidth {
                        area: m.area,
                        width: m.width,
                    });
                }
                if m.offset.bit > 7 || (m.width != 1 && m.offset.bit != 0) {
                    return Err(AddressError::MisalignedBit {
                        area: m.area,
                        offset: m.offset,
                        width: m.width,
                    });
                }
                Ok(())
            }
            Operand::BlockRef { .. } | Operand::InterfaceSlot(_) => Ok(()),
        }
    }

    /// Fetch the concrete value this operand designates
    pub fn resolve<S: AddressSpace + ?Sized>(&self, space: &S) -> Result<Value, AddressError> {
        self.validate()?;
        space.fetch(self)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate { value, width, .. } => write!(f, "#{} ({} bits)", value, width),
            Operand::Memory(m) => {
                write!(f, "{} {} ({} bits", m.area, m.offset, m.width)?;
                if m.compound {
                    write!(f, ", compound")?;
                }
                write!(f, ")")
            }
            Operand::BlockRef { kind, index } => write!(f, "{} {}", kind, index),
            Operand::InterfaceSlot(index) => write!(f, "#P{}", index),
        }
    }
}
