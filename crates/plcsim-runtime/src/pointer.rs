//! Six-byte DB pointers used to forward compound parameters
//!
//! Layout: a big-endian data block number (0 when the target is not in a
//! data block) followed by a 32-bit area pointer whose top byte is the area
//! code and whose low 24 bits hold `byte << 3 | bit`.

use crate::error::AddressError;
use crate::operand::{Area, MemRef, Offset, Operand, Value};

/// Width of an encoded pointer in bits
pub const POINTER_WIDTH: u32 = 48;

/// Area codes in the top byte of an area pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PointerArea {
    Periphery = 0x80,
    Input = 0x81,
    Output = 0x82,
    Flag = 0x83,
    DataBlock = 0x84,
    InstanceData = 0x85,
    Local = 0x86,
    OuterLocal = 0x87,
}

impl PointerArea {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x80 => PointerArea::Periphery,
            0x81 => PointerArea::Input,
            0x82 => PointerArea::Output,
            0x83 => PointerArea::Flag,
            0x84 => PointerArea::DataBlock,
            0x85 => PointerArea::InstanceData,
            0x86 => PointerArea::Local,
            0x87 => PointerArea::OuterLocal,
            _ => return None,
        })
    }
}

/// Decoded DB pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerDescriptor {
    pub db: u16,
    pub area: PointerArea,
    pub offset: Offset,
}

impl PointerDescriptor {
    /// Pointer that lets a callee reach `target`, a location named in the
    /// caller's context
    ///
    /// The caller's `L` becomes the callee's `V` and `DI` is pinned to the
    /// data block number currently in the DI register. Returns `None` for
    /// areas that cannot be forwarded (the caller's own `V`, timers,
    /// counters and peripherals) and for offsets beyond the pointer range.
    pub fn for_caller_location(target: &MemRef, di: u16) -> Option<Self> {
        if !target.offset.fits_pointer() {
            return None;
        }
        let (db, area) = match target.area {
            Area::Input => (0, PointerArea::Input),
            Area::Output => (0, PointerArea::Output),
            Area::Flag => (0, PointerArea::Flag),
            Area::Local => (0, PointerArea::OuterLocal),
            Area::DataBlock(n) => (n, PointerArea::DataBlock),
            Area::InstanceData => (di, PointerArea::DataBlock),
            Area::OuterLocal
            | Area::Timer
            | Area::Counter
            | Area::PeripheralIn
            | Area::PeripheralOut => return None,
        };
        Some(Self {
            db,
            area,
            offset: target.offset,
        })
    }

    pub fn area_pointer(&self) -> u32 {
        (u32::from(self.area.code()) << 24) | self.offset.to_pointer()
    }

    pub fn encode(&self) -> [u8; 6] {
        let db = self.db.to_be_bytes();
        let ptr = self.area_pointer().to_be_bytes();
        [db[0], db[1], ptr[0], ptr[1], ptr[2], ptr[3]]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; 6] = bytes.try_into().map_err(|_| {
            AddressError::InvalidPointer(format!("expected 6 bytes, got {}", bytes.len()))
        })?;
        let area = PointerArea::from_code(bytes[2]).ok_or_else(|| {
            AddressError::InvalidPointer(format!("unknown area code {:#04X}", bytes[2]))
        })?;
        let pointer = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        Ok(Self {
            db: u16::from_be_bytes([bytes[0], bytes[1]]),
            area,
            offset: Offset::from_pointer(pointer),
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Bytes(self.encode().to_vec())
    }

    pub fn from_value(value: &Value) -> Result<Self, AddressError> {
        match value {
            Value::Bytes(bytes) => Self::decode(bytes),
            Value::Scalar(_) => Err(AddressError::InvalidPointer(
                "a scalar is not a pointer".to_string(),
            )),
        }
    }

    /// Operand designating the pointed-to location, as seen by the block
    /// that received the pointer
    pub fn target(&self, width: u32, compound: bool) -> Result<Operand, AddressError> {
        let area = match self.area {
            PointerArea::Periphery => Area::PeripheralIn,
            PointerArea::Input => Area::Input,
            PointerArea::Output => Area::Output,
            PointerArea::Flag => Area::Flag,
            PointerArea::DataBlock if self.db == 0 => {
                return Err(AddressError::InvalidPointer(
                    "data block pointer without a block number".to_string(),
                ))
            }
            PointerArea::DataBlock => Area::DataBlock(self.db),
            PointerArea::InstanceData => Area::InstanceData,
            PointerArea::Local => Area::Local,
            PointerArea::OuterLocal => Area::OuterLocal,
        };
        Ok(Operand::Memory(MemRef {
            area,
            offset: self.offset,
            width,
            compound,
        }))
    }
}
