//! Global memory areas and the byte-level access primitives shared with scratch

use crate::error::AddressError;
use crate::operand::{Area, Offset, Operand, Value};
use plcsim_config::CpuSpecs;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Anything operands can be resolved against
pub trait AddressSpace {
    fn fetch(&self, operand: &Operand) -> Result<Value, AddressError>;
    fn store(&mut self, operand: &Operand, value: &Value) -> Result<(), AddressError>;
}

/// Validate an access and return its byte length
pub(crate) fn check_access(
    area: Area,
    size: usize,
    offset: Offset,
    width: u32,
) -> Result<usize, AddressError> {
    if width == 0 || (width != 1 && width % 8 != 0) {
        return Err(AddressError::InvalidWidth { area, width });
    }
    if offset.bit > 7 || (width != 1 && offset.bit != 0) {
        return Err(AddressError::MisalignedBit {
            area,
            offset,
            width,
        });
    }
    let len = if width == 1 { 1 } else { (width / 8) as usize };
    let end = offset.byte as usize + len;
    if end > size {
        return Err(AddressError::OutOfRange {
            area,
            offset,
            width,
            size,
        });
    }
    Ok(len)
}

pub(crate) fn read_bits(
    area: Area,
    bytes: &[u8],
    offset: Offset,
    width: u32,
) -> Result<Value, AddressError> {
    let len = check_access(area, bytes.len(), offset, width)?;
    let start = offset.byte as usize;
    let chunk = &bytes[start..start + len];
    Ok(match width {
        1 => Value::Scalar(u32::from((chunk[0] >> offset.bit) & 1)),
        8 => Value::Scalar(u32::from(chunk[0])),
        16 => Value::Scalar(u32::from(u16::from_be_bytes([chunk[0], chunk[1]]))),
        32 => Value::Scalar(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
        _ => Value::Bytes(chunk.to_vec()),
    })
}

pub(crate) fn write_bits(
    area: Area,
    bytes: &mut [u8],
    offset: Offset,
    width: u32,
    value: &Value,
) -> Result<(), AddressError> {
    let len = check_access(area, bytes.len(), offset, width)?;
    if !value.fits(width) {
        return Err(AddressError::ValueMismatch { width });
    }
    let start = offset.byte as usize;
    let chunk = &mut bytes[start..start + len];
    match value {
        Value::Scalar(v) => match width {
            1 => {
                let mask = 1u8 << offset.bit;
                if *v != 0 {
                    chunk[0] |= mask;
                } else {
                    chunk[0] &= !mask;
                }
            }
            8 => chunk[0] = *v as u8,
            16 => chunk.copy_from_slice(&(*v as u16).to_be_bytes()),
            _ => chunk.copy_from_slice(&v.to_be_bytes()),
        },
        Value::Bytes(b) => chunk.copy_from_slice(b),
    }
    Ok(())
}

/// A global data block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub index: u16,
    bytes: Vec<u8>,
}

impl DataBlock {
    pub fn new(index: u16, size: usize) -> Self {
        Self {
            index,
            bytes: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn fetch(&self, offset: Offset, width: u32) -> Result<Value, AddressError> {
        read_bits(Area::DataBlock(self.index), &self.bytes, offset, width)
    }

    pub fn store(&mut self, offset: Offset, width: u32, value: &Value) -> Result<(), AddressError> {
        write_bits(Area::DataBlock(self.index), &mut self.bytes, offset, width, value)
    }
}

/// Process image, flags, timers, counters and data blocks
///
/// Timers and counters are 16-bit cells indexed by `offset.byte`.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    inputs: Vec<u8>,
    outputs: Vec<u8>,
    flags: Vec<u8>,
    peripheral_in: Vec<u8>,
    peripheral_out: Vec<u8>,
    timers: Vec<u16>,
    counters: Vec<u16>,
    data_blocks: BTreeMap<u16, DataBlock>,
}

impl MemoryMap {
    pub fn new(specs: &CpuSpecs) -> Self {
        Self {
            inputs: vec![0; specs.input_bytes as usize],
            outputs: vec![0; specs.output_bytes as usize],
            flags: vec![0; specs.flag_bytes as usize],
            peripheral_in: vec![0; specs.input_bytes as usize],
            peripheral_out: vec![0; specs.output_bytes as usize],
            timers: vec![0; specs.timers as usize],
            counters: vec![0; specs.counters as usize],
            data_blocks: BTreeMap::new(),
        }
    }

    /// Resize every area to `specs`, keeping existing contents where they fit
    pub fn resize(&mut self, specs: &CpuSpecs) {
        self.inputs.resize(specs.input_bytes as usize, 0);
        self.outputs.resize(specs.output_bytes as usize, 0);
        self.flags.resize(specs.flag_bytes as usize, 0);
        self.peripheral_in.resize(specs.input_bytes as usize, 0);
        self.peripheral_out.resize(specs.output_bytes as usize, 0);
        self.timers.resize(specs.timers as usize, 0);
        self.counters.resize(specs.counters as usize, 0);
    }

    /// Create (or replace) data block `index` with `size` zeroed bytes
    pub fn add_data_block(&mut self, index: u16, size: usize) -> &mut DataBlock {
        let db = DataBlock::new(index, size);
        match self.data_blocks.entry(index) {
            Entry::Occupied(mut slot) => {
                slot.insert(db);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(db),
        }
    }

    pub fn has_data_block(&self, index: u16) -> bool {
        self.data_blocks.contains_key(&index)
    }

    pub fn data_block(&self, index: u16) -> Result<&DataBlock, AddressError> {
        self.data_blocks
            .get(&index)
            .ok_or(AddressError::NoSuchDataBlock(index))
    }

    pub fn data_block_mut(&mut self, index: u16) -> Result<&mut DataBlock, AddressError> {
        self.data_blocks
            .get_mut(&index)
            .ok_or(AddressError::NoSuchDataBlock(index))
    }

    /// Check that a data block access would succeed without performing it
    pub fn check_data_block(&self, index: u16, offset: Offset, width: u32) -> Result<(), AddressError> {
        let db = self.data_block(index)?;
        check_access(Area::DataBlock(index), db.len(), offset, width).map(|_| ())
    }

    fn byte_area(&self, area: Area) -> Option<&Vec<u8>> {
        match area {
            Area::Input => Some(&self.inputs),
            Area::Output => Some(&self.outputs),
            Area::Flag => Some(&self.flags),
            Area::PeripheralIn => Some(&self.peripheral_in),
            Area::PeripheralOut => Some(&self.peripheral_out),
            _ => None,
        }
    }

    fn byte_area_mut(&mut self, area: Area) -> Option<&mut Vec<u8>> {
        match area {
            Area::Input => Some(&mut self.inputs),
            Area::Output => Some(&mut self.outputs),
            Area::Flag => Some(&mut self.flags),
            Area::PeripheralIn => Some(&mut self.peripheral_in),
            Area::PeripheralOut => Some(&mut self.peripheral_out),
            _ => None,
        }
    }

    fn cells(&self, area: Area) -> Option<&Vec<u16>> {
        match area {
            Area::Timer => Some(&self.timers),
            Area::Counter => Some(&self.counters),
            _ => None,
        }
    }

    fn cell_index(area: Area, size: usize, offset: Offset, width: u32) -> Result<usize, AddressError> {
        if width != 16 {
            return Err(AddressError::InvalidWidth { area, width });
        }
        let index = offset.byte as usize;
        if offset.bit != 0 || index >= size {
            return Err(AddressError::OutOfRange {
                area,
                offset,
                width,
                size,
            });
        }
        Ok(index)
    }

    /// Read from a frame-independent area
    ///
    /// `Local`, `OuterLocal` and `InstanceData` are resolved by the machine,
    /// which knows the active frame and the DI register.
    pub fn fetch(&self, area: Area, offset: Offset, width: u32) -> Result<Value, AddressError> {
        match area {
            Area::DataBlock(index) => self.data_block(index)?.fetch(offset, width),
            Area::Timer | Area::Counter => {
                let cells = self.cells(area).map(Vec::as_slice).unwrap_or_default();
                let index = Self::cell_index(area, cells.len(), offset, width)?;
                Ok(Value::Scalar(u32::from(cells[index])))
            }
            Area::Local | Area::OuterLocal | Area::InstanceData => Err(AddressError::NoActiveFrame),
            _ => {
                let bytes = self.byte_area(area).map(Vec::as_slice).unwrap_or_default();
                read_bits(area, bytes, offset, width)
            }
        }
    }

    pub fn store(&mut self, area: Area, offset: Offset, width: u32, value: &Value) -> Result<(), AddressError> {
        match area {
            Area::DataBlock(index) => self.data_block_mut(index)?.store(offset, width, value),
            Area::Timer | Area::Counter => {
                let cells = match area {
                    Area::Timer => &mut self.timers,
                    _ => &mut self.counters,
                };
                let index = Self::cell_index(area, cells.len(), offset, width)?;
                match value {
                    Value::Scalar(v) if *v <= 0xFFFF => {
                        cells[index] = *v as u16;
                        Ok(())
                    }
                    _ => Err(AddressError::ValueMismatch { width }),
                }
            }
            Area::Local | Area::OuterLocal | Area::InstanceData => Err(AddressError::NoActiveFrame),
            _ => match self.byte_area_mut(area) {
                Some(bytes) => write_bits(area, bytes, offset, width, value),
                None => Err(AddressError::InvalidWidth { area, width }),
            },
        }
    }
}
