/*!
  Block storage with up to four units.

  The program fills the parameter registers, then writes an operation code to `OP`. Operations
  complete immediately; the outcome lands in `STATUS` and, in interrupt mode, raises the device's
  interrupt. Data moves between a unit and the device's own 512 byte `DATA` buffer, which the
  program reads and writes through the bus like any other register.

  | operation | parameters                                          | results             |
  |-----------|-----------------------------------------------------|---------------------|
  | READ      | P0 unit, P1/P2 position (low/high), P3 byte count   | R0 bytes read       |
  | WRITE     | P0 unit, P1/P2 position (low/high), P3 byte count   | R0 bytes written    |
  | SIZE      | P0 unit                                             | R0/R1 size low/high |

  Transfers are word aligned: the position and the byte count must both be multiples of
  `ALIGNMENT`.

  Problems are reported through `STATUS` only: a unit that does not exist is `UNAVAILABLE`, a
  transfer that is misaligned or does not fit the unit or the buffer is `ADDRESS_ERROR`, and a
  unit failing its I/O is `PHYSICAL_ERROR`. `WAITING` is never seen, since every operation
  completes before the write to `OP` returns.
*/

use std::any::Any;

use super::{byte_lane, set_byte_lane, Device, DeviceType, HEADER_SIZE};
use crate::error::DeviceError;

pub const MAX_UNITS: usize = 4;

pub const STG_MODE      : u32 = 0x10;
pub const STG_STATUS    : u32 = 0x11;
pub const STG_UNIT_LIST : u32 = 0x12;
pub const STG_OP        : u32 = 0x13;
pub const STG_P0        : u32 = 0x14;
pub const STG_R0        : u32 = 0x34;
pub const STG_R1        : u32 = 0x38;
pub const STG_DATA      : u32 = 0x200;

const PARAMETER_COUNT : usize = 8;
const RESULT_COUNT    : usize = 2;
pub const DATA_SIZE   : usize = 512;
pub const ALIGNMENT   : u64   = 4;

pub const OP_READ  : u8 = 0x1;
pub const OP_WRITE : u8 = 0x2;
pub const OP_SIZE  : u8 = 0x3;

pub const MODE_POLL      : u8 = 0x0;
pub const MODE_INTERRUPT : u8 = 0x1;

pub const STATUS_DONE           : u8 = 0x0;
/// Reserved. Operations here always finish before `OP` is written back.
pub const STATUS_WAITING        : u8 = 0x1;
pub const STATUS_ADDRESS_ERROR  : u8 = 0x2;
pub const STATUS_UNAVAILABLE    : u8 = 0x3;
pub const STATUS_PHYSICAL_ERROR : u8 = 0x4;

static CONSTANTS: &[(&str, u32)] = &[
  ("MODE",      STG_MODE),
  ("STATUS",    STG_STATUS),
  ("UNIT_LIST", STG_UNIT_LIST),
  ("OP",        STG_OP),
  ("P0",        STG_P0),
  ("P1",        STG_P0 + 0x04),
  ("P2",        STG_P0 + 0x08),
  ("P3",        STG_P0 + 0x0C),
  ("P4",        STG_P0 + 0x10),
  ("P5",        STG_P0 + 0x14),
  ("P6",        STG_P0 + 0x18),
  ("P7",        STG_P0 + 0x1C),
  ("R0",        STG_R0),
  ("R1",        STG_R1),
  ("DATA",      STG_DATA),
];

/// The backing of one storage unit: a disk image, a file, a block of host memory.
pub trait StorageUnit {
  fn size(&self) -> u64;
  /// Fills `buffer` from `position`. The caller has checked the range.
  fn read(&mut self, position: u64, buffer: &mut [u8]) -> Result<(), DeviceError>;
  /// Writes `data` at `position`. The caller has checked the range.
  fn write(&mut self, position: u64, data: &[u8]) -> Result<(), DeviceError>;
}

/// A unit backed by a byte vector.
pub struct MemoryUnit {
  data: Vec<u8>
}

impl MemoryUnit {
  pub fn new(size: usize) -> MemoryUnit {
    MemoryUnit { data: vec![0; size] }
  }

  pub fn from_bytes(data: Vec<u8>) -> MemoryUnit {
    MemoryUnit { data }
  }

  pub fn bytes(&self) -> &[u8] {
    &self.data
  }
}

impl StorageUnit for MemoryUnit {
  fn size(&self) -> u64 {
    self.data.len() as u64
  }

  fn read(&mut self, position: u64, buffer: &mut [u8]) -> Result<(), DeviceError> {
    let start = position as usize;
    let source = self.data
                     .get(start..start + buffer.len())
                     .ok_or_else(|| DeviceError::Physical(format!("read past end at {}", position)))?;
    buffer.copy_from_slice(source);
    Ok(())
  }

  fn write(&mut self, position: u64, data: &[u8]) -> Result<(), DeviceError> {
    let start = position as usize;
    let target = self.data
                     .get_mut(start..start + data.len())
                     .ok_or_else(|| DeviceError::Physical(format!("write past end at {}", position)))?;
    target.copy_from_slice(data);
    Ok(())
  }
}

enum Transfer {
  Read,
  Write
}

pub struct Storage {
  units      : Vec<Box<dyn StorageUnit>>,
  mode       : u8,
  status     : u8,
  parameters : [u32; PARAMETER_COUNT],
  results    : [u32; RESULT_COUNT],
  data       : Vec<u8>,
  interrupt  : Option<u8>,
  pending    : bool,
}

impl Storage {
  pub fn new(units: Vec<Box<dyn StorageUnit>>) -> Result<Storage, DeviceError> {
    if units.len() > MAX_UNITS {
      return Err(DeviceError::TooManyUnits { max: MAX_UNITS, given: units.len() });
    }
    Ok(Storage {
      units,
      mode       : MODE_POLL,
      status     : STATUS_DONE,
      parameters : [0; PARAMETER_COUNT],
      results    : [0; RESULT_COUNT],
      data       : vec![0; DATA_SIZE],
      interrupt  : None,
      pending    : false,
    })
  }

  pub fn unit(&self, index: usize) -> Option<&dyn StorageUnit> {
    self.units.get(index).map(|unit| unit.as_ref())
  }

  pub fn status(&self) -> u8 {
    self.status
  }

  fn position(&self) -> u64 {
    self.parameters[1] as u64 | (self.parameters[2] as u64) << 32
  }

  fn transfer(&mut self, direction: Transfer) -> u8 {
    let count    = self.parameters[3] as usize;
    let position = self.position();

    let unit = match self.units.get_mut(self.parameters[0] as usize) {
      Some(unit) => unit,
      None       => return STATUS_UNAVAILABLE
    };
    let aligned = position % ALIGNMENT == 0 && count as u64 % ALIGNMENT == 0;
    let fits    = count <= DATA_SIZE
                  && position.checked_add(count as u64).map_or(false, |end| end <= unit.size());
    if !aligned || !fits {
      return STATUS_ADDRESS_ERROR;
    }

    let outcome =
      match direction {
        Transfer::Read  => unit.read(position, &mut self.data[..count]),
        Transfer::Write => unit.write(position, &self.data[..count]),
      };
    match outcome {
      Ok(()) => {
        self.results[0] = count as u32;
        STATUS_DONE
      }
      Err(_) => STATUS_PHYSICAL_ERROR
    }
  }

  fn unit_size(&mut self) -> u8 {
    match self.units.get(self.parameters[0] as usize) {
      Some(unit) => {
        let size = unit.size();
        self.results = [size as u32, (size >> 32) as u32];
        STATUS_DONE
      }
      None => STATUS_UNAVAILABLE
    }
  }

  fn execute(&mut self, operation: u8) {
    self.results = [0; RESULT_COUNT];

    let status =
      match operation {
        OP_READ  => self.transfer(Transfer::Read),
        OP_WRITE => self.transfer(Transfer::Write),
        OP_SIZE  => self.unit_size(),
        // Unknown operations leave the device idle.
        _        => STATUS_DONE
      };
    self.fire_interrupt(status);
  }
}

impl Device for Storage {
  fn name(&self) -> &str {
    "TinyStorage"
  }

  fn device_type(&self) -> DeviceType {
    DeviceType::Storage
  }

  fn prefix(&self) -> &'static str {
    "STG"
  }

  fn constant_list(&self) -> &'static [(&'static str, u32)] {
    CONSTANTS
  }

  fn get(&mut self, offset: u32) -> u8 {
    let p_end = STG_P0 + 4 * PARAMETER_COUNT as u32;
    let r_end = STG_R0 + 4 * RESULT_COUNT as u32;

    match offset {
      o if o < HEADER_SIZE                   => self.header_byte(o),
      STG_MODE                               => self.mode,
      STG_STATUS                             => self.status,
      STG_UNIT_LIST                          => ((1u32 << self.units.len()) - 1) as u8,
      o if o >= STG_P0 && o < p_end          => {
        let index = (o - STG_P0) / 4;
        byte_lane(self.parameters[index as usize], (o - STG_P0) % 4)
      }
      o if o >= STG_R0 && o < r_end          => {
        let index = (o - STG_R0) / 4;
        byte_lane(self.results[index as usize], (o - STG_R0) % 4)
      }
      o if o >= STG_DATA && ((o - STG_DATA) as usize) < DATA_SIZE => {
        self.data[(o - STG_DATA) as usize]
      }
      _ => 0
    }
  }

  fn set(&mut self, offset: u32, value: u8) {
    let p_end = STG_P0 + 4 * PARAMETER_COUNT as u32;

    match offset {
      STG_MODE => {
        self.mode = if value == MODE_POLL { MODE_POLL } else { MODE_INTERRUPT };
      }
      STG_OP => self.execute(value),
      o if o >= STG_P0 && o < p_end => {
        let index = ((o - STG_P0) / 4) as usize;
        self.parameters[index] = set_byte_lane(self.parameters[index], (o - STG_P0) % 4, value);
      }
      o if o >= STG_DATA && ((o - STG_DATA) as usize) < DATA_SIZE => {
        self.data[(o - STG_DATA) as usize] = value;
      }
      // Header, status and results are read-only.
      _ => {}
    }
  }

  fn has_interrupt(&self) -> bool {
    true
  }

  fn connect_interrupt(&mut self, line: u8) {
    self.interrupt = Some(line);
  }

  fn interrupt_line(&self) -> Option<u8> {
    self.interrupt
  }

  fn take_interrupt(&mut self) -> bool {
    std::mem::replace(&mut self.pending, false)
  }

  /// Records `status` and, in interrupt mode, requests an interrupt.
  fn fire_interrupt(&mut self, status: u8) {
    self.status = status;
    if self.mode == MODE_INTERRUPT {
      self.pending = true;
    }
  }

  fn reset(&mut self) {
    self.mode       = MODE_POLL;
    self.status     = STATUS_DONE;
    self.parameters = [0; PARAMETER_COUNT];
    self.results    = [0; RESULT_COUNT];
    self.pending    = false;
    for byte in self.data.iter_mut() {
      *byte = 0;
    }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }
}
