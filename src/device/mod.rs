/*!
  Devices are the things that sit on the bus. Every device answers byte reads and writes at
  offsets relative to the start of its window; the bus does the routing and assembles
  multi-byte values.

  Peripherals share a sixteen byte header at the start of their window:

  ```text
  0x00  type
  0x01  version
  0x02  interrupt line (0xFF when the device has none)
  0x03  name, ASCII, zero padded to 0x0F
  ```

  Device-specific registers start at `HEADER_SIZE`. RAM has no header; it is addressed from
  byte zero.
*/

use std::any::Any;

use num_enum::IntoPrimitive;
use strum_macros::Display as StrumDisplay;

pub mod keyboard;
pub mod memory;
pub mod storage;

pub const HEADER_TYPE      : u32 = 0x00;
pub const HEADER_VERSION   : u32 = 0x01;
pub const HEADER_INTERRUPT : u32 = 0x02;
pub const HEADER_NAME      : u32 = 0x03;
pub const HEADER_SIZE      : u32 = 0x10;

/// Read from `HEADER_INTERRUPT` when a device has no interrupt line.
pub const NO_INTERRUPT: u8 = 0xFF;

#[derive(StrumDisplay, IntoPrimitive, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum DeviceType {
  Memory   = 0x01,
  Cpu      = 0x02,
  Storage  = 0x03,
  Keyboard = 0x04,
  Video    = 0x05,
  Timer    = 0x06,
  Other    = 0xFF,
}

/**
  The contract between the bus and everything attached to it. Offsets are relative to the
  device's window. Reads take `&mut self` because some registers have side effects on read
  (the keyboard queue pops).
*/
pub trait Device: Any {
  /// At most twelve ASCII characters are visible in the header.
  fn name(&self) -> &str;
  fn device_type(&self) -> DeviceType;
  fn version(&self) -> u8 {
    0
  }

  /// Prefix of this device's symbolic constants, e.g. `STG` for `STG_OP`.
  fn prefix(&self) -> &'static str;
  /// Named register offsets. The symbol table prepends the prefix and the window base.
  fn constant_list(&self) -> &'static [(&'static str, u32)] {
    &[]
  }
  /// Whether the first `HEADER_SIZE` bytes of the window are the standard header.
  fn has_header(&self) -> bool {
    true
  }

  fn get(&mut self, offset: u32) -> u8;
  fn set(&mut self, offset: u32, value: u8);

  /// Devices that want an interrupt line return true; the bus then assigns one on attach.
  fn has_interrupt(&self) -> bool {
    false
  }
  fn connect_interrupt(&mut self, _line: u8) {}
  fn interrupt_line(&self) -> Option<u8> {
    None
  }
  /// Returns and clears the pending request. Polled by the bus between instructions.
  fn take_interrupt(&mut self) -> bool {
    false
  }
  /// Host-side entry point for raising this device's interrupt with a status code.
  fn fire_interrupt(&mut self, _status: u8) {}

  fn reset(&mut self) {}

  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;

  /// The standard header byte at `offset`, which must be below `HEADER_SIZE`.
  fn header_byte(&self, offset: u32) -> u8 {
    match offset {
      HEADER_TYPE      => self.device_type().into(),
      HEADER_VERSION   => self.version(),
      HEADER_INTERRUPT => self.interrupt_line().unwrap_or(NO_INTERRUPT),
      _                => {
        self.name()
            .as_bytes()
            .get((offset - HEADER_NAME) as usize)
            .copied()
            .unwrap_or(0)
      }
    }
  }
}

/// Replaces byte `lane` (0 is least significant) of `word`.
pub(crate) fn set_byte_lane(word: u32, lane: u32, value: u8) -> u32 {
  let shift = 8 * lane;
  (word & !(0xFF << shift)) | ((value as u32) << shift)
}

/// Byte `lane` (0 is least significant) of `word`.
pub(crate) fn byte_lane(word: u32, lane: u32) -> u8 {
  (word >> (8 * lane)) as u8
}
