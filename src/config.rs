//! Machine configuration. Everything here is fixed when the machine is built; nothing is
//! re-read afterwards.

/// Bytes in a kilobyte, for readability of the defaults below.
const KB: u32 = 1024;

/// Number of entries in the interrupt vector table. Interrupt lines are a byte wide.
pub const INTERRUPT_VECTOR_ENTRIES: u32 = 256;
/// Width in bytes of one vector table entry.
pub const INTERRUPT_VECTOR_ENTRY_SIZE: u32 = 4;

pub const DEFAULT_RAM_SIZE: u32 = 256 * KB;
pub const DEFAULT_INTERRUPT_VECTOR_BASE: u32 =
  DEFAULT_RAM_SIZE - INTERRUPT_VECTOR_ENTRIES * INTERRUPT_VECTOR_ENTRY_SIZE;
pub const DEFAULT_DEVICE_AREA_BASE: u32 = 0xF000_1000;
pub const DEFAULT_DEVICE_SLOT_SIZE: u32 = 0x1000;
pub const DEFAULT_RUN_STEP_LIMIT: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  /// Bytes of RAM, mapped at address zero.
  pub ram_size              : u32,
  /// Address of entry 0 of the interrupt vector table.
  pub interrupt_vector_base : u32,
  /// Initial value of `SP`. The stack grows downward.
  pub stack_top             : u32,
  /// Address of device slot 0. Slot 0 belongs to the memory controller; peripherals
  /// (the CPU first) get slots 1, 2, ...
  pub device_area_base      : u32,
  /// Size of each device register window.
  pub device_slot_size      : u32,
  /// Upper bound on instructions executed by a single debugger `continue` or `step over`.
  pub run_step_limit        : u64,
}

impl MachineConfig {
  /// Address of the vector table entry for interrupt `line`.
  pub fn vector_address(&self, line: u8) -> u32 {
    self.interrupt_vector_base
        .wrapping_add(line as u32 * INTERRUPT_VECTOR_ENTRY_SIZE)
  }

  /// Base address of the peripheral register slot `slot`.
  pub fn slot_address(&self, slot: u32) -> u32 {
    self.device_area_base.wrapping_add(slot.wrapping_mul(self.device_slot_size))
  }
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      ram_size              : DEFAULT_RAM_SIZE,
      interrupt_vector_base : DEFAULT_INTERRUPT_VECTOR_BASE,
      stack_top             : DEFAULT_INTERRUPT_VECTOR_BASE,
      device_area_base      : DEFAULT_DEVICE_AREA_BASE,
      device_slot_size      : DEFAULT_DEVICE_SLOT_SIZE,
      run_step_limit        : DEFAULT_RUN_STEP_LIMIT,
    }
  }
}
