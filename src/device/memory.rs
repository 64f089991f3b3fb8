use std::any::Any;

use super::{Device, DeviceType};

/// Main memory. Mapped at address zero with no header; offset `n` is byte `n` of RAM.
pub struct Memory {
  data: Vec<u8>
}

impl Memory {
  pub fn new(size: u32) -> Memory {
    Memory {
      data: vec![0; size as usize]
    }
  }

  pub fn size(&self) -> u32 {
    self.data.len() as u32
  }
}

impl Device for Memory {
  fn name(&self) -> &str {
    "Memory"
  }

  fn device_type(&self) -> DeviceType {
    DeviceType::Memory
  }

  fn prefix(&self) -> &'static str {
    "MEM"
  }

  fn has_header(&self) -> bool {
    false
  }

  fn get(&mut self, offset: u32) -> u8 {
    self.data.get(offset as usize).copied().unwrap_or(0)
  }

  fn set(&mut self, offset: u32, value: u8) {
    if let Some(byte) = self.data.get_mut(offset as usize) {
      *byte = value;
    }
  }

  /// Clears RAM.
  fn reset(&mut self) {
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


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reset_clears(){
    let mut memory = Memory::new(16);
    memory.set(3, 0x42);
    assert_eq!(memory.get(3), 0x42);
    memory.reset();
    assert_eq!(memory.get(3), 0);
    // Past the end.
    memory.set(16, 1);
    assert_eq!(memory.get(16), 0);
  }
}
