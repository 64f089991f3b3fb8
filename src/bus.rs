/*!
  The address space. Devices are attached at non-overlapping windows of the 32-bit address space;
  every CPU memory access goes through `AddressSpace`, which routes it to the device whose window
  contains the address. Multi-byte accesses are little-endian and are split into byte accesses,
  so a value may straddle two devices.

  Addresses that no window covers read as zero and ignore writes.
*/

use crate::config::MachineConfig;
use crate::device::Device;
use crate::error::BusError;

/// Index of an attached device, in attach order.
pub type DeviceId = usize;

/// A contiguous range of addresses.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Window {
  pub base : u32,
  pub size : u32,
}

impl Window {
  /// One past the last address, which may be 2^32.
  pub fn end(&self) -> u64 {
    self.base as u64 + self.size as u64
  }

  pub fn contains(&self, address: u32) -> bool {
    address >= self.base && (address as u64) < self.end()
  }

  pub fn overlaps(&self, other: &Window) -> bool {
    (self.base as u64) < other.end() && (other.base as u64) < self.end()
  }
}

struct Binding {
  window : Window,
  device : Box<dyn Device>,
}

pub struct AddressSpace {
  bindings               : Vec<Binding>,
  device_area_base       : u32,
  device_slot_size       : u32,
  /// Peripheral slot tried next by `add_device`. Slot 0 is reserved.
  next_slot              : u32,
  next_interrupt_line    : u8,
}

impl AddressSpace {
  pub fn new(config: &MachineConfig) -> AddressSpace {
    AddressSpace {
      bindings            : Vec::new(),
      device_area_base    : config.device_area_base,
      device_slot_size    : config.device_slot_size,
      next_slot           : 1,
      next_interrupt_line : 0,
    }
  }

  /**
    Attaches `device` at `[base, base + size)`. Fails if the window is empty, runs past the end of
    the address space, or overlaps a device already attached. A device that asks for an interrupt
    line gets the next free one.
  */
  pub fn attach(&mut self, mut device: Box<dyn Device>, base: u32, size: u32)
    -> Result<DeviceId, BusError>
  {
    let window = Window { base, size };
    if size == 0 {
      return Err(BusError::EmptyWindow(base));
    }
    if window.end() > 1u64 << 32 {
      return Err(BusError::WindowOverflow { base, size });
    }
    if self.bindings.iter().any(|binding| binding.window.overlaps(&window)) {
      return Err(BusError::Overlap { base, size });
    }

    if device.has_interrupt() {
      device.connect_interrupt(self.next_interrupt_line);
      self.next_interrupt_line = self.next_interrupt_line.saturating_add(1);
    }

    self.bindings.push(Binding { window, device });
    Ok(self.bindings.len() - 1)
  }

  /// Attaches `device` at the next free peripheral slot and returns its id and base address.
  pub fn add_device(&mut self, device: Box<dyn Device>) -> Result<(DeviceId, u32), BusError> {
    loop {
      let base = (self.device_area_base as u64)
                 + (self.next_slot as u64) * (self.device_slot_size as u64);
      if base + self.device_slot_size as u64 > 1u64 << 32 {
        return Err(BusError::NoFreeSlot);
      }
      let base = base as u32;
      self.next_slot += 1;

      let window = Window { base, size: self.device_slot_size };
      if self.bindings.iter().any(|binding| binding.window.overlaps(&window)) {
        continue;
      }
      let id = self.attach(device, base, self.device_slot_size)?;
      return Ok((id, base));
    }
  }

  fn route(&mut self, address: u32) -> Option<(&mut Box<dyn Device>, u32)> {
    self.bindings
        .iter_mut()
        .find(|binding| binding.window.contains(address))
        .map(|binding| (&mut binding.device, address - binding.window.base))
  }

  pub fn get(&mut self, address: u32) -> u8 {
    match self.route(address) {
      Some((device, offset)) => device.get(offset),
      None                   => 0
    }
  }

  pub fn set(&mut self, address: u32, value: u8) {
    if let Some((device, offset)) = self.route(address) {
      device.set(offset, value);
    }
  }

  /// Reads `width` bytes starting at `address`, least significant first.
  pub fn get_sized(&mut self, address: u32, width: u32) -> u32 {
    (0..width).fold(0u32, |value, i| {
      value | ((self.get(address.wrapping_add(i)) as u32) << (8 * i))
    })
  }

  /// Writes the low `width` bytes of `value` starting at `address`, least significant first.
  pub fn set_sized(&mut self, address: u32, width: u32, value: u32) {
    for i in 0..width {
      self.set(address.wrapping_add(i), (value >> (8 * i)) as u8);
    }
  }

  pub fn get16(&mut self, address: u32) -> u16 {
    self.get_sized(address, 2) as u16
  }

  pub fn get32(&mut self, address: u32) -> u32 {
    self.get_sized(address, 4)
  }

  pub fn set16(&mut self, address: u32, value: u16) {
    self.set_sized(address, 2, value as u32);
  }

  pub fn set32(&mut self, address: u32, value: u32) {
    self.set_sized(address, 4, value);
  }

  pub fn get_array(&mut self, address: u32, size: u32) -> Vec<u8> {
    (0..size).map(|i| self.get(address.wrapping_add(i))).collect()
  }

  pub fn set_array(&mut self, address: u32, bytes: &[u8]) {
    for (i, byte) in bytes.iter().enumerate() {
      self.set(address.wrapping_add(i as u32), *byte);
    }
  }

  /// Resets every device, in attach order.
  pub fn reset(&mut self) {
    for binding in self.bindings.iter_mut() {
      binding.device.reset();
    }
  }

  /**
    The line of the first device, in attach order, with a pending interrupt. That device's
    request is consumed; the others stay pending and are delivered on later calls.
  */
  pub fn next_interrupt(&mut self) -> Option<u8> {
    for binding in self.bindings.iter_mut() {
      if let Some(line) = binding.device.interrupt_line() {
        if binding.device.take_interrupt() {
          return Some(line);
        }
      }
    }
    None
  }

  pub fn window(&self, id: DeviceId) -> Option<Window> {
    self.bindings.get(id).map(|binding| binding.window)
  }

  pub fn device(&self, id: DeviceId) -> Option<&dyn Device> {
    self.bindings.get(id).map(|binding| binding.device.as_ref())
  }

  pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut dyn Device> {
    match self.bindings.get_mut(id) {
      Some(binding) => Some(binding.device.as_mut()),
      None          => None
    }
  }

  /// The device with the given id, if it is a `T`.
  pub fn device_as<T: Device>(&self, id: DeviceId) -> Option<&T> {
    self.device(id).and_then(|device| device.as_any().downcast_ref::<T>())
  }

  pub fn device_as_mut<T: Device>(&mut self, id: DeviceId) -> Option<&mut T> {
    self.device_mut(id).and_then(|device| device.as_any_mut().downcast_mut::<T>())
  }

  /// Every attached device with its window, in attach order.
  pub fn devices(&self) -> impl Iterator<Item = (Window, &dyn Device)> + '_ {
    self.bindings.iter().map(|binding| (binding.window, binding.device.as_ref()))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::memory::Memory;

  fn bus() -> AddressSpace {
    AddressSpace::new(&MachineConfig::default())
  }

  #[test]
  fn little_endian_access(){
    let mut bus = bus();
    bus.attach(Box::new(Memory::new(0x100)), 0, 0x100).unwrap();
    bus.set32(0x10, 0x1234_5678);
    assert_eq!(bus.get(0x10), 0x78);
    assert_eq!(bus.get(0x13), 0x12);
    assert_eq!(bus.get16(0x11), 0x3456);
    assert_eq!(bus.get32(0x10), 0x1234_5678);
    assert_eq!(bus.get_array(0x10, 2), vec![0x78, 0x56]);
  }

  #[test]
  fn routes_by_window(){
    let mut bus = bus();
    bus.attach(Box::new(Memory::new(0x100)), 0, 0x100).unwrap();
    let high = bus.attach(Box::new(Memory::new(0x100)), 0x1000, 0x100).unwrap();

    bus.set(0x1004, 0xAB);
    assert_eq!(bus.device_as_mut::<Memory>(high).unwrap().get(4), 0xAB);
    assert_eq!(bus.get(0x0004), 0);
  }

  #[test]
  fn unmapped_addresses(){
    let mut bus = bus();
    bus.set(0x5000, 0xFF);
    assert_eq!(bus.get(0x5000), 0);
  }

  #[test]
  fn straddling_devices(){
    let mut bus = bus();
    bus.attach(Box::new(Memory::new(0x10)), 0, 0x10).unwrap();
    bus.attach(Box::new(Memory::new(0x10)), 0x10, 0x10).unwrap();
    bus.set32(0x0E, 0xDDCC_BBAA);
    assert_eq!(bus.get32(0x0E), 0xDDCC_BBAA);
    assert_eq!(bus.get(0x10), 0xCC);
  }

  #[test]
  fn rejects_bad_windows(){
    let mut bus = bus();
    bus.attach(Box::new(Memory::new(0x100)), 0, 0x100).unwrap();
    assert_eq!(
      bus.attach(Box::new(Memory::new(0x100)), 0x80, 0x100),
      Err(BusError::Overlap { base: 0x80, size: 0x100 })
    );
    assert_eq!(bus.attach(Box::new(Memory::new(1)), 0x200, 0), Err(BusError::EmptyWindow(0x200)));
    assert_eq!(
      bus.attach(Box::new(Memory::new(0x10)), 0xFFFF_FFF8, 0x10),
      Err(BusError::WindowOverflow { base: 0xFFFF_FFF8, size: 0x10 })
    );
    assert!(bus.attach(Box::new(Memory::new(0x8)), 0xFFFF_FFF8, 0x8).is_ok());
  }

  #[test]
  fn slots_skip_the_memory_controller(){
    let mut bus = bus();
    let (_, first) = bus.add_device(Box::new(Memory::new(0x1000))).unwrap();
    let (_, second) = bus.add_device(Box::new(Memory::new(0x1000))).unwrap();
    assert_eq!(first, 0xF000_2000);
    assert_eq!(second, 0xF000_3000);
  }
}
