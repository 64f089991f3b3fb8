/*!
  A keyboard that queues key events for the program.

  Events are 32-bit words:

  ```text
  bit 31     release (0 for press)
  bit 30     shift
  bit 29     control
  bit 28     alt
  bits 0-27  key code
  ```

  A 32-bit read of `DEQUEUE` pops one event, or reads 0 when the queue is empty. The pop happens
  on the read of byte 0; bytes 1 to 3 return the rest of the event popped last, so a
  little-endian 32-bit read sees the whole event.
*/

use std::any::Any;
use std::collections::VecDeque;

use super::{byte_lane, Device, DeviceType, HEADER_SIZE};
use crate::error::DeviceError;

pub const QUEUE_SIZE: usize = 16;

pub const KBD_MODE       : u32 = 0x10;
pub const KBD_QUEUE_FULL : u32 = 0x11;
pub const KBD_DEQUEUE    : u32 = 0x12;

pub const MODE_POLL      : u8 = 0x0;
pub const MODE_INTERRUPT : u8 = 0x1;

const RELEASE_BIT : u32 = 1 << 31;
const SHIFT_BIT   : u32 = 1 << 30;
const CONTROL_BIT : u32 = 1 << 29;
const ALT_BIT     : u32 = 1 << 28;
const KEY_MASK    : u32 = 0x0FFF_FFFF;

static CONSTANTS: &[(&str, u32)] = &[
  ("MODE",       KBD_MODE),
  ("QUEUE_FULL", KBD_QUEUE_FULL),
  ("DEQUEUE",    KBD_DEQUEUE),
];

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum KeyAction {
  Press,
  Release
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct KeyEvent {
  pub action  : KeyAction,
  pub shift   : bool,
  pub control : bool,
  pub alt     : bool,
  pub key     : u32,
}

impl KeyEvent {
  pub fn press(key: u32) -> KeyEvent {
    KeyEvent { action: KeyAction::Press, shift: false, control: false, alt: false, key }
  }

  pub fn release(key: u32) -> KeyEvent {
    KeyEvent { action: KeyAction::Release, ..KeyEvent::press(key) }
  }

  /// The event as the program sees it. Fails if the key code does not fit in 28 bits.
  pub fn encode(&self) -> Result<u32, DeviceError> {
    if self.key & !KEY_MASK != 0 {
      return Err(DeviceError::InvalidKey(self.key));
    }
    let bit = |set: bool, mask: u32| if set { mask } else { 0 };
    Ok(
      bit(self.action == KeyAction::Release, RELEASE_BIT)
      | bit(self.shift, SHIFT_BIT)
      | bit(self.control, CONTROL_BIT)
      | bit(self.alt, ALT_BIT)
      | self.key
    )
  }
}

pub struct Keyboard {
  queue     : VecDeque<u32>,
  /// Event returned by the last pop, for reads of bytes 1 to 3 of `DEQUEUE`.
  latched   : u32,
  mode      : u8,
  interrupt : Option<u8>,
  /// Interrupt requests not yet taken by the bus, one per event queued in interrupt mode.
  pending   : usize,
}

impl Keyboard {
  pub fn new() -> Keyboard {
    Keyboard {
      queue     : VecDeque::with_capacity(QUEUE_SIZE),
      latched   : 0,
      mode      : MODE_POLL,
      interrupt : None,
      pending   : 0,
    }
  }

  /// Queues an event from the host. In interrupt mode this also requests an interrupt.
  pub fn add_event(&mut self, event: KeyEvent) -> Result<(), DeviceError> {
    let encoded = event.encode()?;
    if self.queue.len() >= QUEUE_SIZE {
      return Err(DeviceError::QueueFull);
    }
    self.queue.push_back(encoded);
    self.fire_interrupt(0);
    Ok(())
  }

  pub fn queued(&self) -> usize {
    self.queue.len()
  }
}

impl Default for Keyboard {
  fn default() -> Self {
    Keyboard::new()
  }
}

impl Device for Keyboard {
  fn name(&self) -> &str {
    "TinyKeyboard"
  }

  fn device_type(&self) -> DeviceType {
    DeviceType::Keyboard
  }

  fn prefix(&self) -> &'static str {
    "KBD"
  }

  fn constant_list(&self) -> &'static [(&'static str, u32)] {
    CONSTANTS
  }

  fn get(&mut self, offset: u32) -> u8 {
    match offset {
      o if o < HEADER_SIZE => self.header_byte(o),
      KBD_MODE             => self.mode,
      KBD_QUEUE_FULL       => (self.queue.len() >= QUEUE_SIZE) as u8,
      KBD_DEQUEUE          => {
        self.latched = self.queue.pop_front().unwrap_or(0);
        byte_lane(self.latched, 0)
      }
      o if o > KBD_DEQUEUE && o < KBD_DEQUEUE + 4 => byte_lane(self.latched, o - KBD_DEQUEUE),
      _ => 0
    }
  }

  fn set(&mut self, offset: u32, value: u8) {
    if offset == KBD_MODE {
      self.mode = if value == MODE_POLL { MODE_POLL } else { MODE_INTERRUPT };
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
    match self.pending {
      0 => false,
      _ => {
        self.pending -= 1;
        true
      }
    }
  }

  fn fire_interrupt(&mut self, _status: u8) {
    if self.mode == MODE_INTERRUPT {
      self.pending += 1;
    }
  }

  fn reset(&mut self) {
    self.queue.clear();
    self.latched = 0;
    self.mode    = MODE_POLL;
    self.pending = 0;
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
  use crate::bus::AddressSpace;
  use crate::config::MachineConfig;

  fn alt_press(key: u32) -> KeyEvent {
    KeyEvent { alt: true, ..KeyEvent::press(key) }
  }

  fn keyboard_bus() -> (AddressSpace, usize, u32) {
    let mut bus = AddressSpace::new(&MachineConfig::default());
    let (id, base) = bus.add_device(Box::new(Keyboard::new())).unwrap();
    (bus, id, base)
  }

  #[test]
  fn invalid_key(){
    let mut keyboard = Keyboard::new();
    assert_eq!(keyboard.add_event(alt_press(0xF000_0000)), Err(DeviceError::InvalidKey(0xF000_0000)));
    assert_eq!(keyboard.queued(), 0);
  }

  #[test]
  fn poll_mode(){
    let (mut bus, id, base) = keyboard_bus();
    {
      let keyboard = bus.device_as_mut::<Keyboard>(id).unwrap();
      keyboard.add_event(alt_press(0x20)).unwrap();
      keyboard.add_event(KeyEvent { action: KeyAction::Release, ..alt_press(0x20) }).unwrap();
    }

    assert_eq!(bus.get(base + KBD_QUEUE_FULL), 0);
    assert_eq!(bus.get32(base + KBD_DEQUEUE), (1 << 0x1C) | 0x20);
    assert_eq!(bus.get32(base + KBD_DEQUEUE), (1 << 0x1F) | (1 << 0x1C) | 0x20);
    assert_eq!(bus.get32(base + KBD_DEQUEUE), 0);
    assert_eq!(bus.next_interrupt(), None);
  }

  #[test]
  fn queue_full(){
    let (mut bus, id, base) = keyboard_bus();
    let keyboard = bus.device_as_mut::<Keyboard>(id).unwrap();
    for _ in 0..QUEUE_SIZE {
      keyboard.add_event(alt_press(0x20)).unwrap();
    }
    assert_eq!(keyboard.add_event(alt_press(0x20)), Err(DeviceError::QueueFull));
    assert_eq!(bus.get(base + KBD_QUEUE_FULL), 1);
  }

  #[test]
  fn interrupt_mode_raises_per_event(){
    let (mut bus, id, base) = keyboard_bus();
    bus.set(base + KBD_MODE, MODE_INTERRUPT);
    {
      let keyboard = bus.device_as_mut::<Keyboard>(id).unwrap();
      keyboard.add_event(KeyEvent::press(0x41)).unwrap();
      keyboard.add_event(KeyEvent::release(0x41)).unwrap();
    }
    assert_eq!(bus.next_interrupt(), Some(0));
    assert_eq!(bus.next_interrupt(), Some(0));
    assert_eq!(bus.next_interrupt(), None);
  }
}
