//! The register file: sixteen 32-bit registers, the last of which (`FL`) packs the flag bits.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

pub const REGISTER_COUNT: usize = 16;

/**
  Register names. The discriminant is the register's index, which is also its 4-bit encoding
  in instruction operands and its position in the CPU's device window.
*/
#[derive(
StrumDisplay, EnumString, EnumIter, IntoStaticStr, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,       Eq,       PartialEq,     Debug,            Hash
)]
#[repr(u8)]
pub enum Register {
  A, B, C, D, E, F, G, H, I, J, K, L,
  FP, // Frame pointer
  SP, // Stack pointer
  PC, // Program counter
  FL, // Flags
}

impl Register {
  /// Case-insensitive lookup of a register by its assembly name.
  pub fn from_name(name: &str) -> Option<Register> {
    Register::from_str(&name.to_ascii_uppercase()).ok()
  }

  pub fn index(&self) -> usize {
    Into::<u8>::into(*self) as usize
  }

  /// The twelve general purpose registers, in the order `push.a` stores them.
  pub fn general_purpose() -> impl DoubleEndedIterator<Item = Register> {
    use Register::*;
    vec![A, B, C, D, E, F, G, H, I, J, K, L].into_iter()
  }
}


/// The flag bits packed into `FL`.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug, Hash)]
pub struct Flags(u32);

impl Flags {
  /// Unsigned overflow: carry (or borrow) out of bit 31.
  pub const Y  : u32 = 1 << 0;
  /// Signed overflow.
  pub const V  : u32 = 1 << 1;
  /// Zero result.
  pub const Z  : u32 = 1 << 2;
  /// Sign bit of the result.
  pub const S  : u32 = 1 << 3;
  /// Greater than, set by `cmp`.
  pub const GT : u32 = 1 << 4;
  /// Less than, set by `cmp`.
  pub const LT : u32 = 1 << 5;
  /// The result is even.
  pub const P  : u32 = 1 << 6;
  /// Interrupts enabled.
  pub const T  : u32 = 1 << 7;

  pub fn from_bits(bits: u32) -> Flags {
    Flags(bits)
  }

  pub fn bits(&self) -> u32 {
    self.0
  }

  pub fn get(&self, mask: u32) -> bool {
    self.0 & mask != 0
  }

  pub fn set(&mut self, mask: u32, value: bool) {
    match value {
      true  => self.0 |= mask,
      false => self.0 &= !mask
    }
  }

  pub fn carry(&self)              -> bool { self.get(Flags::Y)  }
  pub fn overflow(&self)           -> bool { self.get(Flags::V)  }
  pub fn zero(&self)               -> bool { self.get(Flags::Z)  }
  pub fn sign(&self)               -> bool { self.get(Flags::S)  }
  pub fn greater(&self)            -> bool { self.get(Flags::GT) }
  pub fn less(&self)               -> bool { self.get(Flags::LT) }
  pub fn parity(&self)             -> bool { self.get(Flags::P)  }
  pub fn interrupts_enabled(&self) -> bool { self.get(Flags::T)  }

  /**
    Recomputes Y, V, Z, S and P from the result of an operation. All five are written, so no
    stale value from a previous instruction survives. GT, LT and T are left alone.
  */
  pub fn set_result(&mut self, result: u32, carry: bool, overflow: bool) {
    self.set(Flags::Y, carry);
    self.set(Flags::V, overflow);
    self.set(Flags::Z, result == 0);
    self.set(Flags::S, result & 0x8000_0000 != 0);
    self.set(Flags::P, result % 2 == 0);
  }

  /// Writes both comparison flags.
  pub fn set_comparison(&mut self, greater: bool, less: bool) {
    self.set(Flags::GT, greater);
    self.set(Flags::LT, less);
  }
}

impl Display for Flags {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let bit = |value: bool| if value { 1 } else { 0 };
    write!(
      f,
      "Y:{}  V:{}  Z:{}  S:{}  GT:{}  LT:{}  P:{}  T:{}",
      bit(self.carry()), bit(self.overflow()), bit(self.zero()), bit(self.sign()),
      bit(self.greater()), bit(self.less()), bit(self.parity()), bit(self.interrupts_enabled())
    )
  }
}


/// Sixteen registers. Copies of this struct double as register snapshots for display.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug)]
pub struct RegisterFile {
  registers: [u32; REGISTER_COUNT]
}

impl RegisterFile {
  pub fn new() -> RegisterFile {
    RegisterFile::default()
  }

  pub fn read(&self, register: Register) -> u32 {
    self.registers[register.index()]
  }

  pub fn write(&mut self, register: Register, value: u32) {
    self.registers[register.index()] = value;
  }

  /// Panics if `index` is not below `REGISTER_COUNT`: indices come from `Register`, so a bad
  /// one is a bug in the caller.
  pub fn read_index(&self, index: usize) -> u32 {
    self.registers[index]
  }

  pub fn write_index(&mut self, index: usize, value: u32) {
    self.registers[index] = value;
  }

  pub fn flags(&self) -> Flags {
    Flags::from_bits(self.read(Register::FL))
  }

  /// Replaces every flag at once, as `iret` does.
  pub fn set_flags(&mut self, flags: Flags) {
    self.write(Register::FL, flags.bits());
  }

  pub fn update_flags<F: FnOnce(&mut Flags)>(&mut self, update: F) {
    let mut flags = self.flags();
    update(&mut flags);
    self.set_flags(flags);
  }

  pub fn clear(&mut self) {
    self.registers = [0; REGISTER_COUNT];
  }
}
