use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::register::Register;

/**
  Instruction mnemonics. One mnemonic covers several opcodes, one per operand shape; the
  shapes are listed in `OPCODE_TABLE`. The text form is what the assembler accepts (after
  lowercasing) and what the disassembler prints.
*/
#[derive(StrumDisplay, EnumString, IntoStaticStr, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Mnemonic {
  // Data movement //
  #[strum(to_string = "mov")]    Mov,
  #[strum(to_string = "movb")]   Movb,
  #[strum(to_string = "movw")]   Movw,
  #[strum(to_string = "movd")]   Movd,

  // Logic //
  #[strum(to_string = "or")]     Or,
  #[strum(to_string = "xor")]    Xor,
  #[strum(to_string = "and")]    And,
  #[strum(to_string = "shl")]    Shl,
  #[strum(to_string = "shr")]    Shr,
  #[strum(to_string = "not")]    Not,

  // Integer arithmetic //
  #[strum(to_string = "add")]    Add,
  #[strum(to_string = "sub")]    Sub,
  #[strum(to_string = "cmp")]    Cmp,
  #[strum(to_string = "mul")]    Mul,
  #[strum(to_string = "idiv")]   Idiv,
  #[strum(to_string = "mod")]    Mod,
  #[strum(to_string = "inc")]    Inc,
  #[strum(to_string = "dec")]    Dec,

  // Branches //
  #[strum(to_string = "bz", serialize = "beq")]
  Bz,
  #[strum(to_string = "bnz", serialize = "bneq")]
  Bnz,
  #[strum(to_string = "bneg")]   Bneg,
  #[strum(to_string = "bpos")]   Bpos,
  #[strum(to_string = "bgt")]    Bgt,
  #[strum(to_string = "bgte")]   Bgte,
  #[strum(to_string = "blt")]    Blt,
  #[strum(to_string = "blte")]   Blte,
  #[strum(to_string = "bv")]     Bv,
  #[strum(to_string = "bnv")]    Bnv,
  #[strum(to_string = "jmp")]    Jmp,
  #[strum(to_string = "jsr")]    Jsr,
  #[strum(to_string = "ret")]    Ret,
  #[strum(to_string = "sys")]    Sys,
  #[strum(to_string = "iret")]   Iret,
  #[strum(to_string = "sret")]   Sret,

  // Stack //
  #[strum(to_string = "pushb")]  Pushb,
  #[strum(to_string = "pushw")]  Pushw,
  #[strum(to_string = "pushd")]  Pushd,
  #[strum(to_string = "push.a")] PushAll,
  #[strum(to_string = "popb")]   Popb,
  #[strum(to_string = "popw")]   Popw,
  #[strum(to_string = "popd")]   Popd,
  #[strum(to_string = "pop.a")]  PopAll,
  #[strum(to_string = "popx")]   Popx,

  // Other //
  #[strum(to_string = "nop")]    Nop,
}

impl Mnemonic {
  /// Width in bytes of the memory access performed by a sized move or stack operation.
  pub fn access_width(&self) -> Width {
    match self {
      | Mnemonic::Movb
      | Mnemonic::Pushb
      | Mnemonic::Popb => Width::W8,

      | Mnemonic::Movw
      | Mnemonic::Pushw
      | Mnemonic::Popw => Width::W16,

      _                => Width::W32
    }
  }
}


/// Width of an immediate or of a memory access.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Width {
  W8,
  W16,
  W32
}

impl Width {
  pub fn bytes(&self) -> u32 {
    match self {
      Width::W8  => 1,
      Width::W16 => 2,
      Width::W32 => 4
    }
  }

  pub fn mask(&self) -> u32 {
    match self {
      Width::W8  => 0xFF,
      Width::W16 => 0xFFFF,
      Width::W32 => 0xFFFF_FFFF
    }
  }

  pub fn fits(&self, value: u32) -> bool {
    value & !self.mask() == 0
  }

  /// The smallest width that holds `value`.
  pub fn minimal(value: u32) -> Width {
    match value {
      v if Width::W8.fits(v)  => Width::W8,
      v if Width::W16.fits(v) => Width::W16,
      _                       => Width::W32
    }
  }
}


/**
  The shape of one operand slot in an opcode's binary layout. Each shape has a fixed size, so
  an opcode's length never depends on the data that follows it.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandKind {
  /// A register index in one byte.
  Reg,
  Imm8,
  /// Little-endian.
  Imm16,
  /// Little-endian.
  Imm32,
  /// `[reg]`: one byte holding the index of the register that holds the address.
  IndReg,
  /// `[addr]`: a little-endian 32-bit address.
  IndImm,
}

impl OperandKind {
  pub fn size(&self) -> u32 {
    match self {
      OperandKind::Reg    => 1,
      OperandKind::Imm8   => 1,
      OperandKind::Imm16  => 2,
      OperandKind::Imm32  => 4,
      OperandKind::IndReg => 1,
      OperandKind::IndImm => 4,
    }
  }

  /// Whether `operand` can be encoded in this slot.
  pub fn accepts(&self, operand: &Operand) -> bool {
    match (self, operand) {
      (OperandKind::Reg,    Operand::Register(_))          => true,
      (OperandKind::Imm8,   Operand::Immediate(value, _))  => Width::W8.fits(*value),
      (OperandKind::Imm16,  Operand::Immediate(value, _))  => Width::W16.fits(*value),
      (OperandKind::Imm32,  Operand::Immediate(_, _))      => true,
      (OperandKind::IndReg, Operand::IndirectRegister(_))  => true,
      (OperandKind::IndImm, Operand::IndirectImmediate(_)) => true,
      _                                                    => false
    }
  }

  /// Gives an accepted immediate this slot's width. Other operands pass through.
  pub fn fit(&self, operand: Operand) -> Operand {
    match (self, operand) {
      (OperandKind::Imm8,  Operand::Immediate(value, _)) => Operand::Immediate(value, Width::W8),
      (OperandKind::Imm16, Operand::Immediate(value, _)) => Operand::Immediate(value, Width::W16),
      (OperandKind::Imm32, Operand::Immediate(value, _)) => Operand::Immediate(value, Width::W32),
      (_, other)                                         => other
    }
  }
}


/// A decoded or parsed operand.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Operand {
  Register(Register),
  Immediate(u32, Width),
  IndirectRegister(Register),
  IndirectImmediate(u32),
}

impl Operand {
  /// A short description of the operand's kind, for error messages.
  pub fn describe(&self) -> &'static str {
    match self {
      Operand::Register(_)          => "register",
      Operand::Immediate(_, _)      => "value",
      Operand::IndirectRegister(_)  => "indirect register",
      Operand::IndirectImmediate(_) => "indirect value",
    }
  }
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operand::Register(register)            => write!(f, "{}", register),
      Operand::Immediate(value, Width::W8)   => write!(f, "0x{:02X}", value),
      Operand::Immediate(value, Width::W16)  => write!(f, "0x{:04X}", value),
      Operand::Immediate(value, Width::W32)  => write!(f, "0x{:08X}", value),
      Operand::IndirectRegister(register)    => write!(f, "[{}]", register),
      Operand::IndirectImmediate(address)    => write!(f, "[0x{:08X}]", address),
    }
  }
}


/// One row of the opcode table.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct OpcodeInfo {
  pub opcode   : u8,
  pub mnemonic : Mnemonic,
  pub operands : &'static [OperandKind],
}

impl OpcodeInfo {
  /// Total encoded length in bytes, opcode included.
  pub fn length(&self) -> u32 {
    1 + self.operands.iter().map(OperandKind::size).sum::<u32>()
  }

  /**
    Stores whose destination is `[addr]` treat every `[addr]` operand as the location of a
    32-bit pointer rather than as the effective address itself.
  */
  pub fn stores_through_pointer(&self) -> bool {
    self.operands.first() == Some(&OperandKind::IndImm)
  }
}

macro_rules! opcodes {
  ($($opcode:literal => $mnemonic:ident($($kind:ident),*)),* $(,)?) => {
    &[
      $(
        OpcodeInfo {
          opcode   : $opcode,
          mnemonic : Mnemonic::$mnemonic,
          operands : &[$(OperandKind::$kind),*]
        }
      ),*
    ]
  };
}

/// Every valid opcode. Opcodes not listed here decode as data.
pub static OPCODE_TABLE: &[OpcodeInfo] = opcodes![
  0x01 => Mov(Reg, Reg),
  0x02 => Mov(Reg, Imm8),
  0x03 => Mov(Reg, Imm16),
  0x04 => Mov(Reg, Imm32),

  0x05 => Movb(Reg, IndReg),
  0x06 => Movb(Reg, IndImm),
  0x07 => Movw(Reg, IndReg),
  0x08 => Movw(Reg, IndImm),
  0x09 => Movd(Reg, IndReg),
  0x0A => Movd(Reg, IndImm),

  0x0B => Movb(IndReg, Reg),
  0x0C => Movb(IndReg, Imm8),
  0x0D => Movb(IndReg, IndReg),
  0x0E => Movb(IndReg, IndImm),
  0x0F => Movw(IndReg, Reg),
  0x1A => Movw(IndReg, Imm16),
  0x1B => Movw(IndReg, IndReg),
  0x1C => Movw(IndReg, IndImm),
  0x1D => Movd(IndReg, Reg),
  0x1E => Movd(IndReg, Imm32),
  0x1F => Movd(IndReg, IndReg),
  0x20 => Movd(IndReg, IndImm),

  0x21 => Movb(IndImm, Reg),
  0x22 => Movb(IndImm, Imm8),
  0x23 => Movb(IndImm, IndReg),
  0x24 => Movb(IndImm, IndImm),
  0x25 => Movw(IndImm, Reg),
  0x26 => Movw(IndImm, Imm16),
  0x27 => Movw(IndImm, IndReg),
  0x28 => Movw(IndImm, IndImm),
  0x29 => Movd(IndImm, Reg),
  0x2A => Movd(IndImm, Imm32),
  0x2B => Movd(IndImm, IndReg),
  0x2C => Movd(IndImm, IndImm),

  0x2D => Or(Reg, Reg),
  0x2E => Or(Reg, Imm8),
  0x2F => Or(Reg, Imm16),
  0x30 => Or(Reg, Imm32),
  0x31 => Xor(Reg, Reg),
  0x32 => Xor(Reg, Imm8),
  0x33 => Xor(Reg, Imm16),
  0x34 => Xor(Reg, Imm32),
  0x35 => And(Reg, Reg),
  0x36 => And(Reg, Imm8),
  0x37 => And(Reg, Imm16),
  0x38 => And(Reg, Imm32),
  0x39 => Shl(Reg, Reg),
  0x3A => Shl(Reg, Imm8),
  0x3B => Shr(Reg, Reg),
  0x3C => Shr(Reg, Imm8),
  0x3D => Not(Reg),

  0x42 => Add(Reg, Reg),
  0x43 => Add(Reg, Imm8),
  0x44 => Add(Reg, Imm16),
  0x45 => Add(Reg, Imm32),
  0x46 => Sub(Reg, Reg),
  0x47 => Sub(Reg, Imm8),
  0x48 => Sub(Reg, Imm16),
  0x49 => Sub(Reg, Imm32),
  0x4A => Cmp(Reg, Reg),
  0x4B => Cmp(Reg, Imm8),
  0x4C => Cmp(Reg, Imm16),
  0x4D => Cmp(Reg, Imm32),
  0x4E => Mul(Reg, Reg),
  0x4F => Mul(Reg, Imm8),
  0x50 => Mul(Reg, Imm16),
  0x51 => Mul(Reg, Imm32),
  0x52 => Idiv(Reg, Reg),
  0x53 => Idiv(Reg, Imm8),
  0x54 => Idiv(Reg, Imm16),
  0x55 => Idiv(Reg, Imm32),
  0x56 => Mod(Reg, Reg),
  0x57 => Mod(Reg, Imm8),
  0x58 => Mod(Reg, Imm16),
  0x59 => Mod(Reg, Imm32),
  0x5A => Inc(Reg),
  0x5B => Dec(Reg),

  0x5C => Bz(Reg),
  0x5D => Bz(Imm32),
  0x5E => Bnz(Reg),
  0x5F => Bnz(Imm32),
  0x60 => Bneg(Reg),
  0x61 => Bneg(Imm32),
  0x62 => Bpos(Reg),
  0x63 => Bpos(Imm32),
  0x64 => Bgt(Reg),
  0x65 => Bgt(Imm32),
  0x66 => Bgte(Reg),
  0x67 => Bgte(Imm32),
  0x68 => Blt(Reg),
  0x69 => Blt(Imm32),
  0x6A => Blte(Reg),
  0x6B => Blte(Imm32),
  0x6C => Bv(Reg),
  0x6D => Bv(Imm32),
  0x6E => Bnv(Reg),
  0x6F => Bnv(Imm32),
  0x70 => Jmp(Reg),
  0x71 => Jmp(Imm32),
  0x72 => Jsr(Reg),
  0x73 => Jsr(Imm32),
  0x74 => Ret(),
  0x75 => Sys(Reg),
  0x76 => Sys(Imm8),
  0x77 => Iret(),

  0x78 => Pushb(Reg),
  0x79 => Pushb(Imm8),
  0x7A => Pushw(Reg),
  0x7B => Pushw(Imm16),
  0x7C => Pushd(Reg),
  0x7D => Pushd(Imm32),
  0x7E => PushAll(),
  0x7F => Popb(Reg),
  0x80 => Popw(Reg),
  0x81 => Popd(Reg),
  0x82 => PopAll(),
  0x83 => Popx(Reg),
  0x84 => Popx(Imm8),
  0x85 => Popx(Imm16),
  0x86 => Sret(),
  0x87 => Nop(),
];

lazy_static! {
  /// `OPCODE_TABLE` indexed by opcode byte.
  static ref DECODE_TABLE: Vec<Option<&'static OpcodeInfo>> = {
    let mut table = vec![None; 256];
    for info in OPCODE_TABLE.iter() {
      table[info.opcode as usize] = Some(info);
    }
    table
  };
}

pub fn opcode_info(opcode: u8) -> Option<&'static OpcodeInfo> {
  DECODE_TABLE[opcode as usize]
}

/// Encoded length of the instruction starting with `opcode`. Unknown opcodes are one byte of
/// data.
pub fn instruction_length(opcode: u8) -> u32 {
  opcode_info(opcode).map_or(1, |info| info.length())
}


/// An opcode together with its operands. Built by the assembler or the decoder and consumed
/// right away.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub info     : &'static OpcodeInfo,
  pub operands : Vec<Operand>,
}

impl Instruction {
  pub fn opcode(&self) -> u8 {
    self.info.opcode
  }

  pub fn mnemonic(&self) -> Mnemonic {
    self.info.mnemonic
  }

  pub fn length(&self) -> u32 {
    self.info.length()
  }

  /// Formats the instruction, letting `render` override how each operand is shown.
  pub fn format_with<F>(&self, render: F) -> String
    where F: Fn(&Operand) -> String
  {
    let mnemonic: &'static str = self.mnemonic().into();
    if self.operands.is_empty() {
      return mnemonic.to_string();
    }
    format!(
      "{:<8}{}",
      mnemonic,
      self.operands
          .iter()
          .map(render)
          .collect::<Vec<String>>()
          .join(", ")
    )
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.format_with(Operand::to_string))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn opcodes_are_unique(){
    let mut seen = HashSet::new();
    for info in OPCODE_TABLE.iter() {
      assert!(seen.insert(info.opcode), "duplicate opcode 0x{:02X}", info.opcode);
    }
  }

  #[test]
  fn operand_shapes_are_unique_per_mnemonic(){
    let mut seen = HashSet::new();
    for info in OPCODE_TABLE.iter() {
      assert!(
        seen.insert((info.mnemonic, info.operands)),
        "{} has two opcodes for the same operands", info.mnemonic
      );
    }
  }

  #[test]
  fn lengths(){
    assert_eq!(instruction_length(0x01), 3);
    assert_eq!(instruction_length(0x04), 6);
    assert_eq!(instruction_length(0x24), 9);
    assert_eq!(instruction_length(0x26), 7);
    assert_eq!(instruction_length(0x5D), 5);
    assert_eq!(instruction_length(0x74), 1);
    assert_eq!(instruction_length(0x00), 1);
    assert_eq!(instruction_length(0xFF), 1);
  }

  #[test]
  fn pointer_stores(){
    assert!(opcode_info(0x22).unwrap().stores_through_pointer());
    assert!(!opcode_info(0x06).unwrap().stores_through_pointer());
  }

  #[test]
  fn minimal_width(){
    assert_eq!(Width::minimal(0), Width::W8);
    assert_eq!(Width::minimal(0xFF), Width::W8);
    assert_eq!(Width::minimal(0x100), Width::W16);
    assert_eq!(Width::minimal(0x1_0000), Width::W32);
  }

  #[test]
  fn mnemonic_aliases(){
    use std::str::FromStr;
    assert_eq!(Mnemonic::from_str("beq"), Ok(Mnemonic::Bz));
    assert_eq!(Mnemonic::from_str("bz"), Ok(Mnemonic::Bz));
    assert_eq!(Mnemonic::Bz.to_string(), "bz");
    assert_eq!(Mnemonic::from_str("push.a"), Ok(Mnemonic::PushAll));
  }
}
