//! Error types for every layer of the machine. Each layer has its own enum; none of them are
//! converted into one another implicitly, because the recovery policy differs:
//!
//!  * `EncodeError`: bad assembler input. The caller fixes the text and tries again.
//!  * `DecodeError`: bytes that are not an instruction. Disassembly shows them as data.
//!  * `MachineFault`: fatal for the current step. The host decides to halt or reset.
//!  * `BusError`: a device could not be attached.
//!  * `DeviceError`: host-side misuse of a device, or a storage unit failing. Never seen by the
//!    emulated program, which only observes device status registers.
//!  * `CommandError`: a debugger command that could not run. Shown to the user as text.

use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EncodeError {
  #[error("Invalid command `{0}`")]
  InvalidSyntax(String),

  #[error("Unknown instruction `{0}`")]
  UnknownMnemonic(String),

  #[error("Invalid register `{0}`")]
  UnknownRegister(String),

  #[error("Unbalanced bracket in `{0}`")]
  UnbalancedBracket(String),

  #[error("Invalid literal `{0}`")]
  InvalidLiteral(String),

  #[error("No form of `{mnemonic}` takes operands ({operands})")]
  NoMatchingOpcode {
    mnemonic : String,
    operands : String
  },
}

/// An `EncodeError` in a multi-line program, with the 1-based line it occurred on.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("line {line}: {error}")]
pub struct AssemblyError {
  pub line  : usize,
  pub error : EncodeError,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
  #[error("unknown opcode 0x{0:02X}")]
  UnknownOpcode(u8),

  #[error("invalid register index 0x{0:02X}")]
  InvalidRegister(u8),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum MachineFault {
  #[error("division by zero at 0x{pc:08X}")]
  DivisionByZero { pc: u32 },

  #[error("invalid register index 0x{index:02X} at 0x{pc:08X}")]
  InvalidRegister { pc: u32, index: u8 },

  #[error("invalid opcode 0x{opcode:02X} at 0x{pc:08X}")]
  InvalidOpcode { pc: u32, opcode: u8 },
}

impl MachineFault {
  /// Attaches the address of the faulting instruction to a decode failure.
  pub fn from_decode(pc: u32, error: DecodeError) -> MachineFault {
    match error {
      DecodeError::UnknownOpcode(opcode)  => MachineFault::InvalidOpcode { pc, opcode },
      DecodeError::InvalidRegister(index) => MachineFault::InvalidRegister { pc, index },
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum BusError {
  #[error("device window at 0x{0:08X} has size zero")]
  EmptyWindow(u32),

  #[error("device window at 0x{base:08X} of size 0x{size:X} runs past the end of the address space")]
  WindowOverflow { base: u32, size: u32 },

  #[error("device window at 0x{base:08X} of size 0x{size:X} overlaps an attached device")]
  Overlap { base: u32, size: u32 },

  #[error("no free device slot")]
  NoFreeSlot,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DeviceError {
  #[error("a storage device holds at most {max} units, {given} given")]
  TooManyUnits { max: usize, given: usize },

  #[error("storage unit failed: {0}")]
  Physical(String),

  #[error("key code 0x{0:X} does not fit in 28 bits")]
  InvalidKey(u32),

  #[error("keyboard queue is full")]
  QueueFull,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CommandError {
  #[error("syntax error (use [?] for help)")]
  UnknownCommand,

  #[error("missing {0}")]
  MissingArgument(&'static str),

  #[error("invalid address or symbol `{0}`")]
  InvalidAddress(String),

  #[error("invalid byte `{0}`")]
  InvalidByte(String),

  #[error("block size 0x{size:X} is larger than 0x{max:X}")]
  SizeTooLarge { size: u32, max: u32 },

  #[error("no breakpoint at 0x{0:08X}")]
  NoBreakpoint(u32),

  #[error(transparent)]
  Encode(#[from] EncodeError),

  #[error(transparent)]
  Fault(#[from] MachineFault),
}
