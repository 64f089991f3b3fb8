/*!
  Encoding and decoding of binary instructions.

  An instruction is one opcode byte followed by its operands, packed with no padding. Registers
  take one byte holding the register index; immediates and absolute addresses are little-endian
  and as wide as the opcode table says. Nothing is aligned.
*/
use std::convert::TryFrom;

use super::instruction::{opcode_info, instruction_length, Instruction, Operand, OperandKind, Width};
use crate::bus::AddressSpace;
use crate::error::DecodeError;
use crate::register::Register;

/// Appends the bytes of `instruction` to `bytes`.
pub fn encode_instruction_into(instruction: &Instruction, bytes: &mut Vec<u8>) {
  bytes.push(instruction.opcode());
  for operand in instruction.operands.iter() {
    match operand {
      | Operand::Register(register)
      | Operand::IndirectRegister(register) => {
        bytes.push((*register).into());
      }

      Operand::Immediate(value, width) => {
        bytes.extend_from_slice(&value.to_le_bytes()[..width.bytes() as usize]);
      }

      Operand::IndirectImmediate(address) => {
        bytes.extend_from_slice(&address.to_le_bytes());
      }
    }
  }
}

pub fn encode_instruction(instruction: &Instruction) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(instruction.length() as usize);
  encode_instruction_into(instruction, &mut bytes);
  bytes
}

/// Reads a little-endian value of `width` bytes. Missing bytes read as zero.
fn read_le(bytes: &[u8], start: usize, width: usize) -> u32 {
  (0..width).fold(0u32, |value, i| {
    let byte = bytes.get(start + i).copied().unwrap_or(0) as u32;
    value | (byte << (8 * i))
  })
}

fn read_register(bytes: &[u8], position: usize) -> Result<Register, DecodeError> {
  let index = bytes.get(position).copied().unwrap_or(0);
  Register::try_from(index).map_err(|_| DecodeError::InvalidRegister(index))
}

/**
  Decodes the instruction at the start of `bytes`. A slice shorter than the instruction's length
  is treated as if it were padded with zeros.
*/
pub fn decode_instruction(bytes: &[u8]) -> Result<Instruction, DecodeError> {
  let opcode = bytes.first().copied().unwrap_or(0);
  let info = opcode_info(opcode).ok_or(DecodeError::UnknownOpcode(opcode))?;

  let mut position = 1usize;
  let mut operands = Vec::with_capacity(info.operands.len());
  for kind in info.operands.iter() {
    let operand =
      match kind {
        OperandKind::Reg    => Operand::Register(read_register(bytes, position)?),
        OperandKind::IndReg => Operand::IndirectRegister(read_register(bytes, position)?),
        OperandKind::Imm8   => Operand::Immediate(read_le(bytes, position, 1), Width::W8),
        OperandKind::Imm16  => Operand::Immediate(read_le(bytes, position, 2), Width::W16),
        OperandKind::Imm32  => Operand::Immediate(read_le(bytes, position, 4), Width::W32),
        OperandKind::IndImm => Operand::IndirectImmediate(read_le(bytes, position, 4)),
      };
    operands.push(operand);
    position += kind.size() as usize;
  }

  Ok(Instruction { info, operands })
}

/// Fetches and decodes the instruction at `address`. Reads go through the bus, so an
/// instruction may straddle devices.
pub fn read_instruction(bus: &mut AddressSpace, address: u32) -> Result<Instruction, DecodeError> {
  let length = instruction_length(bus.get(address));
  decode_instruction(&bus.get_array(address, length))
}
