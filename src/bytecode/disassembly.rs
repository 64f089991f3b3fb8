use super::binary::read_instruction;
use super::instruction::{Instruction, Operand, Width};
use crate::bus::AddressSpace;
use crate::symboltable::SymbolTable;

/// Renders memory as assembly text. Thirty-two bit values that name a known address are shown
/// by name.
pub struct Disassembler {
  symbols: SymbolTable
}

impl Disassembler {
  pub fn new(symbols: SymbolTable) -> Disassembler {
    Disassembler { symbols }
  }

  pub fn symbols(&self) -> &SymbolTable {
    &self.symbols
  }

  fn render_operand(&self, operand: &Operand) -> String {
    let symbol =
      match operand {
        Operand::Immediate(value, Width::W32) => self.symbols.get_symbol(*value),
        Operand::IndirectImmediate(address)   => self.symbols.get_symbol(*address),
        _                                     => None
      };

    match (symbol, operand) {
      (Some(name), Operand::IndirectImmediate(_)) => format!("[{}]", name),
      (Some(name), _)                             => name.to_string(),
      (None, operand)                             => operand.to_string()
    }
  }

  pub fn render(&self, instruction: &Instruction) -> String {
    instruction.format_with(|operand| self.render_operand(operand))
  }

  /**
    Disassembles the instruction at `address`, returning its text and its length in bytes.
    Bytes that do not form a valid instruction come back as a one-byte `data` pseudo-instruction,
    so a listing can always advance.
  */
  pub fn decode(&self, bus: &mut AddressSpace, address: u32) -> (String, u32) {
    match read_instruction(bus, address) {
      Ok(instruction) => (self.render(&instruction), instruction.length()),
      Err(_) => (format!("{:<8}0x{:02X}", "data", bus.get(address)), 1)
    }
  }
}
