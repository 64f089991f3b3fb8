/*!
  Machine code for the LuisaVM CPU.

  Instructions are variable length: one opcode byte followed by the opcode's operands, packed
  little-endian with no alignment. A single mnemonic maps to several opcodes, one per operand
  shape (`mov A, B`, `mov A, 0x12`, `mov A, 0x1234`, ...). The shapes live in one table,
  `OPCODE_TABLE`, which drives all three directions:

    * `assembly`: text to instruction, choosing the narrowest immediate that fits.
    * `binary`: instruction to bytes and back.
    * `disassembly`: bytes on the bus to text, naming known addresses and showing anything that
      does not decode as a `data` byte.

  The CPU executes `Instruction` values produced by `binary::read_instruction`, so the
  disassembler and the CPU can never disagree about an instruction's length.
*/

mod assembly;
mod binary;
mod disassembly;
mod instruction;

pub use assembly::{assemble, encode, parse_instruction, parse_literal, parse_operand, select_instruction};
pub use binary::{decode_instruction, encode_instruction, encode_instruction_into, read_instruction};
pub use disassembly::Disassembler;
pub use instruction::{
  instruction_length, opcode_info,
  Instruction, Mnemonic, OpcodeInfo, Operand, OperandKind, Width,
  OPCODE_TABLE
};
