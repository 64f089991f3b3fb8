/*!
  The human readable textual form of machine code is called assembly. One line holds one
  instruction:

  ```text
  mnemonic [operand [, operand]]
  ```

  An operand is a register name, a literal (`0x`-prefixed hexadecimal or decimal), or either of
  those in square brackets. Mnemonics and register names are case-insensitive. The opcode is
  chosen from the mnemonic, the operand classes, and the magnitude of any immediate: the
  narrowest immediate form that holds the value wins.
*/

use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{is_not, tag_no_case, take_while1},
  character::complete::{
    char as one_char,
    digit1,
    hex_digit1,
    space0,
    space1
  },
  combinator::{all_consuming, map, map_res, opt},
  sequence::{delimited, pair, preceded, tuple},
  IResult
};

use super::binary::encode_instruction_into;
use super::instruction::{Instruction, Mnemonic, Operand, OPCODE_TABLE, Width};
use crate::error::{AssemblyError, EncodeError};
use crate::register::Register;

/// Starts a comment in multi-line program text.
const COMMENT_CHAR: char = ';';

fn mnemonic_p(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.')(input)
}

fn operand_p(input: &str) -> IResult<&str, &str> {
  is_not(", \t")(input)
}

/// Splits a line into its mnemonic and zero, one, or two operand tokens.
fn line_p(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
  map(
    all_consuming(delimited(
      space0,
      pair(
        mnemonic_p,
        opt(pair(
          preceded(space1, operand_p),
          opt(preceded(tuple((space0, one_char(','), space0)), operand_p))
        ))
      ),
      space0
    )),
    |(mnemonic, operands)| {
      let mut tokens = Vec::new();
      if let Some((first, second)) = operands {
        tokens.push(first);
        tokens.extend(second);
      }
      (mnemonic, tokens)
    }
  )(input)
}

fn literal_p(input: &str) -> IResult<&str, u64> {
  alt((
    map_res(
      preceded(tag_no_case("0x"), hex_digit1),
      |digits: &str| u64::from_str_radix(digits, 16)
    ),
    map_res(digit1, |digits: &str| digits.parse::<u64>())
  ))(input)
}

/// Parses a hexadecimal (`0x1F`) or decimal (`31`) literal that fits in 32 bits.
pub fn parse_literal(text: &str) -> Result<u32, EncodeError> {
  match all_consuming(literal_p)(text) {
    Ok((_, value)) if value <= u32::MAX as u64 => Ok(value as u32),
    _ => Err(EncodeError::InvalidLiteral(text.to_string()))
  }
}

enum Bare {
  Register(Register),
  Literal(u32)
}

fn parse_bare(token: &str) -> Result<Bare, EncodeError> {
  if token.contains(|c: char| c == '[' || c == ']') {
    return Err(EncodeError::UnbalancedBracket(token.to_string()));
  }
  match token.chars().next() {
    Some(c) if c.is_ascii_digit() => parse_literal(token).map(Bare::Literal),
    Some(c) if c.is_ascii_alphabetic() && token.chars().all(|c| c.is_ascii_alphanumeric()) => {
      Register::from_name(token)
        .map(Bare::Register)
        .ok_or_else(|| EncodeError::UnknownRegister(token.to_string()))
    }
    _ => Err(EncodeError::InvalidSyntax(token.to_string()))
  }
}

/// Classifies one operand token.
pub fn parse_operand(token: &str) -> Result<Operand, EncodeError> {
  let opens  = token.starts_with('[');
  let closes = token.ends_with(']');

  match (opens, closes) {
    (true, true) if token.len() >= 2 => {
      let inner = &token[1..token.len() - 1];
      if inner.is_empty() {
        return Err(EncodeError::InvalidSyntax(token.to_string()));
      }
      match parse_bare(inner)? {
        Bare::Register(register) => Ok(Operand::IndirectRegister(register)),
        Bare::Literal(address)   => Ok(Operand::IndirectImmediate(address)),
      }
    }

    (false, false) => {
      match parse_bare(token)? {
        Bare::Register(register) => Ok(Operand::Register(register)),
        Bare::Literal(value)     => Ok(Operand::Immediate(value, Width::minimal(value))),
      }
    }

    _ => Err(EncodeError::UnbalancedBracket(token.to_string()))
  }
}

/**
  Finds the opcode for `mnemonic` applied to `operands`. Among the forms whose operand classes
  match, the shortest encoding wins, which is the one with the narrowest immediate that still
  holds the value.
*/
pub fn select_instruction(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Instruction, EncodeError> {
  let info =
    OPCODE_TABLE
      .iter()
      .filter(|info| info.mnemonic == mnemonic && info.operands.len() == operands.len())
      .filter(|info| info.operands.iter().zip(operands).all(|(kind, operand)| kind.accepts(operand)))
      .min_by_key(|info| info.length())
      .ok_or_else(|| EncodeError::NoMatchingOpcode {
        mnemonic: mnemonic.to_string(),
        operands: operands.iter().map(Operand::describe).collect::<Vec<&str>>().join(", ")
      })?;

  Ok(Instruction {
    info,
    operands: info.operands
                  .iter()
                  .zip(operands)
                  .map(|(kind, operand)| kind.fit(*operand))
                  .collect()
  })
}

/// Parses one line of assembly into an instruction.
pub fn parse_instruction(text: &str) -> Result<Instruction, EncodeError> {
  let (mnemonic_text, tokens) =
    match line_p(text.trim()) {
      Ok((_, parsed)) => parsed,
      Err(_) => return Err(EncodeError::InvalidSyntax(text.trim().to_string()))
    };

  let mnemonic = Mnemonic::from_str(&mnemonic_text.to_ascii_lowercase())
    .map_err(|_| EncodeError::UnknownMnemonic(mnemonic_text.to_string()))?;

  let operands = tokens.into_iter()
                       .map(parse_operand)
                       .collect::<Result<Vec<Operand>, EncodeError>>()?;

  select_instruction(mnemonic, &operands)
}

/// Assembles one instruction to bytes.
pub fn encode(text: &str) -> Result<Vec<u8>, EncodeError> {
  let instruction = parse_instruction(text)?;
  let mut bytes = Vec::with_capacity(instruction.length() as usize);
  encode_instruction_into(&instruction, &mut bytes);
  Ok(bytes)
}

/**
  Assembles a program of one instruction per line into contiguous bytes. Blank lines and
  everything after a `;` are ignored. The error names the first failing line, counting from 1.
*/
pub fn assemble(text: &str) -> Result<Vec<u8>, AssemblyError> {
  let mut bytes = Vec::new();
  for (index, line) in text.lines().enumerate() {
    let code = line.split(COMMENT_CHAR).next().unwrap_or("").trim();
    if code.is_empty() {
      continue;
    }
    let instruction = parse_instruction(code)
      .map_err(|error| AssemblyError { line: index + 1, error })?;
    encode_instruction_into(&instruction, &mut bytes);
  }
  Ok(bytes)
}
