/*!
  A line-oriented debugger over a `Machine`. Every command takes one line of text and returns
  the text to show; failures come back as `error: ...` lines, so a host needs a single channel.

  Addresses are hexadecimal (`0x1F`) or decimal literals, or names from the machine's symbol
  table (`KBD_DEQUEUE`). Memory commands go through the bus, so reading a device register here
  has the same side effects as a program reading it.
*/

use std::collections::BTreeSet;

use prettytable::Table;

use crate::bytecode::{encode, parse_literal, read_instruction, Mnemonic};
use crate::error::CommandError;
use crate::machine::{make_register_table, Machine, RunOutcome, TABLE_DISPLAY_FORMAT};
use crate::register::Register;

const DEFAULT_DUMP_SIZE    : u32   = 0x100;
const DUMP_BYTES_PER_LINE  : u32   = 16;
const LISTING_INSTRUCTIONS : usize = 16;
/// Most matches `p` reports.
const MAX_MATCHES          : usize = 32;

type CommandResult = Result<String, CommandError>;

pub struct Debugger {
  machine     : Machine,
  breakpoints : BTreeSet<u32>,
}

impl Debugger {
  pub fn new(machine: Machine) -> Debugger {
    Debugger {
      machine,
      breakpoints: BTreeSet::new()
    }
  }

  pub fn machine(&self) -> &Machine {
    &self.machine
  }

  pub fn machine_mut(&mut self) -> &mut Machine {
    &mut self.machine
  }

  pub fn breakpoints(&self) -> impl Iterator<Item = &u32> {
    self.breakpoints.iter()
  }

  pub fn welcome(&mut self) -> String {
    format!("Welcome to the TinyVM debugger. Type '?' for help.\n\n{}", self.current_instruction())
  }

  /// Runs one command line. An empty line does nothing.
  pub fn parse(&mut self, line: &str) -> String {
    let mut words = line.split_whitespace();
    let command = match words.next() {
      Some(command) => command,
      None          => return String::new()
    };
    let args = words.collect::<Vec<&str>>();

    let result =
      match command {
        "?" | "h" => Ok(help().to_string()),
        "r"       => Ok(self.registers()),
        "s"       => self.step(),
        "o"       => self.step_over(),
        "c"       => self.continue_execution(),
        "b"       => self.set_breakpoint(&args),
        "u"       => self.unset_breakpoint(&args),
        "l"       => self.listing(&args),
        "a"       => self.assemble_at(&args),
        "d"       => self.dump(&args),
        "e"       => self.enter(&args),
        "f"       => self.fill(&args),
        "y"       => self.copy(&args),
        "p"       => self.search(&args),
        _         => Err(CommandError::UnknownCommand)
      };

    match result {
      Ok(text)                          => text,
      Err(CommandError::UnknownCommand) => CommandError::UnknownCommand.to_string(),
      Err(error)                        => format!("error: {}", error)
    }
  }

  // region Argument parsing

  fn address(&self, token: &str) -> Result<u32, CommandError> {
    parse_literal(token)
      .ok()
      .or_else(|| self.machine.symbols().get_address(token))
      .ok_or_else(|| CommandError::InvalidAddress(token.to_string()))
  }

  fn address_or_pc(&self, token: Option<&&str>) -> Result<u32, CommandError> {
    match token {
      Some(token) => self.address(token),
      None        => Ok(self.pc())
    }
  }

  fn required_address(&self, args: &[&str], index: usize, what: &'static str)
    -> Result<u32, CommandError>
  {
    let token = args.get(index).ok_or(CommandError::MissingArgument(what))?;
    self.address(token)
  }

  /// A block size for `d`, `f` and `y`. Blocks are capped at the size of RAM.
  fn block_size(&self, token: &str) -> Result<u32, CommandError> {
    let size = self.address(token)?;
    let max  = self.machine.config().ram_size;
    match size > max {
      true  => Err(CommandError::SizeTooLarge { size, max }),
      false => Ok(size)
    }
  }

  fn required_size(&self, args: &[&str], index: usize) -> Result<u32, CommandError> {
    let token = args.get(index).ok_or(CommandError::MissingArgument("size"))?;
    self.block_size(token)
  }

  // endregion

  fn pc(&self) -> u32 {
    self.machine.cpu().read(Register::PC)
  }

  fn current_instruction(&mut self) -> String {
    let pc = self.pc();
    let (text, _) = self.machine.disassemble_at(pc);
    format!(":: PC 0x{:08X} -> {}", pc, text)
  }

  // region CPU commands

  fn registers(&mut self) -> String {
    let registers = self.machine.registers_snapshot();
    format!(
      "{}\nFlags => {}\n\n{}",
      make_register_table(&registers),
      registers.flags(),
      self.current_instruction()
    )
  }

  fn step(&mut self) -> CommandResult {
    self.machine.step()?;
    Ok(self.current_instruction())
  }

  /// Steps, except that a `jsr` runs until control comes back to the instruction after it.
  fn step_over(&mut self) -> CommandResult {
    let pc = self.pc();
    let return_address =
      match read_instruction(self.machine.bus_mut(), pc) {
        Ok(instruction) if instruction.mnemonic() == Mnemonic::Jsr => pc.wrapping_add(instruction.length()),
        _ => return self.step()
      };

    let limit       = self.machine.config().run_step_limit;
    let breakpoints = &self.breakpoints;
    let outcome     = self.machine.run_until(
      limit,
      |pc| pc == return_address || breakpoints.contains(&pc)
    )?;
    Ok(self.report(outcome))
  }

  fn continue_execution(&mut self) -> CommandResult {
    let limit       = self.machine.config().run_step_limit;
    let breakpoints = &self.breakpoints;
    let outcome     = self.machine.run_until(limit, |pc| breakpoints.contains(&pc))?;
    Ok(self.report(outcome))
  }

  fn report(&mut self, outcome: RunOutcome) -> String {
    match outcome {
      RunOutcome::Stopped(pc) if self.breakpoints.contains(&pc) => {
        format!("breakpoint reached\n{}", self.current_instruction())
      }
      RunOutcome::Stopped(_) => self.current_instruction(),
      RunOutcome::StepLimit  => {
        let limit = self.machine.config().run_step_limit;
        format!("stopped after {} steps\n{}", limit, self.current_instruction())
      }
    }
  }

  fn set_breakpoint(&mut self, args: &[&str]) -> CommandResult {
    let address = self.address_or_pc(args.first())?;
    self.breakpoints.insert(address);
    Ok(format!("breakpoint set at 0x{:08X}", address))
  }

  fn unset_breakpoint(&mut self, args: &[&str]) -> CommandResult {
    let address = self.address_or_pc(args.first())?;
    match self.breakpoints.remove(&address) {
      true  => Ok(format!("breakpoint removed from 0x{:08X}", address)),
      false => Err(CommandError::NoBreakpoint(address))
    }
  }

  /// Disassembles from the given address. The current instruction and breakpoints are marked.
  fn listing(&mut self, args: &[&str]) -> CommandResult {
    let mut address = self.address_or_pc(args.first())?;
    let pc          = self.pc();

    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Bytes", ubl->"Instruction"]);

    for _ in 0..LISTING_INSTRUCTIONS {
      let (text, length) = self.machine.disassemble_at(address);
      let bytes = self.machine.bus_mut().get_array(address, length);

      let marker =
        match (address == pc, self.breakpoints.contains(&address)) {
          (true, true)   => "* --> ",
          (true, false)  => "--> ",
          (false, true)  => "* ",
          (false, false) => ""
        };
      table.add_row(
        row![r->format!("{}{:08X}", marker, address), hex_bytes(&bytes), text]
      );
      address = address.wrapping_add(length);
    }
    Ok(table.to_string())
  }

  // endregion

  // region Memory commands

  fn assemble_at(&mut self, args: &[&str]) -> CommandResult {
    let address = self.required_address(args, 0, "address")?;
    if args.len() < 2 {
      return Err(CommandError::MissingArgument("instruction"));
    }
    let bytes = encode(&args[1..].join(" "))?;
    self.machine.bus_mut().set_array(address, &bytes);

    let (text, _) = self.machine.disassemble_at(address);
    Ok(format!("0x{:08X}: {:<24}{}", address, hex_bytes(&bytes), text))
  }

  /// Sixteen bytes per line, with printable ASCII on the right.
  fn dump(&mut self, args: &[&str]) -> CommandResult {
    let address = self.required_address(args, 0, "address")?;
    let size    =
      match args.get(1) {
        Some(token) => self.block_size(token)?,
        None        => DEFAULT_DUMP_SIZE
      };

    let bytes = self.machine.bus_mut().get_array(address, size);
    let lines = bytes
      .chunks(DUMP_BYTES_PER_LINE as usize)
      .enumerate()
      .map(|(row, chunk)| {
        let ascii = chunk.iter()
                         .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                         .collect::<String>();
        format!(
          "{:08X}  {:<48} {}",
          address.wrapping_add(row as u32 * DUMP_BYTES_PER_LINE),
          hex_bytes(chunk),
          ascii
        )
      })
      .collect::<Vec<String>>();
    Ok(lines.join("\n"))
  }

  fn enter(&mut self, args: &[&str]) -> CommandResult {
    let address = self.required_address(args, 0, "address")?;
    let bytes   = parse_bytes(&args[1..])?;
    if bytes.is_empty() {
      return Err(CommandError::MissingArgument("data"));
    }
    self.machine.bus_mut().set_array(address, &bytes);
    Ok(format!("{} byte(s) written at 0x{:08X}", bytes.len(), address))
  }

  fn fill(&mut self, args: &[&str]) -> CommandResult {
    let address = self.required_address(args, 0, "address")?;
    let size    = self.required_size(args, 1)?;
    let value   = args.get(2).ok_or(CommandError::MissingArgument("value"))?;
    let value   = parse_byte(value)?;

    self.machine.bus_mut().set_array(address, &vec![value; size as usize]);
    Ok(format!("0x{:X} byte(s) filled at 0x{:08X}", size, address))
  }

  /// Copies a block. The source is read in full first, so the blocks may overlap.
  fn copy(&mut self, args: &[&str]) -> CommandResult {
    let source      = self.required_address(args, 0, "origin")?;
    let destination = self.required_address(args, 1, "destination")?;
    let size        = self.required_size(args, 2)?;

    let bus   = self.machine.bus_mut();
    let block = bus.get_array(source, size);
    bus.set_array(destination, &block);
    Ok(format!("0x{:X} byte(s) copied from 0x{:08X} to 0x{:08X}", size, source, destination))
  }

  /// Searches RAM for a byte pattern.
  fn search(&mut self, args: &[&str]) -> CommandResult {
    let pattern = parse_bytes(args)?;
    if pattern.is_empty() {
      return Err(CommandError::MissingArgument("pattern"));
    }

    let ram_size = self.machine.config().ram_size;
    let memory   = self.machine.bus_mut().get_array(0, ram_size);
    let found    = memory
      .windows(pattern.len())
      .enumerate()
      .filter(|(_, window)| *window == pattern.as_slice())
      .map(|(address, _)| format!("0x{:08X}", address))
      .take(MAX_MATCHES)
      .collect::<Vec<String>>();

    match found.is_empty() {
      true  => Ok("pattern not found".to_string()),
      false => Ok(found.join("\n"))
    }
  }

  // endregion
}

fn help() -> &'static str {
"CPU:
  [r] registers
  [s] step through
  [o] step over
  [c] continue execution
  [b]/[u] set/unset breakpoint  ([address=PC])
  [l] disassembly               ([address=PC])

Memory:
  [a] assemble into memory      (address instruction)
  [d] dump memory block         (address [size=0x100])
  [e] enter memory data         (address byte...)
  [f] fill memory with data     (address size byte)
  [y] copy memory block         (origin destination size)
  [p] search RAM for pattern    (byte...)"
}

fn hex_bytes(bytes: &[u8]) -> String {
  bytes.iter()
       .map(|byte| format!("{:02X}", byte))
       .collect::<Vec<String>>()
       .join(" ")
}

fn parse_byte(token: &str) -> Result<u8, CommandError> {
  match parse_literal(token) {
    Ok(value) if value <= u8::MAX as u32 => Ok(value as u8),
    _ => Err(CommandError::InvalidByte(token.to_string()))
  }
}

fn parse_bytes(tokens: &[&str]) -> Result<Vec<u8>, CommandError> {
  tokens.iter().map(|token| parse_byte(token)).collect()
}
