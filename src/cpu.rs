/*!
  The CPU: fetch, decode, execute, then check for interrupts.

  The register file is shared with `CpuPort`, the device through which the registers also appear
  on the bus. `Cpu` never holds a borrow of the register file across a bus access, since that
  access may land in `CpuPort` and borrow it again.
*/

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::AddressSpace;
use crate::bytecode::{read_instruction, Instruction, Mnemonic, Operand, Width};
use crate::config::MachineConfig;
use crate::device::{byte_lane, set_byte_lane, Device, DeviceType, HEADER_SIZE};
use crate::error::MachineFault;
use crate::register::{Flags, Register, RegisterFile, REGISTER_COUNT};

/// Offset of register `A` in the CPU's device window. Register `i` is at `4 * i` past it.
pub const CPU_REGISTERS: u32 = 0x10;

static CONSTANTS: &[(&str, u32)] = &[
  ("A",  CPU_REGISTERS + 0x00),
  ("B",  CPU_REGISTERS + 0x04),
  ("C",  CPU_REGISTERS + 0x08),
  ("D",  CPU_REGISTERS + 0x0C),
  ("E",  CPU_REGISTERS + 0x10),
  ("F",  CPU_REGISTERS + 0x14),
  ("G",  CPU_REGISTERS + 0x18),
  ("H",  CPU_REGISTERS + 0x1C),
  ("I",  CPU_REGISTERS + 0x20),
  ("J",  CPU_REGISTERS + 0x24),
  ("K",  CPU_REGISTERS + 0x28),
  ("L",  CPU_REGISTERS + 0x2C),
  ("FP", CPU_REGISTERS + 0x30),
  ("SP", CPU_REGISTERS + 0x34),
  ("PC", CPU_REGISTERS + 0x38),
  ("FL", CPU_REGISTERS + 0x3C),
];

type SharedRegisters = Rc<RefCell<RegisterFile>>;

fn reset_registers(registers: &mut RegisterFile, stack_top: u32) {
  registers.clear();
  registers.write(Register::SP, stack_top);
}

/**
  Result, carry and overflow of a two-operand ALU operation on `a` and `b`. `None` means the
  divisor was zero.
*/
fn alu(mnemonic: Mnemonic, a: u32, b: u32) -> Option<(u32, bool, bool)> {
  let outcome =
    match mnemonic {
      Mnemonic::Or  => (a | b, false, false),
      Mnemonic::Xor => (a ^ b, false, false),
      Mnemonic::And => (a & b, false, false),

      Mnemonic::Shl => {
        // Carry when any set bit is shifted out.
        let carry = b > 0 && a != 0 && (b >= 32 || a >> (32 - b) != 0);
        (a.checked_shl(b).unwrap_or(0), carry, false)
      }
      Mnemonic::Shr => (a.checked_shr(b).unwrap_or(0), false, false),

      Mnemonic::Add => {
        let (result, carry) = a.overflowing_add(b);
        (result, carry, (a as i32).overflowing_add(b as i32).1)
      }
      Mnemonic::Sub | Mnemonic::Cmp => {
        let (result, borrow) = a.overflowing_sub(b);
        (result, borrow, (a as i32).overflowing_sub(b as i32).1)
      }
      Mnemonic::Mul => {
        let wide = a as u64 * b as u64;
        (wide as u32, wide > u32::MAX as u64, (a as i32).overflowing_mul(b as i32).1)
      }
      Mnemonic::Idiv => (a.checked_div(b)?, false, false),
      Mnemonic::Mod  => (a.checked_rem(b)?, false, false),

      _ => (a, false, false)
    };
  Some(outcome)
}

fn branch_taken(mnemonic: Mnemonic, flags: Flags) -> bool {
  match mnemonic {
    Mnemonic::Bz   => flags.zero(),
    Mnemonic::Bnz  => !flags.zero(),
    Mnemonic::Bneg => flags.sign(),
    Mnemonic::Bpos => !flags.sign(),
    Mnemonic::Bgt  => flags.greater(),
    Mnemonic::Bgte => !flags.less(),
    Mnemonic::Blt  => flags.less(),
    Mnemonic::Blte => !flags.greater(),
    Mnemonic::Bv   => flags.overflow(),
    Mnemonic::Bnv  => !flags.overflow(),
    // jmp, jsr
    _              => true
  }
}

pub struct Cpu {
  registers : SharedRegisters,
  config    : MachineConfig,
}

impl Cpu {
  pub fn new(config: &MachineConfig) -> Cpu {
    let mut registers = RegisterFile::new();
    reset_registers(&mut registers, config.stack_top);
    Cpu {
      registers : Rc::new(RefCell::new(registers)),
      config    : *config,
    }
  }

  /// The device that exposes this CPU's registers on the bus.
  pub fn port(&self) -> CpuPort {
    CpuPort {
      registers : Rc::clone(&self.registers),
      stack_top : self.config.stack_top,
    }
  }

  /// Clears every register and points `SP` at the top of the stack.
  pub fn reset(&mut self) {
    reset_registers(&mut self.registers.borrow_mut(), self.config.stack_top);
  }

  pub fn snapshot(&self) -> RegisterFile {
    *self.registers.borrow()
  }

  pub fn read(&self, register: Register) -> u32 {
    self.registers.borrow().read(register)
  }

  pub fn write(&self, register: Register, value: u32) {
    self.registers.borrow_mut().write(register, value);
  }

  pub fn flags(&self) -> Flags {
    self.registers.borrow().flags()
  }

  pub fn set_flags(&self, flags: Flags) {
    self.registers.borrow_mut().set_flags(flags);
  }

  fn update_flags<F: FnOnce(&mut Flags)>(&self, update: F) {
    self.registers.borrow_mut().update_flags(update);
  }

  // region Stack

  fn push(&self, bus: &mut AddressSpace, width: Width, value: u32) {
    let sp = self.read(Register::SP).wrapping_sub(width.bytes());
    self.write(Register::SP, sp);
    bus.set_sized(sp, width.bytes(), value);
  }

  fn pop(&self, bus: &mut AddressSpace, width: Width) -> u32 {
    let sp = self.read(Register::SP);
    let value = bus.get_sized(sp, width.bytes());
    self.write(Register::SP, sp.wrapping_add(width.bytes()));
    value
  }

  // endregion

  // region Operands

  /// The value of a register or immediate operand.
  fn value(&self, operand: &Operand) -> u32 {
    match operand {
      Operand::Register(register)         => self.read(*register),
      Operand::Immediate(value, _)        => *value,
      Operand::IndirectRegister(register) => self.read(*register),
      Operand::IndirectImmediate(address) => *address,
    }
  }

  /// The address an indirect operand refers to.
  fn address(&self, bus: &mut AddressSpace, operand: &Operand, through_pointer: bool) -> u32 {
    match operand {
      Operand::IndirectImmediate(address) if through_pointer => bus.get32(*address),
      operand                                                => self.value(operand)
    }
  }

  fn load(&self, bus: &mut AddressSpace, operand: &Operand, width: Width, through_pointer: bool) -> u32 {
    match operand {
      | Operand::IndirectRegister(_)
      | Operand::IndirectImmediate(_) => {
        let address = self.address(bus, operand, through_pointer);
        bus.get_sized(address, width.bytes())
      }
      operand => self.value(operand) & width.mask()
    }
  }

  fn store(&self, bus: &mut AddressSpace, operand: &Operand, width: Width, through_pointer: bool, value: u32) {
    match operand {
      Operand::Register(register) => {
        self.update_flags(|flags| flags.set_result(value, false, false));
        self.write(*register, value);
      }
      | Operand::IndirectRegister(_)
      | Operand::IndirectImmediate(_) => {
        let address = self.address(bus, operand, through_pointer);
        bus.set_sized(address, width.bytes(), value);
      }
      // Immediates are never destinations.
      Operand::Immediate(_, _) => {}
    }
  }

  // endregion

  /**
    Saves the return address and `FL` on the stack, disables interrupts, and jumps to the vector
    of `line`.
  */
  fn enter_interrupt(&self, bus: &mut AddressSpace, return_address: u32, line: u8) {
    #[cfg(feature = "trace_execution")]
    println!("interrupt {} from 0x{:08X}", line, return_address);

    self.push(bus, Width::W32, return_address);
    self.push(bus, Width::W32, self.read(Register::FL));
    self.update_flags(|flags| flags.set(Flags::T, false));
    let handler = bus.get32(self.config.vector_address(line));
    self.write(Register::PC, handler);
  }

  /// Services at most one pending device interrupt, if interrupts are enabled.
  pub fn check_interrupts(&self, bus: &mut AddressSpace) {
    if !self.flags().interrupts_enabled() {
      return;
    }
    if let Some(line) = bus.next_interrupt() {
      self.enter_interrupt(bus, self.read(Register::PC), line);
    }
  }

  /**
    Executes the instruction at `PC`, then services a pending interrupt. On a fault, `PC` still
    points at the faulting instruction and no register has been written.
  */
  pub fn step(&mut self, bus: &mut AddressSpace) -> Result<(), MachineFault> {
    let pc = self.read(Register::PC);
    let instruction = read_instruction(bus, pc).map_err(|error| MachineFault::from_decode(pc, error))?;

    #[cfg(feature = "trace_execution")]
    println!("0x{:08X}: {}", pc, instruction);

    self.write(Register::PC, pc.wrapping_add(instruction.length()));
    if let Err(fault) = self.execute(bus, pc, &instruction) {
      self.write(Register::PC, pc);
      return Err(fault);
    }

    self.check_interrupts(bus);
    Ok(())
  }

  /// Executes one decoded instruction. `PC` already holds the address of the next one.
  fn execute(&self, bus: &mut AddressSpace, pc: u32, instruction: &Instruction) -> Result<(), MachineFault> {
    let mnemonic = instruction.mnemonic();
    let next_pc  = self.read(Register::PC);

    match (mnemonic, instruction.operands.as_slice()) {

      // region Data movement

      (Mnemonic::Mov, [destination, source])
      | (Mnemonic::Movb, [destination, source])
      | (Mnemonic::Movw, [destination, source])
      | (Mnemonic::Movd, [destination, source]) => {
        let width = mnemonic.access_width();
        let through_pointer = instruction.info.stores_through_pointer();
        let value = self.load(bus, source, width, through_pointer);
        self.store(bus, destination, width, through_pointer, value);
      }

      // endregion

      // region Arithmetic and logic

      (Mnemonic::Cmp, [Operand::Register(register), source]) => {
        let a = self.read(*register);
        let b = self.value(source);
        if let Some((result, carry, overflow)) = alu(mnemonic, a, b) {
          self.update_flags(|flags| {
            flags.set_result(result, carry, overflow);
            flags.set_comparison(a > b, a < b);
          });
        }
      }

      (_, [Operand::Register(register), source])
        if matches!(
          mnemonic,
          Mnemonic::Or | Mnemonic::Xor | Mnemonic::And | Mnemonic::Shl | Mnemonic::Shr
          | Mnemonic::Add | Mnemonic::Sub | Mnemonic::Mul | Mnemonic::Idiv | Mnemonic::Mod
        ) => {
        let (result, carry, overflow) =
          alu(mnemonic, self.read(*register), self.value(source))
            .ok_or(MachineFault::DivisionByZero { pc })?;
        self.update_flags(|flags| flags.set_result(result, carry, overflow));
        self.write(*register, result);
      }

      (Mnemonic::Not, [Operand::Register(register)]) => {
        let result = !self.read(*register);
        self.update_flags(|flags| flags.set_result(result, false, false));
        self.write(*register, result);
      }

      (Mnemonic::Inc, [Operand::Register(register)])
      | (Mnemonic::Dec, [Operand::Register(register)]) => {
        let operation = if mnemonic == Mnemonic::Inc { Mnemonic::Add } else { Mnemonic::Sub };
        if let Some((result, carry, overflow)) = alu(operation, self.read(*register), 1) {
          self.update_flags(|flags| flags.set_result(result, carry, overflow));
          self.write(*register, result);
        }
      }

      // endregion

      // region Control flow

      (Mnemonic::Jsr, [target]) => {
        let target = self.value(target);
        self.push(bus, Width::W32, next_pc);
        self.write(Register::PC, target);
      }

      (Mnemonic::Ret, []) => {
        let target = self.pop(bus, Width::W32);
        self.write(Register::PC, target);
      }

      (Mnemonic::Sys, [line]) => {
        let line = self.value(line) as u8;
        self.enter_interrupt(bus, next_pc, line);
      }

      (Mnemonic::Iret, []) | (Mnemonic::Sret, []) => {
        let flags = self.pop(bus, Width::W32);
        let target = self.pop(bus, Width::W32);
        self.set_flags(Flags::from_bits(flags));
        self.write(Register::PC, target);
      }

      (_, [target])
        if matches!(
          mnemonic,
          Mnemonic::Bz | Mnemonic::Bnz | Mnemonic::Bneg | Mnemonic::Bpos | Mnemonic::Bgt
          | Mnemonic::Bgte | Mnemonic::Blt | Mnemonic::Blte | Mnemonic::Bv | Mnemonic::Bnv
          | Mnemonic::Jmp
        ) => {
        if branch_taken(mnemonic, self.flags()) {
          let target = self.value(target);
          self.write(Register::PC, target);
        }
      }

      // endregion

      // region Stack

      (Mnemonic::Pushb, [source])
      | (Mnemonic::Pushw, [source])
      | (Mnemonic::Pushd, [source]) => {
        let width = mnemonic.access_width();
        let value = self.value(source) & width.mask();
        self.push(bus, width, value);
      }

      (Mnemonic::Popb, [Operand::Register(register)])
      | (Mnemonic::Popw, [Operand::Register(register)])
      | (Mnemonic::Popd, [Operand::Register(register)]) => {
        let value = self.pop(bus, mnemonic.access_width());
        self.write(*register, value);
      }

      (Mnemonic::PushAll, []) => {
        for register in Register::general_purpose() {
          self.push(bus, Width::W32, self.read(register));
        }
      }

      (Mnemonic::PopAll, []) => {
        for register in Register::general_purpose().rev() {
          let value = self.pop(bus, Width::W32);
          self.write(register, value);
        }
      }

      (Mnemonic::Popx, [count]) => {
        let sp = self.read(Register::SP).wrapping_add(self.value(count));
        self.write(Register::SP, sp);
      }

      // endregion

      (Mnemonic::Nop, []) => {}

      _ => return Err(MachineFault::InvalidOpcode { pc, opcode: instruction.opcode() })
    }

    Ok(())
  }
}


/**
  The CPU's registers as a device. Register `i` occupies four bytes, little-endian, at
  `CPU_REGISTERS + 4 * i`, so `movd A, [CPU_K]` reads `K`.
*/
pub struct CpuPort {
  registers : SharedRegisters,
  stack_top : u32,
}

impl CpuPort {
  /// Register index and byte lane for a window offset, if it falls on a register.
  fn locate(offset: u32) -> Option<(usize, u32)> {
    let end = CPU_REGISTERS + 4 * REGISTER_COUNT as u32;
    if offset >= CPU_REGISTERS && offset < end {
      let relative = offset - CPU_REGISTERS;
      Some(((relative / 4) as usize, relative % 4))
    } else {
      None
    }
  }
}

impl Device for CpuPort {
  fn name(&self) -> &str {
    "TinyCPU"
  }

  fn device_type(&self) -> DeviceType {
    DeviceType::Cpu
  }

  fn prefix(&self) -> &'static str {
    "CPU"
  }

  fn constant_list(&self) -> &'static [(&'static str, u32)] {
    CONSTANTS
  }

  fn get(&mut self, offset: u32) -> u8 {
    if offset < HEADER_SIZE {
      return self.header_byte(offset);
    }
    match CpuPort::locate(offset) {
      Some((index, lane)) => byte_lane(self.registers.borrow().read_index(index), lane),
      None                => 0
    }
  }

  fn set(&mut self, offset: u32, value: u8) {
    if let Some((index, lane)) = CpuPort::locate(offset) {
      let mut registers = self.registers.borrow_mut();
      let word = set_byte_lane(registers.read_index(index), lane, value);
      registers.write_index(index, word);
    }
  }

  fn reset(&mut self) {
    reset_registers(&mut self.registers.borrow_mut(), self.stack_top);
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }
}
