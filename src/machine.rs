//! The whole computer: RAM, the CPU, and any peripherals, wired to one address space.

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Cell, Row, Table};
use strum::IntoEnumIterator;

use crate::bus::{AddressSpace, DeviceId, Window};
use crate::bytecode::Disassembler;
use crate::config::MachineConfig;
use crate::cpu::Cpu;
use crate::device::memory::Memory;
use crate::device::Device;
use crate::error::{BusError, MachineFault};
use crate::register::{Register, RegisterFile};
use crate::symboltable::SymbolTable;

/// Why `run_until` returned without a fault.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RunOutcome {
  /// The stop condition held for the `PC` carried here.
  Stopped(u32),
  /// The step budget ran out.
  StepLimit,
}

/**
  Collects peripherals, then builds a `Machine`. RAM goes at address zero and the CPU gets the
  first peripheral slot; the peripherals follow in the order they were added. The symbol table is
  built once, after everything is attached.
*/
pub struct MachineBuilder {
  config  : MachineConfig,
  devices : Vec<Box<dyn Device>>,
}

impl MachineBuilder {
  pub fn new(config: MachineConfig) -> MachineBuilder {
    MachineBuilder {
      config,
      devices: Vec::new()
    }
  }

  pub fn device(mut self, device: Box<dyn Device>) -> MachineBuilder {
    self.devices.push(device);
    self
  }

  pub fn build(self) -> Result<Machine, BusError> {
    let config  = self.config;
    let mut bus = AddressSpace::new(&config);

    bus.attach(Box::new(Memory::new(config.ram_size)), 0, config.ram_size)?;
    let cpu = Cpu::new(&config);
    bus.add_device(Box::new(cpu.port()))?;
    for device in self.devices {
      bus.add_device(device)?;
    }

    let disassembler = Disassembler::new(SymbolTable::from_bus(&bus));
    Ok(Machine { config, bus, cpu, disassembler })
  }
}

pub struct Machine {
  config       : MachineConfig,
  bus          : AddressSpace,
  cpu          : Cpu,
  disassembler : Disassembler,
}

impl Machine {
  /// A machine with RAM and a CPU only.
  pub fn new(config: MachineConfig) -> Result<Machine, BusError> {
    MachineBuilder::new(config).build()
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  pub fn cpu(&self) -> &Cpu {
    &self.cpu
  }

  pub fn bus(&self) -> &AddressSpace {
    &self.bus
  }

  pub fn bus_mut(&mut self) -> &mut AddressSpace {
    &mut self.bus
  }

  pub fn symbols(&self) -> &SymbolTable {
    self.disassembler.symbols()
  }

  /// Executes exactly one instruction, plus the interrupt check that follows it.
  pub fn step(&mut self) -> Result<(), MachineFault> {
    let result = self.cpu.step(&mut self.bus);

    #[cfg(feature = "trace_execution")]
    println!("{}", self);

    result
  }

  /**
    Steps until `stop(PC)` holds after a step, or `max_steps` steps have run. At least one step is
    always taken, so running from a breakpoint moves past it.
  */
  pub fn run_until<F>(&mut self, max_steps: u64, stop: F) -> Result<RunOutcome, MachineFault>
    where F: Fn(u32) -> bool
  {
    for _ in 0..max_steps {
      self.step()?;
      let pc = self.cpu.read(Register::PC);
      if stop(pc) {
        return Ok(RunOutcome::Stopped(pc));
      }
    }
    Ok(RunOutcome::StepLimit)
  }

  /// Disassembles the instruction at `address`: its text and its length in bytes.
  pub fn disassemble_at(&mut self, address: u32) -> (String, u32) {
    self.disassembler.decode(&mut self.bus, address)
  }

  pub fn registers_snapshot(&self) -> RegisterFile {
    self.cpu.snapshot()
  }

  /// Resets every device, which clears RAM and the registers.
  pub fn reset(&mut self) {
    self.bus.reset();
  }

  // region Device lookup

  /// The first attached device of type `T`, with its window.
  pub fn find_device<T: Device>(&self) -> Option<(DeviceId, Window)> {
    self.bus
        .devices()
        .enumerate()
        .find(|(_, (_, device))| device.as_any().is::<T>())
        .map(|(id, (window, _))| (id, window))
  }

  pub fn device_mut<T: Device>(&mut self) -> Option<&mut T> {
    let (id, _) = self.find_device::<T>()?;
    self.bus.device_as_mut::<T>(id)
  }

  // endregion
}

lazy_static! {
  pub(crate) static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// Registers in four columns of four, `A` to `D` down the first column.
pub fn make_register_table(registers: &RegisterFile) -> Table {
  let names = Register::iter().collect::<Vec<Register>>();
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);

  for row in 0..4 {
    let cells = (0..4).map(|column| {
                        let register = names[column * 4 + row];
                        let name: &'static str = register.into();
                        Cell::new(&format!("{:>2}: {:08X}", name, registers.read(register)))
                      })
                      .collect::<Vec<Cell>>();
    table.add_row(Row::new(cells));
  }
  table
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let registers = self.cpu.snapshot();
    let table = make_register_table(&registers);
    write!(f, "{}{}", table, registers.flags())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{assemble, encode};
  use crate::device::keyboard::{KeyEvent, Keyboard, KBD_MODE, MODE_INTERRUPT};
  use crate::device::storage::{self, MemoryUnit, Storage, STATUS_DONE};
  use crate::register::Flags;
  use std::collections::HashSet;

  fn machine() -> Machine {
    Machine::new(MachineConfig::default()).unwrap()
  }

  /// Resets, runs `prepare`, writes `text` at address 0, and steps once.
  fn opc<F: FnOnce(&mut Machine)>(machine: &mut Machine, text: &str, prepare: F) {
    machine.reset();
    prepare(machine);
    let bytes = encode(text).unwrap();
    machine.bus_mut().set_array(0, &bytes);
    machine.step().unwrap();
  }

  fn reg(machine: &Machine, register: Register) -> u32 {
    machine.cpu().read(register)
  }

  fn set(machine: &Machine, register: Register, value: u32) {
    machine.cpu().write(register, value);
  }

  fn flags(machine: &Machine) -> Flags {
    machine.cpu().flags()
  }

  #[test]
  fn initial_state(){
    let m = machine();
    assert_eq!(reg(&m, Register::PC), 0);
    assert_eq!(reg(&m, Register::SP), m.config().stack_top);
  }

  #[test]
  fn registers_through_the_bus(){
    let mut m = machine();
    let cpu_k = m.symbols().get_address("CPU_K").unwrap();
    assert_eq!(cpu_k, 0xF000_2038);

    set(&m, Register::K, 0xABCD_EF01);
    assert_eq!(m.bus_mut().get32(cpu_k), 0xABCD_EF01);
    m.bus_mut().set32(cpu_k, 0x1234_5678);
    assert_eq!(reg(&m, Register::K), 0x1234_5678);
  }

  #[test]
  fn register_moves(){
    let mut m = machine();

    opc(&mut m, "mov A, B", |m| set(m, Register::B, 0x42));
    assert_eq!(reg(&m, Register::A), 0x42);
    assert_eq!(reg(&m, Register::PC), 3);

    opc(&mut m, "mov A, 0x34", |_| {});
    assert_eq!(reg(&m, Register::A), 0x34);
    opc(&mut m, "mov A, 0x1234", |_| {});
    assert_eq!(reg(&m, Register::A), 0x1234);
    opc(&mut m, "mov A, 0xFABC1234", |_| {});
    assert_eq!(reg(&m, Register::A), 0xFABC_1234);
  }

  #[test]
  fn move_flags(){
    let mut m = machine();
    opc(&mut m, "mov A, 0", |_| {});
    assert!(flags(&m).zero() && flags(&m).parity() && !flags(&m).sign());

    opc(&mut m, "mov A, 0xF0000001", |_| {});
    assert!(!flags(&m).zero() && !flags(&m).parity() && flags(&m).sign());
  }

  #[test]
  fn byte_moves(){
    let mut m = machine();

    opc(&mut m, "movb A, [B]", |m| { set(m, Register::B, 0x1000); m.bus_mut().set(0x1000, 0xAB); });
    assert_eq!(reg(&m, Register::A), 0xAB);

    opc(&mut m, "movb A, [0x1000]", |m| m.bus_mut().set(0x1000, 0xAB));
    assert_eq!(reg(&m, Register::A), 0xAB);

    opc(&mut m, "movb [A], A", |m| set(m, Register::A, 0x64));
    assert_eq!(m.bus_mut().get(0x64), 0x64);

    opc(&mut m, "movb [A], 0xFA", |m| set(m, Register::A, 0x64));
    assert_eq!(m.bus_mut().get(0x64), 0xFA);

    opc(&mut m, "movb [A], [B]", |m| {
      set(m, Register::A, 0x32);
      set(m, Register::B, 0x64);
      m.bus_mut().set(0x64, 0xFF);
    });
    assert_eq!(m.bus_mut().get(0x32), 0xFF);

    opc(&mut m, "movb [A], [0x6420]", |m| { set(m, Register::A, 0x32); m.bus_mut().set(0x6420, 0xFF); });
    assert_eq!(m.bus_mut().get(0x32), 0xFF);
  }

  #[test]
  fn stores_to_absolute_addresses_go_through_a_pointer(){
    let mut m = machine();

    opc(&mut m, "movb [0x64], A", |m| { set(m, Register::A, 0xAC32); m.bus_mut().set32(0x64, 0xFF); });
    assert_eq!(m.bus_mut().get(0xFF), 0x32);

    opc(&mut m, "movb [0x64], 0xF0", |m| m.bus_mut().set32(0x64, 0xFF));
    assert_eq!(m.bus_mut().get(0xFF), 0xF0);

    opc(&mut m, "movb [0xCC64], [A]", |m| {
      set(m, Register::A, 0xF000);
      m.bus_mut().set(0xF000, 0x42);
      m.bus_mut().set32(0xCC64, 0xFFAB);
    });
    assert_eq!(m.bus_mut().get(0xFFAB), 0x42);

    opc(&mut m, "movb [0x64], [0xABF0]", |m| {
      m.bus_mut().set32(0x64, 0xFF00);
      m.bus_mut().set32(0xABF0, 0x1234);
      m.bus_mut().set(0x1234, 0x3F);
    });
    assert_eq!(m.bus_mut().get(0xFF00), 0x3F);
  }

  #[test]
  fn word_moves(){
    let mut m = machine();

    opc(&mut m, "movw A, [B]", |m| { set(m, Register::B, 0x1000); m.bus_mut().set16(0x1000, 0xABCD); });
    assert_eq!(reg(&m, Register::A), 0xABCD);

    opc(&mut m, "movw [A], A", |m| set(m, Register::A, 0x6402));
    assert_eq!(m.bus_mut().get16(0x6402), 0x6402);

    opc(&mut m, "movw [A], 0xFABA", |m| set(m, Register::A, 0x64));
    assert_eq!(m.bus_mut().get16(0x64), 0xFABA);

    opc(&mut m, "movw [0x64], A", |m| { set(m, Register::A, 0xAB32AC); m.bus_mut().set32(0x64, 0xFF); });
    assert_eq!(m.bus_mut().get16(0xFF), 0x32AC);
    assert_eq!(m.bus_mut().get(0x101), 0);

    opc(&mut m, "movw [0x64], [0xABF0]", |m| {
      m.bus_mut().set32(0x64, 0xFF00);
      m.bus_mut().set32(0xABF0, 0x1234);
      m.bus_mut().set16(0x1234, 0x3F54);
    });
    assert_eq!(m.bus_mut().get16(0xFF00), 0x3F54);
  }

  #[test]
  fn double_word_moves(){
    let mut m = machine();

    opc(&mut m, "movd A, [0x1000]", |m| m.bus_mut().set32(0x1000, 0xABCD_EF01));
    assert_eq!(reg(&m, Register::A), 0xABCD_EF01);

    opc(&mut m, "movd [A], A", |m| set(m, Register::A, 0x16402));
    assert_eq!(m.bus_mut().get32(0x16402), 0x16402);

    opc(&mut m, "movd [A], [0x6420]", |m| { set(m, Register::A, 0x32); m.bus_mut().set32(0x6420, 0xFFAC_9876); });
    assert_eq!(m.bus_mut().get32(0x32), 0xFFAC_9876);

    opc(&mut m, "movd [0x64], 0xF0FA1234", |m| m.bus_mut().set32(0x64, 0xFF));
    assert_eq!(m.bus_mut().get32(0xFF), 0xF0FA_1234);
  }

  #[test]
  fn logic(){
    let mut m = machine();

    opc(&mut m, "or A, B", |m| { set(m, Register::A, 0b1010); set(m, Register::B, 0b1100); });
    assert_eq!(reg(&m, Register::A), 0b1110);
    let f = flags(&m);
    assert!(!f.sign() && f.parity() && !f.zero() && !f.carry() && !f.overflow());

    opc(&mut m, "or A, 0x2A426653", |m| set(m, Register::A, 0x1080_0000));
    assert_eq!(reg(&m, Register::A), 0x3AC2_6653);

    opc(&mut m, "xor A, 0xFF00", |m| set(m, Register::A, 0xFF0));
    assert_eq!(reg(&m, Register::A), 0xF0F0);

    opc(&mut m, "and A, B", |m| { set(m, Register::A, 0b11); set(m, Register::B, 0b1100); });
    assert_eq!(reg(&m, Register::A), 0);
    assert!(flags(&m).zero());

    opc(&mut m, "and A, 0x2A426653", |m| set(m, Register::A, 0x148A_BD12));
    assert_eq!(reg(&m, Register::A), 0x22412);

    opc(&mut m, "shl A, B", |m| { set(m, Register::A, 0b1010_1010); set(m, Register::B, 4); });
    assert_eq!(reg(&m, Register::A), 0b1010_1010_0000);

    opc(&mut m, "shr A, 4", |m| set(m, Register::A, 0b1010_1010));
    assert_eq!(reg(&m, Register::A), 0b1010);

    opc(&mut m, "not A", |m| set(m, Register::A, 0b1100_1010));
    assert_eq!(reg(&m, Register::A), 0xFFFF_FF35);
  }

  #[test]
  fn arithmetic(){
    let mut m = machine();

    opc(&mut m, "add A, 0x2000", |m| set(m, Register::A, 0x12));
    assert_eq!(reg(&m, Register::A), 0x2012);

    opc(&mut m, "add A, 0xF0000000", |m| set(m, Register::A, 0x1000_0012));
    assert_eq!(reg(&m, Register::A), 0x12);
    assert!(flags(&m).carry());

    opc(&mut m, "sub A, B", |m| { set(m, Register::A, 0x30); set(m, Register::B, 0x20); });
    assert_eq!(reg(&m, Register::A), 0x10);
    assert!(!flags(&m).sign());

    opc(&mut m, "sub A, B", |m| { set(m, Register::A, 0x20); set(m, Register::B, 0x30); });
    assert_eq!(reg(&m, Register::A), 0xFFFF_FFF0);
    assert!(flags(&m).sign());

    opc(&mut m, "mul A, 0x12AF", |m| set(m, Register::A, 0x1234));
    assert_eq!(reg(&m, Register::A), 0x154_198C);
    assert!(!flags(&m).carry());

    opc(&mut m, "mul A, 0x12AF87AB", |m| set(m, Register::A, 0x1234));
    assert_eq!(reg(&m, Register::A), 0x2331_94BC);
    assert!(flags(&m).carry());

    opc(&mut m, "idiv A, 0x12AF", |m| set(m, Register::A, 0x1234_87AB));
    assert_eq!(reg(&m, Register::A), 0xF971);

    opc(&mut m, "mod A, 0x12AF", |m| set(m, Register::A, 0x1234_87AB));
    assert_eq!(reg(&m, Register::A), 0x116C);

    opc(&mut m, "mod A, B", |m| { set(m, Register::A, 0xF000); set(m, Register::B, 0xF0); });
    assert_eq!(reg(&m, Register::A), 0);
    assert!(flags(&m).zero());

    opc(&mut m, "inc A", |m| set(m, Register::A, 0xFFFF_FFFF));
    assert_eq!(reg(&m, Register::A), 0);
    assert!(flags(&m).carry() && flags(&m).zero());

    opc(&mut m, "dec A", |_| {});
    assert_eq!(reg(&m, Register::A), 0xFFFF_FFFF);
    assert!(!flags(&m).zero());
  }

  #[test]
  fn compare(){
    let mut m = machine();

    opc(&mut m, "cmp A, B", |_| {});
    assert!(flags(&m).zero());

    opc(&mut m, "cmp A, 0x12", |_| {});
    assert!(flags(&m).less() && !flags(&m).greater());

    opc(&mut m, "cmp A, 0x1234", |m| set(m, Register::A, 0x6000));
    assert!(!flags(&m).less() && flags(&m).greater());
    assert_eq!(reg(&m, Register::A), 0x6000);

    // Unsigned: the sign bit makes A the larger value.
    opc(&mut m, "cmp A, 0x12345678", |m| set(m, Register::A, 0xF000_0000));
    assert!(!flags(&m).less() && flags(&m).greater());
  }

  #[test]
  fn division_by_zero_is_a_fault(){
    let mut m = machine();
    set(&m, Register::A, 0x1234);
    m.bus_mut().set_array(0, &encode("idiv A, 0").unwrap());
    assert_eq!(m.step(), Err(MachineFault::DivisionByZero { pc: 0 }));
    assert_eq!(reg(&m, Register::A), 0x1234);
    assert_eq!(reg(&m, Register::PC), 0);
  }

  #[test]
  fn invalid_opcode_is_a_fault(){
    let mut m = machine();
    m.bus_mut().set(0, 0xFF);
    assert_eq!(m.step(), Err(MachineFault::InvalidOpcode { pc: 0, opcode: 0xFF }));
  }

  #[test]
  fn branches(){
    let mut m = machine();
    let program = assemble("
      mov A, 3     ; 0x00
      dec A        ; 0x03
      bnz 0x3      ; 0x05
      mov B, 1     ; 0x0A
    ").unwrap();
    m.bus_mut().set_array(0, &program);

    let outcome = m.run_until(100, |pc| pc == 0x0D).unwrap();
    assert_eq!(outcome, RunOutcome::Stopped(0x0D));
    assert_eq!(reg(&m, Register::A), 0);
    assert_eq!(reg(&m, Register::B), 1);
  }

  #[test]
  fn step_limit(){
    let mut m = machine();
    // jmp 0, forever
    m.bus_mut().set_array(0, &encode("jmp 0").unwrap());
    assert_eq!(m.run_until(10, |_| false), Ok(RunOutcome::StepLimit));
  }

  #[test]
  fn subroutines(){
    let mut m = machine();
    let top = m.config().stack_top;
    m.bus_mut().set_array(0, &encode("jsr 0x100").unwrap());
    m.bus_mut().set_array(0x100, &encode("ret").unwrap());

    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 0x100);
    assert_eq!(reg(&m, Register::SP), top - 4);
    assert_eq!(m.bus_mut().get32(top - 4), 5);

    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 5);
    assert_eq!(reg(&m, Register::SP), top);
  }

  #[test]
  fn stack(){
    let mut m = machine();
    let top = m.config().stack_top;

    opc(&mut m, "pushb 0xAB", |_| {});
    assert_eq!(reg(&m, Register::SP), top - 1);
    assert_eq!(m.bus_mut().get(top - 1), 0xAB);

    opc(&mut m, "pushw A", |m| set(m, Register::A, 0x12_3456));
    assert_eq!(reg(&m, Register::SP), top - 2);
    assert_eq!(m.bus_mut().get16(top - 2), 0x3456);

    opc(&mut m, "popd B", |m| {
      set(m, Register::SP, top - 4);
      m.bus_mut().set32(top - 4, 0xDEAD_BEEF);
    });
    assert_eq!(reg(&m, Register::B), 0xDEAD_BEEF);
    assert_eq!(reg(&m, Register::SP), top);

    opc(&mut m, "popx 0x10", |_| {});
    assert_eq!(reg(&m, Register::SP), top + 0x10);
  }

  #[test]
  fn push_and_pop_all(){
    let mut m = machine();
    let top = m.config().stack_top;
    let program = assemble("push.a\nmov A, 0\nmov L, 0\npop.a").unwrap();
    m.bus_mut().set_array(0, &program);
    set(&m, Register::A, 1);
    set(&m, Register::L, 12);

    m.step().unwrap();
    assert_eq!(reg(&m, Register::SP), top - 48);
    assert_eq!(m.bus_mut().get32(top - 4), 1);
    assert_eq!(m.bus_mut().get32(top - 48), 12);

    for _ in 0..3 {
      m.step().unwrap();
    }
    assert_eq!(reg(&m, Register::A), 1);
    assert_eq!(reg(&m, Register::L), 12);
    assert_eq!(reg(&m, Register::SP), top);
  }

  #[test]
  fn software_interrupt(){
    let mut m = machine();
    let top = m.config().stack_top;
    let vector = m.config().vector_address(5);
    m.bus_mut().set32(vector, 0x200);
    m.bus_mut().set_array(0, &encode("sys 5").unwrap());
    m.bus_mut().set_array(0x200, &encode("iret").unwrap());
    set(&m, Register::FL, Flags::T);

    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 0x200);
    assert!(!flags(&m).interrupts_enabled());
    assert_eq!(m.bus_mut().get32(top - 4), 2);
    assert_eq!(m.bus_mut().get32(top - 8), Flags::T);

    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 2);
    assert!(flags(&m).interrupts_enabled());
    assert_eq!(reg(&m, Register::SP), top);
  }

  #[test]
  fn device_interrupt(){
    let mut m = MachineBuilder::new(MachineConfig::default())
      .device(Box::new(Keyboard::new()))
      .build()
      .unwrap();
    let top = m.config().stack_top;
    let (_, window) = m.find_device::<Keyboard>().unwrap();

    m.bus_mut().set_array(0, &encode("nop").unwrap());
    m.bus_mut().set(window.base + KBD_MODE, MODE_INTERRUPT);
    let line_address = m.symbols().get_address("KBD_INTERRUPT").unwrap();
    let line = m.bus_mut().get(line_address);
    let vector = m.config().vector_address(line);
    m.bus_mut().set32(vector, 0x1000);
    set(&m, Register::FL, Flags::T);

    m.device_mut::<Keyboard>().unwrap().add_event(KeyEvent::press(0x20)).unwrap();
    m.step().unwrap();

    assert_eq!(reg(&m, Register::PC), 0x1000);
    assert_eq!(m.bus_mut().get32(top - 4), 1);
    assert_eq!(m.bus_mut().get32(top - 8) & Flags::T, Flags::T);
    assert!(!flags(&m).interrupts_enabled());
  }

  #[test]
  fn each_key_event_enters_the_handler(){
    let mut m = MachineBuilder::new(MachineConfig::default())
      .device(Box::new(Keyboard::new()))
      .build()
      .unwrap();
    let (_, window) = m.find_device::<Keyboard>().unwrap();
    m.bus_mut().set_array(0, &assemble("nop\nnop\nnop\nnop").unwrap());
    m.bus_mut().set_array(0x1000, &encode("iret").unwrap());
    m.bus_mut().set(window.base + KBD_MODE, MODE_INTERRUPT);
    let line = m.bus_mut().get(window.base + 2);
    let vector = m.config().vector_address(line);
    m.bus_mut().set32(vector, 0x1000);
    set(&m, Register::FL, Flags::T);

    let keyboard = m.device_mut::<Keyboard>().unwrap();
    keyboard.add_event(KeyEvent::press(0x20)).unwrap();
    keyboard.add_event(KeyEvent::release(0x20)).unwrap();

    let mut entries = 0;
    for _ in 0..6 {
      m.step().unwrap();
      if reg(&m, Register::PC) == 0x1000 {
        entries += 1;
      }
    }
    assert_eq!(entries, 2);
    assert_eq!(reg(&m, Register::SP), m.config().stack_top);
  }

  #[test]
  fn storage_completion_interrupts_the_cpu(){
    let unit = Storage::new(vec![Box::new(MemoryUnit::new(0x800))]).unwrap();
    let mut m = MachineBuilder::new(MachineConfig::default())
      .device(Box::new(unit))
      .build()
      .unwrap();
    let address = |m: &Machine, name: &str| m.symbols().get_address(name).unwrap();
    let op        = address(&m, "STG_OP");
    let status    = address(&m, "STG_STATUS");
    let r0        = address(&m, "STG_R0");
    let mode      = address(&m, "STG_MODE");
    let interrupt = address(&m, "STG_INTERRUPT");

    let program = format!("mov B, 0x{:08X}\nmovb [B], 3\nnop", op);
    let handler = format!("movb A, [0x{:08X}]\nmovd C, [0x{:08X}]\niret", status, r0);
    m.bus_mut().set_array(0, &assemble(&program).unwrap());
    m.bus_mut().set_array(0x1000, &assemble(&handler).unwrap());
    m.bus_mut().set(mode, storage::MODE_INTERRUPT);
    let line = m.bus_mut().get(interrupt);
    let vector = m.config().vector_address(line);
    m.bus_mut().set32(vector, 0x1000);
    set(&m, Register::A, 0xFF);
    set(&m, Register::FL, Flags::T);

    m.step().unwrap();
    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 0x1000);

    for _ in 0..3 {
      m.step().unwrap();
    }
    assert_eq!(reg(&m, Register::A), STATUS_DONE as u32);
    assert_eq!(reg(&m, Register::C), 0x800);
    assert_eq!(reg(&m, Register::PC), 9);
    assert!(flags(&m).interrupts_enabled());
  }

  #[test]
  fn interrupts_wait_for_enable(){
    let mut m = MachineBuilder::new(MachineConfig::default())
      .device(Box::new(Keyboard::new()))
      .build()
      .unwrap();
    let (_, window) = m.find_device::<Keyboard>().unwrap();
    m.bus_mut().set_array(0, &assemble("nop\nnop").unwrap());
    m.bus_mut().set(window.base + KBD_MODE, MODE_INTERRUPT);
    m.device_mut::<Keyboard>().unwrap().add_event(KeyEvent::press(0x20)).unwrap();

    m.step().unwrap();
    assert_eq!(reg(&m, Register::PC), 1);
  }

  #[test]
  fn reset_clears_ram_and_registers(){
    let mut m = machine();
    m.bus_mut().set(0x10, 1);
    set(&m, Register::C, 9);
    m.reset();
    assert_eq!(m.bus_mut().get(0x10), 0);
    assert_eq!(reg(&m, Register::C), 0);
    assert_eq!(reg(&m, Register::SP), m.config().stack_top);
  }

  #[test]
  fn symbols_are_unique_per_device(){
    let m = MachineBuilder::new(MachineConfig::default())
      .device(Box::new(Keyboard::new()))
      .build()
      .unwrap();
    let names = m.symbols().sorted().into_iter().map(|(name, _)| name).collect::<HashSet<_>>();
    assert!(names.contains("CPU_TYPE"));
    assert!(names.contains("KBD_DEQUEUE"));
    assert_eq!(m.symbols().get_address("KBD_TYPE"), Some(0xF000_3000));
  }

  #[test]
  fn display_lists_registers(){
    let m = machine();
    let text = m.to_string();
    assert!(text.contains("FL: 00000000"));
    assert!(text.contains("SP: 0003FC00"));
    assert!(text.contains("T:0"));
  }
}
