/*!
  An emulator for the TinyVM/LuisaVM 32-bit computer: a CPU with sixteen registers, RAM, and
  memory-mapped peripherals on one bus, with an assembler, a disassembler and a debugger.

  Start with `machine::MachineBuilder`, or `debugger::Debugger` for an interactive session.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod bus;
pub mod bytecode;
pub mod config;
pub mod cpu;
pub mod debugger;
pub mod device;
pub mod error;
pub mod machine;
pub mod register;
pub mod symboltable;
