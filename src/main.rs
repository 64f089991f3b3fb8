use std::io::{self, BufRead, Write};

use luisavm::config::MachineConfig;
use luisavm::debugger::Debugger;
use luisavm::device::keyboard::Keyboard;
use luisavm::device::storage::{MemoryUnit, Storage};
use luisavm::machine::MachineBuilder;

/// Size of the storage unit attached at start-up.
const STORAGE_UNIT_SIZE: usize = 1024 * 1024;

fn main() {

  #[cfg(feature = "trace_execution")]
  println!("Execution Tracing ENABLED");

  let storage = match Storage::new(vec![Box::new(MemoryUnit::new(STORAGE_UNIT_SIZE))]) {
    Ok(storage) => storage,
    Err(e) => {
      eprintln!("{}", e);
      return;
    }
  };

  let machine = MachineBuilder::new(MachineConfig::default())
    .device(Box::new(storage))
    .device(Box::new(Keyboard::new()))
    .build();
  let mut debugger = match machine {
    Ok(machine) => Debugger::new(machine),
    Err(e) => {
      eprintln!("{}", e);
      return;
    }
  };

  println!("{}", debugger.welcome());

  let stdin = io::stdin();
  loop {
    print!("- ");
    if io::stdout().flush().is_err() {
      return;
    }

    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
      Ok(0) => return,
      Ok(_) => {}
      Err(e) => {
        eprintln!("{}", e);
        return;
      }
    }

    if line.trim() == "q" {
      return;
    }
    let output = debugger.parse(&line);
    if !output.is_empty() {
      println!("{}", output);
    }
  }
}
