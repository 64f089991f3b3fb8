use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bus::AddressSpace;
use crate::device::{HEADER_INTERRUPT, HEADER_NAME, HEADER_TYPE, HEADER_VERSION};

/**
  A symbol table maps symbolic constant names like `CPU_K` or `STG_OP` to absolute addresses,
  and back. The mapping is one-to-one: inserting a name or an address that is already present
  replaces the old pair, with a warning.

  The debugger uses it to accept names where it expects an address, and the disassembler to
  show names in place of 32-bit values. A symbol table is really just a convenience wrapper
  around a BiMap.
*/
pub struct SymbolTable {
  table: BiMap<DefaultAtom, u32>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table: BiMap::new()
    }
  }

  /**
    Collects the constants of every device attached to `bus`. Devices with a header get
    `PREFIX_TYPE`, `PREFIX_VERSION`, `PREFIX_INTERRUPT` and `PREFIX_NAME`; every device gets
    `PREFIX_CONSTANT` for each entry of its constant list. Addresses are absolute.
  */
  pub fn from_bus(bus: &AddressSpace) -> SymbolTable {
    let mut symbols = SymbolTable::new();

    for (window, device) in bus.devices() {
      let prefix = device.prefix();
      if device.has_header() {
        for (name, offset) in [
          ("TYPE", HEADER_TYPE),
          ("VERSION", HEADER_VERSION),
          ("INTERRUPT", HEADER_INTERRUPT),
          ("NAME", HEADER_NAME),
        ].iter() {
          symbols.insert(&format!("{}_{}", prefix, name), window.base.wrapping_add(*offset));
        }
      }
      for (name, offset) in device.constant_list().iter() {
        symbols.insert(&format!("{}_{}", prefix, name), window.base.wrapping_add(*offset));
      }
    }

    symbols
  }

  pub fn get_symbol(&self, address: u32) -> Option<&str> {
    self.table.get_by_right(&address).map(|atom| &**atom)
  }

  /// Names are matched case-insensitively.
  pub fn get_address(&self, name: &str) -> Option<u32> {
    self.table.get_by_left(&DefaultAtom::from(name.to_ascii_uppercase())).copied()
  }

  pub fn insert(&mut self, name: &str, address: u32) {
    let name = DefaultAtom::from(name.to_ascii_uppercase());

    if let Some(old) = self.table.get_by_left(&name) {
      eprintln!("warning: symbol {} redefined from 0x{:08X} to 0x{:08X}", name, old, address);
    }
    if let Some(old) = self.table.get_by_right(&address) {
      if *old != name {
        eprintln!("warning: symbol {} replaces {} at 0x{:08X}", name, old, address);
      }
    }

    self.table.insert(name, address);
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.len() == 0
  }

  /// All symbols, sorted by address.
  pub fn sorted(&self) -> Vec<(&str, u32)> {
    let mut symbols = self.table
                          .iter()
                          .map(|(name, address)| (&**name, *address))
                          .collect::<Vec<(&str, u32)>>();
    symbols.sort_by_key(|(_, address)| *address);
    symbols
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    SymbolTable::new()
  }
}
