//! Program symbol map.
//!
//! Sidecar `.map` files hold one `address size name` entry per line, both
//! numbers hex. Loading is best-effort at bring-up; saving happens during
//! teardown when auto-save is configured.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u32,
    pub size: u32,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct SymbolMap {
    /// Sorted by address.
    symbols: Vec<Symbol>,
}

/// Sidecar path for a program: `game.elf` -> `game.map`.
pub fn map_path_for(program: &Path) -> PathBuf {
    program.with_extension("map")
}

impl SymbolMap {
    pub fn new() -> Self {
        SymbolMap::default()
    }

    pub fn load(path: &Path) -> io::Result<SymbolMap> {
        let text = fs::read_to_string(path)?;
        let mut map = SymbolMap::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(addr), Some(size), Some(name)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let (Ok(address), Ok(size)) =
                (u32::from_str_radix(addr, 16), u32::from_str_radix(size, 16))
            else {
                continue;
            };
            map.add(address, size, name);
        }
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        for sym in &self.symbols {
            out.push_str(&format!(
                "{:08x} {:08x} {}\n",
                sym.address, sym.size, sym.name
            ));
        }
        fs::write(path, out)
    }

    pub fn add(&mut self, address: u32, size: u32, name: &str) {
        let at = self.symbols.partition_point(|s| s.address <= address);
        self.symbols.insert(
            at,
            Symbol {
                address,
                size,
                name: name.to_owned(),
            },
        );
    }

    /// Symbol whose `[address, address + size)` range contains `address`.
    pub fn lookup(&self, address: u32) -> Option<&Symbol> {
        let at = self.symbols.partition_point(|s| s.address <= address);
        let candidate = self.symbols.get(at.checked_sub(1)?)?;
        let end = candidate.address.checked_add(candidate.size)?;
        (address < end).then_some(candidate)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
