//! Kernel/HLE module registry.
//!
//! Guest programs link against firmware modules by name; high-level emulation
//! resolves those imports to host-side handlers instead of running firmware
//! code. The registry only tracks which modules exist and how many entries
//! each exports — call semantics live with the interpreter, not here.
//! A concurrent map because debugger-style observers may query while the
//! worker registers lazily-loaded modules.

use dashmap::DashMap;

/// Firmware modules every user program can assume are present.
const CORE_MODULES: &[(&str, u32)] = &[
    ("SysMemUserForUser", 16),
    ("ThreadManForUser", 121),
    ("IoFileMgrForUser", 55),
    ("ModuleMgrForUser", 12),
    ("StdioForUser", 9),
    ("sceDisplay", 15),
    ("sceGe_user", 22),
    ("sceAudio", 28),
    ("sceCtrl", 18),
    ("sceRtc", 44),
    ("scePower", 31),
    ("sceUmdUser", 14),
    ("sceUtility", 39),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HleModule {
    pub name: String,
    pub entry_count: u32,
}

pub struct Kernel {
    modules: DashMap<String, HleModule>,
}

impl Kernel {
    pub fn new() -> Self {
        let kernel = Kernel {
            modules: DashMap::new(),
        };
        for &(name, entry_count) in CORE_MODULES {
            kernel.register_module(name, entry_count);
        }
        kernel
    }

    pub fn register_module(&self, name: &str, entry_count: u32) {
        self.modules.insert(
            name.to_owned(),
            HleModule {
                name: name.to_owned(),
                entry_count,
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn entry_count(&self, name: &str) -> Option<u32> {
        self.modules.get(name).map(|m| m.entry_count)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn shutdown(&mut self) {
        self.modules.clear();
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_modules_present_after_init() {
        let kernel = Kernel::new();
        assert!(kernel.is_registered("ThreadManForUser"));
        assert!(kernel.is_registered("sceDisplay"));
        assert_eq!(kernel.entry_count("IoFileMgrForUser"), Some(55));
        assert_eq!(kernel.module_count(), CORE_MODULES.len());
    }

    #[test]
    fn test_late_registration_and_shutdown() {
        let mut kernel = Kernel::new();
        kernel.register_module("sceNetInet", 35);
        assert!(kernel.is_registered("sceNetInet"));

        kernel.shutdown();
        assert_eq!(kernel.module_count(), 0);
        assert!(!kernel.is_registered("ThreadManForUser"));
    }
}
