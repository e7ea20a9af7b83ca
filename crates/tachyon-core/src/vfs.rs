//! Virtual filesystem mount table.
//!
//! Guest paths are device-prefixed (`disc0:/PSP_GAME/...`, `ms0:/PSP/...`).
//! This module only maps devices to host directories; directory trees, file
//! handles and the full I/O surface belong to the I/O emulation layer.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub device: String,
    pub host_root: PathBuf,
}

#[derive(Debug, Default)]
pub struct Vfs {
    mounts: Vec<Mount>,
}

impl Vfs {
    pub fn new() -> Self {
        Vfs { mounts: Vec::new() }
    }

    /// Mount `host_root` at `device` (e.g. `disc0:`). Remounting a device
    /// replaces the previous mapping.
    pub fn mount(&mut self, device: &str, host_root: impl Into<PathBuf>) {
        self.unmount(device);
        self.mounts.push(Mount {
            device: device.to_owned(),
            host_root: host_root.into(),
        });
    }

    pub fn unmount(&mut self, device: &str) {
        self.mounts.retain(|m| m.device != device);
    }

    /// Translate a device-prefixed guest path to a host path.
    pub fn resolve(&self, guest_path: &str) -> Option<PathBuf> {
        let (device_name, rest) = guest_path.split_once(':')?;
        let device = format!("{device_name}:");
        let mount = self.mounts.iter().find(|m| m.device == device)?;

        let mut host = mount.host_root.clone();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            host.push(part);
        }
        Some(host)
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn shutdown(&mut self) {
        self.mounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_resolve_through_mount() {
        let mut vfs = Vfs::new();
        vfs.mount("disc0:", "/tmp/game");

        assert_eq!(
            vfs.resolve("disc0:/PSP_GAME/SYSDIR/EBOOT.BIN"),
            Some(PathBuf::from("/tmp/game/PSP_GAME/SYSDIR/EBOOT.BIN"))
        );
        assert_eq!(vfs.resolve("ms0:/PSP/SAVEDATA"), None);
        assert_eq!(vfs.resolve("no-device-prefix"), None);
    }

    #[test]
    fn test_remount_replaces_and_shutdown_clears() {
        let mut vfs = Vfs::new();
        vfs.mount("disc0:", "/old");
        vfs.mount("disc0:", "/new");

        assert_eq!(vfs.mounts().len(), 1);
        assert_eq!(
            vfs.resolve("disc0:/a").as_deref(),
            Some(Path::new("/new/a"))
        );

        vfs.shutdown();
        assert!(vfs.mounts().is_empty());
        assert_eq!(vfs.resolve("disc0:/a"), None);
    }
}
