//! Minimal ELF32 executable loading.
//!
//! Enough of the format to place a user-mode executable into guest RAM:
//! header validation (32-bit little-endian MIPS), PT_LOAD segment copy, BSS
//! zeroing. Relocatable PRX modules need the module manager's relocation
//! support and are rejected here.

use tachyon_utils::bytes::{u16_le, u32_le};

use crate::error::LoadError;
use crate::mem::GuestMemory;

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const CLASS_32BIT: u8 = 1;
const DATA_LITTLE_ENDIAN: u8 = 1;
const TYPE_EXEC: u16 = 2;
/// Firmware-relocatable module (PRX).
const TYPE_PRX: u16 = 0xffa0;
const MACHINE_MIPS: u16 = 8;
const PT_LOAD: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage {
    pub entry: u32,
    /// Bytes copied into guest memory, BSS included.
    pub loaded_bytes: u32,
}

fn header_field_u16(data: &[u8], offset: usize) -> Result<u16, LoadError> {
    u16_le(data, offset).ok_or_else(|| LoadError::InvalidFormat("truncated ELF header".into()))
}

fn header_field_u32(data: &[u8], offset: usize) -> Result<u32, LoadError> {
    u32_le(data, offset).ok_or_else(|| LoadError::InvalidFormat("truncated ELF header".into()))
}

/// Copy an executable's loadable segments into guest memory.
pub fn load_into(data: &[u8], mem: &mut GuestMemory) -> Result<ElfImage, LoadError> {
    if data.get(..4) != Some(&ELF_MAGIC) {
        return Err(LoadError::InvalidFormat("bad ELF magic".into()));
    }
    if data.get(4) != Some(&CLASS_32BIT) || data.get(5) != Some(&DATA_LITTLE_ENDIAN) {
        return Err(LoadError::InvalidFormat(
            "not a 32-bit little-endian ELF".into(),
        ));
    }

    let e_type = header_field_u16(data, 0x10)?;
    if e_type == TYPE_PRX {
        return Err(LoadError::Unsupported(
            "relocatable PRX modules are not supported".into(),
        ));
    }
    if e_type != TYPE_EXEC {
        return Err(LoadError::InvalidFormat(format!(
            "unexpected ELF type {e_type:#06x}"
        )));
    }
    if header_field_u16(data, 0x12)? != MACHINE_MIPS {
        return Err(LoadError::InvalidFormat("not a MIPS executable".into()));
    }

    let entry = header_field_u32(data, 0x18)?;
    let phoff = header_field_u32(data, 0x1c)? as usize;
    let phentsize = header_field_u16(data, 0x2a)? as usize;
    let phnum = header_field_u16(data, 0x2c)? as usize;
    if phentsize < 32 {
        return Err(LoadError::InvalidFormat("bad program header size".into()));
    }

    let mut loaded_bytes = 0u64;
    for index in 0..phnum {
        let ph = phoff + index * phentsize;
        if u32_le(data, ph).ok_or_else(|| {
            LoadError::InvalidFormat("truncated program header table".into())
        })? != PT_LOAD
        {
            continue;
        }
        let p_offset = header_field_u32(data, ph + 0x04)? as usize;
        let p_vaddr = header_field_u32(data, ph + 0x08)?;
        let p_filesz = header_field_u32(data, ph + 0x10)? as usize;
        let p_memsz = header_field_u32(data, ph + 0x14)? as usize;

        let file_data = data.get(p_offset..p_offset + p_filesz).ok_or_else(|| {
            LoadError::InvalidFormat("segment data past end of file".into())
        })?;
        mem.write(p_vaddr, file_data)
            .map_err(|e| LoadError::DoesNotFit(e.to_string()))?;
        if p_memsz > p_filesz {
            mem.zero(p_vaddr + p_filesz as u32, p_memsz - p_filesz)
                .map_err(|e| LoadError::DoesNotFit(e.to_string()))?;
        }
        // Overlapping segments can each fit on their own while their total
        // runs away; bound the sum by guest RAM instead of trusting it.
        loaded_bytes += p_memsz as u64;
        if loaded_bytes > u64::from(mem.size()) {
            return Err(LoadError::DoesNotFit(format!(
                "segments total {loaded_bytes} bytes against {} bytes of guest RAM",
                mem.size()
            )));
        }
    }

    if loaded_bytes == 0 {
        return Err(LoadError::InvalidFormat("no loadable segments".into()));
    }
    if !mem.is_valid_range(entry, 4) {
        return Err(LoadError::InvalidFormat(format!(
            "entry point {entry:08x} outside loaded memory"
        )));
    }

    Ok(ElfImage {
        entry,
        loaded_bytes: loaded_bytes as u32,
    })
}
