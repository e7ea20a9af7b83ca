//! Guest RAM.
//!
//! User memory sits at `0x0800_0000`; cached and uncached mirrors differ only
//! in the top address bits, which are masked off before translation. The
//! stock machine has 32 MiB; remastered releases double that, decided during
//! program identification before memory is initialized.

use crate::error::MemoryError;

pub const RAM_BASE: u32 = 0x0800_0000;
pub const RAM_NORMAL_SIZE: u32 = 0x0200_0000;
pub const RAM_DOUBLE_SIZE: u32 = 0x0400_0000;

/// Strips the cacheability bits from a guest address.
const ADDRESS_MASK: u32 = 0x3FFF_FFFF;

pub struct GuestMemory {
    ram: Vec<u8>,
}

impl GuestMemory {
    pub fn new(size: u32) -> Self {
        GuestMemory {
            ram: vec![0; size as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.ram.len() as u32
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize, MemoryError> {
        if self.ram.is_empty() {
            return Err(MemoryError::NotInitialized);
        }
        let physical = address & ADDRESS_MASK;
        let offset = physical.wrapping_sub(RAM_BASE) as usize;
        if physical < RAM_BASE || offset + len > self.ram.len() {
            return Err(MemoryError::AccessViolation { address, len });
        }
        Ok(offset)
    }

    pub fn is_valid_range(&self, address: u32, len: usize) -> bool {
        self.offset(address, len).is_ok()
    }

    pub fn read(&self, address: u32, len: usize) -> Result<&[u8], MemoryError> {
        let offset = self.offset(address, len)?;
        Ok(&self.ram[offset..offset + len])
    }

    pub fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let bytes = self.read(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, data.len())?;
        self.ram[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn zero(&mut self, address: u32, len: usize) -> Result<(), MemoryError> {
        let offset = self.offset(address, len)?;
        self.ram[offset..offset + len].fill(0);
        Ok(())
    }

    /// Release the backing allocation. Further accesses report
    /// [`MemoryError::NotInitialized`].
    pub fn shutdown(&mut self) {
        self.ram = Vec::new();
    }
}
