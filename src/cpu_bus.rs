//! Trait representing the bus interface required by the VR4300 core.

use crate::error::FaultError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
            Width::Double => 8,
        }
    }
}

/// Accesses take 32-bit virtual addresses and move big-endian values
/// right-aligned in a `u64`.
pub trait CpuBus {
    fn read(&mut self, addr: u32, width: Width) -> Result<u64, FaultError>;
    fn write(&mut self, addr: u32, width: Width, value: u64) -> Result<(), FaultError>;

    fn fetch(&mut self, addr: u32) -> Result<u32, FaultError> {
        self.read(addr, Width::Word).map(|w| w as u32)
    }
    fn read_u8(&mut self, addr: u32) -> Result<u8, FaultError> {
        self.read(addr, Width::Byte).map(|v| v as u8)
    }
    fn read_u16(&mut self, addr: u32) -> Result<u16, FaultError> {
        self.read(addr, Width::Half).map(|v| v as u16)
    }
    fn read_u32(&mut self, addr: u32) -> Result<u32, FaultError> {
        self.read(addr, Width::Word).map(|v| v as u32)
    }
    fn read_u64(&mut self, addr: u32) -> Result<u64, FaultError> {
        self.read(addr, Width::Double)
    }
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), FaultError> {
        self.write(addr, Width::Word, value as u64)
    }
}

/// Rejects accesses that are not naturally aligned.
pub fn check_alignment(addr: u32, width: Width) -> Result<(), FaultError> {
    if addr as usize % width.bytes() != 0 {
        return Err(FaultError::Misaligned {
            address: addr,
            width: width.bytes() as u8,
        });
    }
    Ok(())
}
