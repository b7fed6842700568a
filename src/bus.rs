use std::sync::Arc;

use crate::cartridge::RomImage;
use crate::cpu_bus::{check_alignment, CpuBus, Width};
use crate::devices::{Device, Mmio, MmioEffect};
use crate::error::FaultError;
use crate::memory::{Ram, PIF_RAM_SIZE, SP_MEM_SIZE};

pub const SP_DMEM_BASE: u32 = 0x0400_0000;
pub const SP_IMEM_BASE: u32 = 0x0400_1000;
pub const CART_ROM_BASE: u32 = 0x1000_0000;
pub const PIF_RAM_BASE: u32 = 0x1FC0_07C0;

/// Where a physical address lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Rdram(usize),
    SpDmem(usize),
    SpImem(usize),
    Registers(Device, usize),
    CartRom(usize),
    PifRam(usize),
}

/// Translates a KSEG0/KSEG1 virtual address to physical.
pub fn translate(vaddr: u32) -> Result<u32, FaultError> {
    match vaddr {
        0x8000_0000..=0xBFFF_FFFF => Ok(vaddr & 0x1FFF_FFFF),
        // KUSEG, KSSEG and KSEG3 go through the TLB
        _ => Err(FaultError::UnmappedAddress { address: vaddr }),
    }
}

pub struct Bus {
    rdram: Ram,
    sp_dmem: Ram,
    sp_imem: Ram,
    pif_ram: Ram,
    rom: Arc<[u8]>,
    mmio: Mmio,
}

impl Bus {
    pub fn new(cartridge: &RomImage, rdram_size: usize) -> Self {
        Bus {
            rdram: Ram::new(rdram_size),
            sp_dmem: Ram::new(SP_MEM_SIZE),
            sp_imem: Ram::new(SP_MEM_SIZE),
            pif_ram: Ram::new(PIF_RAM_SIZE),
            rom: cartridge.bytes().clone(),
            mmio: Mmio::new(),
        }
    }

    pub fn decode(&self, paddr: u32) -> Result<Region, FaultError> {
        let p = paddr as usize;
        let region = match paddr {
            _ if p < self.rdram.len() => Region::Rdram(p),
            SP_DMEM_BASE..=0x0400_0FFF => Region::SpDmem((paddr - SP_DMEM_BASE) as usize),
            SP_IMEM_BASE..=0x0400_1FFF => Region::SpImem((paddr - SP_IMEM_BASE) as usize),
            CART_ROM_BASE..=0x1FBF_FFFF if ((paddr - CART_ROM_BASE) as usize) < self.rom.len() => {
                Region::CartRom((paddr - CART_ROM_BASE) as usize)
            }
            PIF_RAM_BASE..=0x1FC0_07FF => Region::PifRam((paddr - PIF_RAM_BASE) as usize),
            _ => match Device::locate(paddr) {
                Some((dev, reg)) => Region::Registers(dev, reg),
                None => return Err(FaultError::UnmappedAddress { address: paddr }),
            },
        };
        Ok(region)
    }

    pub fn read_physical(&mut self, paddr: u32, width: Width) -> Result<u64, FaultError> {
        let value = match self.decode(paddr)? {
            Region::Rdram(offset) => self.rdram.read(offset, width),
            Region::SpDmem(offset) => self.sp_dmem.read(offset, width),
            Region::SpImem(offset) => self.sp_imem.read(offset, width),
            Region::PifRam(offset) => self.pif_ram.read(offset, width),
            Region::CartRom(offset) => {
                let n = width.bytes();
                let bytes = self
                    .rom
                    .get(offset..offset + n)
                    .ok_or(FaultError::UnmappedAddress { address: paddr })?;
                bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
            }
            Region::Registers(dev, reg) => {
                register_width(paddr, width)?;
                self.mmio.read(dev, reg) as u64
            }
        };
        Ok(value)
    }

    pub fn write_physical(&mut self, paddr: u32, width: Width, value: u64) -> Result<(), FaultError> {
        match self.decode(paddr)? {
            Region::Rdram(offset) => self.rdram.write(offset, width, value),
            Region::SpDmem(offset) => self.sp_dmem.write(offset, width, value),
            Region::SpImem(offset) => self.sp_imem.write(offset, width, value),
            Region::PifRam(offset) => self.pif_ram.write(offset, width, value),
            Region::CartRom(_) => return Err(FaultError::ReadOnly { address: paddr }),
            Region::Registers(dev, reg) => {
                register_width(paddr, width)?;
                let effect = self.mmio.write(dev, reg, value as u32);
                self.apply(effect);
            }
        }
        Ok(())
    }

    fn apply(&mut self, effect: MmioEffect) {
        if let MmioEffect::PiDmaToRdram {
            dram_addr,
            cart_addr,
            len,
        } = effect
        {
            let start = cart_addr.wrapping_sub(CART_ROM_BASE) as usize;
            let len = len as usize;
            // Bytes beyond the end of the image read back as zero
            let mut buf = vec![0u8; len];
            if start < self.rom.len() {
                let available = len.min(self.rom.len() - start);
                buf[..available].copy_from_slice(&self.rom[start..start + available]);
            }
            let copied = self.rdram.copy_in(dram_addr as usize, &buf);
            log::debug!(
                "PI DMA cart {:#010x} -> rdram {:#08x}, {} of {} bytes",
                cart_addr,
                dram_addr,
                copied,
                len
            );
        }
    }

    /// Advances device timing by `cycles` CPU cycles.
    pub fn advance(&mut self, cycles: u64) {
        if self.mmio.advance(cycles) > 0 {
            log::trace!("VI field {} complete", self.mmio.fields());
        }
    }

    /// Video fields completed since power-on.
    pub fn fields(&self) -> u64 {
        self.mmio.fields()
    }

    pub fn rdram(&self) -> &Ram {
        &self.rdram
    }

    pub fn rdram_mut(&mut self) -> &mut Ram {
        &mut self.rdram
    }

    pub fn sp_dmem_mut(&mut self) -> &mut Ram {
        &mut self.sp_dmem
    }

    pub fn working_set_bytes(&self) -> u64 {
        self.rdram.touched_bytes()
    }

    pub fn rdram_size(&self) -> u64 {
        self.rdram.len() as u64
    }
}

fn register_width(paddr: u32, width: Width) -> Result<(), FaultError> {
    if width != Width::Word {
        return Err(FaultError::Misaligned {
            address: paddr,
            width: width.bytes() as u8,
        });
    }
    Ok(())
}

// Faults are reported against the address the program used
impl CpuBus for Bus {
    fn read(&mut self, addr: u32, width: Width) -> Result<u64, FaultError> {
        check_alignment(addr, width)?;
        let paddr = translate(addr)?;
        self.read_physical(paddr, width).map_err(|e| e.at(addr))
    }

    fn write(&mut self, addr: u32, width: Width, value: u64) -> Result<(), FaultError> {
        check_alignment(addr, width)?;
        let paddr = translate(addr)?;
        self.write_physical(paddr, width, value)
            .map_err(|e| e.at(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::testing::test_rom;
    use crate::cartridge::MIN_ROM_SIZE;
    use crate::memory::RDRAM_SIZE;

    fn bus_with_rom(size: usize) -> (Bus, RomImage) {
        let mut data = test_rom(size, &[]);
        for (i, byte) in data.iter_mut().enumerate().skip(0x40) {
            *byte = (i * 7 + i / 251) as u8;
        }
        let image = RomImage::from_bytes(data).unwrap();
        (Bus::new(&image, RDRAM_SIZE), image)
    }

    #[test]
    fn test_rom_reads_match_image_for_all_sizes() {
        for mib in [1usize, 4, 8] {
            let (mut bus, image) = bus_with_rom(mib << 20);
            let rom = image.bytes();
            for offset in [0usize, 0x40, 0x1000, 0x1234, (mib << 20) - 8] {
                let addr = 0xB000_0000 + offset as u32;
                assert_eq!(bus.read_u8(addr).unwrap(), rom[offset]);
                let aligned = addr & !7;
                let base = offset & !7;
                let expected = u64::from_be_bytes(rom[base..base + 8].try_into().unwrap());
                assert_eq!(bus.read_u64(aligned).unwrap(), expected);
            }
            // One past the image is unmapped, not zero
            let past = 0xB000_0000 + (mib << 20) as u32;
            assert_eq!(
                bus.read_u32(past),
                Err(FaultError::UnmappedAddress { address: past })
            );
        }
    }

    #[test]
    fn test_rdram_kseg0_and_kseg1_alias() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        bus.write_u32(0x8000_1000, 0xDEAD_BEEF).unwrap();
        assert_eq!(bus.read_u32(0xA000_1000).unwrap(), 0xDEAD_BEEF);
        assert_eq!(bus.read_u16(0x8000_1002).unwrap(), 0xBEEF);
        bus.write(0xA000_1001, Width::Byte, 0x11).unwrap();
        assert_eq!(bus.read_u32(0x8000_1000).unwrap(), 0xDE11_BEEF);
    }

    #[test]
    fn test_unmapped_regions_fault() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        for addr in [0x0000_0000u32, 0x7FFF_FFFC, 0xC000_0000, 0xA080_0000, 0xA500_0000] {
            assert_eq!(
                bus.read_u32(addr),
                Err(FaultError::UnmappedAddress { address: addr })
            );
            assert_eq!(
                bus.write_u32(addr, 1),
                Err(FaultError::UnmappedAddress { address: addr })
            );
        }
    }

    #[test]
    fn test_misaligned_access() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        assert_eq!(
            bus.read_u32(0x8000_0002),
            Err(FaultError::Misaligned {
                address: 0x8000_0002,
                width: 4
            })
        );
        assert_eq!(
            bus.write(0x8000_0001, Width::Half, 0),
            Err(FaultError::Misaligned {
                address: 0x8000_0001,
                width: 2
            })
        );
        // Registers only take full words
        assert_eq!(
            bus.read_u8(0xA430_0004),
            Err(FaultError::Misaligned {
                address: 0xA430_0004,
                width: 1
            })
        );
    }

    #[test]
    fn test_cart_rom_is_read_only() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        assert_eq!(
            bus.write_u32(0xB000_1000, 0),
            Err(FaultError::ReadOnly {
                address: 0xB000_1000
            })
        );
    }

    #[test]
    fn test_reads_observe_latest_write() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        for value in [1u64, 0xFFFF_FFFF_0000_0000, 42] {
            bus.write(0x8020_0008, Width::Double, value).unwrap();
            assert_eq!(bus.read_u64(0x8020_0008).unwrap(), value);
        }
        bus.write_u32(0xA400_0010, 0x1234_5678).unwrap();
        assert_eq!(bus.read_u32(0xA400_0010).unwrap(), 0x1234_5678);
        bus.write_u32(0xBFC0_07FC, 0x55).unwrap();
        assert_eq!(bus.read_u32(0xBFC0_07FC).unwrap(), 0x55);
    }

    #[test]
    fn test_pi_dma_copies_cartridge_into_rdram() {
        let (mut bus, image) = bus_with_rom(MIN_ROM_SIZE);
        bus.write_u32(0xA460_0000, 0x0020_0000).unwrap();
        bus.write_u32(0xA460_0004, 0x1000_2000).unwrap();
        bus.write_u32(0xA460_000C, 0x0FF).unwrap();
        let rom = image.bytes();
        for offset in [0usize, 4, 0xFC] {
            let expected = u32::from_be_bytes(
                rom[0x2000 + offset..0x2004 + offset].try_into().unwrap(),
            );
            assert_eq!(bus.read_u32(0x8020_0000 + offset as u32).unwrap(), expected);
        }
        assert_eq!(bus.read_u32(0x8020_0100).unwrap(), 0);
        assert_eq!(bus.read_u32(0xA460_0010).unwrap(), 0x8);
    }

    #[test]
    fn test_expansion_pak_maps_upper_rdram() {
        let image = RomImage::from_bytes(test_rom(MIN_ROM_SIZE, &[])).unwrap();
        let mut bus = Bus::new(&image, 2 * RDRAM_SIZE);
        bus.write_u32(0xA07F_FFFC, 7).unwrap();
        assert_eq!(bus.read_u32(0x807F_FFFC).unwrap(), 7);
        assert_eq!(bus.rdram_size(), 2 * RDRAM_SIZE as u64);
    }

    #[test]
    fn test_advance_counts_video_fields() {
        let (mut bus, _) = bus_with_rom(MIN_ROM_SIZE);
        bus.advance(crate::devices::CYCLES_PER_FIELD / 2);
        assert_eq!(bus.fields(), 0);
        assert_eq!(bus.read_u32(0xA440_0010).unwrap(), 262);
        bus.advance(crate::devices::CYCLES_PER_FIELD);
        assert_eq!(bus.fields(), 1);
    }
}
