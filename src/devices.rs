//! Memory-mapped register blocks of the RCP and the peripheral interfaces.

use bitflags::bitflags;

use crate::debug_flags;

pub const CPU_CLOCK_HZ: u64 = 93_750_000;
pub const FIELDS_PER_SECOND: u64 = 60;
pub const CYCLES_PER_FIELD: u64 = CPU_CLOCK_HZ / FIELDS_PER_SECOND;
const LINES_PER_FIELD: u64 = 262;

pub const MI_VERSION_VALUE: u32 = 0x0202_0102;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MiInterrupt: u32 {
        const SP = 0x01;
        const SI = 0x02;
        const AI = 0x04;
        const VI = 0x08;
        const PI = 0x10;
        const DP = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    RdramConfig,
    Sp,
    SpPc,
    DpCommand,
    Mi,
    Vi,
    Ai,
    Pi,
    Ri,
    Si,
}

impl Device {
    pub const ALL: [Device; 10] = [
        Device::RdramConfig,
        Device::Sp,
        Device::SpPc,
        Device::DpCommand,
        Device::Mi,
        Device::Vi,
        Device::Ai,
        Device::Pi,
        Device::Ri,
        Device::Si,
    ];

    pub fn base(self) -> u32 {
        match self {
            Device::RdramConfig => 0x03F0_0000,
            Device::Sp => 0x0404_0000,
            Device::SpPc => 0x0408_0000,
            Device::DpCommand => 0x0410_0000,
            Device::Mi => 0x0430_0000,
            Device::Vi => 0x0440_0000,
            Device::Ai => 0x0450_0000,
            Device::Pi => 0x0460_0000,
            Device::Ri => 0x0470_0000,
            Device::Si => 0x0480_0000,
        }
    }

    pub fn register_count(self) -> usize {
        match self {
            Device::RdramConfig => 10,
            Device::Sp => 8,
            Device::SpPc => 2,
            Device::DpCommand => 8,
            Device::Mi => 4,
            Device::Vi => 14,
            Device::Ai => 6,
            Device::Pi => 13,
            Device::Ri => 8,
            Device::Si => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Device::RdramConfig => "RDRAM",
            Device::Sp => "SP",
            Device::SpPc => "SP_PC",
            Device::DpCommand => "DP",
            Device::Mi => "MI",
            Device::Vi => "VI",
            Device::Ai => "AI",
            Device::Pi => "PI",
            Device::Ri => "RI",
            Device::Si => "SI",
        }
    }

    /// Finds the register block covering a physical address, if any.
    pub fn locate(paddr: u32) -> Option<(Device, usize)> {
        Device::ALL.iter().find_map(|&dev| {
            let offset = paddr.checked_sub(dev.base())? as usize;
            (offset < dev.register_count() * 4).then_some((dev, offset / 4))
        })
    }

    fn index(self) -> usize {
        self as usize
    }
}

// Register indices within their block
const MI_MODE: usize = 0;
const MI_VERSION: usize = 1;
const MI_INTR: usize = 2;
const MI_MASK: usize = 3;
const SP_STATUS: usize = 4;
const VI_CURRENT: usize = 4;
const VI_V_SYNC: usize = 6;
const PI_DRAM_ADDR: usize = 0;
const PI_CART_ADDR: usize = 1;
const PI_RD_LEN: usize = 2;
const PI_WR_LEN: usize = 3;
const PI_STATUS: usize = 4;
const SI_STATUS: usize = 6;

/// Side effect of a register write that the bus has to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioEffect {
    None,
    PiDmaToRdram { dram_addr: u32, cart_addr: u32, len: u32 },
}

pub struct Mmio {
    regs: Vec<Vec<u32>>,
    mi_intr: MiInterrupt,
    mi_mask: MiInterrupt,
    field_cycle: u64,
    fields: u64,
}

impl Mmio {
    pub fn new() -> Self {
        let mut regs: Vec<Vec<u32>> = Device::ALL
            .iter()
            .map(|dev| vec![0; dev.register_count()])
            .collect();
        regs[Device::Sp.index()][SP_STATUS] = 0x1; // RSP halted
        regs[Device::Vi.index()][VI_V_SYNC] = 0x20D;
        Mmio {
            regs,
            mi_intr: MiInterrupt::empty(),
            mi_mask: MiInterrupt::empty(),
            field_cycle: 0,
            fields: 0,
        }
    }

    pub fn read(&self, dev: Device, reg: usize) -> u32 {
        match (dev, reg) {
            (Device::Mi, MI_VERSION) => MI_VERSION_VALUE,
            (Device::Mi, MI_INTR) => self.mi_intr.bits(),
            (Device::Mi, MI_MASK) => self.mi_mask.bits(),
            (Device::Vi, VI_CURRENT) => self.current_half_line(),
            (Device::Pi, PI_STATUS) => {
                // DMA completes instantly; only the interrupt bit can be set
                if self.mi_intr.contains(MiInterrupt::PI) {
                    0x8
                } else {
                    0
                }
            }
            (Device::Si, SI_STATUS) => 0,
            _ => self.regs[dev.index()][reg],
        }
    }

    pub fn write(&mut self, dev: Device, reg: usize, value: u32) -> MmioEffect {
        if debug_flags::mmio() {
            log::debug!("{}[{}] <- {:#010x}", dev.name(), reg, value);
        }
        match (dev, reg) {
            (Device::Mi, MI_MODE) => {
                if value & 0x800 != 0 {
                    self.mi_intr.remove(MiInterrupt::DP);
                }
                self.regs[dev.index()][reg] = value & 0x7F;
            }
            (Device::Mi, MI_VERSION) | (Device::Mi, MI_INTR) => {}
            (Device::Mi, MI_MASK) => {
                // Each interrupt has a clear bit followed by a set bit
                for bit in 0..6 {
                    let flag = MiInterrupt::from_bits_truncate(1 << bit);
                    if value & (1 << (bit * 2)) != 0 {
                        self.mi_mask.remove(flag);
                    }
                    if value & (1 << (bit * 2 + 1)) != 0 {
                        self.mi_mask.insert(flag);
                    }
                }
            }
            (Device::Sp, SP_STATUS) => {
                let status = &mut self.regs[dev.index()][reg];
                if value & 0x1 != 0 {
                    *status &= !0x1;
                }
                if value & 0x2 != 0 {
                    *status |= 0x1;
                }
            }
            (Device::Vi, VI_CURRENT) => self.mi_intr.remove(MiInterrupt::VI),
            (Device::Pi, PI_RD_LEN) => {
                self.regs[dev.index()][reg] = value;
                log::warn!("PI DMA into cartridge ROM ignored (len {:#x})", value.wrapping_add(1));
                self.mi_intr.insert(MiInterrupt::PI);
            }
            (Device::Pi, PI_WR_LEN) => {
                let regs = &mut self.regs[dev.index()];
                regs[reg] = value;
                self.mi_intr.insert(MiInterrupt::PI);
                return MmioEffect::PiDmaToRdram {
                    dram_addr: regs[PI_DRAM_ADDR] & 0x00FF_FFFF,
                    cart_addr: regs[PI_CART_ADDR],
                    len: (value & 0x00FF_FFFF) + 1,
                };
            }
            (Device::Pi, PI_STATUS) => {
                if value & 0x2 != 0 {
                    self.mi_intr.remove(MiInterrupt::PI);
                }
            }
            (Device::Si, SI_STATUS) => self.mi_intr.remove(MiInterrupt::SI),
            _ => self.regs[dev.index()][reg] = value,
        }
        MmioEffect::None
    }

    /// Advances video timing; returns the number of fields completed.
    pub fn advance(&mut self, cycles: u64) -> u64 {
        self.field_cycle += cycles;
        let mut completed = 0;
        while self.field_cycle >= CYCLES_PER_FIELD {
            self.field_cycle -= CYCLES_PER_FIELD;
            completed += 1;
        }
        if completed > 0 {
            self.fields += completed;
            self.mi_intr.insert(MiInterrupt::VI);
        }
        completed
    }

    pub fn fields(&self) -> u64 {
        self.fields
    }

    fn current_half_line(&self) -> u32 {
        ((self.field_cycle * LINES_PER_FIELD / CYCLES_PER_FIELD) << 1) as u32
    }
}

impl Default for Mmio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_register_blocks() {
        assert_eq!(Device::locate(0x0430_0004), Some((Device::Mi, 1)));
        assert_eq!(Device::locate(0x0460_0010), Some((Device::Pi, 4)));
        assert_eq!(Device::locate(0x0408_0000), Some((Device::SpPc, 0)));
        // Past the last register of MI
        assert_eq!(Device::locate(0x0430_0010), None);
        assert_eq!(Device::locate(0x0500_0000), None);
    }

    #[test]
    fn test_mi_version_is_read_only() {
        let mut mmio = Mmio::new();
        mmio.write(Device::Mi, MI_VERSION, 0);
        assert_eq!(mmio.read(Device::Mi, MI_VERSION), MI_VERSION_VALUE);
    }

    #[test]
    fn test_mi_mask_set_and_clear_pairs() {
        let mut mmio = Mmio::new();
        // set VI (bit 7) and PI (bit 9)
        mmio.write(Device::Mi, MI_MASK, (1 << 7) | (1 << 9));
        assert_eq!(
            mmio.read(Device::Mi, MI_MASK),
            (MiInterrupt::VI | MiInterrupt::PI).bits()
        );
        // clear VI (bit 6)
        mmio.write(Device::Mi, MI_MASK, 1 << 6);
        assert_eq!(mmio.read(Device::Mi, MI_MASK), MiInterrupt::PI.bits());
    }

    #[test]
    fn test_video_fields_raise_vi_interrupt() {
        let mut mmio = Mmio::new();
        assert_eq!(mmio.advance(CYCLES_PER_FIELD / 2), 0);
        assert_eq!(mmio.read(Device::Vi, VI_CURRENT), 262);
        assert_eq!(mmio.advance(CYCLES_PER_FIELD), 1);
        assert_eq!(mmio.fields(), 1);
        assert_ne!(mmio.read(Device::Mi, MI_INTR) & MiInterrupt::VI.bits(), 0);
        mmio.write(Device::Vi, VI_CURRENT, 0);
        assert_eq!(mmio.read(Device::Mi, MI_INTR) & MiInterrupt::VI.bits(), 0);
    }

    #[test]
    fn test_pi_write_length_requests_dma() {
        let mut mmio = Mmio::new();
        mmio.write(Device::Pi, PI_DRAM_ADDR, 0x0010_0000);
        mmio.write(Device::Pi, PI_CART_ADDR, 0x1000_2000);
        let effect = mmio.write(Device::Pi, PI_WR_LEN, 0xFF);
        assert_eq!(
            effect,
            MmioEffect::PiDmaToRdram {
                dram_addr: 0x0010_0000,
                cart_addr: 0x1000_2000,
                len: 0x100
            }
        );
        assert_eq!(mmio.read(Device::Pi, PI_STATUS), 0x8);
        mmio.write(Device::Pi, PI_STATUS, 0x2);
        assert_eq!(mmio.read(Device::Pi, PI_STATUS), 0);
    }

    #[test]
    fn test_sp_starts_halted() {
        let mut mmio = Mmio::new();
        assert_eq!(mmio.read(Device::Sp, SP_STATUS) & 1, 1);
        mmio.write(Device::Sp, SP_STATUS, 0x1);
        assert_eq!(mmio.read(Device::Sp, SP_STATUS) & 1, 0);
    }
}
