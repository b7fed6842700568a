use bitflags::bitflags;

use crate::error::{ExecutionFault, FaultError};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        const IE = 1 << 0;
        const EXL = 1 << 1;
        const ERL = 1 << 2;
        const UX = 1 << 5;
        const SX = 1 << 6;
        const KX = 1 << 7;
        const IM = 0xFF << 8;
        const DE = 1 << 16;
        const CE = 1 << 17;
        const CH = 1 << 18;
        const SR = 1 << 20;
        const TS = 1 << 21;
        const BEV = 1 << 22;
        const ITS = 1 << 24;
        const RE = 1 << 25;
        const FR = 1 << 26;
        const RP = 1 << 27;
        const CU0 = 1 << 28;
        const CU1 = 1 << 29;
        const CU2 = 1 << 30;
        const CU3 = 1 << 31;
    }
}

pub const INDEX: u8 = 0;
pub const RANDOM: u8 = 1;
pub const WIRED: u8 = 6;
pub const BAD_VADDR: u8 = 8;
pub const COUNT: u8 = 9;
pub const COMPARE: u8 = 11;
pub const STATUS: u8 = 12;
pub const CAUSE: u8 = 13;
pub const EPC: u8 = 14;
pub const PRID: u8 = 15;
pub const CONFIG: u8 = 16;
pub const ERROR_EPC: u8 = 30;

pub const PRID_VALUE: u64 = 0x0B22;
pub const CONFIG_VALUE: u64 = 0x7006_E463;
/// ERL | BEV
pub const POWER_ON_STATUS: u32 = 0x0040_0004;

const CAUSE_TIMER_PENDING: u64 = 1 << 15;
const CAUSE_SOFTWARE_MASK: u64 = 0x300;
const CAUSE_BRANCH_DELAY: u64 = 1 << 31;

pub struct Cop0 {
    regs: [u64; 32],
    count_phase: bool,
}

impl Cop0 {
    pub fn new() -> Self {
        let mut regs = [0u64; 32];
        regs[RANDOM as usize] = 31;
        regs[PRID as usize] = PRID_VALUE;
        regs[CONFIG as usize] = CONFIG_VALUE;
        regs[STATUS as usize] = POWER_ON_STATUS as u64;
        Cop0 {
            regs,
            count_phase: false,
        }
    }

    pub fn read(&self, reg: u8) -> u64 {
        self.regs[reg as usize & 31]
    }

    pub fn write(&mut self, reg: u8, value: u64) {
        let reg = reg & 31;
        match reg {
            RANDOM | PRID => {}
            WIRED => {
                self.regs[WIRED as usize] = value & 0x3F;
                self.regs[RANDOM as usize] = 31;
            }
            COUNT | STATUS => self.regs[reg as usize] = value & 0xFFFF_FFFF,
            COMPARE => {
                self.regs[COMPARE as usize] = value & 0xFFFF_FFFF;
                self.regs[CAUSE as usize] &= !CAUSE_TIMER_PENDING;
            }
            CAUSE => {
                let cause = &mut self.regs[CAUSE as usize];
                *cause = (*cause & !CAUSE_SOFTWARE_MASK) | (value & CAUSE_SOFTWARE_MASK);
            }
            _ => self.regs[reg as usize] = value,
        }
    }

    pub fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.regs[STATUS as usize] as u32)
    }

    pub fn set_status(&mut self, status: StatusFlags) {
        self.regs[STATUS as usize] = status.bits() as u64;
    }

    /// Called once per retired instruction.
    pub fn tick(&mut self) {
        // Count runs at half the pipeline clock
        self.count_phase = !self.count_phase;
        if !self.count_phase {
            let count = (self.regs[COUNT as usize] as u32).wrapping_add(1);
            self.regs[COUNT as usize] = count as u64;
            if count as u64 == self.regs[COMPARE as usize] {
                self.regs[CAUSE as usize] |= CAUSE_TIMER_PENDING;
            }
        }

        let wired = self.regs[WIRED as usize];
        let random = &mut self.regs[RANDOM as usize];
        *random = if *random <= wired { 31 } else { *random - 1 };
    }

    /// Target of ERET; clears the matching error/exception level bit.
    pub fn take_return_address(&mut self) -> u64 {
        let mut status = self.status();
        if status.contains(StatusFlags::ERL) {
            status.remove(StatusFlags::ERL);
            self.set_status(status);
            self.regs[ERROR_EPC as usize]
        } else {
            status.remove(StatusFlags::EXL);
            self.set_status(status);
            self.regs[EPC as usize]
        }
    }

    /// Records a fatal fault the way the hardware would latch an exception.
    pub fn record_fault(&mut self, fault: &ExecutionFault, in_delay_slot: bool) {
        let code = match fault {
            ExecutionFault::Memory { source, .. } => {
                self.regs[BAD_VADDR as usize] = source.address() as i32 as i64 as u64;
                match source {
                    FaultError::Misaligned { .. } => 4,
                    FaultError::UnmappedAddress { .. } | FaultError::ReadOnly { .. } => 7,
                }
            }
            ExecutionFault::Decode { .. } => 10,
            ExecutionFault::Exception { kind, .. } => kind.code(),
        };
        let pc = fault.pc() as i32 as i64 as u64;
        let mut cause = self.regs[CAUSE as usize] & !(0x1F << 2) & !CAUSE_BRANCH_DELAY;
        cause |= (code as u64) << 2;
        if in_delay_slot {
            cause |= CAUSE_BRANCH_DELAY;
            self.regs[EPC as usize] = pc.wrapping_sub(4);
        } else {
            self.regs[EPC as usize] = pc;
        }
        self.regs[CAUSE as usize] = cause;
        let status = self.status() | StatusFlags::EXL;
        self.set_status(status);
    }
}

impl Default for Cop0 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExceptionKind;

    #[test]
    fn test_count_advances_every_other_tick() {
        let mut cop0 = Cop0::new();
        for _ in 0..10 {
            cop0.tick();
        }
        assert_eq!(cop0.read(COUNT), 5);
    }

    #[test]
    fn test_compare_match_sets_timer_pending() {
        let mut cop0 = Cop0::new();
        cop0.write(COMPARE, 2);
        for _ in 0..4 {
            cop0.tick();
        }
        assert_ne!(cop0.read(CAUSE) & CAUSE_TIMER_PENDING, 0);
        cop0.write(COMPARE, 100);
        assert_eq!(cop0.read(CAUSE) & CAUSE_TIMER_PENDING, 0);
    }

    #[test]
    fn test_random_wraps_at_wired() {
        let mut cop0 = Cop0::new();
        cop0.write(WIRED, 30);
        assert_eq!(cop0.read(RANDOM), 31);
        cop0.tick();
        assert_eq!(cop0.read(RANDOM), 30);
        cop0.tick();
        assert_eq!(cop0.read(RANDOM), 31);
    }

    #[test]
    fn test_read_only_registers() {
        let mut cop0 = Cop0::new();
        cop0.write(PRID, 0);
        cop0.write(RANDOM, 3);
        assert_eq!(cop0.read(PRID), PRID_VALUE);
        assert_eq!(cop0.read(RANDOM), 31);
    }

    #[test]
    fn test_record_fault_latches_epc_and_badvaddr() {
        let mut cop0 = Cop0::new();
        let fault = ExecutionFault::Memory {
            pc: 0x8000_0404,
            source: FaultError::UnmappedAddress {
                address: 0xA080_0000,
            },
        };
        cop0.record_fault(&fault, true);
        assert_eq!(cop0.read(BAD_VADDR), 0xFFFF_FFFF_A080_0000);
        assert_eq!(cop0.read(EPC), 0xFFFF_FFFF_8000_0400);
        assert_eq!((cop0.read(CAUSE) >> 2) & 0x1F, 7);
        assert_ne!(cop0.read(CAUSE) & CAUSE_BRANCH_DELAY, 0);
        assert!(cop0.status().contains(StatusFlags::EXL));

        let trap = ExecutionFault::Exception {
            pc: 0x8000_0500,
            kind: ExceptionKind::Breakpoint,
        };
        cop0.record_fault(&trap, false);
        assert_eq!((cop0.read(CAUSE) >> 2) & 0x1F, 9);
        assert_eq!(cop0.read(CAUSE) & CAUSE_BRANCH_DELAY, 0);
    }

    #[test]
    fn test_eret_prefers_error_epc() {
        let mut cop0 = Cop0::new();
        cop0.write(ERROR_EPC, 0x8000_1000);
        cop0.write(EPC, 0x8000_2000);
        assert_eq!(cop0.take_return_address(), 0x8000_1000);
        assert!(!cop0.status().contains(StatusFlags::ERL));
        cop0.set_status(StatusFlags::EXL);
        assert_eq!(cop0.take_return_address(), 0x8000_2000);
        assert!(!cop0.status().contains(StatusFlags::EXL));
    }
}
