//! VR4300 execution engine.
//!
//! The PC/next-PC pair models the branch delay slot: a taken branch only
//! rewrites `next_pc`, so the instruction after it still executes before
//! control reaches the target.

pub mod cop0;
pub mod decode;
pub mod fpu;

#[cfg(test)]
pub(crate) mod asm;

use crate::cpu_bus::{CpuBus, Width};
use crate::debug_flags;
use crate::error::{ExceptionKind, ExecutionFault, FaultError};

use cop0::{Cop0, StatusFlags};
use decode::{
    decode, AluImmOp, AluOp, BranchCond, CopMoveOp, HiLoOp, LoadOp, MulDivOp, Operation, Reg,
    ShiftAmount, ShiftOp, StoreOp, TrapCond, TrapOperand,
};
use fpu::Fpu;

fn sext32(value: u32) -> u64 {
    value as i32 as i64 as u64
}

fn sext16(value: u16) -> u64 {
    value as i16 as i64 as u64
}

fn sext8(value: u8) -> u64 {
    value as i8 as i64 as u64
}

pub struct Registers {
    pub gpr: [u64; 32],
    pub hi: u64,
    pub lo: u64,
    pub pc: u64,
    pub next_pc: u64,
}

impl Registers {
    fn new() -> Self {
        Registers {
            gpr: [0; 32],
            hi: 0,
            lo: 0,
            pc: 0,
            next_pc: 4,
        }
    }

    fn get(&self, reg: Reg) -> u64 {
        self.gpr[reg.index()]
    }

    // r0 is hard-wired to zero
    fn set(&mut self, reg: Reg, value: u64) {
        if reg.index() != 0 {
            self.gpr[reg.index()] = value;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Retired,
    /// A jump or taken branch; the delay slot runs before `target`.
    Redirected { target: u32 },
    /// The engine faulted earlier and no longer steps.
    Halted,
}

pub struct Cpu {
    pub regs: Registers,
    pub cop0: Cop0,
    pub fpu: Fpu,
    cycles: u64,
    ll_bit: bool,
    in_delay_slot: bool,
    halted: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            regs: Registers::new(),
            cop0: Cop0::new(),
            fpu: Fpu::new(),
            cycles: 0,
            ll_bit: false,
            in_delay_slot: false,
            halted: false,
        }
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.regs.pc = sext32(pc);
        self.regs.next_pc = sext32(pc.wrapping_add(4));
        self.in_delay_slot = false;
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc as u32
    }

    pub fn gpr(&self, reg: Reg) -> u64 {
        self.regs.get(reg)
    }

    pub fn set_gpr(&mut self, reg: Reg, value: u64) {
        self.regs.set(reg, value);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// On a fault the PC is left on the faulting instruction, COP0 latches
    /// the cause and every later call returns [`StepOutcome::Halted`].
    pub fn step(&mut self, bus: &mut dyn CpuBus) -> Result<StepOutcome, ExecutionFault> {
        if self.halted {
            return Ok(StepOutcome::Halted);
        }

        let (pc, next_pc) = (self.regs.pc, self.regs.next_pc);
        let in_delay_slot = self.in_delay_slot;

        match self.fetch_and_execute(pc as u32, bus) {
            Ok(outcome) => {
                self.cycles += 1;
                self.cop0.tick();
                Ok(outcome)
            }
            Err(fault) => {
                self.regs.pc = pc;
                self.regs.next_pc = next_pc;
                self.in_delay_slot = in_delay_slot;
                self.cop0.record_fault(&fault, in_delay_slot);
                self.halted = true;
                Err(fault)
            }
        }
    }

    fn fetch_and_execute(
        &mut self,
        pc: u32,
        bus: &mut dyn CpuBus,
    ) -> Result<StepOutcome, ExecutionFault> {
        let word = bus
            .fetch(pc)
            .map_err(|source| ExecutionFault::Memory { pc, source })?;
        let op = decode(word).map_err(|source| ExecutionFault::Decode { pc, source })?;

        if debug_flags::trace() {
            log::trace!("{:08X}: {:08X}  {}", pc, word, op);
        }

        self.regs.pc = self.regs.next_pc;
        self.regs.next_pc = self.regs.next_pc.wrapping_add(4);
        self.in_delay_slot = false;

        self.execute(op, pc, bus)
    }

    fn execute(
        &mut self,
        op: Operation,
        pc: u32,
        bus: &mut dyn CpuBus,
    ) -> Result<StepOutcome, ExecutionFault> {
        let mem = move |source| ExecutionFault::Memory { pc, source };
        let exception = move |kind| ExecutionFault::Exception { pc, kind };
        let link_address = sext32(pc.wrapping_add(8));

        match op {
            Operation::Shift { op, rd, rt, amount } => {
                let amount = match amount {
                    ShiftAmount::Immediate(sa) => sa as u32,
                    ShiftAmount::Register(rs) => self.regs.get(rs) as u32,
                };
                let t = self.regs.get(rt);
                let value = match op {
                    ShiftOp::Sll => sext32((t as u32) << (amount & 31)),
                    ShiftOp::Srl => sext32((t as u32) >> (amount & 31)),
                    ShiftOp::Sra => sext32(((t as i64) >> (amount & 31)) as u32),
                    ShiftOp::Dsll => t << (amount & 63),
                    ShiftOp::Dsrl => t >> (amount & 63),
                    ShiftOp::Dsra => ((t as i64) >> (amount & 63)) as u64,
                    ShiftOp::Dsll32 => t << ((amount & 31) + 32),
                    ShiftOp::Dsrl32 => t >> ((amount & 31) + 32),
                    ShiftOp::Dsra32 => ((t as i64) >> ((amount & 31) + 32)) as u64,
                };
                self.regs.set(rd, value);
            }

            Operation::Alu { op, rd, rs, rt } => {
                let (s, t) = (self.regs.get(rs), self.regs.get(rt));
                let overflow = exception(ExceptionKind::IntegerOverflow);
                let value = match op {
                    AluOp::Add => (s as i32)
                        .checked_add(t as i32)
                        .map(|v| sext32(v as u32))
                        .ok_or(overflow)?,
                    AluOp::Addu => sext32((s as u32).wrapping_add(t as u32)),
                    AluOp::Sub => (s as i32)
                        .checked_sub(t as i32)
                        .map(|v| sext32(v as u32))
                        .ok_or(overflow)?,
                    AluOp::Subu => sext32((s as u32).wrapping_sub(t as u32)),
                    AluOp::And => s & t,
                    AluOp::Or => s | t,
                    AluOp::Xor => s ^ t,
                    AluOp::Nor => !(s | t),
                    AluOp::Slt => ((s as i64) < (t as i64)) as u64,
                    AluOp::Sltu => (s < t) as u64,
                    AluOp::Dadd => (s as i64)
                        .checked_add(t as i64)
                        .map(|v| v as u64)
                        .ok_or(overflow)?,
                    AluOp::Daddu => s.wrapping_add(t),
                    AluOp::Dsub => (s as i64)
                        .checked_sub(t as i64)
                        .map(|v| v as u64)
                        .ok_or(overflow)?,
                    AluOp::Dsubu => s.wrapping_sub(t),
                };
                self.regs.set(rd, value);
            }

            Operation::AluImmediate { op, rt, rs, imm } => {
                let s = self.regs.get(rs);
                let simm = sext16(imm);
                let overflow = exception(ExceptionKind::IntegerOverflow);
                let value = match op {
                    AluImmOp::Addi => (s as i32)
                        .checked_add(imm as i16 as i32)
                        .map(|v| sext32(v as u32))
                        .ok_or(overflow)?,
                    AluImmOp::Addiu => sext32((s as u32).wrapping_add(simm as u32)),
                    AluImmOp::Slti => ((s as i64) < (simm as i64)) as u64,
                    AluImmOp::Sltiu => (s < simm) as u64,
                    AluImmOp::Andi => s & imm as u64,
                    AluImmOp::Ori => s | imm as u64,
                    AluImmOp::Xori => s ^ imm as u64,
                    AluImmOp::Daddi => (s as i64)
                        .checked_add(simm as i64)
                        .map(|v| v as u64)
                        .ok_or(overflow)?,
                    AluImmOp::Daddiu => s.wrapping_add(simm),
                };
                self.regs.set(rt, value);
            }

            Operation::Lui { rt, imm } => self.regs.set(rt, sext32((imm as u32) << 16)),

            Operation::MulDiv { op, rs, rt } => {
                let (s, t) = (self.regs.get(rs), self.regs.get(rt));
                self.mul_div(op, s, t);
            }

            Operation::HiLo { op, reg } => match op {
                HiLoOp::Mfhi => self.regs.set(reg, self.regs.hi),
                HiLoOp::Mflo => self.regs.set(reg, self.regs.lo),
                HiLoOp::Mthi => self.regs.hi = self.regs.get(reg),
                HiLoOp::Mtlo => self.regs.lo = self.regs.get(reg),
            },

            Operation::Jump { link, index } => {
                // self.regs.pc already holds the delay slot address
                let target = (self.regs.pc & !0x0FFF_FFFF) | ((index as u64) << 2);
                if link {
                    self.regs.set(Reg::RA, link_address);
                }
                return Ok(self.redirect(target));
            }

            Operation::JumpRegister { rs, link } => {
                let target = self.regs.get(rs);
                if let Some(rd) = link {
                    self.regs.set(rd, link_address);
                }
                return Ok(self.redirect(target));
            }

            Operation::Branch {
                cond,
                rs,
                rt,
                offset,
                likely,
                link,
            } => {
                let (s, t) = (self.regs.get(rs) as i64, self.regs.get(rt) as i64);
                let taken = match cond {
                    BranchCond::Eq => s == t,
                    BranchCond::Ne => s != t,
                    BranchCond::Lez => s <= 0,
                    BranchCond::Gtz => s > 0,
                    BranchCond::Ltz => s < 0,
                    BranchCond::Gez => s >= 0,
                };
                if link {
                    self.regs.set(Reg::RA, link_address);
                }
                return Ok(self.branch(taken, likely, offset));
            }

            Operation::Load {
                op,
                rt,
                base,
                offset,
            } => {
                let addr = self.effective_address(base, offset);
                // Partial accesses fault at the unrounded address
                let unaligned = move |source: FaultError| mem(source.at(addr));
                let value = match op {
                    LoadOp::Byte => sext8(bus.read_u8(addr).map_err(mem)?),
                    LoadOp::ByteUnsigned => bus.read_u8(addr).map_err(mem)? as u64,
                    LoadOp::Half => sext16(bus.read_u16(addr).map_err(mem)?),
                    LoadOp::HalfUnsigned => bus.read_u16(addr).map_err(mem)? as u64,
                    LoadOp::Word => sext32(bus.read_u32(addr).map_err(mem)?),
                    LoadOp::WordUnsigned => bus.read_u32(addr).map_err(mem)? as u64,
                    LoadOp::Double => bus.read_u64(addr).map_err(mem)?,
                    LoadOp::Linked => {
                        let value = sext32(bus.read_u32(addr).map_err(mem)?);
                        self.ll_bit = true;
                        value
                    }
                    LoadOp::LinkedDouble => {
                        let value = bus.read_u64(addr).map_err(mem)?;
                        self.ll_bit = true;
                        value
                    }
                    LoadOp::WordLeft => {
                        let shift = (addr & 3) * 8;
                        let word = bus.read_u32(addr & !3).map_err(unaligned)?;
                        let old = self.regs.get(rt) as u32;
                        sext32((word << shift) | (old & ((1u32 << shift) - 1)))
                    }
                    LoadOp::WordRight => {
                        let shift = (3 - (addr & 3)) * 8;
                        let word = bus.read_u32(addr & !3).map_err(unaligned)?;
                        let old = self.regs.get(rt) as u32;
                        sext32((word >> shift) | (old & !(u32::MAX >> shift)))
                    }
                    LoadOp::DoubleLeft => {
                        let shift = (addr & 7) * 8;
                        let dword = bus.read_u64(addr & !7).map_err(unaligned)?;
                        let old = self.regs.get(rt);
                        (dword << shift) | (old & ((1u64 << shift) - 1))
                    }
                    LoadOp::DoubleRight => {
                        let shift = (7 - (addr & 7)) * 8;
                        let dword = bus.read_u64(addr & !7).map_err(unaligned)?;
                        let old = self.regs.get(rt);
                        (dword >> shift) | (old & !(u64::MAX >> shift))
                    }
                };
                self.regs.set(rt, value);
            }

            Operation::Store {
                op,
                rt,
                base,
                offset,
            } => {
                let addr = self.effective_address(base, offset);
                // Partial accesses fault at the unrounded address
                let unaligned = move |source: FaultError| mem(source.at(addr));
                let t = self.regs.get(rt);
                match op {
                    StoreOp::Byte => bus.write(addr, Width::Byte, t & 0xFF).map_err(mem)?,
                    StoreOp::Half => bus.write(addr, Width::Half, t & 0xFFFF).map_err(mem)?,
                    StoreOp::Word => bus.write(addr, Width::Word, t & 0xFFFF_FFFF).map_err(mem)?,
                    StoreOp::Double => bus.write(addr, Width::Double, t).map_err(mem)?,
                    StoreOp::Conditional | StoreOp::ConditionalDouble => {
                        let success = self.ll_bit;
                        if success {
                            let (width, value) = match op {
                                StoreOp::Conditional => (Width::Word, t & 0xFFFF_FFFF),
                                _ => (Width::Double, t),
                            };
                            bus.write(addr, width, value).map_err(mem)?;
                        }
                        self.regs.set(rt, success as u64);
                    }
                    StoreOp::WordLeft => {
                        let shift = (addr & 3) * 8;
                        let word = bus.read_u32(addr & !3).map_err(unaligned)?;
                        let merged = ((t as u32) >> shift) | (word & !(u32::MAX >> shift));
                        bus.write_u32(addr & !3, merged).map_err(unaligned)?;
                    }
                    StoreOp::WordRight => {
                        let shift = (3 - (addr & 3)) * 8;
                        let word = bus.read_u32(addr & !3).map_err(unaligned)?;
                        let merged = ((t as u32) << shift) | (word & ((1u32 << shift) - 1));
                        bus.write_u32(addr & !3, merged).map_err(unaligned)?;
                    }
                    StoreOp::DoubleLeft => {
                        let shift = (addr & 7) * 8;
                        let dword = bus.read_u64(addr & !7).map_err(unaligned)?;
                        let merged = (t >> shift) | (dword & !(u64::MAX >> shift));
                        bus.write(addr & !7, Width::Double, merged).map_err(unaligned)?;
                    }
                    StoreOp::DoubleRight => {
                        let shift = (7 - (addr & 7)) * 8;
                        let dword = bus.read_u64(addr & !7).map_err(unaligned)?;
                        let merged = (t << shift) | (dword & ((1u64 << shift) - 1));
                        bus.write(addr & !7, Width::Double, merged).map_err(unaligned)?;
                    }
                }
            }

            Operation::Trap { cond, rs, operand } => {
                let s = self.regs.get(rs);
                let t = match operand {
                    TrapOperand::Register(rt) => self.regs.get(rt),
                    TrapOperand::Immediate(imm) => imm as i64 as u64,
                };
                let hit = match cond {
                    TrapCond::Ge => (s as i64) >= (t as i64),
                    TrapCond::Geu => s >= t,
                    TrapCond::Lt => (s as i64) < (t as i64),
                    TrapCond::Ltu => s < t,
                    TrapCond::Eq => s == t,
                    TrapCond::Ne => s != t,
                };
                if hit {
                    return Err(exception(ExceptionKind::Trap));
                }
            }

            Operation::Syscall { .. } => return Err(exception(ExceptionKind::Syscall)),
            Operation::Break { .. } => return Err(exception(ExceptionKind::Breakpoint)),

            // No caches or TLB are modelled
            Operation::Sync | Operation::Cache { .. } | Operation::Tlb(_) => {}

            Operation::Cop0Move { op, rt, rd } => match op {
                CopMoveOp::From => self.regs.set(rt, sext32(self.cop0.read(rd) as u32)),
                CopMoveOp::DoubleFrom => self.regs.set(rt, self.cop0.read(rd)),
                CopMoveOp::To => self.cop0.write(rd, sext32(self.regs.get(rt) as u32)),
                CopMoveOp::DoubleTo => self.cop0.write(rd, self.regs.get(rt)),
                // not encodable for COP0
                CopMoveOp::ControlFrom | CopMoveOp::ControlTo => {}
            },

            Operation::Eret => {
                let target = self.cop0.take_return_address();
                self.ll_bit = false;
                // ERET has no delay slot
                self.regs.pc = target;
                self.regs.next_pc = target.wrapping_add(4);
                return Ok(StepOutcome::Redirected {
                    target: target as u32,
                });
            }

            Operation::Cop1Move { .. }
            | Operation::FpuLoad { .. }
            | Operation::FpuStore { .. }
            | Operation::FpuBranch { .. }
            | Operation::FpuArith { .. }
            | Operation::FpuConvert { .. }
            | Operation::FpuCompare { .. } => return self.execute_cop1(op, pc, bus),
        }

        Ok(StepOutcome::Retired)
    }

    fn execute_cop1(
        &mut self,
        op: Operation,
        pc: u32,
        bus: &mut dyn CpuBus,
    ) -> Result<StepOutcome, ExecutionFault> {
        let status = self.cop0.status();
        if !status.contains(StatusFlags::CU1) {
            return Err(ExecutionFault::Exception {
                pc,
                kind: ExceptionKind::CoprocessorUnusable(1),
            });
        }
        let fr = status.contains(StatusFlags::FR);
        let mem = move |source| ExecutionFault::Memory { pc, source };

        match op {
            Operation::Cop1Move { op, rt, fs } => match op {
                CopMoveOp::From => self.regs.set(rt, sext32(self.fpu.read_u32(fs, fr))),
                CopMoveOp::DoubleFrom => self.regs.set(rt, self.fpu.read_u64(fs, fr)),
                CopMoveOp::ControlFrom => self.regs.set(rt, sext32(self.fpu.read_control(fs))),
                CopMoveOp::To => self.fpu.write_u32(fs, self.regs.get(rt) as u32, fr),
                CopMoveOp::DoubleTo => self.fpu.write_u64(fs, self.regs.get(rt), fr),
                CopMoveOp::ControlTo => self.fpu.write_control(fs, self.regs.get(rt) as u32),
            },
            Operation::FpuLoad {
                double,
                ft,
                base,
                offset,
            } => {
                let addr = self.effective_address(base, offset);
                if double {
                    let value = bus.read_u64(addr).map_err(mem)?;
                    self.fpu.write_u64(ft, value, fr);
                } else {
                    let value = bus.read_u32(addr).map_err(mem)?;
                    self.fpu.write_u32(ft, value, fr);
                }
            }
            Operation::FpuStore {
                double,
                ft,
                base,
                offset,
            } => {
                let addr = self.effective_address(base, offset);
                if double {
                    let value = self.fpu.read_u64(ft, fr);
                    bus.write(addr, Width::Double, value).map_err(mem)?;
                } else {
                    bus.write_u32(addr, self.fpu.read_u32(ft, fr)).map_err(mem)?;
                }
            }
            Operation::FpuBranch {
                on_true,
                likely,
                offset,
            } => {
                let taken = self.fpu.condition() == on_true;
                return Ok(self.branch(taken, likely, offset));
            }
            Operation::FpuArith {
                op,
                fmt,
                fd,
                fs,
                ft,
            } => self.fpu.arith(op, fmt, fd, fs, ft, fr),
            Operation::FpuConvert {
                to,
                from,
                rounding,
                fd,
                fs,
            } => self.fpu.convert(to, from, rounding, fd, fs, fr),
            Operation::FpuCompare { cond, fmt, fs, ft } => {
                self.fpu.compare(cond, fmt, fs, ft, fr)
            }
            _ => {}
        }
        Ok(StepOutcome::Retired)
    }

    fn effective_address(&self, base: Reg, offset: i16) -> u32 {
        self.regs.get(base).wrapping_add(offset as i64 as u64) as u32
    }

    fn mul_div(&mut self, op: MulDivOp, s: u64, t: u64) {
        let (lo, hi) = match op {
            MulDivOp::Mult => {
                let r = (s as i32 as i64) * (t as i32 as i64);
                (sext32(r as u32), sext32((r >> 32) as u32))
            }
            MulDivOp::Multu => {
                let r = (s as u32 as u64) * (t as u32 as u64);
                (sext32(r as u32), sext32((r >> 32) as u32))
            }
            MulDivOp::Div => {
                let (n, d) = (s as i32, t as i32);
                if d == 0 {
                    let lo = if n >= 0 { -1i32 } else { 1 };
                    (sext32(lo as u32), sext32(n as u32))
                } else {
                    (
                        sext32(n.wrapping_div(d) as u32),
                        sext32(n.wrapping_rem(d) as u32),
                    )
                }
            }
            MulDivOp::Divu => {
                let (n, d) = (s as u32, t as u32);
                if d == 0 {
                    (u64::MAX, sext32(n))
                } else {
                    (sext32(n / d), sext32(n % d))
                }
            }
            MulDivOp::Dmult => {
                let r = (s as i64 as i128) * (t as i64 as i128);
                (r as u64, (r >> 64) as u64)
            }
            MulDivOp::Dmultu => {
                let r = (s as u128) * (t as u128);
                (r as u64, (r >> 64) as u64)
            }
            MulDivOp::Ddiv => {
                let (n, d) = (s as i64, t as i64);
                if d == 0 {
                    (if n >= 0 { u64::MAX } else { 1 }, n as u64)
                } else {
                    (n.wrapping_div(d) as u64, n.wrapping_rem(d) as u64)
                }
            }
            MulDivOp::Ddivu => {
                if t == 0 {
                    (u64::MAX, s)
                } else {
                    (s / t, s % t)
                }
            }
        };
        self.regs.lo = lo;
        self.regs.hi = hi;
    }

    fn redirect(&mut self, target: u64) -> StepOutcome {
        self.regs.next_pc = target;
        self.in_delay_slot = true;
        StepOutcome::Redirected {
            target: target as u32,
        }
    }

    /// `self.regs.pc` is the delay slot when this runs.
    fn branch(&mut self, taken: bool, likely: bool, offset: i16) -> StepOutcome {
        if taken {
            let target = self.regs.pc.wrapping_add(((offset as i64) << 2) as u64);
            return self.redirect(target);
        }
        if likely {
            // Not taken: the delay slot is nullified
            self.regs.pc = self.regs.next_pc;
            self.regs.next_pc = self.regs.next_pc.wrapping_add(4);
        } else {
            self.in_delay_slot = true;
        }
        StepOutcome::Retired
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
