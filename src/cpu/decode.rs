//! VR4300 instruction decoding.
//!
//! [`decode`] is a pure function from a 32-bit instruction word to an
//! [`Operation`]. Encodings the VR4300 does not define (reserved opcodes,
//! functs and formats, and the COP2/COP3 spaces, which have no coprocessor on
//! the N64) are rejected with [`DecodeError::IllegalOpcode`] instead of being
//! mapped to a default operation.

use std::fmt;

use crate::error::DecodeError;

/// A general-purpose register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

impl Reg {
    pub const ZERO: Reg = Reg(0);
    pub const SP: Reg = Reg(29);
    pub const RA: Reg = Reg(31);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

const REG_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp",
    "ra",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", REG_NAMES[self.index() & 31])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAmount {
    Immediate(u8),
    Register(Reg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluImmOp {
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Daddi,
    Daddiu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulDivOp {
    Mult,
    Multu,
    Div,
    Divu,
    Dmult,
    Dmultu,
    Ddiv,
    Ddivu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiLoOp {
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCond {
    Eq,
    Ne,
    Lez,
    Gtz,
    Ltz,
    Gez,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCond {
    Ge,
    Geu,
    Lt,
    Ltu,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOperand {
    Register(Reg),
    Immediate(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Byte,
    ByteUnsigned,
    Half,
    HalfUnsigned,
    Word,
    WordUnsigned,
    Double,
    WordLeft,
    WordRight,
    DoubleLeft,
    DoubleRight,
    Linked,
    LinkedDouble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Byte,
    Half,
    Word,
    Double,
    WordLeft,
    WordRight,
    DoubleLeft,
    DoubleRight,
    Conditional,
    ConditionalDouble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopMoveOp {
    From,
    DoubleFrom,
    ControlFrom,
    To,
    DoubleTo,
    ControlTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlbOp {
    Read,
    WriteIndexed,
    WriteRandom,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuFormat {
    Single,
    Double,
    Word,
    Long,
}

impl FpuFormat {
    fn from_field(fmt: u32) -> Option<Self> {
        match fmt {
            16 => Some(FpuFormat::Single),
            17 => Some(FpuFormat::Double),
            20 => Some(FpuFormat::Word),
            21 => Some(FpuFormat::Long),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            FpuFormat::Single => "s",
            FpuFormat::Double => "d",
            FpuFormat::Word => "w",
            FpuFormat::Long => "l",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, FpuFormat::Single | FpuFormat::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    Abs,
    Mov,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Whatever FCR31 selects.
    Current,
    Nearest,
    Zero,
    Ceil,
    Floor,
}

/// A decoded instruction. Register fields of coprocessor registers are raw
/// indices since they are not GPRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Shift { op: ShiftOp, rd: Reg, rt: Reg, amount: ShiftAmount },
    Alu { op: AluOp, rd: Reg, rs: Reg, rt: Reg },
    AluImmediate { op: AluImmOp, rt: Reg, rs: Reg, imm: u16 },
    Lui { rt: Reg, imm: u16 },
    MulDiv { op: MulDivOp, rs: Reg, rt: Reg },
    HiLo { op: HiLoOp, reg: Reg },
    Jump { link: bool, index: u32 },
    JumpRegister { rs: Reg, link: Option<Reg> },
    Branch { cond: BranchCond, rs: Reg, rt: Reg, offset: i16, likely: bool, link: bool },
    Load { op: LoadOp, rt: Reg, base: Reg, offset: i16 },
    Store { op: StoreOp, rt: Reg, base: Reg, offset: i16 },
    Trap { cond: TrapCond, rs: Reg, operand: TrapOperand },
    Syscall { code: u32 },
    Break { code: u32 },
    Sync,
    Cache { op: u8, base: Reg, offset: i16 },
    Cop0Move { op: CopMoveOp, rt: Reg, rd: u8 },
    Tlb(TlbOp),
    Eret,
    Cop1Move { op: CopMoveOp, rt: Reg, fs: u8 },
    FpuLoad { double: bool, ft: u8, base: Reg, offset: i16 },
    FpuStore { double: bool, ft: u8, base: Reg, offset: i16 },
    FpuBranch { on_true: bool, likely: bool, offset: i16 },
    FpuArith { op: FpuOp, fmt: FpuFormat, fd: u8, fs: u8, ft: u8 },
    FpuConvert { to: FpuFormat, from: FpuFormat, rounding: Rounding, fd: u8, fs: u8 },
    FpuCompare { cond: u8, fmt: FpuFormat, fs: u8, ft: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Alu,
    Shift,
    MulDiv,
    Jump,
    Branch,
    Load,
    Store,
    Trap,
    System,
    Cop0,
    Cop1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Register,
    Immediate,
    /// `offset(base)`
    BaseOffset,
    /// PC + 4 + offset * 4
    PcRelative,
    /// Index within the current 256 MiB segment
    Segment,
    None,
}

impl Operation {
    pub fn class(&self) -> OpClass {
        match self {
            Operation::Shift { .. } => OpClass::Shift,
            Operation::Alu { .. } | Operation::AluImmediate { .. } | Operation::Lui { .. } => {
                OpClass::Alu
            }
            Operation::MulDiv { .. } | Operation::HiLo { .. } => OpClass::MulDiv,
            Operation::Jump { .. } | Operation::JumpRegister { .. } => OpClass::Jump,
            Operation::Branch { .. } => OpClass::Branch,
            Operation::Load { .. } => OpClass::Load,
            Operation::Store { .. } => OpClass::Store,
            Operation::Trap { .. } => OpClass::Trap,
            Operation::Syscall { .. }
            | Operation::Break { .. }
            | Operation::Sync
            | Operation::Cache { .. } => OpClass::System,
            Operation::Cop0Move { .. } | Operation::Tlb(_) | Operation::Eret => OpClass::Cop0,
            Operation::Cop1Move { .. }
            | Operation::FpuLoad { .. }
            | Operation::FpuStore { .. }
            | Operation::FpuBranch { .. }
            | Operation::FpuArith { .. }
            | Operation::FpuConvert { .. }
            | Operation::FpuCompare { .. } => OpClass::Cop1,
        }
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        match self {
            Operation::Shift { .. }
            | Operation::Alu { .. }
            | Operation::MulDiv { .. }
            | Operation::HiLo { .. }
            | Operation::JumpRegister { .. }
            | Operation::Cop0Move { .. }
            | Operation::Cop1Move { .. }
            | Operation::FpuArith { .. }
            | Operation::FpuConvert { .. }
            | Operation::FpuCompare { .. } => AddressingMode::Register,
            Operation::AluImmediate { .. } | Operation::Lui { .. } => AddressingMode::Immediate,
            Operation::Trap { operand, .. } => match operand {
                TrapOperand::Register(_) => AddressingMode::Register,
                TrapOperand::Immediate(_) => AddressingMode::Immediate,
            },
            Operation::Load { .. }
            | Operation::Store { .. }
            | Operation::Cache { .. }
            | Operation::FpuLoad { .. }
            | Operation::FpuStore { .. } => AddressingMode::BaseOffset,
            Operation::Branch { .. } | Operation::FpuBranch { .. } => AddressingMode::PcRelative,
            Operation::Jump { .. } => AddressingMode::Segment,
            Operation::Syscall { .. }
            | Operation::Break { .. }
            | Operation::Sync
            | Operation::Tlb(_)
            | Operation::Eret => AddressingMode::None,
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(
            self,
            Operation::Shift {
                op: ShiftOp::Sll,
                rd: Reg::ZERO,
                ..
            }
        )
    }
}

// Field extraction
fn rs(word: u32) -> Reg {
    Reg(((word >> 21) & 31) as u8)
}
fn rt(word: u32) -> Reg {
    Reg(((word >> 16) & 31) as u8)
}
fn rd(word: u32) -> Reg {
    Reg(((word >> 11) & 31) as u8)
}
fn sa(word: u32) -> u8 {
    ((word >> 6) & 31) as u8
}
fn imm(word: u32) -> u16 {
    word as u16
}
fn simm(word: u32) -> i16 {
    word as u16 as i16
}
fn field(word: u32, shift: u32) -> u8 {
    ((word >> shift) & 31) as u8
}

pub fn decode(word: u32) -> Result<Operation, DecodeError> {
    let illegal = DecodeError::IllegalOpcode { word };
    let op = match word >> 26 {
        0x00 => return decode_special(word),
        0x01 => return decode_regimm(word),
        0x02 => Operation::Jump {
            link: false,
            index: word & 0x03FF_FFFF,
        },
        0x03 => Operation::Jump {
            link: true,
            index: word & 0x03FF_FFFF,
        },
        0x04 => branch(word, BranchCond::Eq, false),
        0x05 => branch(word, BranchCond::Ne, false),
        0x06 => branch(word, BranchCond::Lez, false),
        0x07 => branch(word, BranchCond::Gtz, false),
        0x08 => alu_imm(word, AluImmOp::Addi),
        0x09 => alu_imm(word, AluImmOp::Addiu),
        0x0A => alu_imm(word, AluImmOp::Slti),
        0x0B => alu_imm(word, AluImmOp::Sltiu),
        0x0C => alu_imm(word, AluImmOp::Andi),
        0x0D => alu_imm(word, AluImmOp::Ori),
        0x0E => alu_imm(word, AluImmOp::Xori),
        0x0F => Operation::Lui {
            rt: rt(word),
            imm: imm(word),
        },
        0x10 => return decode_cop0(word),
        0x11 => return decode_cop1(word),
        0x14 => branch(word, BranchCond::Eq, true),
        0x15 => branch(word, BranchCond::Ne, true),
        0x16 => branch(word, BranchCond::Lez, true),
        0x17 => branch(word, BranchCond::Gtz, true),
        0x18 => alu_imm(word, AluImmOp::Daddi),
        0x19 => alu_imm(word, AluImmOp::Daddiu),
        0x1A => load(word, LoadOp::DoubleLeft),
        0x1B => load(word, LoadOp::DoubleRight),
        0x20 => load(word, LoadOp::Byte),
        0x21 => load(word, LoadOp::Half),
        0x22 => load(word, LoadOp::WordLeft),
        0x23 => load(word, LoadOp::Word),
        0x24 => load(word, LoadOp::ByteUnsigned),
        0x25 => load(word, LoadOp::HalfUnsigned),
        0x26 => load(word, LoadOp::WordRight),
        0x27 => load(word, LoadOp::WordUnsigned),
        0x28 => store(word, StoreOp::Byte),
        0x29 => store(word, StoreOp::Half),
        0x2A => store(word, StoreOp::WordLeft),
        0x2B => store(word, StoreOp::Word),
        0x2C => store(word, StoreOp::DoubleLeft),
        0x2D => store(word, StoreOp::DoubleRight),
        0x2E => store(word, StoreOp::WordRight),
        0x2F => Operation::Cache {
            op: field(word, 16),
            base: rs(word),
            offset: simm(word),
        },
        0x30 => load(word, LoadOp::Linked),
        0x31 => fpu_mem(word, false, true),
        0x34 => load(word, LoadOp::LinkedDouble),
        0x35 => fpu_mem(word, true, true),
        0x37 => load(word, LoadOp::Double),
        0x38 => store(word, StoreOp::Conditional),
        0x39 => fpu_mem(word, false, false),
        0x3C => store(word, StoreOp::ConditionalDouble),
        0x3D => fpu_mem(word, true, false),
        0x3F => store(word, StoreOp::Double),
        _ => return Err(illegal),
    };
    Ok(op)
}

fn branch(word: u32, cond: BranchCond, likely: bool) -> Operation {
    Operation::Branch {
        cond,
        rs: rs(word),
        rt: rt(word),
        offset: simm(word),
        likely,
        link: false,
    }
}

fn alu_imm(word: u32, op: AluImmOp) -> Operation {
    Operation::AluImmediate {
        op,
        rt: rt(word),
        rs: rs(word),
        imm: imm(word),
    }
}

fn load(word: u32, op: LoadOp) -> Operation {
    Operation::Load {
        op,
        rt: rt(word),
        base: rs(word),
        offset: simm(word),
    }
}

fn store(word: u32, op: StoreOp) -> Operation {
    Operation::Store {
        op,
        rt: rt(word),
        base: rs(word),
        offset: simm(word),
    }
}

fn fpu_mem(word: u32, double: bool, is_load: bool) -> Operation {
    let (ft, base, offset) = (field(word, 16), rs(word), simm(word));
    if is_load {
        Operation::FpuLoad {
            double,
            ft,
            base,
            offset,
        }
    } else {
        Operation::FpuStore {
            double,
            ft,
            base,
            offset,
        }
    }
}

fn decode_special(word: u32) -> Result<Operation, DecodeError> {
    let (rd, rs, rt) = (rd(word), rs(word), rt(word));
    let shift = |op| Operation::Shift {
        op,
        rd,
        rt,
        amount: ShiftAmount::Immediate(sa(word)),
    };
    let shift_var = |op| Operation::Shift {
        op,
        rd,
        rt,
        amount: ShiftAmount::Register(rs),
    };
    let alu = |op| Operation::Alu { op, rd, rs, rt };
    let muldiv = |op| Operation::MulDiv { op, rs, rt };
    let trap = |cond| Operation::Trap {
        cond,
        rs,
        operand: TrapOperand::Register(rt),
    };

    let op = match word & 0x3F {
        0x00 => shift(ShiftOp::Sll),
        0x02 => shift(ShiftOp::Srl),
        0x03 => shift(ShiftOp::Sra),
        0x04 => shift_var(ShiftOp::Sll),
        0x06 => shift_var(ShiftOp::Srl),
        0x07 => shift_var(ShiftOp::Sra),
        0x08 => Operation::JumpRegister { rs, link: None },
        0x09 => Operation::JumpRegister { rs, link: Some(rd) },
        0x0C => Operation::Syscall {
            code: (word >> 6) & 0xF_FFFF,
        },
        0x0D => Operation::Break {
            code: (word >> 6) & 0xF_FFFF,
        },
        0x0F => Operation::Sync,
        0x10 => Operation::HiLo {
            op: HiLoOp::Mfhi,
            reg: rd,
        },
        0x11 => Operation::HiLo {
            op: HiLoOp::Mthi,
            reg: rs,
        },
        0x12 => Operation::HiLo {
            op: HiLoOp::Mflo,
            reg: rd,
        },
        0x13 => Operation::HiLo {
            op: HiLoOp::Mtlo,
            reg: rs,
        },
        0x14 => shift_var(ShiftOp::Dsll),
        0x16 => shift_var(ShiftOp::Dsrl),
        0x17 => shift_var(ShiftOp::Dsra),
        0x18 => muldiv(MulDivOp::Mult),
        0x19 => muldiv(MulDivOp::Multu),
        0x1A => muldiv(MulDivOp::Div),
        0x1B => muldiv(MulDivOp::Divu),
        0x1C => muldiv(MulDivOp::Dmult),
        0x1D => muldiv(MulDivOp::Dmultu),
        0x1E => muldiv(MulDivOp::Ddiv),
        0x1F => muldiv(MulDivOp::Ddivu),
        0x20 => alu(AluOp::Add),
        0x21 => alu(AluOp::Addu),
        0x22 => alu(AluOp::Sub),
        0x23 => alu(AluOp::Subu),
        0x24 => alu(AluOp::And),
        0x25 => alu(AluOp::Or),
        0x26 => alu(AluOp::Xor),
        0x27 => alu(AluOp::Nor),
        0x2A => alu(AluOp::Slt),
        0x2B => alu(AluOp::Sltu),
        0x2C => alu(AluOp::Dadd),
        0x2D => alu(AluOp::Daddu),
        0x2E => alu(AluOp::Dsub),
        0x2F => alu(AluOp::Dsubu),
        0x30 => trap(TrapCond::Ge),
        0x31 => trap(TrapCond::Geu),
        0x32 => trap(TrapCond::Lt),
        0x33 => trap(TrapCond::Ltu),
        0x34 => trap(TrapCond::Eq),
        0x36 => trap(TrapCond::Ne),
        0x38 => shift(ShiftOp::Dsll),
        0x3A => shift(ShiftOp::Dsrl),
        0x3B => shift(ShiftOp::Dsra),
        0x3C => shift(ShiftOp::Dsll32),
        0x3E => shift(ShiftOp::Dsrl32),
        0x3F => shift(ShiftOp::Dsra32),
        _ => return Err(DecodeError::IllegalOpcode { word }),
    };
    Ok(op)
}

fn decode_regimm(word: u32) -> Result<Operation, DecodeError> {
    let (rs, offset) = (rs(word), simm(word));
    let branch = |cond, likely, link| Operation::Branch {
        cond,
        rs,
        rt: Reg::ZERO,
        offset,
        likely,
        link,
    };
    let trap = |cond| Operation::Trap {
        cond,
        rs,
        operand: TrapOperand::Immediate(offset),
    };
    let op = match field(word, 16) {
        0x00 => branch(BranchCond::Ltz, false, false),
        0x01 => branch(BranchCond::Gez, false, false),
        0x02 => branch(BranchCond::Ltz, true, false),
        0x03 => branch(BranchCond::Gez, true, false),
        0x08 => trap(TrapCond::Ge),
        0x09 => trap(TrapCond::Geu),
        0x0A => trap(TrapCond::Lt),
        0x0B => trap(TrapCond::Ltu),
        0x0C => trap(TrapCond::Eq),
        0x0E => trap(TrapCond::Ne),
        0x10 => branch(BranchCond::Ltz, false, true),
        0x11 => branch(BranchCond::Gez, false, true),
        0x12 => branch(BranchCond::Ltz, true, true),
        0x13 => branch(BranchCond::Gez, true, true),
        _ => return Err(DecodeError::IllegalOpcode { word }),
    };
    Ok(op)
}

fn decode_cop0(word: u32) -> Result<Operation, DecodeError> {
    let (rt, rd) = (rt(word), field(word, 11));
    let op = match field(word, 21) {
        0x00 => CopMoveOp::From,
        0x01 => CopMoveOp::DoubleFrom,
        0x04 => CopMoveOp::To,
        0x05 => CopMoveOp::DoubleTo,
        0x10..=0x1F => {
            return match word & 0x3F {
                0x01 => Ok(Operation::Tlb(TlbOp::Read)),
                0x02 => Ok(Operation::Tlb(TlbOp::WriteIndexed)),
                0x06 => Ok(Operation::Tlb(TlbOp::WriteRandom)),
                0x08 => Ok(Operation::Tlb(TlbOp::Probe)),
                0x18 => Ok(Operation::Eret),
                _ => Err(DecodeError::IllegalOpcode { word }),
            }
        }
        _ => return Err(DecodeError::IllegalOpcode { word }),
    };
    Ok(Operation::Cop0Move { op, rt, rd })
}

fn decode_cop1(word: u32) -> Result<Operation, DecodeError> {
    let illegal = DecodeError::IllegalOpcode { word };
    let fmt_field = (word >> 21) & 31;
    let (ft, fs, fd) = (field(word, 16), field(word, 11), field(word, 6));
    let cop_move = |op| Operation::Cop1Move { op, rt: rt(word), fs };

    let fmt = match fmt_field {
        0x00 => return Ok(cop_move(CopMoveOp::From)),
        0x01 => return Ok(cop_move(CopMoveOp::DoubleFrom)),
        0x02 => return Ok(cop_move(CopMoveOp::ControlFrom)),
        0x04 => return Ok(cop_move(CopMoveOp::To)),
        0x05 => return Ok(cop_move(CopMoveOp::DoubleTo)),
        0x06 => return Ok(cop_move(CopMoveOp::ControlTo)),
        0x08 => {
            let (on_true, likely) = match ft & 0x3 {
                0 => (false, false),
                1 => (true, false),
                2 => (false, true),
                _ => (true, true),
            };
            return Ok(Operation::FpuBranch {
                on_true,
                likely,
                offset: simm(word),
            });
        }
        other => FpuFormat::from_field(other).ok_or(illegal)?,
    };

    let funct = word & 0x3F;
    let convert = |to, rounding| Operation::FpuConvert {
        to,
        from: fmt,
        rounding,
        fd,
        fs,
    };

    if !fmt.is_float() {
        // Fixed-point formats only convert to floating point
        return match funct {
            0x20 => Ok(convert(FpuFormat::Single, Rounding::Current)),
            0x21 => Ok(convert(FpuFormat::Double, Rounding::Current)),
            _ => Err(illegal),
        };
    }

    let arith = |op| Operation::FpuArith { op, fmt, fd, fs, ft };
    let op = match funct {
        0x00 => arith(FpuOp::Add),
        0x01 => arith(FpuOp::Sub),
        0x02 => arith(FpuOp::Mul),
        0x03 => arith(FpuOp::Div),
        0x04 => arith(FpuOp::Sqrt),
        0x05 => arith(FpuOp::Abs),
        0x06 => arith(FpuOp::Mov),
        0x07 => arith(FpuOp::Neg),
        0x08 => convert(FpuFormat::Long, Rounding::Nearest),
        0x09 => convert(FpuFormat::Long, Rounding::Zero),
        0x0A => convert(FpuFormat::Long, Rounding::Ceil),
        0x0B => convert(FpuFormat::Long, Rounding::Floor),
        0x0C => convert(FpuFormat::Word, Rounding::Nearest),
        0x0D => convert(FpuFormat::Word, Rounding::Zero),
        0x0E => convert(FpuFormat::Word, Rounding::Ceil),
        0x0F => convert(FpuFormat::Word, Rounding::Floor),
        0x20 if fmt != FpuFormat::Single => convert(FpuFormat::Single, Rounding::Current),
        0x21 if fmt != FpuFormat::Double => convert(FpuFormat::Double, Rounding::Current),
        0x24 => convert(FpuFormat::Word, Rounding::Current),
        0x25 => convert(FpuFormat::Long, Rounding::Current),
        0x30..=0x3F => Operation::FpuCompare {
            cond: (funct & 0xF) as u8,
            fmt,
            fs,
            ft,
        },
        _ => return Err(illegal),
    };
    Ok(op)
}

const FPU_CONDITIONS: [&str; 16] = [
    "f", "un", "eq", "ueq", "olt", "ult", "ole", "ule", "sf", "ngle", "seq", "ngl", "lt", "nge",
    "le", "ngt",
];

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            _ if self.is_nop() => write!(f, "nop"),
            Operation::Shift { op, rd, rt, amount } => {
                let name = format!("{:?}", op).to_lowercase();
                match amount {
                    ShiftAmount::Immediate(sa) => write!(f, "{} {}, {}, {}", name, rd, rt, sa),
                    ShiftAmount::Register(rs) => write!(f, "{}v {}, {}, {}", name, rd, rt, rs),
                }
            }
            Operation::Alu { op, rd, rs, rt } => {
                write!(f, "{} {}, {}, {}", format!("{:?}", op).to_lowercase(), rd, rs, rt)
            }
            Operation::AluImmediate { op, rt, rs, imm } => {
                let name = format!("{:?}", op).to_lowercase();
                match op {
                    AluImmOp::Andi | AluImmOp::Ori | AluImmOp::Xori => {
                        write!(f, "{} {}, {}, {:#x}", name, rt, rs, imm)
                    }
                    _ => write!(f, "{} {}, {}, {}", name, rt, rs, imm as i16),
                }
            }
            Operation::Lui { rt, imm } => write!(f, "lui {}, {:#x}", rt, imm),
            Operation::MulDiv { op, rs, rt } => {
                write!(f, "{} {}, {}", format!("{:?}", op).to_lowercase(), rs, rt)
            }
            Operation::HiLo { op, reg } => {
                write!(f, "{} {}", format!("{:?}", op).to_lowercase(), reg)
            }
            Operation::Jump { link, index } => {
                write!(f, "{} {:#x}", if link { "jal" } else { "j" }, index << 2)
            }
            Operation::JumpRegister { rs, link } => match link {
                Some(rd) => write!(f, "jalr {}, {}", rd, rs),
                None => write!(f, "jr {}", rs),
            },
            Operation::Branch {
                cond,
                rs,
                rt,
                offset,
                likely,
                link,
            } => {
                let base = match cond {
                    BranchCond::Eq => "beq",
                    BranchCond::Ne => "bne",
                    BranchCond::Lez => "blez",
                    BranchCond::Gtz => "bgtz",
                    BranchCond::Ltz => "bltz",
                    BranchCond::Gez => "bgez",
                };
                let link = if link { "al" } else { "" };
                let likely = if likely { "l" } else { "" };
                match cond {
                    BranchCond::Eq | BranchCond::Ne => {
                        write!(f, "{}{} {}, {}, {}", base, likely, rs, rt, offset)
                    }
                    _ => write!(f, "{}{}{} {}, {}", base, link, likely, rs, offset),
                }
            }
            Operation::Load {
                op,
                rt,
                base,
                offset,
            } => {
                let name = match op {
                    LoadOp::Byte => "lb",
                    LoadOp::ByteUnsigned => "lbu",
                    LoadOp::Half => "lh",
                    LoadOp::HalfUnsigned => "lhu",
                    LoadOp::Word => "lw",
                    LoadOp::WordUnsigned => "lwu",
                    LoadOp::Double => "ld",
                    LoadOp::WordLeft => "lwl",
                    LoadOp::WordRight => "lwr",
                    LoadOp::DoubleLeft => "ldl",
                    LoadOp::DoubleRight => "ldr",
                    LoadOp::Linked => "ll",
                    LoadOp::LinkedDouble => "lld",
                };
                write!(f, "{} {}, {}({})", name, rt, offset, base)
            }
            Operation::Store {
                op,
                rt,
                base,
                offset,
            } => {
                let name = match op {
                    StoreOp::Byte => "sb",
                    StoreOp::Half => "sh",
                    StoreOp::Word => "sw",
                    StoreOp::Double => "sd",
                    StoreOp::WordLeft => "swl",
                    StoreOp::WordRight => "swr",
                    StoreOp::DoubleLeft => "sdl",
                    StoreOp::DoubleRight => "sdr",
                    StoreOp::Conditional => "sc",
                    StoreOp::ConditionalDouble => "scd",
                };
                write!(f, "{} {}, {}({})", name, rt, offset, base)
            }
            Operation::Trap { cond, rs, operand } => {
                let name = format!("t{:?}", cond).to_lowercase();
                match operand {
                    TrapOperand::Register(rt) => write!(f, "{} {}, {}", name, rs, rt),
                    TrapOperand::Immediate(imm) => write!(f, "{}i {}, {}", name, rs, imm),
                }
            }
            Operation::Syscall { code } => write!(f, "syscall {:#x}", code),
            Operation::Break { code } => write!(f, "break {:#x}", code),
            Operation::Sync => write!(f, "sync"),
            Operation::Cache { op, base, offset } => {
                write!(f, "cache {:#x}, {}({})", op, offset, base)
            }
            Operation::Cop0Move { op, rt, rd } => {
                let name = match op {
                    CopMoveOp::From => "mfc0",
                    CopMoveOp::DoubleFrom => "dmfc0",
                    CopMoveOp::To => "mtc0",
                    CopMoveOp::DoubleTo => "dmtc0",
                    CopMoveOp::ControlFrom => "cfc0",
                    CopMoveOp::ControlTo => "ctc0",
                };
                write!(f, "{} {}, ${}", name, rt, rd)
            }
            Operation::Tlb(op) => {
                let name = match op {
                    TlbOp::Read => "tlbr",
                    TlbOp::WriteIndexed => "tlbwi",
                    TlbOp::WriteRandom => "tlbwr",
                    TlbOp::Probe => "tlbp",
                };
                write!(f, "{}", name)
            }
            Operation::Eret => write!(f, "eret"),
            Operation::Cop1Move { op, rt, fs } => {
                let name = match op {
                    CopMoveOp::From => "mfc1",
                    CopMoveOp::DoubleFrom => "dmfc1",
                    CopMoveOp::ControlFrom => "cfc1",
                    CopMoveOp::To => "mtc1",
                    CopMoveOp::DoubleTo => "dmtc1",
                    CopMoveOp::ControlTo => "ctc1",
                };
                write!(f, "{} {}, $f{}", name, rt, fs)
            }
            Operation::FpuLoad {
                double,
                ft,
                base,
                offset,
            } => write!(
                f,
                "{} $f{}, {}({})",
                if double { "ldc1" } else { "lwc1" },
                ft,
                offset,
                base
            ),
            Operation::FpuStore {
                double,
                ft,
                base,
                offset,
            } => write!(
                f,
                "{} $f{}, {}({})",
                if double { "sdc1" } else { "swc1" },
                ft,
                offset,
                base
            ),
            Operation::FpuBranch {
                on_true,
                likely,
                offset,
            } => write!(
                f,
                "bc1{}{} {}",
                if on_true { "t" } else { "f" },
                if likely { "l" } else { "" },
                offset
            ),
            Operation::FpuArith {
                op,
                fmt,
                fd,
                fs,
                ft,
            } => {
                let name = format!("{:?}", op).to_lowercase();
                match op {
                    FpuOp::Sqrt | FpuOp::Abs | FpuOp::Mov | FpuOp::Neg => {
                        write!(f, "{}.{} $f{}, $f{}", name, fmt.suffix(), fd, fs)
                    }
                    _ => write!(f, "{}.{} $f{}, $f{}, $f{}", name, fmt.suffix(), fd, fs, ft),
                }
            }
            Operation::FpuConvert {
                to,
                from,
                rounding,
                fd,
                fs,
            } => {
                let name = match rounding {
                    Rounding::Current => "cvt",
                    Rounding::Nearest => "round",
                    Rounding::Zero => "trunc",
                    Rounding::Ceil => "ceil",
                    Rounding::Floor => "floor",
                };
                write!(
                    f,
                    "{}.{}.{} $f{}, $f{}",
                    name,
                    to.suffix(),
                    from.suffix(),
                    fd,
                    fs
                )
            }
            Operation::FpuCompare { cond, fmt, fs, ft } => write!(
                f,
                "c.{}.{} $f{}, $f{}",
                FPU_CONDITIONS[cond as usize & 0xF],
                fmt.suffix(),
                fs,
                ft
            ),
        }
    }
}
