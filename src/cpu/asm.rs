//! Tiny encoder for hand-written test programs.

#![allow(dead_code)]

use super::decode::Reg;

pub const ZERO: Reg = Reg(0);
pub const AT: Reg = Reg(1);
pub const V0: Reg = Reg(2);
pub const V1: Reg = Reg(3);
pub const A0: Reg = Reg(4);
pub const A1: Reg = Reg(5);
pub const T0: Reg = Reg(8);
pub const T1: Reg = Reg(9);
pub const T2: Reg = Reg(10);
pub const T3: Reg = Reg(11);
pub const S0: Reg = Reg(16);
pub const S4: Reg = Reg(20);
pub const S6: Reg = Reg(22);
pub const SP: Reg = Reg(29);
pub const RA: Reg = Reg(31);

fn i_type(op: u32, rs: Reg, rt: Reg, imm: u16) -> u32 {
    (op << 26) | ((rs.0 as u32) << 21) | ((rt.0 as u32) << 16) | imm as u32
}

fn r_type(rs: Reg, rt: Reg, rd: Reg, sa: u8, funct: u32) -> u32 {
    ((rs.0 as u32) << 21)
        | ((rt.0 as u32) << 16)
        | ((rd.0 as u32) << 11)
        | ((sa as u32 & 31) << 6)
        | funct
}

pub fn nop() -> u32 {
    0
}

pub fn sll(rd: Reg, rt: Reg, sa: u8) -> u32 {
    r_type(ZERO, rt, rd, sa, 0x00)
}

pub fn sra(rd: Reg, rt: Reg, sa: u8) -> u32 {
    r_type(ZERO, rt, rd, sa, 0x03)
}

pub fn dsll32(rd: Reg, rt: Reg, sa: u8) -> u32 {
    r_type(ZERO, rt, rd, sa, 0x3C)
}

pub fn jr(rs: Reg) -> u32 {
    r_type(rs, ZERO, ZERO, 0, 0x08)
}

pub fn jalr(rd: Reg, rs: Reg) -> u32 {
    r_type(rs, ZERO, rd, 0, 0x09)
}

pub fn syscall() -> u32 {
    0x0C
}

pub fn brk() -> u32 {
    0x0D
}

pub fn mfhi(rd: Reg) -> u32 {
    r_type(ZERO, ZERO, rd, 0, 0x10)
}

pub fn mflo(rd: Reg) -> u32 {
    r_type(ZERO, ZERO, rd, 0, 0x12)
}

pub fn mult(rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, ZERO, 0, 0x18)
}

pub fn div(rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, ZERO, 0, 0x1A)
}

pub fn divu(rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, ZERO, 0, 0x1B)
}

pub fn dmultu(rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, ZERO, 0, 0x1D)
}

pub fn add(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x20)
}

pub fn addu(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x21)
}

pub fn subu(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x23)
}

pub fn or(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x25)
}

pub fn slt(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x2A)
}

pub fn daddu(rd: Reg, rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, rd, 0, 0x2D)
}

pub fn teq(rs: Reg, rt: Reg) -> u32 {
    r_type(rs, rt, ZERO, 0, 0x34)
}

pub fn j(target: u32) -> u32 {
    (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF)
}

pub fn jal(target: u32) -> u32 {
    (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF)
}

pub fn beq(rs: Reg, rt: Reg, offset: i16) -> u32 {
    i_type(0x04, rs, rt, offset as u16)
}

pub fn bne(rs: Reg, rt: Reg, offset: i16) -> u32 {
    i_type(0x05, rs, rt, offset as u16)
}

pub fn beql(rs: Reg, rt: Reg, offset: i16) -> u32 {
    i_type(0x14, rs, rt, offset as u16)
}

pub fn bnel(rs: Reg, rt: Reg, offset: i16) -> u32 {
    i_type(0x15, rs, rt, offset as u16)
}

pub fn bgezal(rs: Reg, offset: i16) -> u32 {
    i_type(0x01, rs, Reg(0x11), offset as u16)
}

pub fn addi(rt: Reg, rs: Reg, imm: i16) -> u32 {
    i_type(0x08, rs, rt, imm as u16)
}

pub fn addiu(rt: Reg, rs: Reg, imm: i16) -> u32 {
    i_type(0x09, rs, rt, imm as u16)
}

pub fn slti(rt: Reg, rs: Reg, imm: i16) -> u32 {
    i_type(0x0A, rs, rt, imm as u16)
}

pub fn andi(rt: Reg, rs: Reg, imm: u16) -> u32 {
    i_type(0x0C, rs, rt, imm)
}

pub fn ori(rt: Reg, rs: Reg, imm: u16) -> u32 {
    i_type(0x0D, rs, rt, imm)
}

pub fn lui(rt: Reg, imm: u16) -> u32 {
    i_type(0x0F, ZERO, rt, imm)
}

pub fn daddiu(rt: Reg, rs: Reg, imm: i16) -> u32 {
    i_type(0x19, rs, rt, imm as u16)
}

pub fn lb(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x20, base, rt, offset as u16)
}

pub fn lbu(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x24, base, rt, offset as u16)
}

pub fn lh(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x21, base, rt, offset as u16)
}

pub fn lw(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x23, base, rt, offset as u16)
}

pub fn lwl(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x22, base, rt, offset as u16)
}

pub fn lwr(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x26, base, rt, offset as u16)
}

pub fn ld(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x37, base, rt, offset as u16)
}

pub fn ll(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x30, base, rt, offset as u16)
}

pub fn sb(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x28, base, rt, offset as u16)
}

pub fn sh(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x29, base, rt, offset as u16)
}

pub fn sw(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x2B, base, rt, offset as u16)
}

pub fn swl(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x2A, base, rt, offset as u16)
}

pub fn swr(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x2E, base, rt, offset as u16)
}

pub fn sd(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x3F, base, rt, offset as u16)
}

pub fn sc(rt: Reg, offset: i16, base: Reg) -> u32 {
    i_type(0x38, base, rt, offset as u16)
}

pub fn mfc0(rt: Reg, rd: u8) -> u32 {
    (0x10 << 26) | ((rt.0 as u32) << 16) | ((rd as u32) << 11)
}

pub fn mtc0(rt: Reg, rd: u8) -> u32 {
    (0x10 << 26) | (0x04 << 21) | ((rt.0 as u32) << 16) | ((rd as u32) << 11)
}

pub fn eret() -> u32 {
    0x4200_0018
}

pub fn mtc1(rt: Reg, fs: u8) -> u32 {
    (0x11 << 26) | (0x04 << 21) | ((rt.0 as u32) << 16) | ((fs as u32) << 11)
}

pub fn mfc1(rt: Reg, fs: u8) -> u32 {
    (0x11 << 26) | ((rt.0 as u32) << 16) | ((fs as u32) << 11)
}

/// add.s fd, fs, ft
pub fn add_s(fd: u8, fs: u8, ft: u8) -> u32 {
    (0x11 << 26) | (16 << 21) | ((ft as u32) << 16) | ((fs as u32) << 11) | ((fd as u32) << 6)
}

/// cvt.s.w fd, fs
pub fn cvt_s_w(fd: u8, fs: u8) -> u32 {
    (0x11 << 26) | (20 << 21) | ((fs as u32) << 11) | ((fd as u32) << 6) | 0x20
}

/// c.lt.s fs, ft
pub fn c_lt_s(fs: u8, ft: u8) -> u32 {
    (0x11 << 26) | (16 << 21) | ((ft as u32) << 16) | ((fs as u32) << 11) | 0x3C
}

pub fn bc1t(offset: i16) -> u32 {
    (0x11 << 26) | (0x08 << 21) | (1 << 16) | offset as u16 as u32
}
