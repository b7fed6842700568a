//! COP1: floating-point register file and arithmetic.
//!
//! With Status.FR clear the 32 registers act as 16 even/odd pairs, singles in
//! odd registers living in the upper half of the even register.

use super::decode::{FpuFormat, FpuOp, Rounding};

pub const FCR0_VALUE: u32 = 0x0000_0A00;
const CONDITION: u32 = 1 << 23;
const FCR31_MASK: u32 = 0x0183_FFFF;

pub struct Fpu {
    fpr: [u64; 32],
    fcr31: u32,
}

impl Fpu {
    pub fn new() -> Self {
        Fpu {
            fpr: [0; 32],
            fcr31: 0,
        }
    }

    pub fn read_u32(&self, idx: u8, fr: bool) -> u32 {
        let idx = idx as usize & 31;
        if fr || idx % 2 == 0 {
            self.fpr[idx] as u32
        } else {
            (self.fpr[idx & !1] >> 32) as u32
        }
    }

    pub fn write_u32(&mut self, idx: u8, value: u32, fr: bool) {
        let idx = idx as usize & 31;
        if fr || idx % 2 == 0 {
            let reg = &mut self.fpr[idx];
            *reg = (*reg & !0xFFFF_FFFF) | value as u64;
        } else {
            let reg = &mut self.fpr[idx & !1];
            *reg = (*reg & 0xFFFF_FFFF) | ((value as u64) << 32);
        }
    }

    pub fn read_u64(&self, idx: u8, fr: bool) -> u64 {
        let idx = idx as usize & 31;
        self.fpr[if fr { idx } else { idx & !1 }]
    }

    pub fn write_u64(&mut self, idx: u8, value: u64, fr: bool) {
        let idx = idx as usize & 31;
        self.fpr[if fr { idx } else { idx & !1 }] = value;
    }

    pub fn read_control(&self, idx: u8) -> u32 {
        match idx {
            0 => FCR0_VALUE,
            31 => self.fcr31,
            _ => 0,
        }
    }

    pub fn write_control(&mut self, idx: u8, value: u32) {
        if idx == 31 {
            self.fcr31 = value & FCR31_MASK;
        }
    }

    pub fn condition(&self) -> bool {
        self.fcr31 & CONDITION != 0
    }

    fn set_condition(&mut self, on: bool) {
        if on {
            self.fcr31 |= CONDITION;
        } else {
            self.fcr31 &= !CONDITION;
        }
    }

    fn rounding_mode(&self) -> Rounding {
        match self.fcr31 & 3 {
            0 => Rounding::Nearest,
            1 => Rounding::Zero,
            2 => Rounding::Ceil,
            _ => Rounding::Floor,
        }
    }

    fn read_f32(&self, idx: u8, fr: bool) -> f32 {
        f32::from_bits(self.read_u32(idx, fr))
    }

    fn read_f64(&self, idx: u8, fr: bool) -> f64 {
        f64::from_bits(self.read_u64(idx, fr))
    }

    /// Any source format widened to f64.
    fn source(&self, fmt: FpuFormat, idx: u8, fr: bool) -> f64 {
        match fmt {
            FpuFormat::Single => self.read_f32(idx, fr) as f64,
            FpuFormat::Double => self.read_f64(idx, fr),
            FpuFormat::Word => self.read_u32(idx, fr) as i32 as f64,
            FpuFormat::Long => self.read_u64(idx, fr) as i64 as f64,
        }
    }

    pub fn arith(&mut self, op: FpuOp, fmt: FpuFormat, fd: u8, fs: u8, ft: u8, fr: bool) {
        match fmt {
            FpuFormat::Double => {
                let (a, b) = (self.read_f64(fs, fr), self.read_f64(ft, fr));
                let result = match op {
                    FpuOp::Add => a + b,
                    FpuOp::Sub => a - b,
                    FpuOp::Mul => a * b,
                    FpuOp::Div => a / b,
                    FpuOp::Sqrt => a.sqrt(),
                    FpuOp::Abs => a.abs(),
                    FpuOp::Mov => a,
                    FpuOp::Neg => -a,
                };
                self.write_u64(fd, result.to_bits(), fr);
            }
            _ => {
                let (a, b) = (self.read_f32(fs, fr), self.read_f32(ft, fr));
                let result = match op {
                    FpuOp::Add => a + b,
                    FpuOp::Sub => a - b,
                    FpuOp::Mul => a * b,
                    FpuOp::Div => a / b,
                    FpuOp::Sqrt => a.sqrt(),
                    FpuOp::Abs => a.abs(),
                    FpuOp::Mov => a,
                    FpuOp::Neg => -a,
                };
                self.write_u32(fd, result.to_bits(), fr);
            }
        }
    }

    pub fn convert(
        &mut self,
        to: FpuFormat,
        from: FpuFormat,
        rounding: Rounding,
        fd: u8,
        fs: u8,
        fr: bool,
    ) {
        let rounding = match rounding {
            Rounding::Current => self.rounding_mode(),
            other => other,
        };
        match (to, from) {
            (FpuFormat::Single, FpuFormat::Word) => {
                let v = self.read_u32(fs, fr) as i32 as f32;
                self.write_u32(fd, v.to_bits(), fr);
            }
            (FpuFormat::Single, FpuFormat::Long) => {
                let v = self.read_u64(fs, fr) as i64 as f32;
                self.write_u32(fd, v.to_bits(), fr);
            }
            (FpuFormat::Single, _) => {
                let v = self.source(from, fs, fr) as f32;
                self.write_u32(fd, v.to_bits(), fr);
            }
            (FpuFormat::Double, _) => {
                let v = self.source(from, fs, fr);
                self.write_u64(fd, v.to_bits(), fr);
            }
            (FpuFormat::Word, _) => {
                let v = round(self.source(from, fs, fr), rounding) as i32;
                self.write_u32(fd, v as u32, fr);
            }
            (FpuFormat::Long, _) => {
                let v = round(self.source(from, fs, fr), rounding) as i64;
                self.write_u64(fd, v as u64, fr);
            }
        }
    }

    /// `cond` bit 0: unordered, bit 1: equal, bit 2: less than.
    pub fn compare(&mut self, cond: u8, fmt: FpuFormat, fs: u8, ft: u8, fr: bool) {
        let (a, b) = (self.source(fmt, fs, fr), self.source(fmt, ft, fr));
        let unordered = a.is_nan() || b.is_nan();
        let result = (cond & 1 != 0 && unordered)
            || (cond & 2 != 0 && a == b)
            || (cond & 4 != 0 && a < b);
        self.set_condition(result);
    }
}

impl Default for Fpu {
    fn default() -> Self {
        Self::new()
    }
}

fn round(v: f64, mode: Rounding) -> f64 {
    match mode {
        Rounding::Nearest | Rounding::Current => v.round_ties_even(),
        Rounding::Zero => v.trunc(),
        Rounding::Ceil => v.ceil(),
        Rounding::Floor => v.floor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_registers_when_fr_clear() {
        let mut fpu = Fpu::new();
        fpu.write_u32(0, 0x1111_1111, false);
        fpu.write_u32(1, 0x2222_2222, false);
        assert_eq!(fpu.read_u64(0, false), 0x2222_2222_1111_1111);
        assert_eq!(fpu.read_u64(1, false), 0x2222_2222_1111_1111);
        // FR set: registers are independent
        fpu.write_u32(3, 0x3333_3333, true);
        assert_eq!(fpu.read_u32(3, true), 0x3333_3333);
        assert_eq!(fpu.read_u32(2, true), 0);
    }

    #[test]
    fn test_single_and_double_arithmetic() {
        let mut fpu = Fpu::new();
        fpu.write_u32(2, 1.5f32.to_bits(), true);
        fpu.write_u32(4, 2.25f32.to_bits(), true);
        fpu.arith(FpuOp::Mul, FpuFormat::Single, 6, 2, 4, true);
        assert_eq!(f32::from_bits(fpu.read_u32(6, true)), 3.375);

        fpu.write_u64(8, 9.0f64.to_bits(), true);
        fpu.arith(FpuOp::Sqrt, FpuFormat::Double, 10, 8, 0, true);
        assert_eq!(f64::from_bits(fpu.read_u64(10, true)), 3.0);
        fpu.arith(FpuOp::Neg, FpuFormat::Double, 10, 10, 0, true);
        assert_eq!(f64::from_bits(fpu.read_u64(10, true)), -3.0);
    }

    #[test]
    fn test_conversions_honor_rounding() {
        let mut fpu = Fpu::new();
        fpu.write_u64(0, 2.5f64.to_bits(), true);
        fpu.convert(FpuFormat::Word, FpuFormat::Double, Rounding::Current, 2, 0, true);
        assert_eq!(fpu.read_u32(2, true) as i32, 2);
        fpu.convert(FpuFormat::Word, FpuFormat::Double, Rounding::Ceil, 2, 0, true);
        assert_eq!(fpu.read_u32(2, true) as i32, 3);
        fpu.write_control(31, 1);
        fpu.write_u64(0, (-2.7f64).to_bits(), true);
        fpu.convert(FpuFormat::Long, FpuFormat::Double, Rounding::Current, 4, 0, true);
        assert_eq!(fpu.read_u64(4, true) as i64, -2);

        fpu.write_u32(6, (-7i32) as u32, true);
        fpu.convert(FpuFormat::Single, FpuFormat::Word, Rounding::Current, 8, 6, true);
        assert_eq!(f32::from_bits(fpu.read_u32(8, true)), -7.0);
    }

    #[test]
    fn test_compare_sets_condition() {
        let mut fpu = Fpu::new();
        fpu.write_u32(0, 1.0f32.to_bits(), true);
        fpu.write_u32(1, 2.0f32.to_bits(), true);
        // c.lt.s
        fpu.compare(0xC, FpuFormat::Single, 0, 1, true);
        assert!(fpu.condition());
        // c.eq.s
        fpu.compare(0x2, FpuFormat::Single, 0, 1, true);
        assert!(!fpu.condition());
        fpu.write_u32(1, f32::NAN.to_bits(), true);
        // c.ueq.s
        fpu.compare(0x3, FpuFormat::Single, 0, 1, true);
        assert!(fpu.condition());
    }

    #[test]
    fn test_control_registers() {
        let mut fpu = Fpu::new();
        assert_eq!(fpu.read_control(0), FCR0_VALUE);
        fpu.write_control(31, 0xFFFF_FFFF);
        assert_eq!(fpu.read_control(31), FCR31_MASK);
        fpu.write_control(5, 1);
        assert_eq!(fpu.read_control(5), 0);
    }
}
