use crate::cpu::asm::*;
use crate::cpu::decode::*;
use crate::error::DecodeError;

#[test]
fn test_decode_is_deterministic() {
    for word in [0u32, 0x2408_FFFF, 0x8FA8_0010, 0x0C00_0100, 0x4600_1080] {
        assert_eq!(decode(word), decode(word));
    }
}

#[test]
fn test_nop() {
    let op = decode(nop()).unwrap();
    assert!(op.is_nop());
    assert_eq!(op.to_string(), "nop");
}

#[test]
fn test_alu_immediate() {
    let op = decode(addiu(T0, ZERO, -1)).unwrap();
    assert_eq!(
        op,
        Operation::AluImmediate {
            op: AluImmOp::Addiu,
            rt: T0,
            rs: ZERO,
            imm: 0xFFFF
        }
    );
    assert_eq!(op.class(), OpClass::Alu);
    assert_eq!(op.addressing_mode(), AddressingMode::Immediate);
    assert_eq!(op.to_string(), "addiu t0, zero, -1");
    assert_eq!(decode(ori(T0, T0, 0xBEEF)).unwrap().to_string(), "ori t0, t0, 0xbeef");
}

#[test]
fn test_load_store_operands() {
    let op = decode(lw(T0, 16, SP)).unwrap();
    assert_eq!(
        op,
        Operation::Load {
            op: LoadOp::Word,
            rt: T0,
            base: SP,
            offset: 16
        }
    );
    assert_eq!(op.addressing_mode(), AddressingMode::BaseOffset);
    assert_eq!(op.to_string(), "lw t0, 16(sp)");

    let op = decode(swl(A0, -3, T3)).unwrap();
    assert_eq!(op.class(), OpClass::Store);
    assert_eq!(op.to_string(), "swl a0, -3(t3)");
}

#[test]
fn test_jumps_and_branches() {
    let op = decode(jal(0x8000_0400)).unwrap();
    assert_eq!(op, Operation::Jump { link: true, index: 0x100 });
    assert_eq!(op.class(), OpClass::Jump);
    assert_eq!(op.addressing_mode(), AddressingMode::Segment);

    let op = decode(beql(T0, T1, -4)).unwrap();
    assert_eq!(
        op,
        Operation::Branch {
            cond: BranchCond::Eq,
            rs: T0,
            rt: T1,
            offset: -4,
            likely: true,
            link: false
        }
    );
    assert_eq!(op.addressing_mode(), AddressingMode::PcRelative);
    assert_eq!(op.to_string(), "beql t0, t1, -4");

    let op = decode(bgezal(S0, 3)).unwrap();
    assert_eq!(op.to_string(), "bgezal s0, 3");

    assert_eq!(
        decode(jr(RA)).unwrap(),
        Operation::JumpRegister { rs: RA, link: None }
    );
}

#[test]
fn test_special_table() {
    assert_eq!(
        decode(dsll32(T1, T0, 4)).unwrap(),
        Operation::Shift {
            op: ShiftOp::Dsll32,
            rd: T1,
            rt: T0,
            amount: ShiftAmount::Immediate(4)
        }
    );
    assert_eq!(
        decode(divu(T0, T1)).unwrap(),
        Operation::MulDiv {
            op: MulDivOp::Divu,
            rs: T0,
            rt: T1
        }
    );
    assert_eq!(decode(mflo(V0)).unwrap().to_string(), "mflo v0");
    assert_eq!(decode(syscall()).unwrap().class(), OpClass::System);
    assert_eq!(decode(teq(T0, T1)).unwrap().class(), OpClass::Trap);
}

#[test]
fn test_coprocessor_operations() {
    assert_eq!(decode(eret()).unwrap(), Operation::Eret);
    assert_eq!(
        decode(mtc0(T0, 12)).unwrap(),
        Operation::Cop0Move {
            op: CopMoveOp::To,
            rt: T0,
            rd: 12
        }
    );
    assert_eq!(decode(mfc0(T0, 12)).unwrap().to_string(), "mfc0 t0, $12");

    let op = decode(cvt_s_w(2, 0)).unwrap();
    assert_eq!(
        op,
        Operation::FpuConvert {
            to: FpuFormat::Single,
            from: FpuFormat::Word,
            rounding: Rounding::Current,
            fd: 2,
            fs: 0
        }
    );
    assert_eq!(op.to_string(), "cvt.s.w $f2, $f0");
    assert_eq!(decode(add_s(4, 2, 2)).unwrap().to_string(), "add.s $f4, $f2, $f2");
    assert_eq!(decode(c_lt_s(2, 4)).unwrap().to_string(), "c.lt.s $f2, $f4");
    assert_eq!(
        decode(bc1t(2)).unwrap(),
        Operation::FpuBranch {
            on_true: true,
            likely: false,
            offset: 2
        }
    );
}

#[test]
fn test_illegal_encodings() {
    for word in [
        0x0000_0001u32, // SPECIAL funct 0x01
        0x0405_0000,    // REGIMM rt 0x05
        0x4800_0000,    // COP2
        0x4C00_0000,    // COP3
        0xEC00_0000,    // primary 0x3B
        0x4060_0000,    // COP0 rs 0x03
        0x4660_0000,    // COP1 fmt 0x13
        0x4680_0004,    // sqrt.w
    ] {
        assert_eq!(decode(word), Err(DecodeError::IllegalOpcode { word }), "{:#010x}", word);
    }
}

#[test]
fn test_every_primary_opcode_decodes_or_is_rejected() {
    for opcode in 0..64u32 {
        let word = opcode << 26;
        match decode(word) {
            Ok(op) => assert!(!op.to_string().is_empty()),
            Err(err) => assert_eq!(err, DecodeError::IllegalOpcode { word }),
        }
    }
}
