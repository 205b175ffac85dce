use n64_recomp::classify::decode_instruction;
use n64_recomp::decode::Operands;
use n64_recomp::ops::{BranchKind, Op, Target};

const START: u32 = 0x8000_0000;
const END: u32 = 0x8000_1000;
const ADDR: u32 = 0x8000_0800;

fn encode(op: u32, rs: u32, rt: u32, rd: u32, sa: u32, funct: u32) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
}

#[test]
fn every_opcode_field_combination_decodes() {
    let mut reserved = 0usize;
    for op in 0..64 {
        for rs in 0..32 {
            for rt in 0..32 {
                for funct in 0..64 {
                    // rd = 1 so nothing collapses to a NOP because of its destination
                    let word = encode(op, rs, rt, 1, 0, funct);
                    let (decoded, _) = decode_instruction(word, ADDR, START, END, false);
                    if decoded == Op::Reserved {
                        reserved += 1;
                    }
                }
            }
        }
    }
    assert!(reserved > 0);
}

#[test]
fn operand_form_follows_the_opcode() {
    // and r3, r1, r2
    let (op, operands) = decode_instruction(encode(0, 1, 2, 3, 0, 0x24), ADDR, START, END, false);
    assert_eq!(op, Op::And);
    assert_eq!(operands, Operands::R { rs: 1, rt: 2, rd: 3, sa: 0 });

    // jr r31 is decoded with the immediate form
    let (op, operands) = decode_instruction(encode(0, 31, 0, 0, 0, 0x08), ADDR, START, END, false);
    assert_eq!(op, Op::Jr);
    assert_eq!(operands, Operands::I { rs: 31, rt: 0, immediate: 8 });

    // syscall has no fields
    let (op, operands) = decode_instruction(encode(0, 0, 0, 0, 0, 0x0C), ADDR, START, END, false);
    assert_eq!(op, Op::Syscall);
    assert_eq!(operands, Operands::None);

    // mfc0 r8, Status
    let (op, operands) = decode_instruction(encode(0x10, 0, 8, 12, 0, 0), ADDR, START, END, false);
    assert_eq!(op, Op::Mfc0);
    assert_eq!(operands, Operands::R { rs: 0, rt: 8, rd: 12, sa: 0 });

    // sdc1 f2, 16(r29)
    let (op, operands) = decode_instruction(0xF7A2_0010, ADDR, START, END, false);
    assert_eq!(op, Op::Sdc1);
    assert_eq!(operands, Operands::Lf { base: 29, ft: 2, offset: 16 });
}

#[test]
fn unimplemented_traps_and_reserved_slots() {
    for funct in [0x0D, 0x30, 0x31, 0x32, 0x33, 0x36] {
        assert_eq!(decode_instruction(encode(0, 1, 2, 3, 0, funct), ADDR, START, END, false).0, Op::NotImplemented, "funct {funct:02X}");
    }
    for rt in [0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0E] {
        assert_eq!(decode_instruction(encode(1, 1, rt, 0, 0, 0), ADDR, START, END, false).0, Op::NotImplemented, "regimm {rt:02X}");
    }
    for op in [0x12, 0x13, 0x1C, 0x1D, 0x1E, 0x1F, 0x32, 0x33, 0x36, 0x3A, 0x3B, 0x3E] {
        assert_eq!(decode_instruction(encode(op, 1, 2, 3, 0, 0), ADDR, START, END, false).0, Op::Reserved, "opcode {op:02X}");
    }
    // lld keeps its immediate fields
    let (op, operands) = decode_instruction(encode(0x34, 4, 5, 0, 0, 8), ADDR, START, END, false);
    assert_eq!(op, Op::NotImplemented);
    assert_eq!(operands, Operands::I { rs: 4, rt: 5, immediate: 8 });
}

#[test]
fn zero_destination_writers_become_nops() {
    let rd_writers = [
        0x00, 0x02, 0x03, 0x04, 0x06, 0x07, 0x10, 0x12, 0x14, 0x16, 0x17,
        0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x2A, 0x2B,
        0x2C, 0x2D, 0x2E, 0x2F, 0x38, 0x3A, 0x3B, 0x3C, 0x3E, 0x3F,
    ];
    for funct in rd_writers {
        let (op, operands) = decode_instruction(encode(0, 1, 2, 0, 3, funct), ADDR, START, END, false);
        assert_eq!(op, Op::Nop, "funct {funct:02X}");
        // fields are still decoded
        assert_eq!(operands, Operands::R { rs: 1, rt: 2, rd: 0, sa: 3 });
        assert_ne!(decode_instruction(encode(0, 1, 2, 4, 3, funct), ADDR, START, END, false).0, Op::Nop);
    }

    let rt_writers = [
        0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x18, 0x19, 0x1A, 0x1B,
        0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x30, 0x37, 0x38,
    ];
    for op in rt_writers {
        assert_eq!(decode_instruction(encode(op, 1, 0, 0, 0, 4), ADDR, START, END, false).0, Op::Nop, "opcode {op:02X}");
        assert_ne!(decode_instruction(encode(op, 1, 2, 0, 0, 4), ADDR, START, END, false).0, Op::Nop, "opcode {op:02X}");
    }

    // coprocessor to GPR moves with rt = 0
    for (op, rs) in [(0x10, 0), (0x11, 0), (0x11, 1), (0x11, 2)] {
        assert_eq!(decode_instruction(encode(op, rs, 0, 5, 0, 0), ADDR, START, END, false).0, Op::Nop);
    }

    // no GPR destination: never a NOP
    let keep = [
        encode(0, 1, 2, 0, 0, 0x09), // jalr
        encode(0, 1, 0, 0, 0, 0x11), // mthi
        encode(0, 1, 0, 0, 0, 0x13), // mtlo
        encode(0, 1, 2, 0, 0, 0x1D), // dmultu
        encode(0x2B, 1, 0, 0, 0, 0), // sw r0
        encode(0x3F, 1, 0, 0, 0, 0), // sd r0
        encode(0x10, 4, 0, 9, 0, 0), // mtc0 r0
        encode(0x11, 6, 0, 31, 0, 0), // ctc1 r0
    ];
    for word in keep {
        assert_ne!(decode_instruction(word, ADDR, START, END, false).0, Op::Nop, "${word:08X}");
    }
}

#[test]
fn every_branch_family_is_classified() {
    let families = [
        (encode(0x01, 1, 0x00, 0, 0, 4), BranchKind::Bltz),
        (encode(0x01, 1, 0x01, 0, 0, 4), BranchKind::Bgez),
        (encode(0x01, 1, 0x02, 0, 0, 4), BranchKind::Bltzl),
        (encode(0x01, 1, 0x03, 0, 0, 4), BranchKind::Bgezl),
        (encode(0x01, 1, 0x10, 0, 0, 4), BranchKind::Bltzal),
        (encode(0x01, 1, 0x11, 0, 0, 4), BranchKind::Bgezal),
        (encode(0x01, 1, 0x12, 0, 0, 4), BranchKind::Bltzall),
        (encode(0x01, 1, 0x13, 0, 0, 4), BranchKind::Bgezall),
        (encode(0x04, 1, 2, 0, 0, 4), BranchKind::Beq),
        (encode(0x05, 1, 2, 0, 0, 4), BranchKind::Bne),
        (encode(0x06, 1, 0, 0, 0, 4), BranchKind::Blez),
        (encode(0x07, 1, 0, 0, 0, 4), BranchKind::Bgtz),
        (encode(0x14, 1, 2, 0, 0, 4), BranchKind::Beql),
        (encode(0x15, 1, 2, 0, 0, 4), BranchKind::Bnel),
        (encode(0x16, 1, 0, 0, 0, 4), BranchKind::Blezl),
        (encode(0x17, 1, 0, 0, 0, 4), BranchKind::Bgtzl),
        (encode(0x11, 8, 0, 0, 0, 4), BranchKind::Bc1f),
        (encode(0x11, 8, 1, 0, 0, 4), BranchKind::Bc1t),
        (encode(0x11, 8, 2, 0, 0, 4), BranchKind::Bc1fl),
        (encode(0x11, 8, 3, 0, 0, 4), BranchKind::Bc1tl),
    ];

    for (word, kind) in families {
        // +4 words from the middle of the block lands inside it
        assert_eq!(decode_instruction(word, ADDR, START, END, false).0, Op::Branch(kind, Target::Internal));
        // the same branch in the last slot always leaves
        assert_eq!(decode_instruction(word, END - 4, START, END, false).0, Op::Branch(kind, Target::Out));
        // -1 words with a zero delay slot spins on itself
        let spin = (word & 0xFFFF_0000) | 0xFFFF;
        assert_eq!(decode_instruction(spin, ADDR, START, END, true).0, Op::Branch(kind, Target::Idle));
    }

    // j/jal to the middle of the page
    assert_eq!(decode_instruction(0x0800_0100, ADDR, START, END, false).0, Op::Branch(BranchKind::J, Target::Internal));
    assert_eq!(decode_instruction(0x0C00_0100, ADDR, START, END, false).0, Op::Branch(BranchKind::Jal, Target::Internal));
    // jal to the next page
    assert_eq!(decode_instruction(0x0C00_0400, ADDR, START, END, false).0, Op::Branch(BranchKind::Jal, Target::Out));
}
