use crate::decode::{self, Operands};
use crate::ops::{BranchKind, Op, Target};
use crate::tables::{self, Handler};

/// Absolute guest target of a branch at `addr`. PC-relative targets are taken from the
/// delay slot address; J/JAL keep the top four bits of the branch address.
pub fn branch_target(addr: u32, operands: &Operands) -> Option<u32> {
    match *operands {
        Operands::I { immediate, .. } => Some(addr.wrapping_add((immediate as u32) << 2).wrapping_add(4)),
        Operands::J { inst_index } => Some((inst_index << 2) | (addr & 0xF000_0000)),
        _ => None,
    }
}

/// Classify a branch at `addr` with target `target` inside block [start, end). `check_nop`
/// is true when the word following the branch (its delay slot) is zero.
pub fn classify(addr: u32, target: u32, start: u32, end: u32, check_nop: bool) -> Target {
    if target == addr {
        if check_nop {
            return Target::Idle;
        }
    } else if target < start || target >= end || addr == end.wrapping_sub(4) {
        return Target::Out;
    }
    Target::Internal
}

/// Decode `word` at guest address `addr` inside block [start, end): look the word up in the
/// decode tree, run its field decoder, suppress writes to r0 and classify branches.
pub fn decode_instruction(word: u32, addr: u32, start: u32, end: u32, check_nop: bool) -> (Op, Operands) {
    match tables::lookup(word) {
        Handler::Op(op, form, dest) => {
            let operands = form.decode(word);
            let op = if dest.is_zero(&operands) { Op::Nop } else { op };
            (op, operands)
        },

        Handler::Branch(kind) => {
            let operands = if kind.is_absolute() { decode::j_type(word) } else { decode::i_type(word) };
            let target = match branch_target(addr, &operands) {
                Some(target) => classify(addr, target, start, end, check_nop),
                None => Target::Out,
            };
            (Op::Branch(kind, target), operands)
        },
    }
}

/// Convenience for callers that only want the branch family of a word
pub fn branch_kind(word: u32) -> Option<BranchKind> {
    match tables::lookup(word) {
        Handler::Branch(kind) => Some(kind),
        Handler::Op(..) => None,
    }
}
