//! Threaded-code backend. Each compiled slot becomes one or more fixed size records that an
//! executor walks linearly. Jumps are relative to the end of the jump record, so a block's code
//! stays valid wherever its region is moved to.

use bytemuck::{Pod, Zeroable};

#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::assembler::Assembler;
use crate::backend::Backend;
use crate::block::Instruction;
use crate::ops::{Op, Target};
use crate::CompileError;

pub const RECORD_SIZE: usize = 8;

const KIND_NOTCOMPILED: u8 = 0x01;
const KIND_DEBUG      : u8 = 0x02;
const KIND_EXEC       : u8 = 0x03;
const KIND_TEST       : u8 = 0x04;
const KIND_JUMP       : u8 = 0x05;
const KIND_EXIT       : u8 = 0x06;
const KIND_FIN_BLOCK  : u8 = 0x07;

const FLAG_IDLE    : u8 = 0x01;
const FLAG_INDIRECT: u8 = 0x01;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawRecord {
    kind: u8,
    flags: u8,
    _pad: u16,
    payload: u32, // little endian
}

impl RawRecord {
    fn new(kind: u8, flags: u8, payload: u32) -> Self {
        Self { kind, flags, _pad: 0, payload: payload.to_le() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    // enter the compiler for the slot at `addr`
    NotCompiled { addr: u32 },
    Debug { addr: u32 },
    // run one instruction word
    Exec { word: u32 },
    // evaluate a branch condition
    Test { word: u32 },
    // continue `offset` bytes past the end of this record
    Jump { offset: i32, idle: bool },
    // leave the block. None means the target is in a register
    Exit { target: Option<u32> },
    FinBlock { addr: u32 },
    Unknown { kind: u8 },
}

/// Read back a code buffer as a list of (offset, record)
pub fn decode_records(code: &[u8]) -> Vec<(usize, Record)> {
    code.chunks_exact(RECORD_SIZE).enumerate().map(|(i, chunk)| {
        let raw: RawRecord = bytemuck::pod_read_unaligned(chunk);
        let payload = u32::from_le(raw.payload);
        let record = match raw.kind {
            KIND_NOTCOMPILED => Record::NotCompiled { addr: payload },
            KIND_DEBUG       => Record::Debug { addr: payload },
            KIND_EXEC        => Record::Exec { word: payload },
            KIND_TEST        => Record::Test { word: payload },
            KIND_JUMP        => Record::Jump { offset: payload as i32, idle: (raw.flags & FLAG_IDLE) != 0 },
            KIND_EXIT        => Record::Exit { target: if (raw.flags & FLAG_INDIRECT) != 0 { None } else { Some(payload) } },
            KIND_FIN_BLOCK   => Record::FinBlock { addr: payload },
            kind             => Record::Unknown { kind },
        };
        (i * RECORD_SIZE, record)
    }).collect()
}

#[derive(Debug, Default)]
pub struct BytecodeBackend {
    register_flushes: usize,
}

impl BytecodeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_flushes(&self) -> usize {
        self.register_flushes
    }

    fn put(&mut self, asm: &mut Assembler, kind: u8, flags: u8, payload: u32) -> Result<usize, CompileError> {
        asm.put_bytes(bytemuck::bytes_of(&RawRecord::new(kind, flags, payload)))?;
        Ok(RECORD_SIZE)
    }
}

impl Backend for BytecodeBackend {
    fn name(&self) -> &'static str {
        "bytecode"
    }

    fn emit(&mut self, asm: &mut Assembler, inst: &mut Instruction) -> Result<usize, CompileError> {
        match inst.op {
            Op::NotCompiled | Op::NotCompiled2 => self.put(asm, KIND_NOTCOMPILED, 0, inst.addr),
            Op::FinBlock => self.put(asm, KIND_FIN_BLOCK, 0, inst.addr),
            Op::Nop => Ok(0),
            op if op.is_jump() => self.put(asm, KIND_TEST, 0, inst.word),
            _ => self.put(asm, KIND_EXEC, 0, inst.word),
        }
    }

    fn emit_debug(&mut self, asm: &mut Assembler, inst: &Instruction) -> Result<usize, CompileError> {
        self.put(asm, KIND_DEBUG, 0, inst.addr)
    }

    fn insert_delay_slot_trampoline(&mut self, asm: &mut Assembler, branch: &Instruction, target: u32) -> Result<usize, CompileError> {
        let flags = if branch.op.target() == Some(Target::Idle) { FLAG_IDLE } else { 0 };
        asm.add_jump(target);
        self.put(asm, KIND_JUMP, flags, 0)
    }

    fn insert_exit_stub(&mut self, asm: &mut Assembler, _branch: &Instruction, target: Option<u32>) -> Result<usize, CompileError> {
        match target {
            Some(target) => self.put(asm, KIND_EXIT, 0, target),
            None => self.put(asm, KIND_EXIT, FLAG_INDIRECT, 0),
        }
    }

    fn link_subblock(&mut self, asm: &mut Assembler, next: u32) -> Result<usize, CompileError> {
        asm.add_jump(next);
        self.put(asm, KIND_JUMP, 0, 0)
    }

    fn release_register_state(&mut self, _asm: &mut Assembler) {
        self.register_flushes += 1;
    }

    fn link_block(&mut self, asm: &mut Assembler, insts: &[Instruction], start: u32) -> Result<(), CompileError> {
        for fixup in asm.jumps().to_vec() {
            let slot = (fixup.target.wrapping_sub(start) >> 2) as usize;
            let dest = match insts.get(slot) {
                Some(inst) => inst.local_addr,
                None => return Err(CompileError::Link { target: fixup.target }),
            };

            let offset = dest as i64 - (fixup.at + RECORD_SIZE) as i64;
            trace!(target: "RECOMP", "link ${:08X} at +{:X} -> +{:X}", fixup.target, fixup.at, dest);
            asm.patch_u32(fixup.at + 4, offset as i32 as u32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Relocations;
    use crate::decode::Operands;
    use crate::exec_mem::{ArenaKind, ExecutableArena};
    use crate::ops::BranchKind;

    fn inst(addr: u32, op: Op, local_addr: usize) -> Instruction {
        Instruction { addr, word: 0x1234_0000 | (addr & 0xFFFF), op, operands: Operands::None, local_addr, ..Default::default() }
    }

    #[test]
    fn emits_one_record_per_slot_kind() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let region = arena.acquire(256).unwrap();
        let mut asm = Assembler::new(&mut arena, region, 0, Relocations::default(), 256).unwrap();
        let mut backend = BytecodeBackend::new();

        let mut nc = inst(0x8000_0000, Op::NotCompiled, 0);
        let mut nop = inst(0x8000_0004, Op::Nop, 0);
        let mut add = inst(0x8000_0008, Op::Addu, 0);
        let mut fin = inst(0x8000_000C, Op::FinBlock, 0);
        assert_eq!(backend.emit(&mut asm, &mut nc).unwrap(), RECORD_SIZE);
        assert_eq!(backend.emit(&mut asm, &mut nop).unwrap(), 0);
        assert_eq!(backend.emit(&mut asm, &mut add).unwrap(), RECORD_SIZE);
        assert_eq!(backend.emit(&mut asm, &mut fin).unwrap(), RECORD_SIZE);
        backend.insert_exit_stub(&mut asm, &add, None).unwrap();

        let records = decode_records(asm.code());
        assert_eq!(records, vec![
            (0, Record::NotCompiled { addr: 0x8000_0000 }),
            (8, Record::Exec { word: 0x1234_0008 }),
            (16, Record::FinBlock { addr: 0x8000_000C }),
            (24, Record::Exit { target: None }),
        ]);
    }

    #[test]
    fn jumps_are_linked_relative() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let region = arena.acquire(256).unwrap();
        let mut asm = Assembler::new(&mut arena, region, 0, Relocations::default(), 256).unwrap();
        let mut backend = BytecodeBackend::new();

        let slots = [
            inst(0x8000_0000, Op::Addu, 0),
            inst(0x8000_0004, Op::Branch(BranchKind::Beq, Target::Internal), 8),
        ];
        backend.put(&mut asm, KIND_EXEC, 0, 0).unwrap();
        backend.insert_delay_slot_trampoline(&mut asm, &slots[1], 0x8000_0000).unwrap();
        backend.link_block(&mut asm, &slots, 0x8000_0000).unwrap();

        let records = decode_records(asm.code());
        assert_eq!(records[1], (8, Record::Jump { offset: -16, idle: false }));
    }

    #[test]
    fn link_outside_block_fails() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let region = arena.acquire(64).unwrap();
        let mut asm = Assembler::new(&mut arena, region, 0, Relocations::default(), 64).unwrap();
        let mut backend = BytecodeBackend::new();
        let slots = [inst(0x8000_0000, Op::Addu, 0)];
        backend.link_subblock(&mut asm, 0x8000_0040).unwrap();
        assert_eq!(backend.link_block(&mut asm, &slots, 0x8000_0000), Err(CompileError::Link { target: 0x8000_0040 }));
    }
}
