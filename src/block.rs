use std::fmt;

use crate::assembler::Relocations;
use crate::decode::Operands;
use crate::exec_mem::{ExecutableArena, Region};
use crate::ops::Op;

pub const PAGE_SIZE: u32 = 0x1000;

/// Register allocation state a backend keeps per instruction slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegCacheInfo {
    pub need_map: bool,
}

/// One decoded instruction slot of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction {
    pub addr: u32,
    pub word: u32,
    pub op: Op,
    pub operands: Operands,

    // offset of this slot's code in the block's code region
    pub local_addr: usize,

    pub reg_cache: RegCacheInfo,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12}", self.op.to_string())?;
        match self.operands {
            Operands::None => Ok(()),
            Operands::R { rs, rt, rd, sa } => write!(f, "r{}, r{}, r{}, {}", rd, rs, rt, sa),
            Operands::I { rs, rt, immediate } => write!(f, "r{}, r{}, {}", rt, rs, immediate),
            Operands::J { inst_index } => write!(f, "${:08X}", (inst_index << 2) | (self.addr & 0xF000_0000)),
            Operands::Cf { ft, fs, fd } => write!(f, "f{}, f{}, f{}", fd, fs, ft),
            Operands::Lf { base, ft, offset } => write!(f, "f{}, {}(r{})", ft, offset as i16, base),
        }
    }
}

/// The compiled form of one guest page [start, end). Owns its instruction array (plus the
/// overflow slots past the page end) and, for the dynarec, its code region.
#[derive(Debug)]
pub struct Block {
    pub start: u32,
    pub end: u32,

    pub(crate) insts: Option<Vec<Instruction>>,

    pub(crate) code: Option<Region>,
    pub(crate) code_length: usize,

    // code length right after the not-compiled trampolines were emitted
    pub(crate) init_length: usize,

    pub(crate) relocs: Relocations,
}

impl Block {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            insts: None,
            code: None,
            code_length: 0,
            init_length: 0,
            relocs: Relocations::default(),
        }
    }

    pub fn for_page(vaddr: u32) -> Self {
        let start = vaddr & !(PAGE_SIZE - 1);
        Self::new(start, start.wrapping_add(PAGE_SIZE))
    }

    /// Number of instruction words covered by the block
    pub fn length(&self) -> usize {
        (self.end.wrapping_sub(self.start) / 4) as usize
    }

    /// Slots allocated: one per word, one more, and a quarter extra for FIN_BLOCK and
    /// delay slots that spill past the end
    pub fn slot_count(&self) -> usize {
        let length = self.length();
        (length + 1) + (length >> 2)
    }

    pub fn is_allocated(&self) -> bool {
        self.insts.is_some()
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.insts.as_deref().unwrap_or(&[])
    }

    pub fn instruction(&self, slot: usize) -> Option<&Instruction> {
        self.insts.as_ref()?.get(slot)
    }

    pub fn slot_of(&self, addr: u32) -> usize {
        (addr.wrapping_sub(self.start) >> 2) as usize
    }

    pub fn op_at(&self, addr: u32) -> Option<Op> {
        self.instruction(self.slot_of(addr)).map(|inst| inst.op)
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.start) < self.end.wrapping_sub(self.start)
    }

    pub fn code(&self) -> &[u8] {
        match &self.code {
            Some(region) => &region.as_slice()[..self.code_length],
            None => &[],
        }
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    pub fn code_capacity(&self) -> usize {
        self.code.as_ref().map_or(0, Region::size)
    }

    pub fn init_length(&self) -> usize {
        self.init_length
    }

    pub fn relocations(&self) -> &Relocations {
        &self.relocs
    }

    /// Release the instruction array, code region and relocation tables. The block keeps its
    /// range and can be initialized again.
    pub fn free(&mut self, arena: &mut ExecutableArena) {
        self.insts = None;
        if let Some(region) = self.code.take() {
            arena.release(region);
        }
        self.code_length = 0;
        self.init_length = 0;
        self.relocs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec_mem::ArenaKind;

    #[test]
    fn page_geometry() {
        let block = Block::for_page(0x8000_1234);
        assert_eq!(block.start, 0x8000_1000);
        assert_eq!(block.end, 0x8000_2000);
        assert_eq!(block.length(), 1024);
        assert_eq!(block.slot_count(), 1281);
        assert_eq!(block.slot_of(0x8000_1FFC), 1023);
        assert!(block.contains(0x8000_1FFC));
        assert!(!block.contains(0x8000_2000));
    }

    #[test]
    fn top_page_wraps() {
        let block = Block::for_page(0xFFFF_F004);
        assert_eq!(block.start, 0xFFFF_F000);
        assert_eq!(block.end, 0);
        assert_eq!(block.length(), 1024);
        assert!(block.contains(0xFFFF_FFFC));
    }

    #[test]
    fn free_releases_everything() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let mut block = Block::for_page(0x8000_0000);
        block.insts = Some(vec![Instruction::default(); block.slot_count()]);
        block.code = Some(arena.acquire(256).unwrap());
        block.code_length = 32;
        assert!(block.is_allocated());
        assert_eq!(block.code().len(), 32);

        block.free(&mut arena);
        assert!(!block.is_allocated());
        assert!(block.code().is_empty());
        assert_eq!(arena.live_bytes(), 0);
        assert_eq!(block.op_at(0x8000_0000), None);
    }

    #[test]
    fn display_forms() {
        let inst = Instruction {
            addr: 0x8000_0000,
            word: 0x2443_FFFC,
            op: Op::Addiu,
            operands: Operands::I { rs: 2, rt: 3, immediate: -4 },
            ..Default::default()
        };
        assert_eq!(inst.to_string(), "addiu       r3, r2, -4");
    }
}
