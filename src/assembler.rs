use crate::exec_mem::{ExecutableArena, Region};
use crate::CompileError;

/// A jump emitted before its destination slot was known. `at` is the code offset of the
/// instruction to patch, `target` the guest address it jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpFixup {
    pub at: usize,
    pub target: u32,
}

/// Relocation tables kept with a block between compile passes
#[derive(Debug, Clone, Default)]
pub struct Relocations {
    pub jumps: Vec<JumpFixup>,
}

impl Relocations {
    pub fn clear(&mut self) {
        self.jumps.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.jumps.is_empty()
    }
}

/// Byte writer over a block's code region. Grows the region in fixed steps when full.
pub struct Assembler<'a> {
    arena: &'a mut ExecutableArena,
    region: Region,
    length: usize,
    growth: usize,
    relocs: Relocations,
}

impl<'a> Assembler<'a> {
    /// Start writing at `length` into `region`, unsealing it first
    pub fn new(arena: &'a mut ExecutableArena, mut region: Region, length: usize, relocs: Relocations, growth: usize) -> Result<Self, CompileError> {
        let unsealed = region.unseal();
        let region = keep_or_release(arena, region, unsealed)?;
        Ok(Self { arena, region, length, growth: growth.max(1), relocs })
    }

    pub fn code_length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.region.size()
    }

    pub fn code(&self) -> &[u8] {
        &self.region.as_slice()[..self.length]
    }

    pub fn jumps(&self) -> &[JumpFixup] {
        &self.relocs.jumps
    }

    /// Move the write position back, keeping whatever was written before it
    pub fn rewind(&mut self, length: usize) {
        self.length = length.min(self.region.size());
    }

    fn reserve(&mut self, count: usize) -> Result<(), CompileError> {
        let needed = self.length + count;
        if needed <= self.region.size() {
            return Ok(());
        }

        let mut new_size = self.region.size();
        while new_size < needed {
            new_size += self.growth;
        }

        let region = std::mem::replace(&mut self.region, Region::empty());
        self.region = self.arena.grow(region, new_size)?;
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CompileError> {
        self.reserve(bytes.len())?;
        let start = self.length;
        if let Some(dest) = self.region.as_mut_slice() {
            dest[start..start + bytes.len()].copy_from_slice(bytes);
        }
        self.length += bytes.len();
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), CompileError> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Record a jump at the current position to be patched when the block is linked
    pub fn add_jump(&mut self, target: u32) {
        self.relocs.jumps.push(JumpFixup { at: self.length, target });
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) {
        if let Some(dest) = self.region.as_mut_slice() {
            dest[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Seal the region and hand back the region, final code length and relocation tables
    pub fn finish(self) -> Result<(Region, usize, Relocations), CompileError> {
        let Self { arena, mut region, length, relocs, .. } = self;
        let sealed = region.seal();
        let region = keep_or_release(arena, region, sealed)?;
        Ok((region, length, relocs))
    }

    /// Give the region back to the arena without keeping any of the code
    pub fn discard(self) {
        self.arena.release(self.region);
    }
}

/// A region whose protection couldn't be changed goes back to the arena
fn keep_or_release(arena: &mut ExecutableArena, region: Region, result: Result<(), CompileError>) -> Result<Region, CompileError> {
    match result {
        Ok(()) => Ok(region),
        Err(err) => {
            arena.release(region);
            Err(err)
        },
    }
}
