//! Instruction decode and block compilation core for a VR4300 (N64) dynamic recompiler.
//!
//! Guest code is cached per 4KiB page. Each page owns a `Block` of decoded instruction
//! slots that is compiled lazily, one basic run at a time, starting from whichever slot
//! execution first lands on. The same decoded slots drive either a cached interpreter or
//! a codegen `Backend` writing into executable memory.

use std::fmt;

pub mod assembler;
pub mod backend;
pub mod block;
pub mod bytecode;
pub mod classify;
pub mod compiler;
pub mod decode;
pub mod exec_mem;
pub mod ops;
pub mod page_cache;
pub mod rdram;
pub mod recompiler;
pub mod tables;

pub use backend::Backend;
pub use block::{Block, Instruction};
pub use bytecode::BytecodeBackend;
pub use decode::Operands;
pub use exec_mem::{ArenaKind, ExecutableArena, Region};
pub use ops::{BranchKind, Op, Target};
pub use page_cache::PageCache;
pub use rdram::Rdram;
pub use recompiler::{Recompiler, RecompilerStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteFault {
    Invalid,
}

/// Read side of the memory bus, as seen by the block compiler. Offsets are physical.
pub trait Addressable {
    fn read_u32(&mut self, offset: usize) -> Result<u32, ReadWriteFault>;

    // block read. length is in bytes and rounded down to whole words
    fn read_block(&mut self, offset: usize, length: u32) -> Result<Vec<u32>, ReadWriteFault> {
        (0..(length as usize >> 2)).map(|i| self.read_u32(offset + (i << 2))).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Fetch,
}

/// Virtual to physical translation (the TLB, from the compiler's point of view)
pub trait AddressTranslator {
    /// Returns the physical address for `vaddr`, or None on a TLB miss
    fn translate(&self, vaddr: u32, access: AccessKind) -> Option<u32>;
}

/// Translator with no TLB entries: only the unmapped KSEG0/KSEG1 windows resolve
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectMapped;

impl AddressTranslator for DirectMapped {
    fn translate(&self, vaddr: u32, _access: AccessKind) -> Option<u32> {
        match vaddr {
            0x8000_0000..=0xBFFF_FFFF => Some(vaddr & 0x1FFF_FFFF),
            _ => None,
        }
    }
}

/// KSEG0 (cached, unmapped) alias of a physical address. Translated pages are cached
/// under this address.
#[inline]
pub fn kseg0_alias(paddr: u32) -> u32 {
    0x8000_0000 | (paddr & 0x1FFF_FFFF)
}

/// True for addresses that go through the TLB (KUSEG, KSSEG, KSEG3)
#[inline]
pub fn is_mapped(vaddr: u32) -> bool {
    vaddr < 0x8000_0000 || vaddr >= 0xC000_0000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmuMode {
    CachedInterpreter,
    #[default]
    Dynarec,
}

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub mode: EmuMode,

    // code buffer sizes, in bytes
    pub code_capacity: usize,
    pub profile_code_capacity: usize,
    pub code_growth: usize,

    // emit a debug prologue before every instruction
    pub debug_prologue: bool,

    // trace every compiled slot and never move or rewind code buffers
    pub profile: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: EmuMode::Dynarec,
            code_capacity: 32768,
            profile_code_capacity: 524288,
            code_growth: 8192,
            debug_prologue: false,
            profile: false,
        }
    }
}

impl Settings {
    pub fn cached_interpreter() -> Self {
        Self { mode: EmuMode::CachedInterpreter, ..Default::default() }
    }

    pub fn is_dynarec(&self) -> bool {
        self.mode == EmuMode::Dynarec
    }

    /// Initial size of a freshly allocated code buffer
    pub fn initial_code_capacity(&self) -> usize {
        if self.profile { self.profile_code_capacity } else { self.code_capacity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    OutOfMemory { requested: usize },
    Protection { message: String },
    MemoryRead { address: u32 },
    Unmapped { address: u32 },
    Link { target: u32 },
    NotInitialized { address: u32 },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::OutOfMemory { requested } => write!(f, "couldn't allocate {requested} bytes for the recompiler"),
            CompileError::Protection { message } => write!(f, "couldn't change code buffer protection: {message}"),
            CompileError::MemoryRead { address } => write!(f, "couldn't read block source at ${address:08X}"),
            CompileError::Unmapped { address } => write!(f, "address ${address:08X} has no physical mapping"),
            CompileError::Link { target } => write!(f, "jump target ${target:08X} is outside the block"),
            CompileError::NotInitialized { address } => write!(f, "block holding ${address:08X} has no instruction slots"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        CompileError::Protection { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_mapped_translation() {
        let t = DirectMapped;
        assert_eq!(t.translate(0x8000_1234, AccessKind::Fetch), Some(0x0000_1234));
        assert_eq!(t.translate(0xA400_0040, AccessKind::Read), Some(0x0400_0040));
        assert_eq!(t.translate(0x0000_1000, AccessKind::Fetch), None);
        assert_eq!(t.translate(0xC000_0000, AccessKind::Fetch), None);
    }

    #[test]
    fn mapped_segments() {
        assert!(is_mapped(0x0040_0000));
        assert!(!is_mapped(0x8000_0000));
        assert!(!is_mapped(0xBFFF_FFFC));
        assert!(is_mapped(0xC000_0000));
        assert_eq!(kseg0_alias(0x0010_0000), 0x8010_0000);
    }
}
