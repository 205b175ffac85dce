#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::backend::Backend;
use crate::block::Block;
use crate::compiler::Context;
use crate::exec_mem::ExecutableArena;
use crate::page_cache::{page_of, PageCache};
use crate::{is_mapped, AccessKind, Addressable, AddressTranslator, CompileError, Settings};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecompilerStats {
    pub blocks_initialized: u64,
    pub compile_passes: u64,
    pub pages_invalidated: u64,
    pub blocks_freed: u64,
}

/// Owns the page cache, the code arena and the backend, and answers the questions an
/// executing core asks: where does this address live, and compile it if it isn't yet.
pub struct Recompiler<B: Backend, T: AddressTranslator> {
    settings: Settings,
    backend: B,
    translator: T,
    arena: ExecutableArena,
    pages: PageCache,
    stats: RecompilerStats,
}

impl<B: Backend, T: AddressTranslator> Recompiler<B, T> {
    pub fn new(settings: Settings, backend: B, translator: T) -> Self {
        Self::with_arena(settings, backend, translator, ExecutableArena::new())
    }

    pub fn with_arena(settings: Settings, backend: B, translator: T, arena: ExecutableArena) -> Self {
        info!(target: "RECOMP", "{:?} core with the {} backend", settings.mode, backend.name());
        Self {
            settings,
            backend,
            translator,
            arena,
            pages: PageCache::new(),
            stats: RecompilerStats::default(),
        }
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn backend(&self) -> &B { &self.backend }
    pub fn translator(&self) -> &T { &self.translator }
    pub fn arena(&self) -> &ExecutableArena { &self.arena }
    pub fn pages(&self) -> &PageCache { &self.pages }
    pub fn stats(&self) -> RecompilerStats { self.stats }

    fn context(&mut self) -> Context<'_> {
        Context {
            settings: &self.settings,
            backend: &mut self.backend,
            arena: &mut self.arena,
            pages: &mut self.pages,
            translator: &self.translator,
        }
    }

    /// Block holding `vaddr`, if its page has one
    pub fn block(&self, vaddr: u32) -> Option<&Block> {
        self.pages.block(page_of(vaddr))
    }

    /// Initialize (or reset) the block of the page holding `vaddr`
    pub fn init_block(&mut self, vaddr: u32) -> Result<(), CompileError> {
        self.stats.blocks_initialized += 1;
        self.context().init_block(page_of(vaddr))
    }

    /// Resolve a jump to `vaddr`: make sure the page has an up to date block and return the
    /// slot index execution continues at.
    pub fn jump_to(&mut self, vaddr: u32) -> Result<usize, CompileError> {
        if self.pages.update_invalid_addr(vaddr, &self.translator).is_none() {
            debug!(target: "RECOMP", "jump to unmapped address ${:08X}", vaddr);
            return Err(CompileError::Unmapped { address: vaddr });
        }

        let page = page_of(vaddr);
        let needs_init = match self.pages.block(page) {
            Some(block) => !block.is_allocated() || self.pages.is_invalid(page),
            None => true,
        };
        if needs_init {
            self.init_block(vaddr)?;
        }

        match self.pages.block(page) {
            Some(block) => Ok(block.slot_of(vaddr)),
            None => Err(CompileError::Unmapped { address: vaddr }),
        }
    }

    /// Execution reached a not-compiled slot at `vaddr`: compile the block from there on
    pub fn not_compiled<M: Addressable + ?Sized>(&mut self, mem: &mut M, vaddr: u32) -> Result<(), CompileError> {
        let page = page_of(vaddr);
        let ready = self.pages.block(page).is_some_and(Block::is_allocated) && !self.pages.is_invalid(page);
        if !ready {
            self.jump_to(vaddr)?;
        }

        let (start, length) = match self.pages.block(page) {
            Some(block) => (block.start, block.length()),
            None => return Err(CompileError::Unmapped { address: vaddr }),
        };

        let source = match self.fetch_source(mem, start, length) {
            Ok(source) => source,
            Err(err) => {
                error!(target: "RECOMP", "not compiled exception at ${:08X}: {}", vaddr, err);
                return Err(err);
            },
        };

        self.recompile_block(&source, vaddr)
    }

    /// Compile the block holding `vaddr` from `vaddr` on, reading its words from `source`
    pub fn recompile_block(&mut self, source: &[u32], vaddr: u32) -> Result<(), CompileError> {
        let page = page_of(vaddr);
        let Some(mut block) = self.pages.take(page) else {
            return Err(CompileError::Unmapped { address: vaddr });
        };

        let result = self.context().recompile_block(&mut block, source, vaddr);
        if result.is_err() {
            // whatever was emitted can't be trusted, start over on the next jump
            block.free(&mut self.arena);
            self.pages.invalidate(page);
        }
        self.pages.put(page, block);

        self.stats.compile_passes += 1;
        result
    }

    /// Resolve `vaddr` and compile its slot if it hasn't been yet. Returns the block.
    pub fn compile_block<M: Addressable + ?Sized>(&mut self, mem: &mut M, vaddr: u32) -> Result<&Block, CompileError> {
        let slot = self.jump_to(vaddr)?;
        let page = page_of(vaddr);
        let pending = self.pages.block(page)
            .and_then(|block| block.instruction(slot))
            .map_or(true, |inst| inst.op.is_not_compiled());
        if pending {
            self.not_compiled(mem, vaddr)?;
        }
        self.pages.block(page).ok_or(CompileError::Unmapped { address: vaddr })
    }

    fn fetch_source<M: Addressable + ?Sized>(&self, mem: &mut M, start: u32, length: usize) -> Result<Vec<u32>, CompileError> {
        let base = if is_mapped(start) {
            self.translator.translate(start, AccessKind::Fetch).ok_or(CompileError::Unmapped { address: start })?
        } else {
            start & 0x1FFF_FFFF
        };

        let mut source = mem.read_block(base as usize, (length << 2) as u32)
            .map_err(|_| CompileError::MemoryRead { address: start })?;

        // room for the slots that spill past the end of the page. Those may run off the end
        // of memory and read as zero.
        let count = length + (length >> 2) + 2;
        source.extend((length..count).map(|i| mem.read_u32(base as usize + (i << 2)).unwrap_or(0)));
        Ok(source)
    }

    /// Release the storage of the block holding `vaddr`
    pub fn free_block(&mut self, vaddr: u32) {
        let page = page_of(vaddr);
        if let Some(block) = self.pages.block_mut(page) {
            block.free(&mut self.arena);
            self.stats.blocks_freed += 1;
        }
        self.pages.invalidate(page);
    }

    pub fn free_all(&mut self) {
        self.pages.free_all(&mut self.arena);
        self.pages.invalidate_all();
    }

    /// Mark the page holding `vaddr` invalid
    pub fn invalidate(&mut self, vaddr: u32) {
        self.pages.invalidate(page_of(vaddr));
        self.stats.pages_invalidated += 1;
    }

    pub fn invalidate_range(&mut self, vaddr: u32, size: u32) -> usize {
        let count = self.pages.invalidate_range(vaddr, size);
        self.stats.pages_invalidated += count as u64;
        count
    }

    /// A write of `size` bytes hit physical memory at `paddr`; drop code cached through
    /// either unmapped window
    pub fn notify_write(&mut self, paddr: u32, size: u32) -> usize {
        let paddr = paddr & 0x1FFF_FFFF;
        self.invalidate_range(0x8000_0000 | paddr, size) + self.invalidate_range(0xA000_0000 | paddr, size)
    }
}
