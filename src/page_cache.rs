#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::block::Block;
use crate::exec_mem::ExecutableArena;
use crate::ops::Op;
use crate::{AccessKind, AddressTranslator};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_COUNT: usize = 0x10_0000;

#[inline(always)]
pub fn page_of(addr: u32) -> usize {
    (addr >> PAGE_SHIFT) as usize
}

/// One optional block and one invalid flag per 4KiB page of the 32-bit address space.
/// Every page starts out invalid.
pub struct PageCache {
    blocks: Vec<Option<Box<Block>>>,
    invalid: Vec<bool>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    pub fn new() -> Self {
        let mut blocks = Vec::with_capacity(PAGE_COUNT);
        blocks.resize_with(PAGE_COUNT, || None);
        Self {
            blocks,
            invalid: vec![true; PAGE_COUNT],
        }
    }

    pub fn is_invalid(&self, page: usize) -> bool {
        self.invalid[page]
    }

    pub fn set_invalid(&mut self, page: usize, invalid: bool) {
        self.invalid[page] = invalid;
    }

    pub fn block(&self, page: usize) -> Option<&Block> {
        self.blocks[page].as_deref()
    }

    pub fn block_mut(&mut self, page: usize) -> Option<&mut Block> {
        self.blocks[page].as_deref_mut()
    }

    pub fn has_block(&self, page: usize) -> bool {
        self.blocks[page].is_some()
    }

    /// Create an empty block for the page if there isn't one
    pub(crate) fn ensure_block(&mut self, page: usize) {
        if self.blocks[page].is_none() {
            self.blocks[page] = Some(Box::new(Block::for_page((page as u32) << PAGE_SHIFT)));
        }
    }

    /// Take the page's block out for compilation. It must be handed back with `put`.
    pub(crate) fn take(&mut self, page: usize) -> Option<Box<Block>> {
        self.blocks[page].take()
    }

    pub(crate) fn put(&mut self, page: usize, block: Box<Block>) {
        self.blocks[page] = Some(block);
    }

    pub fn invalidate(&mut self, page: usize) {
        trace!(target: "PAGES", "invalidate page ${:05X}", page);
        self.invalid[page] = true;
    }

    pub fn invalidate_all(&mut self) {
        debug!(target: "PAGES", "invalidate all pages");
        self.invalid.fill(true);
    }

    /// Invalidate every page in [address, address + size) that holds compiled code at the
    /// written word. Size zero invalidates everything. Returns the number of pages marked.
    pub fn invalidate_range(&mut self, address: u32, size: u32) -> usize {
        if size == 0 {
            self.invalidate_all();
            return PAGE_COUNT;
        }

        let last = address as u64 + size as u64 - 1;
        let mut addr = address as u64;
        let mut count = 0;
        while addr <= last {
            let page = (addr >> PAGE_SHIFT) as usize;
            if page >= PAGE_COUNT {
                break;
            }

            if !self.invalid[page] {
                let compiled = match self.block(page) {
                    Some(block) => block.op_at(addr as u32) != Some(Op::NotCompiled),
                    None => true,
                };
                if compiled {
                    self.invalidate(page);
                    count += 1;
                    addr |= 0xFFC;
                }
            } else {
                addr |= 0xFFC;
            }
            addr += 4;
        }
        count
    }

    /// Bring the invalid flags of every alias of `addr` in line before executing from it:
    /// both KSEG windows for unmapped addresses, the physical page for mapped ones. Returns
    /// the physical address for mapped addresses, `addr` for unmapped ones, and None when the
    /// address doesn't translate.
    pub fn update_invalid_addr(&mut self, addr: u32, translator: &dyn AddressTranslator) -> Option<u32> {
        if !crate::is_mapped(addr) {
            let page = page_of(addr);
            let mirror = page_of(addr ^ 0x2000_0000);
            if self.invalid[page] {
                self.invalid[mirror] = true;
            }
            if self.invalid[mirror] {
                self.invalid[page] = true;
            }
            return Some(addr);
        }

        let paddr = translator.translate(addr, AccessKind::Fetch)?;
        let cached = crate::kseg0_alias(paddr);
        self.update_invalid_addr(cached, translator);

        let page = page_of(addr);
        let phys_page = page_of(cached);
        if self.invalid[phys_page] {
            self.invalid[page] = true;
        }
        if self.invalid[page] {
            self.invalid[phys_page] = true;
        }
        Some(paddr)
    }

    /// Free every block's storage. Invalid flags are left as they are.
    pub fn free_all(&mut self, arena: &mut ExecutableArena) {
        for block in self.blocks.iter_mut().flatten() {
            block.free(arena);
        }
    }

    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().flatten().filter(|block| block.is_allocated()).count()
    }
}
