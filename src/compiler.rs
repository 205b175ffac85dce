//! Block initialization and the compile pass. A pass starts at the slot execution landed on and
//! decodes forward, handing each slot to the backend, until the run ends at an unconditional
//! jump, an ERET or the end of the block.

#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::assembler::Assembler;
use crate::backend::Backend;
use crate::block::{Block, Instruction};
use crate::classify;
use crate::exec_mem::ExecutableArena;
use crate::ops::{BranchKind, Op, Target};
use crate::page_cache::{page_of, PageCache};
use crate::{is_mapped, kseg0_alias, AccessKind, AddressTranslator, CompileError, Settings};

/// Everything a block operation needs besides the block itself
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub backend: &'a mut dyn Backend,
    pub arena: &'a mut ExecutableArena,
    pub pages: &'a mut PageCache,
    pub translator: &'a dyn AddressTranslator,
}

impl<'a> Context<'a> {
    /// Prepare the block of `page` for compilation: allocate or reset its slots to NotCompiled,
    /// mark the page valid, and bring the other views of the same memory along (the physical
    /// page for a TLB mapped block, the KSEG0/KSEG1 mirror otherwise).
    pub fn init_block(&mut self, page: usize) -> Result<(), CompileError> {
        self.pages.ensure_block(page);
        let Some(mut block) = self.pages.take(page) else {
            return Ok(());
        };
        let result = self.init_block_storage(&mut block);
        let (start, end) = (block.start, block.end);
        self.pages.put(page, block);
        result?;

        self.pages.set_invalid(page, false);

        if end < 0x8000_0000 || start >= 0xC000_0000 {
            let Some(paddr) = self.translator.translate(start, AccessKind::Fetch) else {
                warn!(target: "RECOMP", "block ${:08X} has no physical mapping", start);
                return Ok(());
            };

            let first = page_of(kseg0_alias(paddr));
            self.init_block(first)?;

            let last = page_of(kseg0_alias(paddr.wrapping_add(end.wrapping_sub(start)).wrapping_sub(4)));
            if last != first {
                self.init_block(last)?;
            }
        } else {
            let alt = page_of(start ^ 0x2000_0000);
            if self.pages.is_invalid(alt) {
                self.init_block(alt)?;
            }
        }

        Ok(())
    }

    fn init_block_storage(&mut self, block: &mut Block) -> Result<(), CompileError> {
        let length = block.length();
        let already_exist = block.insts.is_some();
        debug!(target: "RECOMP", "init block {:08X} - {:08X}", block.start, block.end);

        if !already_exist {
            let count = block.slot_count();
            let mut insts = Vec::new();
            if insts.try_reserve_exact(count).is_err() {
                error!(target: "RECOMP", "couldn't allocate {} instruction slots for block ${:08X}", count, block.start);
                return Err(CompileError::OutOfMemory { requested: count * std::mem::size_of::<Instruction>() });
            }
            insts.resize(count, Instruction::default());
            block.insts = Some(insts);
        }

        let mut asm = if self.settings.is_dynarec() {
            let region = match block.code.take() {
                Some(region) => region,
                None => match self.arena.acquire(self.settings.initial_code_capacity()) {
                    Ok(region) => region,
                    Err(err) => {
                        error!(target: "RECOMP", "couldn't allocate executable memory for the dynamic recompiler, try the cached interpreter");
                        block.insts = None;
                        return Err(err);
                    },
                },
            };
            let mut asm = Assembler::new(&mut *self.arena, region, 0, Default::default(), self.settings.code_growth)?;
            self.backend.begin_block(&mut asm, block.start);
            Some(asm)
        } else {
            None
        };

        let start = block.start;
        let Some(insts) = block.insts.as_mut() else {
            return Ok(());
        };

        if !already_exist {
            let mut result: Result<usize, CompileError> = Ok(0);
            for (i, inst) in insts.iter_mut().enumerate().take(length) {
                inst.addr = start.wrapping_add((i as u32) << 2);
                inst.reg_cache.need_map = false;
                inst.local_addr = asm.as_ref().map_or(0, Assembler::code_length);
                inst.op = Op::NotCompiled;

                if let Some(asm) = asm.as_mut() {
                    result = emit_with_prologue(&mut *self.backend, self.settings, asm, inst);
                    if result.is_err() {
                        break;
                    }
                }
            }

            if let Err(err) = result {
                if let Some(asm) = asm {
                    asm.discard();
                }
                block.insts = None;
                return Err(err);
            }
            block.init_length = asm.as_ref().map_or(0, Assembler::code_length);
        } else {
            // reuse the trampolines emitted by the first init
            let rewind = if self.settings.profile { block.code_length } else { block.init_length };
            if let Some(asm) = asm.as_mut() {
                asm.rewind(rewind);
            }
            let stride = if length > 0 { block.init_length / length } else { 0 };
            for (i, inst) in insts.iter_mut().enumerate().take(length) {
                inst.reg_cache.need_map = false;
                inst.local_addr = i * stride;
                inst.op = Op::NotCompiled;
            }
        }

        if let Some(mut asm) = asm {
            self.backend.release_register_state(&mut asm);
            let (region, code_length, relocs) = asm.finish()?;
            block.code = Some(region);
            block.code_length = code_length;
            block.relocs = relocs;
        }

        Ok(())
    }

    /// Compile `block` starting at the slot of `func`, reading instruction words from `source`
    /// (the block's memory, starting at its first word, with at least one quarter of a block
    /// plus two words past its end).
    pub fn recompile_block(&mut self, block: &mut Block, source: &[u32], func: u32) -> Result<(), CompileError> {
        let (start, end) = (block.start, block.end);
        let length = block.length() as isize;
        let start_slot = ((func & 0xFFF) >> 2) as usize;

        let asm = if self.settings.is_dynarec() {
            let region = match block.code.take() {
                Some(region) => region,
                None => self.arena.acquire(self.settings.initial_code_capacity())?,
            };
            let relocs = std::mem::take(&mut block.relocs);
            let mut asm = Assembler::new(&mut *self.arena, region, block.code_length, relocs, self.settings.code_growth)?;
            self.backend.begin_block(&mut asm, start);
            Some(asm)
        } else {
            None
        };

        let Some(insts) = block.insts.as_mut() else {
            warn!(target: "RECOMP", "block ${:08X} has no instruction slots", start);
            if let Some(asm) = asm {
                asm.discard();
            }
            return Err(CompileError::NotInitialized { address: func });
        };

        let mut pass = Pass {
            settings: self.settings,
            backend: &mut *self.backend,
            asm,
            start,
            end,
            insts,
            source,
            src_index: start_slot,
            dst: start_slot,
            check_nop: false,
            delay_slot_compiled: 0,
            finished: 0,
        };

        let mut i = start_slot;
        let result = loop {
            if is_mapped(start) {
                mark_translated_slot(self.pages, self.translator, start.wrapping_add((i as u32) << 2));
            }

            match pass.compile_slot(i, length) {
                Ok(true) => { i += 1; break Ok(()); },
                Ok(false) => i += 1,
                Err(err) => break Err(err),
            }
        };

        let result = result.and_then(|_| pass.finish_pass(i, length));
        let Pass { asm, insts, backend, .. } = pass;
        match (result, asm) {
            (Ok(()), Some(mut asm)) => {
                backend.release_register_state(&mut asm);
                if let Err(err) = backend.link_block(&mut asm, insts, start) {
                    asm.discard();
                    return Err(err);
                }
                let (region, code_length, relocs) = asm.finish()?;
                block.code = Some(region);
                block.code_length = code_length;
                block.relocs = relocs;
            },
            (Ok(()), None) => {},
            (Err(err), asm) => {
                if let Some(asm) = asm {
                    asm.discard();
                }
                return Err(err);
            },
        }

        debug!(target: "RECOMP", "block recompiled ({:08X}-{:08X})", func, end);
        Ok(())
    }
}

/// A slot of a TLB mapped block is about to be compiled: the same word seen through its
/// physical page must be recompiled too when reached, so flag its placeholder.
fn mark_translated_slot(pages: &mut PageCache, translator: &dyn AddressTranslator, vaddr: u32) {
    let Some(paddr) = translator.translate(vaddr, AccessKind::Read) else {
        return;
    };
    let alias = kseg0_alias(paddr);
    if let Some(block) = pages.block_mut(page_of(alias)) {
        let slot = block.slot_of(alias);
        if let Some(inst) = block.insts.as_mut().and_then(|insts| insts.get_mut(slot)) {
            if inst.op == Op::NotCompiled {
                inst.op = Op::NotCompiled2;
            }
        }
    }
}

fn emit_with_prologue(backend: &mut dyn Backend, settings: &Settings, asm: &mut Assembler, inst: &mut Instruction) -> Result<usize, CompileError> {
    let prologue = if settings.debug_prologue { backend.emit_debug(asm, inst)? } else { 0 };
    Ok(prologue + backend.emit(asm, inst)?)
}

/// State of one compile pass over a block
pub struct Pass<'a> {
    settings: &'a Settings,
    backend: &'a mut dyn Backend,
    asm: Option<Assembler<'a>>,

    start: u32,
    end: u32,
    insts: &'a mut [Instruction],
    source: &'a [u32],

    // word being compiled and the slot it goes into
    src_index: usize,
    dst: usize,

    // the word after the current one is zero
    check_nop: bool,

    // counts down the slots after a delay slot was compiled inline
    delay_slot_compiled: u32,

    // 0 keep going, 1 stop after the next slot (the delay slot), 2 stop now
    finished: u8,
}

impl<'a> Pass<'a> {
    fn source_word(&self, index: usize) -> u32 {
        self.source.get(index).copied().unwrap_or(0)
    }

    fn code_length(&self) -> usize {
        self.asm.as_ref().map_or(0, Assembler::code_length)
    }

    /// Reset slot `i` for compilation at the current code position
    fn begin_slot(&mut self, i: usize) -> Result<(), CompileError> {
        self.dst = i;
        let local_addr = self.code_length();
        let inst = &mut self.insts[i];
        inst.addr = self.start.wrapping_add((i as u32) << 2);
        inst.reg_cache.need_map = false;
        inst.local_addr = local_addr;

        if self.settings.debug_prologue {
            if let Some(asm) = self.asm.as_mut() {
                self.backend.emit_debug(asm, &self.insts[i])?;
            }
        }
        Ok(())
    }

    /// Decode the current word into the current slot
    fn decode_current(&mut self) {
        let word = self.source_word(self.src_index);
        let (start, end, check_nop) = (self.start, self.end, self.check_nop);
        let inst = &mut self.insts[self.dst];
        let (op, operands) = classify::decode_instruction(word, inst.addr, start, end, check_nop);
        inst.word = word;
        inst.op = op;
        inst.operands = operands;
    }

    fn emit_slot(&mut self, slot: usize) -> Result<usize, CompileError> {
        match self.asm.as_mut() {
            Some(asm) => self.backend.emit(asm, &mut self.insts[slot]),
            None => Ok(0),
        }
    }

    /// Emit the current slot. A jump also gets its delay slot compiled inline, followed by
    /// the jump itself.
    fn emit_current(&mut self) -> Result<(), CompileError> {
        if self.asm.is_none() {
            return Ok(());
        }

        let slot = self.dst;
        self.emit_slot(slot)?;

        let branch = self.insts[slot];
        if !branch.op.is_jump() {
            return Ok(());
        }

        self.compile_one_opcode()?;

        let Some(asm) = self.asm.as_mut() else {
            return Ok(());
        };
        let target = classify::branch_target(branch.addr, &branch.operands);
        match (branch.op, target) {
            (Op::Branch(_, Target::Internal | Target::Idle), Some(target)) => {
                self.backend.insert_delay_slot_trampoline(asm, &branch, target)?;
            },
            (Op::Branch(..), target) => {
                self.backend.insert_exit_stub(asm, &branch, target)?;
            },
            _ => {
                self.backend.insert_exit_stub(asm, &branch, None)?;
            },
        }
        Ok(())
    }

    /// Compile the next word into the next slot, as the delay slot of the current one. A jump
    /// in a delay slot is compiled as a NOP.
    pub fn compile_one_opcode(&mut self) -> Result<(), CompileError> {
        self.src_index += 1;
        self.dst += 1;

        let prev = self.insts[self.dst - 1].addr;
        let inst = &mut self.insts[self.dst];
        inst.addr = prev.wrapping_add(4);
        inst.reg_cache.need_map = false;

        self.decode_current();
        if self.insts[self.dst].op.is_jump() {
            self.insts[self.dst].op = Op::Nop;
        }
        self.emit_slot(self.dst)?;

        self.delay_slot_compiled = 2;
        Ok(())
    }

    /// Compile slot `i` and report whether the pass is finished after it
    fn compile_slot(&mut self, i: usize, length: isize) -> Result<bool, CompileError> {
        self.src_index = i;
        self.check_nop = self.source_word(i + 1) == 0;
        self.begin_slot(i)?;

        self.decode_current();
        if self.settings.profile {
            let inst = &self.insts[i];
            trace!(target: "RECOMP", "${:08X} ${:08X} +{:X} {}", inst.addr, inst.word, inst.local_addr, inst);
        }
        self.emit_current()?;

        self.dst = i;
        if self.delay_slot_compiled > 0 {
            self.delay_slot_compiled -= 1;
            if let Some(asm) = self.asm.as_mut() {
                self.backend.release_register_state(asm);
            }
        }

        let (start, end) = (self.start, self.end);
        let ii = i as isize;
        if ii >= length - 2 + (length >> 2) {
            self.finished = 2;
        }
        if ii >= length - 1 && (start == 0xA400_0000 || start >= 0xC000_0000 || end < 0x8000_0000) {
            self.finished = 2;
        }
        let op = self.insts[i].op;
        if op == Op::Eret || self.finished == 1 {
            self.finished = 2;
        }
        let unconditional = matches!(op, Op::Branch(BranchKind::J, Target::Internal | Target::Out) | Op::Jr);
        if unconditional && !(ii >= length - 1 && (start >= 0xC000_0000 || end < 0x8000_0000)) {
            self.finished = 1;
        }
        Ok(self.finished == 2)
    }

    fn fin_block(&mut self, i: usize) -> Result<(), CompileError> {
        self.begin_slot(i)?;
        let inst = &mut self.insts[i];
        inst.word = 0;
        inst.op = Op::FinBlock;
        inst.operands = Default::default();
        self.emit_slot(i)?;
        Ok(())
    }

    /// Close the pass after slot `i - 1`: a pass that ran off the end of the block gets
    /// FIN_BLOCK slots, one that stopped early falls through into the next slot.
    fn finish_pass(&mut self, i: usize, length: isize) -> Result<(), CompileError> {
        let mut i = i;
        if i as isize >= length {
            self.fin_block(i)?;
            i += 1;
            // the last word was a jump, so its delay slot also spilled over
            if (i as isize) < length - 1 + (length >> 2) {
                self.fin_block(i)?;
            }
        } else if let Some(asm) = self.asm.as_mut() {
            let next = self.insts[self.dst].addr.wrapping_add(4);
            self.backend.link_subblock(asm, next)?;
        }
        Ok(())
    }
}
