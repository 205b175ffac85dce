use n64_recomp::bytecode::{decode_records, Record};
use n64_recomp::page_cache::page_of;
use n64_recomp::*;

const ADDIU: u32 = 0x2442_0001; // addiu r2, r2, 1
const ERET: u32 = 0x4200_0018;

// one TLB entry mapping a single 4KiB page, everything else direct mapped
struct OnePageTlb {
    vpage: u32,
    ppage: u32,
}

impl AddressTranslator for OnePageTlb {
    fn translate(&self, vaddr: u32, access: AccessKind) -> Option<u32> {
        if vaddr & !0xFFF == self.vpage {
            Some(self.ppage | (vaddr & 0xFFF))
        } else {
            DirectMapped.translate(vaddr, access)
        }
    }
}

fn heap_recompiler<T: AddressTranslator>(settings: Settings, translator: T) -> Recompiler<BytecodeBackend, T> {
    Recompiler::with_arena(settings, BytecodeBackend::new(), translator, ExecutableArena::with_kind(ArenaKind::Heap))
}

fn ram_with(offset: usize, words: &[u32]) -> Rdram {
    let mut ram = Rdram::new(0x20000);
    ram.load_words(offset, words).unwrap();
    ram
}

fn ops(block: &Block, count: usize) -> Vec<(Op, Operands)> {
    block.instructions()[..count].iter().map(|inst| (inst.op, inst.operands)).collect()
}

#[test]
fn compiling_kseg0_leaves_kseg1_ready() {
    let mut ram = ram_with(0x5000, &[ADDIU, ERET]);
    let mut recomp = heap_recompiler(Settings::default(), DirectMapped);
    recomp.compile_block(&mut ram, 0x8000_5000).unwrap();

    // the mirror was initialized alongside but not compiled
    assert!(!recomp.pages().is_invalid(page_of(0xA000_5000)));
    let mirror = recomp.block(0xA000_5000).unwrap();
    assert!(mirror.is_allocated());
    assert_eq!(mirror.instructions()[0].op, Op::NotCompiled);

    // and compiles on its own when reached
    let block = recomp.compile_block(&mut ram, 0xA000_5000).unwrap();
    assert_eq!(block.instructions()[0].op, Op::Addiu);
    assert_eq!(block.instructions()[1].op, Op::Eret);
}

#[test]
fn mapped_block_flags_its_physical_page() {
    let tlb = OnePageTlb { vpage: 0x0040_0000, ppage: 0x0000_6000 };
    let mut ram = ram_with(0x6000, &[ADDIU, ADDIU, ERET]);
    let mut recomp = heap_recompiler(Settings::default(), tlb);

    let block = recomp.compile_block(&mut ram, 0x0040_0000).unwrap();
    assert_eq!(block.start, 0x0040_0000);
    assert_eq!(block.instructions()[2].op, Op::Eret);
    assert_eq!(block.instructions()[3].op, Op::NotCompiled);

    // the physical page went through init and the compiled words are flagged
    let phys = recomp.block(0x8000_6000).unwrap();
    assert!(!recomp.pages().is_invalid(page_of(0x8000_6000)));
    assert_eq!(phys.instructions()[0].op, Op::NotCompiled2);
    assert_eq!(phys.instructions()[2].op, Op::NotCompiled2);
    assert_eq!(phys.instructions()[3].op, Op::NotCompiled);

    // a flagged slot still counts as not compiled
    let phys = recomp.compile_block(&mut ram, 0x8000_6000).unwrap();
    assert_eq!(phys.instructions()[0].op, Op::Addiu);
}

#[test]
fn write_to_physical_page_invalidates_mapped_view() {
    let tlb = OnePageTlb { vpage: 0x0040_0000, ppage: 0x0000_6000 };
    let mut ram = ram_with(0x6000, &[ADDIU, ERET]);
    let mut recomp = heap_recompiler(Settings::default(), tlb);
    recomp.compile_block(&mut ram, 0x0040_0000).unwrap();
    recomp.compile_block(&mut ram, 0x8000_6000).unwrap();

    ram.write_u32(ERET, 0x6000).unwrap();
    assert!(recomp.notify_write(0x6000, 4) > 0);

    // the virtual page picks the invalidation up on the next jump and compiles the new word
    let block = recomp.compile_block(&mut ram, 0x0040_0000).unwrap();
    assert_eq!(block.instructions()[0].op, Op::Eret);
    assert_eq!(block.instructions()[1].op, Op::NotCompiled);
}

#[test]
fn unmapped_jump_is_reported() {
    let tlb = OnePageTlb { vpage: 0x0040_0000, ppage: 0x0000_6000 };
    let mut ram = Rdram::new(0x10000);
    let mut recomp = heap_recompiler(Settings::default(), tlb);
    assert_eq!(recomp.compile_block(&mut ram, 0x0050_0000).unwrap_err(), CompileError::Unmapped { address: 0x0050_0000 });
}

#[test]
fn recompiling_after_free_gives_the_same_slots() {
    // beq r1, r2, +3 ; addiu ; addiu ; addiu ; jr r31 ; addiu
    let words = [0x1022_0003, ADDIU, ADDIU, ADDIU, 0x03E0_0008, ADDIU];
    let mut ram = ram_with(0x7000, &words);
    let mut recomp = heap_recompiler(Settings::default(), DirectMapped);

    let block = recomp.compile_block(&mut ram, 0x8000_7000).unwrap();
    let first = ops(block, 8);
    let first_code = block.code().to_vec();

    recomp.free_block(0x8000_7000);
    let block = recomp.compile_block(&mut ram, 0x8000_7000).unwrap();
    assert_eq!(ops(block, 8), first);
    assert_eq!(block.code(), &first_code[..]);
    assert_eq!(first[6].0, Op::NotCompiled);
}

#[test]
fn small_code_buffers_grow_without_changing_the_code() {
    let words = [ADDIU, 0x1000_0002, ADDIU, ADDIU, ADDIU, ERET];
    let mut ram = ram_with(0x8000, &words);

    let mut roomy = heap_recompiler(Settings::default(), DirectMapped);
    let expected = roomy.compile_block(&mut ram, 0x8000_8000).unwrap().code().to_vec();
    assert_eq!(roomy.arena().grows(), 0);

    let settings = Settings { code_capacity: 64, code_growth: 64, ..Default::default() };
    let mut tight = heap_recompiler(settings, DirectMapped);
    let block = tight.compile_block(&mut ram, 0x8000_8000).unwrap();
    assert_eq!(block.code(), &expected[..]);
    assert!(block.code_capacity() >= block.code_length());

    // the branch still lands on slot 4
    let records = decode_records(block.code());
    let target = block.instructions()[4].local_addr as i64;
    assert!(records.iter().any(|&(at, record)| matches!(record, Record::Jump { offset, .. } if at as i64 + 8 + offset as i64 == target)));
    assert!(tight.arena().grows() > 0);
}

#[test]
fn cached_interpreter_emits_no_code() {
    let mut ram = ram_with(0x9000, &[ADDIU, ERET]);
    let mut recomp = heap_recompiler(Settings::cached_interpreter(), DirectMapped);
    let block = recomp.compile_block(&mut ram, 0x8000_9000).unwrap();
    assert_eq!(block.instructions()[1].op, Op::Eret);
    assert!(block.code().is_empty());
    assert_eq!(recomp.arena().live_bytes(), 0);
}

#[test]
fn invalidate_range_only_hits_compiled_words() {
    let mut ram = ram_with(0xA000, &[ADDIU, ERET]);
    let mut recomp = heap_recompiler(Settings::default(), DirectMapped);
    recomp.compile_block(&mut ram, 0x8000_A000).unwrap();

    // two pages, the first one only at a word that was never compiled
    assert_eq!(recomp.invalidate_range(0x8000_A100, 0x1000), 0);
    assert_eq!(recomp.invalidate_range(0x8000_9FFC, 8), 1);
    assert!(recomp.pages().is_invalid(page_of(0x8000_A000)));
}

#[cfg(unix)]
#[test]
fn mapped_arena_holds_sealed_code() {
    let mut ram = ram_with(0xB000, &[ADDIU, ERET]);
    let mut recomp = Recompiler::with_arena(Settings::default(), BytecodeBackend::new(), DirectMapped, ExecutableArena::with_kind(ArenaKind::Mapped));

    let block = recomp.compile_block(&mut ram, 0x8000_B000).unwrap();
    let at = block.instructions()[0].local_addr;
    let records = decode_records(block.code());
    assert_eq!(records[at / 8].1, Record::Exec { word: ADDIU });
    assert_eq!(records[at / 8 + 1].1, Record::Exec { word: ERET });

    // recompiling after an invalidation unseals and reseals the region
    recomp.invalidate(0x8000_B000);
    let block = recomp.compile_block(&mut ram, 0x8000_B000).unwrap();
    assert_eq!(block.instructions()[0].op, Op::Addiu);
}
