use crate::assembler::Assembler;
use crate::block::Instruction;
use crate::CompileError;

/// Code generator plugged into the block compiler. The compiler decides what each slot is
/// and in which order slots are compiled; the backend only turns slots into bytes.
///
/// Every emit hook returns the number of bytes it wrote.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Called before any slot of a compile pass (or block init) is emitted
    fn begin_block(&mut self, _asm: &mut Assembler, _start: u32) {}

    /// Emit the body of one slot. For branches this is the condition test only; the delay
    /// slot and the jump itself follow through the other hooks.
    fn emit(&mut self, asm: &mut Assembler, inst: &mut Instruction) -> Result<usize, CompileError>;

    /// Per-instruction prologue used when comparing against another core
    fn emit_debug(&mut self, asm: &mut Assembler, inst: &Instruction) -> Result<usize, CompileError>;

    /// Tail of an internal or idle branch, after its delay slot: jump to the target slot
    fn insert_delay_slot_trampoline(&mut self, asm: &mut Assembler, branch: &Instruction, target: u32) -> Result<usize, CompileError>;

    /// Tail of a branch leaving the block, after its delay slot. `target` is None when the
    /// destination is only known at run time (JR, JALR).
    fn insert_exit_stub(&mut self, asm: &mut Assembler, branch: &Instruction, target: Option<u32>) -> Result<usize, CompileError>;

    /// A compile pass that stopped before the end of the block falls through to `next`
    fn link_subblock(&mut self, asm: &mut Assembler, next: u32) -> Result<usize, CompileError>;

    /// Flush any guest registers cached in host registers
    fn release_register_state(&mut self, _asm: &mut Assembler) {}

    /// Resolve every recorded jump fixup now that slot offsets are known
    fn link_block(&mut self, asm: &mut Assembler, insts: &[Instruction], start: u32) -> Result<(), CompileError>;
}
