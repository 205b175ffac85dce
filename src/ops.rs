use std::fmt;

/// Where a branch lands relative to the block that contains it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    // inside the same block, compiled as a direct jump
    Internal,
    // branch to itself with a zero delay slot: an idle loop
    Idle,
    // leaves the block, or is the block's last slot
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    J, Jal,
    Beq, Bne, Blez, Bgtz,
    Beql, Bnel, Blezl, Bgtzl,
    Bltz, Bgez, Bltzl, Bgezl,
    Bltzal, Bgezal, Bltzall, Bgezall,
    Bc1f, Bc1t, Bc1fl, Bc1tl,
}

impl BranchKind {
    /// J and JAL use a 26-bit index within the current 256MiB segment instead of a PC-relative offset
    pub fn is_absolute(self) -> bool {
        matches!(self, BranchKind::J | BranchKind::Jal)
    }

    pub fn name(self) -> &'static str {
        use BranchKind::*;
        match self {
            J       => "j",       Jal     => "jal",
            Beq     => "beq",     Bne     => "bne",     Blez    => "blez",    Bgtz    => "bgtz",
            Beql    => "beql",    Bnel    => "bnel",    Blezl   => "blezl",   Bgtzl   => "bgtzl",
            Bltz    => "bltz",    Bgez    => "bgez",    Bltzl   => "bltzl",   Bgezl   => "bgezl",
            Bltzal  => "bltzal",  Bgezal  => "bgezal",  Bltzall => "bltzall", Bgezall => "bgezall",
            Bc1f    => "bc1f",    Bc1t    => "bc1t",    Bc1fl   => "bc1fl",   Bc1tl   => "bc1tl",
        }
    }
}

/// COP1 operand format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fmt {
    S, D, W, L,
}

impl Fmt {
    pub fn suffix(self) -> &'static str {
        match self {
            Fmt::S => "s", Fmt::D => "d", Fmt::W => "w", Fmt::L => "l",
        }
    }
}

/// C.cond.fmt conditions, in funct & 0xF order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    F, Un, Eq, Ueq, Olt, Ult, Ole, Ule,
    Sf, Ngle, Seq, Ngl, Lt, Nge, Le, Ngt,
}

impl Cond {
    pub fn name(self) -> &'static str {
        use Cond::*;
        match self {
            F  => "f",  Un   => "un",   Eq  => "eq",  Ueq => "ueq", Olt => "olt", Ult => "ult", Ole => "ole", Ule => "ule",
            Sf => "sf", Ngle => "ngle", Seq => "seq", Ngl => "ngl", Lt  => "lt",  Nge => "nge", Le  => "le",  Ngt => "ngt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatOp {
    Add, Sub, Mul, Div, Sqrt, Abs, Mov, Neg,
    RoundL, TruncL, CeilL, FloorL, RoundW, TruncW, CeilW, FloorW,
    CvtS, CvtD, CvtW, CvtL,
    C(Cond),
}

impl FloatOp {
    pub fn name(self) -> &'static str {
        use FloatOp::*;
        match self {
            Add    => "add",     Sub    => "sub",     Mul   => "mul",    Div    => "div",
            Sqrt   => "sqrt",    Abs    => "abs",     Mov   => "mov",    Neg    => "neg",
            RoundL => "round.l", TruncL => "trunc.l", CeilL => "ceil.l", FloorL => "floor.l",
            RoundW => "round.w", TruncW => "trunc.w", CeilW => "ceil.w", FloorW => "floor.w",
            CvtS   => "cvt.s",   CvtD   => "cvt.d",   CvtW  => "cvt.w",  CvtL   => "cvt.l",
            C(cond) => cond.name(),
        }
    }
}

/// Operation tag of a decoded instruction slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Op {
    // slot bookkeeping
    #[default]
    NotCompiled,
    NotCompiled2,
    FinBlock,
    Reserved,
    NotImplemented,
    Nop,

    // SPECIAL
    Sll, Srl, Sra, Sllv, Srlv, Srav,
    Jr, Jalr, Syscall, Sync,
    Mfhi, Mthi, Mflo, Mtlo,
    Dsllv, Dsrlv, Dsrav,
    Mult, Multu, Div, Divu, Dmult, Dmultu, Ddiv, Ddivu,
    Add, Addu, Sub, Subu, And, Or, Xor, Nor,
    Slt, Sltu, Dadd, Daddu, Dsub, Dsubu,
    Teq,
    Dsll, Dsrl, Dsra, Dsll32, Dsrl32, Dsra32,

    // every conditional and unconditional PC-relative/absolute branch
    Branch(BranchKind, Target),

    // immediates
    Addi, Addiu, Slti, Sltiu, Andi, Ori, Xori, Lui, Daddi, Daddiu,

    // loads and stores
    Ldl, Ldr, Lb, Lh, Lwl, Lw, Lbu, Lhu, Lwr, Lwu,
    Sb, Sh, Swl, Sw, Sdl, Sdr, Swr, Cache,
    Ll, Lwc1, Ldc1, Ld, Sc, Swc1, Sdc1, Sd,

    // COP0
    Mfc0, Mtc0, Tlbr, Tlbwi, Tlbwr, Tlbp, Eret,

    // COP1
    Mfc1, Dmfc1, Cfc1, Mtc1, Dmtc1, Ctc1,
    Float(Fmt, FloatOp),
}

impl Op {
    /// Instructions with a delay slot: every branch variant plus JR and JALR
    pub fn is_jump(self) -> bool {
        matches!(self, Op::Branch(..) | Op::Jr | Op::Jalr)
    }

    /// Placeholder slots that trigger compilation when reached
    pub fn is_not_compiled(self) -> bool {
        matches!(self, Op::NotCompiled | Op::NotCompiled2)
    }

    pub fn target(self) -> Option<Target> {
        match self {
            Op::Branch(_, target) => Some(target),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Op::*;
        match self {
            NotCompiled => "<notcompiled>", NotCompiled2 => "<notcompiled2>", FinBlock => "<fin_block>",
            Reserved => "<reserved>", NotImplemented => "<ni>", Nop => "nop",

            Sll   => "sll",   Srl   => "srl",   Sra   => "sra",   Sllv  => "sllv",  Srlv   => "srlv",  Srav  => "srav",
            Jr    => "jr",    Jalr  => "jalr",  Syscall => "syscall", Sync => "sync",
            Mfhi  => "mfhi",  Mthi  => "mthi",  Mflo  => "mflo",  Mtlo  => "mtlo",
            Dsllv => "dsllv", Dsrlv => "dsrlv", Dsrav => "dsrav",
            Mult  => "mult",  Multu => "multu", Div   => "div",   Divu  => "divu",
            Dmult => "dmult", Dmultu => "dmultu", Ddiv => "ddiv", Ddivu => "ddivu",
            Add   => "add",   Addu  => "addu",  Sub   => "sub",   Subu  => "subu",
            And   => "and",   Or    => "or",    Xor   => "xor",   Nor   => "nor",
            Slt   => "slt",   Sltu  => "sltu",  Dadd  => "dadd",  Daddu => "daddu", Dsub => "dsub", Dsubu => "dsubu",
            Teq   => "teq",
            Dsll  => "dsll",  Dsrl  => "dsrl",  Dsra  => "dsra",  Dsll32 => "dsll32", Dsrl32 => "dsrl32", Dsra32 => "dsra32",

            Branch(kind, _) => kind.name(),

            Addi  => "addi",  Addiu => "addiu", Slti  => "slti",  Sltiu => "sltiu", Andi => "andi",
            Ori   => "ori",   Xori  => "xori",  Lui   => "lui",   Daddi => "daddi", Daddiu => "daddiu",

            Ldl   => "ldl",   Ldr   => "ldr",   Lb    => "lb",    Lh    => "lh",    Lwl  => "lwl",
            Lw    => "lw",    Lbu   => "lbu",   Lhu   => "lhu",   Lwr   => "lwr",   Lwu  => "lwu",
            Sb    => "sb",    Sh    => "sh",    Swl   => "swl",   Sw    => "sw",
            Sdl   => "sdl",   Sdr   => "sdr",   Swr   => "swr",   Cache => "cache",
            Ll    => "ll",    Lwc1  => "lwc1",  Ldc1  => "ldc1",  Ld    => "ld",
            Sc    => "sc",    Swc1  => "swc1",  Sdc1  => "sdc1",  Sd    => "sd",

            Mfc0  => "mfc0",  Mtc0  => "mtc0",
            Tlbr  => "tlbr",  Tlbwi => "tlbwi", Tlbwr => "tlbwr", Tlbp  => "tlbp",  Eret => "eret",

            Mfc1  => "mfc1",  Dmfc1 => "dmfc1", Cfc1  => "cfc1",
            Mtc1  => "mtc1",  Dmtc1 => "dmtc1", Ctc1  => "ctc1",
            Float(..) => "<cop1>",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Float(fmt, FloatOp::C(cond)) => write!(f, "c.{}.{}", cond.name(), fmt.suffix()),
            Op::Float(fmt, op) => write!(f, "{}.{}", op.name(), fmt.suffix()),
            Op::Branch(kind, Target::Idle) => write!(f, "{} (idle)", kind.name()),
            Op::Branch(kind, Target::Out) => write!(f, "{} (out)", kind.name()),
            op => f.write_str(op.mnemonic()),
        }
    }
}
