//! The opcode decode tree. The primary table is indexed by the top six bits of the word; some
//! of its entries descend into a secondary table indexed by another field, at most three levels
//! deep (COP1 -> fmt -> funct, COP0 -> TLB -> funct).

use crate::decode::{self, Operands};
use crate::ops::{BranchKind, Cond, FloatOp, Fmt, Op};

/// Which field decoder an instruction goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    None,
    R,
    I,
    J,
    Cf,
    Lf,
}

impl Form {
    pub fn decode(self, word: u32) -> Operands {
        match self {
            Form::None => Operands::None,
            Form::R    => decode::r_type(word),
            Form::I    => decode::i_type(word),
            Form::J    => decode::j_type(word),
            Form::Cf   => decode::cf_type(word),
            Form::Lf   => decode::lf_type(word),
        }
    }
}

/// Destination GPR field that, when zero, turns the instruction into a NOP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    None,
    Rd,
    Rt,
}

impl Dest {
    pub fn is_zero(self, operands: &Operands) -> bool {
        match self {
            Dest::None => false,
            Dest::Rd   => operands.rd() == Some(0),
            Dest::Rt   => operands.rt() == Some(0),
        }
    }
}

/// A leaf of the decode tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Op(Op, Form, Dest),
    Branch(BranchKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Special,
    Regimm,
    Cop0,
    Tlb,
    Cop1,
    Bc,
    Single,
    Double,
    Word,
    Long,
}

impl Table {
    fn index(self, word: u32) -> usize {
        match self {
            Table::Special | Table::Tlb
                | Table::Single | Table::Double | Table::Word | Table::Long => decode::funct(word),
            Table::Regimm => decode::rt(word) as usize,
            Table::Cop0 | Table::Cop1 => decode::rs(word) as usize,
            Table::Bc => ((word >> 16) & 0x03) as usize,
        }
    }

    fn entries(self) -> &'static [Entry] {
        match self {
            Table::Special => &SPECIAL_TABLE,
            Table::Regimm  => &REGIMM_TABLE,
            Table::Cop0    => &COP0_TABLE,
            Table::Tlb     => &TLB_TABLE,
            Table::Cop1    => &COP1_TABLE,
            Table::Bc      => &BC_TABLE,
            Table::Single  => &SINGLE_TABLE,
            Table::Double  => &DOUBLE_TABLE,
            Table::Word    => &WORD_TABLE,
            Table::Long    => &LONG_TABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Handler(Handler),
    Table(Table),
}

/// Walk the decode tree down to the handler for `word`
pub fn lookup(word: u32) -> Handler {
    let mut entry = PRIMARY_TABLE[decode::opcode(word)];
    loop {
        match entry {
            Entry::Handler(handler) => return handler,
            Entry::Table(table) => entry = table.entries()[table.index(word)],
        }
    }
}

// R-form writing rd
const fn r(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::R, Dest::Rd)) }
// R-form without a GPR destination
const fn rx(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::R, Dest::None)) }
// coprocessor to GPR moves: R-form writing rt
const fn rt(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::R, Dest::Rt)) }
// I-form writing rt
const fn i(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::I, Dest::Rt)) }
// I-form without a GPR destination
const fn ix(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::I, Dest::None)) }
const fn lf(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::Lf, Dest::None)) }
const fn bare(op: Op) -> Entry { Entry::Handler(Handler::Op(op, Form::None, Dest::None)) }
const fn b(kind: BranchKind) -> Entry { Entry::Handler(Handler::Branch(kind)) }
const fn t(table: Table) -> Entry { Entry::Table(table) }
const fn s(op: FloatOp) -> Entry { Entry::Handler(Handler::Op(Op::Float(Fmt::S, op), Form::Cf, Dest::None)) }
const fn d(op: FloatOp) -> Entry { Entry::Handler(Handler::Op(Op::Float(Fmt::D, op), Form::Cf, Dest::None)) }
const fn w(op: FloatOp) -> Entry { Entry::Handler(Handler::Op(Op::Float(Fmt::W, op), Form::Cf, Dest::None)) }
const fn l(op: FloatOp) -> Entry { Entry::Handler(Handler::Op(Op::Float(Fmt::L, op), Form::Cf, Dest::None)) }

const RSV: Entry = bare(Op::Reserved);
const NI : Entry = bare(Op::NotImplemented);
// not implemented, but the immediate fields are still decoded
const NII: Entry = Entry::Handler(Handler::Op(Op::NotImplemented, Form::I, Dest::None));

use BranchKind::*;
use FloatOp::*;

static PRIMARY_TABLE: [Entry; 64] = [
                //  _000                 _001                  _010          _011           _100              _101             _110              _111
    /* 000_ */   t(Table::Special) , t(Table::Regimm)  , b(J)        , b(Jal)       , b(Beq)         , b(Bne)         , b(Blez)        , b(Bgtz)        ,
    /* 001_ */   i(Op::Addi)       , i(Op::Addiu)      , i(Op::Slti) , i(Op::Sltiu) , i(Op::Andi)    , i(Op::Ori)     , i(Op::Xori)    , i(Op::Lui)     ,
    /* 010_ */   t(Table::Cop0)    , t(Table::Cop1)    , RSV         , RSV          , b(Beql)        , b(Bnel)        , b(Blezl)       , b(Bgtzl)       ,
    /* 011_ */   i(Op::Daddi)      , i(Op::Daddiu)     , i(Op::Ldl)  , i(Op::Ldr)   , RSV            , RSV            , RSV            , RSV            ,
    /* 100_ */   i(Op::Lb)         , i(Op::Lh)         , i(Op::Lwl)  , i(Op::Lw)    , i(Op::Lbu)     , i(Op::Lhu)     , i(Op::Lwr)     , i(Op::Lwu)     ,
    /* 101_ */   ix(Op::Sb)        , ix(Op::Sh)        , ix(Op::Swl) , ix(Op::Sw)   , ix(Op::Sdl)    , ix(Op::Sdr)    , ix(Op::Swr)    , bare(Op::Cache),
    /* 110_ */   i(Op::Ll)         , lf(Op::Lwc1)      , RSV         , RSV          , NII            , lf(Op::Ldc1)   , RSV            , i(Op::Ld)      ,
    /* 111_ */   i(Op::Sc)         , lf(Op::Swc1)      , RSV         , RSV          , NII            , lf(Op::Sdc1)   , RSV            , ix(Op::Sd)     ,
];

static SPECIAL_TABLE: [Entry; 64] = [
                //  _000          _001           _010          _011          _100              _101            _110            _111
    /* 000_ */   r(Op::Sll)   , RSV          , r(Op::Srl)  , r(Op::Sra)  , r(Op::Sllv)     , RSV           , r(Op::Srlv)   , r(Op::Srav)   ,
    /* 001_ */   ix(Op::Jr)   , rx(Op::Jalr) , RSV         , RSV         , bare(Op::Syscall), NI            , RSV           , bare(Op::Sync),
    /* 010_ */   r(Op::Mfhi)  , rx(Op::Mthi) , r(Op::Mflo) , rx(Op::Mtlo), r(Op::Dsllv)    , RSV           , r(Op::Dsrlv)  , r(Op::Dsrav)  ,
    /* 011_ */   rx(Op::Mult) , rx(Op::Multu), rx(Op::Div) , rx(Op::Divu), rx(Op::Dmult)   , rx(Op::Dmultu), rx(Op::Ddiv)  , rx(Op::Ddivu) ,
    /* 100_ */   r(Op::Add)   , r(Op::Addu)  , r(Op::Sub)  , r(Op::Subu) , r(Op::And)      , r(Op::Or)     , r(Op::Xor)    , r(Op::Nor)    ,
    /* 101_ */   RSV          , RSV          , r(Op::Slt)  , r(Op::Sltu) , r(Op::Dadd)     , r(Op::Daddu)  , r(Op::Dsub)   , r(Op::Dsubu)  ,
    /* 110_ */   NI           , NI           , NI          , NI          , rx(Op::Teq)     , RSV           , NI            , RSV           ,
    /* 111_ */   r(Op::Dsll)  , RSV          , r(Op::Dsrl) , r(Op::Dsra) , r(Op::Dsll32)   , RSV           , r(Op::Dsrl32) , r(Op::Dsra32) ,
];

static REGIMM_TABLE: [Entry; 32] = [
                //  _000         _001         _010          _011          _100  _101  _110  _111
    /* 00_ */    b(Bltz)    , b(Bgez)    , b(Bltzl)   , b(Bgezl)    , RSV , RSV , RSV , RSV ,
    /* 01_ */    NI         , NI         , NI         , NI          , NI  , RSV , NI  , RSV ,
    /* 10_ */    b(Bltzal)  , b(Bgezal)  , b(Bltzall) , b(Bgezall)  , RSV , RSV , RSV , RSV ,
    /* 11_ */    RSV        , RSV        , RSV        , RSV         , RSV , RSV , RSV , RSV ,
];

static COP0_TABLE: [Entry; 32] = [
                //  _000        _001  _010  _011  _100          _101  _110  _111
    /* 00_ */    rt(Op::Mfc0) , RSV , RSV , RSV , rx(Op::Mtc0) , RSV , RSV , RSV ,
    /* 01_ */    RSV          , RSV , RSV , RSV , RSV          , RSV , RSV , RSV ,
    /* 10_ */    t(Table::Tlb), RSV , RSV , RSV , RSV          , RSV , RSV , RSV ,
    /* 11_ */    RSV          , RSV , RSV , RSV , RSV          , RSV , RSV , RSV ,
];

static TLB_TABLE: [Entry; 64] = [
                //  _000           _001            _010              _011  _100  _101  _110              _111
    /* 000_ */   RSV            , bare(Op::Tlbr) , bare(Op::Tlbwi) , RSV , RSV , RSV , bare(Op::Tlbwr) , RSV ,
    /* 001_ */   bare(Op::Tlbp) , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 010_ */   RSV            , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 011_ */   bare(Op::Eret) , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 100_ */   RSV            , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 101_ */   RSV            , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 110_ */   RSV            , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
    /* 111_ */   RSV            , RSV            , RSV             , RSV , RSV , RSV , RSV             , RSV ,
];

static COP1_TABLE: [Entry; 32] = [
                //  _000             _001             _010          _011  _100            _101            _110           _111
    /* 00_ */    rt(Op::Mfc1)     , rt(Op::Dmfc1)   , rt(Op::Cfc1), RSV , rx(Op::Mtc1)  , rx(Op::Dmtc1) , rx(Op::Ctc1) , RSV ,
    /* 01_ */    t(Table::Bc)     , RSV             , RSV         , RSV , RSV           , RSV           , RSV          , RSV ,
    /* 10_ */    t(Table::Single) , t(Table::Double), RSV         , RSV , t(Table::Word), t(Table::Long), RSV          , RSV ,
    /* 11_ */    RSV              , RSV             , RSV         , RSV , RSV           , RSV           , RSV          , RSV ,
];

static BC_TABLE: [Entry; 4] = [
    b(Bc1f), b(Bc1t), b(Bc1fl), b(Bc1tl),
];

static SINGLE_TABLE: [Entry; 64] = [
                //  _000             _001              _010             _011             _100             _101             _110             _111
    /* 000_ */   s(Add)          , s(Sub)          , s(Mul)         , s(Div)         , s(Sqrt)        , s(Abs)         , s(Mov)         , s(Neg)         ,
    /* 001_ */   s(RoundL)       , s(TruncL)       , s(CeilL)       , s(FloorL)      , s(RoundW)      , s(TruncW)      , s(CeilW)       , s(FloorW)      ,
    /* 010_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 011_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 100_ */   RSV             , s(CvtD)         , RSV            , RSV            , s(CvtW)        , s(CvtL)        , RSV            , RSV            ,
    /* 101_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 110_ */   s(C(Cond::F))   , s(C(Cond::Un))  , s(C(Cond::Eq)) , s(C(Cond::Ueq)), s(C(Cond::Olt)), s(C(Cond::Ult)), s(C(Cond::Ole)), s(C(Cond::Ule)),
    /* 111_ */   s(C(Cond::Sf))  , s(C(Cond::Ngle)), s(C(Cond::Seq)), s(C(Cond::Ngl)), s(C(Cond::Lt)) , s(C(Cond::Nge)), s(C(Cond::Le)) , s(C(Cond::Ngt)),
];

static DOUBLE_TABLE: [Entry; 64] = [
                //  _000             _001              _010             _011             _100             _101             _110             _111
    /* 000_ */   d(Add)          , d(Sub)          , d(Mul)         , d(Div)         , d(Sqrt)        , d(Abs)         , d(Mov)         , d(Neg)         ,
    /* 001_ */   d(RoundL)       , d(TruncL)       , d(CeilL)       , d(FloorL)      , d(RoundW)      , d(TruncW)      , d(CeilW)       , d(FloorW)      ,
    /* 010_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 011_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 100_ */   d(CvtS)         , RSV             , RSV            , RSV            , d(CvtW)        , d(CvtL)        , RSV            , RSV            ,
    /* 101_ */   RSV             , RSV             , RSV            , RSV            , RSV            , RSV            , RSV            , RSV            ,
    /* 110_ */   d(C(Cond::F))   , d(C(Cond::Un))  , d(C(Cond::Eq)) , d(C(Cond::Ueq)), d(C(Cond::Olt)), d(C(Cond::Ult)), d(C(Cond::Ole)), d(C(Cond::Ule)),
    /* 111_ */   d(C(Cond::Sf))  , d(C(Cond::Ngle)), d(C(Cond::Seq)), d(C(Cond::Ngl)), d(C(Cond::Lt)) , d(C(Cond::Nge)), d(C(Cond::Le)) , d(C(Cond::Ngt)),
];

// fixed-point sources only convert
static WORD_TABLE: [Entry; 64] = [
                //  _000      _001      _010  _011  _100  _101  _110  _111
    /* 000_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 001_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 010_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 011_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 100_ */   w(CvtS)  , w(CvtD)  , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 101_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 110_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 111_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
];

static LONG_TABLE: [Entry; 64] = [
                //  _000      _001      _010  _011  _100  _101  _110  _111
    /* 000_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 001_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 010_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 011_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 100_ */   l(CvtS)  , l(CvtD)  , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 101_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 110_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
    /* 111_ */   RSV      , RSV      , RSV , RSV , RSV , RSV , RSV , RSV ,
];
