// Field decoders. Each takes the raw 32-bit big-endian word and pulls out the operand fields
// for one instruction form.

/// Decoded operand fields of one instruction slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operands {
    #[default]
    None,

    // register form. rd is the destination register number, or the COP0/COP1 register
    // number for the coprocessor moves.
    R { rs: u8, rt: u8, rd: u8, sa: u8 },

    // immediate form, immediate sign extended from 16 bits
    I { rs: u8, rt: u8, immediate: i64 },

    // 26-bit jump index
    J { inst_index: u32 },

    // COP1 computational form
    Cf { ft: u8, fs: u8, fd: u8 },

    // COP1 load/store form. offset is kept as the raw 16-bit field
    Lf { base: u8, ft: u8, offset: u16 },
}

impl Operands {
    pub fn rd(&self) -> Option<u8> {
        match *self {
            Operands::R { rd, .. } => Some(rd),
            _ => None,
        }
    }

    pub fn rt(&self) -> Option<u8> {
        match *self {
            Operands::R { rt, .. } | Operands::I { rt, .. } => Some(rt),
            _ => None,
        }
    }
}

#[inline(always)]
pub fn opcode(word: u32) -> usize {
    (word >> 26) as usize
}

#[inline(always)]
pub fn rs(word: u32) -> u8 {
    ((word >> 21) & 0x1F) as u8
}

#[inline(always)]
pub fn rt(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}

#[inline(always)]
pub fn rd(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}

#[inline(always)]
pub fn sa(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}

#[inline(always)]
pub fn funct(word: u32) -> usize {
    (word & 0x3F) as usize
}

pub fn r_type(word: u32) -> Operands {
    Operands::R { rs: rs(word), rt: rt(word), rd: rd(word), sa: sa(word) }
}

pub fn i_type(word: u32) -> Operands {
    Operands::I { rs: rs(word), rt: rt(word), immediate: word as u16 as i16 as i64 }
}

pub fn j_type(word: u32) -> Operands {
    Operands::J { inst_index: word & 0x03FF_FFFF }
}

pub fn cf_type(word: u32) -> Operands {
    Operands::Cf { ft: rt(word), fs: rd(word), fd: sa(word) }
}

pub fn lf_type(word: u32) -> Operands {
    Operands::Lf { base: rs(word), ft: rt(word), offset: word as u16 }
}
