/// Opcode table for the script interpreter
///
/// An opcode byte is `(op << 1) | size_bit`. When the size bit is set, the
/// variable-size operands of the instruction are one byte wide, otherwise two
/// (little-endian). Ops 0x40..=0x7F are the variable access family and carry
/// their own bit fields, see [`VarAccess`].
use bitreader::BitReader;

/// How one operand is stored in the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    /// Always a single unsigned byte
    Byte,
    /// Unsigned, one or two bytes depending on the size bit
    Var,
    /// Signed, one or two bytes depending on the size bit (sign-extended)
    SVar,
}

use OperandFormat::{Byte, SVar, Var};

/// Which variable space an access addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSpace {
    Global = 0,
    Local = 1,
    Temp = 2,
    Param = 3,
}

impl VarSpace {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => VarSpace::Global,
            1 => VarSpace::Local,
            2 => VarSpace::Temp,
            _ => VarSpace::Param,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VarSpace::Global => "global",
            VarSpace::Local => "local",
            VarSpace::Temp => "temp",
            VarSpace::Param => "param",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Load,
    Store,
    Inc,
    Dec,
}

/// Decoded variable access opcode.
///
/// Bit layout of the opcode byte: `1 oo i s vv b`
/// (oo operation, i index by accumulator, s stack instead of accumulator,
/// vv variable space, b operand size bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarAccess {
    pub op: AccessOp,
    pub indexed: bool,
    pub stack: bool,
    pub space: VarSpace,
}

impl VarAccess {
    pub fn decode(byte: u8) -> Option<Self> {
        let bytes = [byte];
        let mut br = BitReader::new(&bytes);
        if br.read_u8(1).ok()? != 1 {
            return None;
        }
        let op = match br.read_u8(2).ok()? {
            0 => AccessOp::Load,
            1 => AccessOp::Store,
            2 => AccessOp::Inc,
            _ => AccessOp::Dec,
        };
        let indexed = br.read_bool().ok()?;
        let stack = br.read_bool().ok()?;
        let space = VarSpace::from_bits(br.read_u8(2).ok()?);
        Some(VarAccess {
            op,
            indexed,
            stack,
            space,
        })
    }

    /// Opcode byte for this access (size bit clear)
    pub fn encode(&self) -> u8 {
        let op = match self.op {
            AccessOp::Load => 0,
            AccessOp::Store => 1,
            AccessOp::Inc => 2,
            AccessOp::Dec => 3,
        };
        0x80 | op << 5 | (self.indexed as u8) << 4 | (self.stack as u8) << 3 | (self.space as u8) << 1
    }

    /// Mnemonic such as `lag`, `sst`, `+api`
    pub fn mnemonic(&self) -> String {
        let op = match self.op {
            AccessOp::Load => 'l',
            AccessOp::Store => 's',
            AccessOp::Inc => '+',
            AccessOp::Dec => '-',
        };
        let target = if self.stack { 's' } else { 'a' };
        let space = ['g', 'l', 't', 'p'][self.space as usize];
        let mut name = format!("{op}{target}{space}");
        if self.indexed {
            name.push('i');
        }
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Bnot,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shr,
    Shl,
    Xor,
    And,
    Or,
    Neg,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Ugt,
    Uge,
    Ult,
    Ule,
    Bt,
    Bnt,
    Jmp,
    Ldi,
    Push,
    Pushi,
    Toss,
    Dup,
    Link,
    Call,
    Callk,
    Callb,
    Calle,
    Ret,
    Send,
    Class,
    SelfSend,
    Super,
    Rest,
    Lea,
    SelfId,
    Pprev,
    PToA,
    AToP,
    PToS,
    SToP,
    IpToA,
    DpToA,
    IpToS,
    DpToS,
    Lofsa,
    Lofss,
    Push0,
    Push1,
    Push2,
    PushSelf,
    Access(VarAccess),
}

impl Op {
    /// Decode the op part of an opcode byte; `None` for unassigned ops.
    pub fn from_byte(byte: u8) -> Option<Op> {
        Some(match byte >> 1 {
            0x00 => Op::Bnot,
            0x01 => Op::Add,
            0x02 => Op::Sub,
            0x03 => Op::Mul,
            0x04 => Op::Div,
            0x05 => Op::Mod,
            0x06 => Op::Shr,
            0x07 => Op::Shl,
            0x08 => Op::Xor,
            0x09 => Op::And,
            0x0a => Op::Or,
            0x0b => Op::Neg,
            0x0c => Op::Not,
            0x0d => Op::Eq,
            0x0e => Op::Ne,
            0x0f => Op::Gt,
            0x10 => Op::Ge,
            0x11 => Op::Lt,
            0x12 => Op::Le,
            0x13 => Op::Ugt,
            0x14 => Op::Uge,
            0x15 => Op::Ult,
            0x16 => Op::Ule,
            0x17 => Op::Bt,
            0x18 => Op::Bnt,
            0x19 => Op::Jmp,
            0x1a => Op::Ldi,
            0x1b => Op::Push,
            0x1c => Op::Pushi,
            0x1d => Op::Toss,
            0x1e => Op::Dup,
            0x1f => Op::Link,
            0x20 => Op::Call,
            0x21 => Op::Callk,
            0x22 => Op::Callb,
            0x23 => Op::Calle,
            0x24 => Op::Ret,
            0x25 => Op::Send,
            0x28 => Op::Class,
            0x2a => Op::SelfSend,
            0x2b => Op::Super,
            0x2c => Op::Rest,
            0x2d => Op::Lea,
            0x2e => Op::SelfId,
            0x30 => Op::Pprev,
            0x31 => Op::PToA,
            0x32 => Op::AToP,
            0x33 => Op::PToS,
            0x34 => Op::SToP,
            0x35 => Op::IpToA,
            0x36 => Op::DpToA,
            0x37 => Op::IpToS,
            0x38 => Op::DpToS,
            0x39 => Op::Lofsa,
            0x3a => Op::Lofss,
            0x3b => Op::Push0,
            0x3c => Op::Push1,
            0x3d => Op::Push2,
            0x3e => Op::PushSelf,
            0x40..=0x7f => Op::Access(VarAccess::decode(byte)?),
            _ => return None,
        })
    }

    /// Op number (opcode byte without the size bit, shifted down)
    pub fn number(&self) -> u8 {
        match self {
            Op::Bnot => 0x00,
            Op::Add => 0x01,
            Op::Sub => 0x02,
            Op::Mul => 0x03,
            Op::Div => 0x04,
            Op::Mod => 0x05,
            Op::Shr => 0x06,
            Op::Shl => 0x07,
            Op::Xor => 0x08,
            Op::And => 0x09,
            Op::Or => 0x0a,
            Op::Neg => 0x0b,
            Op::Not => 0x0c,
            Op::Eq => 0x0d,
            Op::Ne => 0x0e,
            Op::Gt => 0x0f,
            Op::Ge => 0x10,
            Op::Lt => 0x11,
            Op::Le => 0x12,
            Op::Ugt => 0x13,
            Op::Uge => 0x14,
            Op::Ult => 0x15,
            Op::Ule => 0x16,
            Op::Bt => 0x17,
            Op::Bnt => 0x18,
            Op::Jmp => 0x19,
            Op::Ldi => 0x1a,
            Op::Push => 0x1b,
            Op::Pushi => 0x1c,
            Op::Toss => 0x1d,
            Op::Dup => 0x1e,
            Op::Link => 0x1f,
            Op::Call => 0x20,
            Op::Callk => 0x21,
            Op::Callb => 0x22,
            Op::Calle => 0x23,
            Op::Ret => 0x24,
            Op::Send => 0x25,
            Op::Class => 0x28,
            Op::SelfSend => 0x2a,
            Op::Super => 0x2b,
            Op::Rest => 0x2c,
            Op::Lea => 0x2d,
            Op::SelfId => 0x2e,
            Op::Pprev => 0x30,
            Op::PToA => 0x31,
            Op::AToP => 0x32,
            Op::PToS => 0x33,
            Op::SToP => 0x34,
            Op::IpToA => 0x35,
            Op::DpToA => 0x36,
            Op::IpToS => 0x37,
            Op::DpToS => 0x38,
            Op::Lofsa => 0x39,
            Op::Lofss => 0x3a,
            Op::Push0 => 0x3b,
            Op::Push1 => 0x3c,
            Op::Push2 => 0x3d,
            Op::PushSelf => 0x3e,
            Op::Access(access) => access.encode() >> 1,
        }
    }

    /// Opcode byte with the given operand width
    pub fn byte(&self, byte_operands: bool) -> u8 {
        self.number() << 1 | byte_operands as u8
    }

    pub fn operand_formats(&self) -> &'static [OperandFormat] {
        match self {
            Op::Bt | Op::Bnt | Op::Jmp | Op::Ldi | Op::Pushi | Op::Lofsa | Op::Lofss => &[SVar],
            Op::Link | Op::Class => &[Var],
            Op::Call => &[SVar, Byte],
            Op::Callk | Op::Callb => &[Var, Byte],
            Op::Calle => &[Var, Var, Byte],
            Op::Send | Op::SelfSend | Op::Rest => &[Byte],
            Op::Super => &[Var, Byte],
            Op::Lea => &[Var, Var],
            Op::PToA
            | Op::AToP
            | Op::PToS
            | Op::SToP
            | Op::IpToA
            | Op::DpToA
            | Op::IpToS
            | Op::DpToS => &[Var],
            Op::Access(_) => &[Var],
            _ => &[],
        }
    }

    pub fn name(&self) -> String {
        let name = match self {
            Op::Bnot => "bnot",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Mod => "mod",
            Op::Shr => "shr",
            Op::Shl => "shl",
            Op::Xor => "xor",
            Op::And => "and",
            Op::Or => "or",
            Op::Neg => "neg",
            Op::Not => "not",
            Op::Eq => "eq?",
            Op::Ne => "ne?",
            Op::Gt => "gt?",
            Op::Ge => "ge?",
            Op::Lt => "lt?",
            Op::Le => "le?",
            Op::Ugt => "ugt?",
            Op::Uge => "uge?",
            Op::Ult => "ult?",
            Op::Ule => "ule?",
            Op::Bt => "bt",
            Op::Bnt => "bnt",
            Op::Jmp => "jmp",
            Op::Ldi => "ldi",
            Op::Push => "push",
            Op::Pushi => "pushi",
            Op::Toss => "toss",
            Op::Dup => "dup",
            Op::Link => "link",
            Op::Call => "call",
            Op::Callk => "callk",
            Op::Callb => "callb",
            Op::Calle => "calle",
            Op::Ret => "ret",
            Op::Send => "send",
            Op::Class => "class",
            Op::SelfSend => "self",
            Op::Super => "super",
            Op::Rest => "&rest",
            Op::Lea => "lea",
            Op::SelfId => "selfID",
            Op::Pprev => "pprev",
            Op::PToA => "pToa",
            Op::AToP => "aTop",
            Op::PToS => "pTos",
            Op::SToP => "sTop",
            Op::IpToA => "ipToa",
            Op::DpToA => "dpToa",
            Op::IpToS => "ipTos",
            Op::DpToS => "dpTos",
            Op::Lofsa => "lofsa",
            Op::Lofss => "lofss",
            Op::Push0 => "push0",
            Op::Push1 => "push1",
            Op::Push2 => "push2",
            Op::PushSelf => "pushSelf",
            Op::Access(access) => return access.mnemonic(),
        };
        name.to_string()
    }
}
