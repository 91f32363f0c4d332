//! CIL opcode definitions, grouped by operand category.
//!
//! Each enum's discriminant is the opcode's wire encoding: one byte for values up to
//! 0xFF, or `0xFE` followed by the low byte for the two-byte opcodes (discriminants
//! `0xFExx`). Grouping by operand shape keeps the instruction buffer's encoding logic
//! a closed match per category instead of a single 200-arm table.
//!
//! ## Reference
//! - [ECMA-335 Partition III](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - CIL instruction set

/// Emits the 1- or 2-byte encoding of an opcode value.
pub(crate) fn emit_opcode(value: u16, buf: &mut Vec<u8>) {
    if value > 0xFF {
        buf.push((value >> 8) as u8);
    }
    buf.push((value & 0xFF) as u8);
}

/// Returns the encoded length of an opcode value (1 or 2 bytes).
pub(crate) fn opcode_len(value: u16) -> u32 {
    if value > 0xFF {
        2
    } else {
        1
    }
}

/// CIL instructions that take no operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Op {
    Nop = 0x00,
    Break = 0x01,
    LdArg0 = 0x02,
    LdArg1 = 0x03,
    LdArg2 = 0x04,
    LdArg3 = 0x05,
    LdLoc0 = 0x06,
    LdLoc1 = 0x07,
    LdLoc2 = 0x08,
    LdLoc3 = 0x09,
    StLoc0 = 0x0A,
    StLoc1 = 0x0B,
    StLoc2 = 0x0C,
    StLoc3 = 0x0D,
    LdNull = 0x14,
    LdcI4M1 = 0x15,
    LdcI40 = 0x16,
    LdcI41 = 0x17,
    LdcI42 = 0x18,
    LdcI43 = 0x19,
    LdcI44 = 0x1A,
    LdcI45 = 0x1B,
    LdcI46 = 0x1C,
    LdcI47 = 0x1D,
    LdcI48 = 0x1E,
    Dup = 0x25,
    Pop = 0x26,
    Ret = 0x2A,
    LdIndI1 = 0x46,
    LdIndU1 = 0x47,
    LdIndI2 = 0x48,
    LdIndU2 = 0x49,
    LdIndI4 = 0x4A,
    LdIndU4 = 0x4B,
    LdIndI8 = 0x4C,
    LdIndI = 0x4D,
    LdIndR4 = 0x4E,
    LdIndR8 = 0x4F,
    LdIndRef = 0x50,
    StIndRef = 0x51,
    StIndI1 = 0x52,
    StIndI2 = 0x53,
    StIndI4 = 0x54,
    StIndI8 = 0x55,
    StIndR4 = 0x56,
    StIndR8 = 0x57,
    Add = 0x58,
    Sub = 0x59,
    Mul = 0x5A,
    Div = 0x5B,
    DivUn = 0x5C,
    Rem = 0x5D,
    RemUn = 0x5E,
    And = 0x5F,
    Or = 0x60,
    Xor = 0x61,
    Shl = 0x62,
    Shr = 0x63,
    ShrUn = 0x64,
    Neg = 0x65,
    Not = 0x66,
    ConvI1 = 0x67,
    ConvI2 = 0x68,
    ConvI4 = 0x69,
    ConvI8 = 0x6A,
    ConvR4 = 0x6B,
    ConvR8 = 0x6C,
    ConvU4 = 0x6D,
    ConvU8 = 0x6E,
    ConvRUn = 0x76,
    Throw = 0x7A,
    ConvOvfI1Un = 0x82,
    ConvOvfI2Un = 0x83,
    ConvOvfI4Un = 0x84,
    ConvOvfI8Un = 0x85,
    ConvOvfU1Un = 0x86,
    ConvOvfU2Un = 0x87,
    ConvOvfU4Un = 0x88,
    ConvOvfU8Un = 0x89,
    ConvOvfIUn = 0x8A,
    ConvOvfUUn = 0x8B,
    LdLen = 0x8E,
    LdElemI1 = 0x90,
    LdElemU1 = 0x91,
    LdElemI2 = 0x92,
    LdElemU2 = 0x93,
    LdElemI4 = 0x94,
    LdElemU4 = 0x95,
    LdElemI8 = 0x96,
    LdElemI = 0x97,
    LdElemR4 = 0x98,
    LdElemR8 = 0x99,
    LdElemRef = 0x9A,
    StElemI = 0x9B,
    StElemI1 = 0x9C,
    StElemI2 = 0x9D,
    StElemI4 = 0x9E,
    StElemI8 = 0x9F,
    StElemR4 = 0xA0,
    StElemR8 = 0xA1,
    StElemRef = 0xA2,
    ConvOvfI1 = 0xB3,
    ConvOvfU1 = 0xB4,
    ConvOvfI2 = 0xB5,
    ConvOvfU2 = 0xB6,
    ConvOvfI4 = 0xB7,
    ConvOvfU4 = 0xB8,
    ConvOvfI8 = 0xB9,
    ConvOvfU8 = 0xBA,
    CkFinite = 0xC3,
    ConvU2 = 0xD1,
    ConvU1 = 0xD2,
    ConvI = 0xD3,
    ConvOvfI = 0xD4,
    ConvOvfU = 0xD5,
    AddOvf = 0xD6,
    AddOvfUn = 0xD7,
    MulOvf = 0xD8,
    MulOvfUn = 0xD9,
    SubOvf = 0xDA,
    SubOvfUn = 0xDB,
    EndFinally = 0xDC,
    StIndI = 0xDF,
    ConvU = 0xE0,
    ArgList = 0xFE00,
    Ceq = 0xFE01,
    Cgt = 0xFE02,
    CgtUn = 0xFE03,
    Clt = 0xFE04,
    CltUn = 0xFE05,
    LocAlloc = 0xFE0F,
    EndFilter = 0xFE11,
    Volatile = 0xFE13,
    Tail = 0xFE14,
    CpBlk = 0xFE17,
    InitBlk = 0xFE18,
    Rethrow = 0xFE1A,
    RefAnyType = 0xFE1D,
    Readonly = 0xFE1E,
}

/// CIL instructions that take an integer operand (argument/local index or constant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum IntOp {
    LdArgS = 0x0E,
    LdArgAS = 0x0F,
    StArgS = 0x10,
    LdLocS = 0x11,
    LdLocAS = 0x12,
    StLocS = 0x13,
    LdcI4S = 0x1F,
    LdcI4 = 0x20,
    LdArg = 0xFE09,
    LdArgA = 0xFE0A,
    StArg = 0xFE0B,
    LdLoc = 0xFE0C,
    LdLocA = 0xFE0D,
    StLoc = 0xFE0E,
    Unaligned = 0xFE12,
}

impl IntOp {
    /// Returns the byte width of this instruction's integer operand.
    #[must_use]
    pub fn operand_size(self) -> u32 {
        match self {
            IntOp::LdArgS
            | IntOp::LdArgAS
            | IntOp::StArgS
            | IntOp::LdLocS
            | IntOp::LdLocAS
            | IntOp::StLocS
            | IntOp::LdcI4S
            | IntOp::Unaligned => 1,
            IntOp::LdcI4 => 4,
            IntOp::LdArg
            | IntOp::LdArgA
            | IntOp::StArg
            | IntOp::LdLoc
            | IntOp::LdLocA
            | IntOp::StLoc => 2,
        }
    }
}

/// CIL branch instructions. Short forms encode a signed byte displacement, long forms
/// a signed 32-bit displacement; the form is fixed when the instruction is authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum BranchOp {
    BrS = 0x2B,
    BrFalseS = 0x2C,
    BrTrueS = 0x2D,
    BeqS = 0x2E,
    BgeS = 0x2F,
    BgtS = 0x30,
    BleS = 0x31,
    BltS = 0x32,
    BneUnS = 0x33,
    BgeUnS = 0x34,
    BgtUnS = 0x35,
    BleUnS = 0x36,
    BltUnS = 0x37,
    Br = 0x38,
    BrFalse = 0x39,
    BrTrue = 0x3A,
    Beq = 0x3B,
    Bge = 0x3C,
    Bgt = 0x3D,
    Ble = 0x3E,
    Blt = 0x3F,
    BneUn = 0x40,
    BgeUn = 0x41,
    BgtUn = 0x42,
    BleUn = 0x43,
    BltUn = 0x44,
    Leave = 0xDD,
    LeaveS = 0xDE,
}

impl BranchOp {
    /// True if this is a short-form branch with a one-byte displacement.
    #[must_use]
    pub fn is_short(self) -> bool {
        matches!(self as u16, 0x2B..=0x37) || self == BranchOp::LeaveS
    }
}

/// CIL instructions whose operand is a method token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum MethodOp {
    Jmp = 0x27,
    Call = 0x28,
    CallVirt = 0x6F,
    NewObj = 0x73,
    LdFtn = 0xFE06,
    LdVirtFtn = 0xFE07,
}

/// CIL instructions whose operand is a field token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum FieldOp {
    LdFld = 0x7B,
    LdFldA = 0x7C,
    StFld = 0x7D,
    LdsFld = 0x7E,
    LdsFldA = 0x7F,
    StsFld = 0x80,
}

/// CIL instructions whose operand is a type token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum TypeOp {
    CpObj = 0x70,
    LdObj = 0x71,
    CastClass = 0x74,
    IsInst = 0x75,
    Unbox = 0x79,
    StObj = 0x81,
    Box = 0x8C,
    NewArr = 0x8D,
    LdElemA = 0x8F,
    LdElem = 0xA3,
    StElem = 0xA4,
    UnboxAny = 0xA5,
    RefAnyVal = 0xC2,
    MkRefAny = 0xC6,
    LdToken = 0xD0,
    InitObj = 0xFE15,
    Constrained = 0xFE16,
    SizeOf = 0xFE1C,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_encoding() {
        let mut buf = Vec::new();
        emit_opcode(Op::Ret as u16, &mut buf);
        assert_eq!(buf, [0x2A]);
        assert_eq!(opcode_len(Op::Ret as u16), 1);
    }

    #[test]
    fn two_byte_encoding() {
        let mut buf = Vec::new();
        emit_opcode(Op::Ceq as u16, &mut buf);
        assert_eq!(buf, [0xFE, 0x01]);
        assert_eq!(opcode_len(Op::Ceq as u16), 2);
    }

    #[test]
    fn branch_forms() {
        assert!(BranchOp::BrS.is_short());
        assert!(BranchOp::LeaveS.is_short());
        assert!(!BranchOp::Br.is_short());
        assert!(!BranchOp::Leave.is_short());
        assert!(BranchOp::BltUnS.is_short());
        assert!(!BranchOp::BltUn.is_short());
    }

    #[test]
    fn int_operand_sizes() {
        assert_eq!(IntOp::LdcI4S.operand_size(), 1);
        assert_eq!(IntOp::LdcI4.operand_size(), 4);
        assert_eq!(IntOp::LdLoc.operand_size(), 2);
        assert_eq!(IntOp::Unaligned.operand_size(), 1);
    }
}
