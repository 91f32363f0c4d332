//! Per-method CIL instruction buffer with fixed-point offset resolution.
//!
//! A [`CodeBuffer`] is an append-only list of instruction records. Each record knows
//! its encoded size up front (the short/long branch form is fixed when the
//! instruction is authored), but two classes of value are deferred:
//!
//! - **branch displacements**, `target - (branch_offset + branch_size)`, which exist
//!   only once every label's offset is fixed;
//! - **heap and signature operands** (`ldstr` indexes, type-spec and call-site
//!   signature tokens), which exist only once the operand is committed to its heap
//!   or table.
//!
//! [`CodeBuffer::resolve`] runs the two to a fixed point: each pass lets every
//! instruction perform its deferred registrations (reporting whether anything
//! changed), then recomputes all offsets from scratch; it stops when a pass changes
//! nothing. Growth is monotonic, so the pass count is bounded by the number of
//! distinct size-changing events - exceeding the bound is an internal fault, never
//! an infinite loop. Instruction offsets are undefined before resolution converges.

use crate::{
    cilassembly::{CilAssembly, FieldTarget, MethodTarget},
    file::io::emit_le,
    metadata::method::opcodes::{
        emit_opcode, opcode_len, BranchOp, FieldOp, IntOp, MethodOp, Op, TypeOp,
    },
    metadata::signatures::{MethodSig, TypeSignature},
    metadata::token::Token,
    Result,
};

/// A position in a method's instruction stream, resolved during the fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

/// One authored instruction record.
#[derive(Debug, Clone)]
pub(crate) enum Instr {
    /// An operand-less instruction
    Simple(Op),
    /// An instruction with an inline integer operand
    Int(IntOp, i32),
    /// `ldc.i8`
    LdcI8(i64),
    /// `ldc.r4`
    LdcR4(f32),
    /// `ldc.r8`
    LdcR8(f64),
    /// `ldstr`; the `#US` index is interned during resolution
    LdStr { value: String, index: Option<u32> },
    /// A method-token instruction
    Method(MethodOp, MethodTarget),
    /// A field-token instruction
    Field(FieldOp, FieldTarget),
    /// A type-token instruction; the token is resolved (possibly interning a
    /// type specification) during resolution
    Type(TypeOp, TypeSignature, Option<Token>),
    /// `calli`; the stand-alone signature row is interned during resolution
    Calli { sig: MethodSig, row: Option<u32> },
    /// A branch to a label
    Branch(BranchOp, Label),
    /// `switch` over a jump table of labels
    Switch(Vec<Label>),
    /// A zero-size marker fixing a label's offset
    LabelMark(Label),
}

impl Instr {
    /// Encoded size in bytes; fixed per record once authored.
    #[allow(clippy::cast_possible_truncation)]
    fn size(&self) -> u32 {
        match self {
            Instr::Simple(op) => opcode_len(*op as u16),
            Instr::Int(op, _) => opcode_len(*op as u16) + op.operand_size(),
            Instr::LdcI8(_) | Instr::LdcR8(_) => 9,
            Instr::LdcR4(_) => 5,
            Instr::LdStr { .. } => 5,
            Instr::Method(op, _) => opcode_len(*op as u16) + 4,
            Instr::Field(op, _) => opcode_len(*op as u16) + 4,
            Instr::Type(op, _, _) => opcode_len(*op as u16) + 4,
            Instr::Calli { .. } => 5,
            Instr::Branch(op, _) => opcode_len(*op as u16) + if op.is_short() { 1 } else { 4 },
            Instr::Switch(targets) => 5 + 4 * targets.len() as u32,
            Instr::LabelMark(_) => 0,
        }
    }

    /// Performs this record's deferred registrations, reporting whether any state
    /// changed. Registrations happen at most once per record.
    fn check(&mut self, asm: &mut CilAssembly) -> Result<bool> {
        match self {
            Instr::LdStr { value, index } if index.is_none() => {
                *index = Some(asm.intern_user_string(value)?);
                Ok(true)
            }
            Instr::Type(_, signature, token) if token.is_none() => {
                *token = Some(asm.type_token_for_signature(signature)?);
                Ok(true)
            }
            Instr::Calli { sig, row } if row.is_none() => {
                *row = Some(asm.intern_calli_signature(sig)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Append-only CIL instruction buffer for one method body.
///
/// Authoring appends records; [`CodeBuffer::resolve`] fixes offsets and deferred
/// operands; [`CodeBuffer::write`] emits the encoded stream. The buffer is created
/// through [`crate::cilassembly::CilAssembly::create_code_buffer`] or
/// [`CodeBuffer::new`].
#[derive(Debug, Default, Clone)]
pub struct CodeBuffer {
    instrs: Vec<Instr>,
    label_count: u32,
    label_offsets: Vec<u32>,
    offsets: Vec<u32>,
    code_size: u32,
    resolved: bool,
}

/// Offset value of a label that has not been marked yet.
const UNMARKED: u32 = u32::MAX;

impl CodeBuffer {
    /// Creates an empty instruction buffer.
    #[must_use]
    pub fn new() -> Self {
        CodeBuffer::default()
    }

    /// Allocates a label that can be branched to before or after it is marked.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        label
    }

    /// Marks `label` at the current end of the stream.
    pub fn mark_label(&mut self, label: Label) {
        self.instrs.push(Instr::LabelMark(label));
    }

    /// Appends an operand-less instruction.
    pub fn op(&mut self, op: Op) {
        self.instrs.push(Instr::Simple(op));
    }

    /// Appends an instruction with an inline integer operand.
    pub fn int_op(&mut self, op: IntOp, value: i32) {
        self.instrs.push(Instr::Int(op, value));
    }

    /// Appends the shortest `ldc.i4` form for `value`.
    pub fn ldc_i4(&mut self, value: i32) {
        match value {
            -1 => self.op(Op::LdcI4M1),
            0..=8 => self.instrs.push(Instr::Simple(match value {
                0 => Op::LdcI40,
                1 => Op::LdcI41,
                2 => Op::LdcI42,
                3 => Op::LdcI43,
                4 => Op::LdcI44,
                5 => Op::LdcI45,
                6 => Op::LdcI46,
                7 => Op::LdcI47,
                _ => Op::LdcI48,
            })),
            -128..=127 => self.int_op(IntOp::LdcI4S, value),
            _ => self.int_op(IntOp::LdcI4, value),
        }
    }

    /// Appends `ldc.i8`.
    pub fn ldc_i8(&mut self, value: i64) {
        self.instrs.push(Instr::LdcI8(value));
    }

    /// Appends `ldc.r4`.
    pub fn ldc_r4(&mut self, value: f32) {
        self.instrs.push(Instr::LdcR4(value));
    }

    /// Appends `ldc.r8`.
    pub fn ldc_r8(&mut self, value: f64) {
        self.instrs.push(Instr::LdcR8(value));
    }

    /// Appends `ldstr`; the literal is committed to the `#US` heap during resolution.
    pub fn ldstr(&mut self, value: &str) {
        self.instrs.push(Instr::LdStr {
            value: value.to_string(),
            index: None,
        });
    }

    /// Appends a method-token instruction (`call`, `callvirt`, `newobj`, ...).
    pub fn method_op(&mut self, op: MethodOp, target: MethodTarget) {
        self.instrs.push(Instr::Method(op, target));
    }

    /// Appends a field-token instruction (`ldfld`, `stsfld`, ...).
    pub fn field_op(&mut self, op: FieldOp, target: FieldTarget) {
        self.instrs.push(Instr::Field(op, target));
    }

    /// Appends a type-token instruction (`box`, `castclass`, `newarr`, ...).
    ///
    /// Simple named types encode their own token; structural types intern a type
    /// specification during resolution.
    pub fn type_op(&mut self, op: TypeOp, signature: TypeSignature) {
        self.instrs.push(Instr::Type(op, signature, None));
    }

    /// Appends `calli` with an explicit call-site signature.
    pub fn calli(&mut self, sig: MethodSig) {
        self.instrs.push(Instr::Calli { sig, row: None });
    }

    /// Appends a branch to `label`. Short forms are validated against their one-byte
    /// displacement range after resolution.
    pub fn branch(&mut self, op: BranchOp, label: Label) {
        self.instrs.push(Instr::Branch(op, label));
    }

    /// Appends `switch` over the given jump table.
    pub fn switch(&mut self, targets: Vec<Label>) {
        self.instrs.push(Instr::Switch(targets));
    }

    /// True if no instructions have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The resolved code size in bytes. Valid only after [`CodeBuffer::resolve`].
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.code_size
    }

    /// The resolved offset of `label`. Valid only after [`CodeBuffer::resolve`].
    #[must_use]
    pub fn label_offset(&self, label: Label) -> u32 {
        self.label_offsets[label.0 as usize]
    }

    /// Runs deferred registrations and offset assignment to a fixed point.
    ///
    /// Each pass invokes every record's check step (which may intern heap content or
    /// register a stand-alone signature) and then recomputes every offset from its
    /// predecessor's end; the loop ends when a pass changes nothing. Re-running after
    /// convergence is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a branch to an unmarked label or a
    /// short-form branch whose displacement does not fit a signed byte, and
    /// [`crate::Error::InternalFault`] if the pass bound is exceeded (sizes only
    /// grow, so non-termination is a bug).
    pub fn resolve(&mut self, asm: &mut CilAssembly) -> Result<()> {
        let max_passes = self.instrs.len() + 2;
        let mut passes = 0;

        loop {
            passes += 1;
            if passes > max_passes {
                return Err(internal_fault!(
                    "instruction fixed point did not converge after {} passes",
                    passes
                ));
            }

            let mut changed = false;
            for instr in &mut self.instrs {
                changed |= instr.check(asm)?;
            }
            changed |= self.recompute_offsets();

            if !changed {
                break;
            }
        }

        self.validate_branches()?;
        self.resolved = true;
        Ok(())
    }

    fn recompute_offsets(&mut self) -> bool {
        let mut label_offsets = vec![UNMARKED; self.label_count as usize];
        let mut offsets = Vec::with_capacity(self.instrs.len());
        let mut cursor = 0_u32;

        for instr in &self.instrs {
            offsets.push(cursor);
            if let Instr::LabelMark(label) = instr {
                label_offsets[label.0 as usize] = cursor;
            }
            cursor += instr.size();
        }

        let changed =
            label_offsets != self.label_offsets || offsets != self.offsets || cursor != self.code_size;
        self.label_offsets = label_offsets;
        self.offsets = offsets;
        self.code_size = cursor;
        changed
    }

    fn branch_displacement(&self, index: usize, label: Label) -> Result<i64> {
        let target = self.label_offsets[label.0 as usize];
        if target == UNMARKED {
            return Err(malformed_error!("branch to a label that was never marked"));
        }
        let end_of_instr = i64::from(self.offsets[index]) + i64::from(self.instrs[index].size());
        Ok(i64::from(target) - end_of_instr)
    }

    fn validate_branches(&self) -> Result<()> {
        for (index, instr) in self.instrs.iter().enumerate() {
            match instr {
                Instr::Branch(op, label) => {
                    let displacement = self.branch_displacement(index, *label)?;
                    if op.is_short() && i8::try_from(displacement).is_err() {
                        return Err(malformed_error!(
                            "short branch displacement {} does not fit a signed byte",
                            displacement
                        ));
                    }
                }
                Instr::Switch(targets) => {
                    for target in targets {
                        self.branch_displacement(index, *target)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Emits the encoded instruction stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalFault`] if called before [`CodeBuffer::resolve`]
    /// has converged - offsets are undefined until then.
    pub fn write(&self, asm: &CilAssembly, buf: &mut Vec<u8>) -> Result<()> {
        if !self.resolved {
            return Err(internal_fault!(
                "instruction stream written before fixed-point resolution"
            ));
        }

        for (index, instr) in self.instrs.iter().enumerate() {
            match instr {
                Instr::Simple(op) => emit_opcode(*op as u16, buf),
                Instr::Int(op, value) => {
                    emit_opcode(*op as u16, buf);
                    match op.operand_size() {
                        1 => {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                            buf.push(*value as u8);
                        }
                        2 => {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                            emit_le(buf, *value as u16);
                        }
                        _ => emit_le(buf, *value),
                    }
                }
                Instr::LdcI8(value) => {
                    buf.push(0x21);
                    emit_le(buf, *value);
                }
                Instr::LdcR4(value) => {
                    buf.push(0x22);
                    emit_le(buf, *value);
                }
                Instr::LdcR8(value) => {
                    buf.push(0x23);
                    emit_le(buf, *value);
                }
                Instr::LdStr { index: slot, .. } => {
                    buf.push(0x72);
                    let index = slot
                        .ok_or_else(|| internal_fault!("unresolved ldstr operand at write time"))?;
                    emit_le(buf, Token::user_string(index).value());
                }
                Instr::Method(op, target) => {
                    emit_opcode(*op as u16, buf);
                    emit_le(buf, asm.method_target_token(*target).value());
                }
                Instr::Field(op, target) => {
                    emit_opcode(*op as u16, buf);
                    emit_le(buf, asm.field_target_token(*target).value());
                }
                Instr::Type(op, _, token) => {
                    emit_opcode(*op as u16, buf);
                    let token = token
                        .ok_or_else(|| internal_fault!("unresolved type operand at write time"))?;
                    emit_le(buf, token.value());
                }
                Instr::Calli { row, .. } => {
                    buf.push(0x29);
                    let row = row
                        .ok_or_else(|| internal_fault!("unresolved calli operand at write time"))?;
                    emit_le(buf, Token::from_parts(0x11, row).value());
                }
                Instr::Branch(op, label) => {
                    emit_opcode(*op as u16, buf);
                    let displacement = self.branch_displacement(index, *label)?;
                    if op.is_short() {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        buf.push(displacement as i8 as u8);
                    } else {
                        #[allow(clippy::cast_possible_truncation)]
                        emit_le(buf, displacement as i32);
                    }
                }
                Instr::Switch(targets) => {
                    buf.push(0x45);
                    #[allow(clippy::cast_possible_truncation)]
                    emit_le(buf, targets.len() as u32);
                    for target in targets {
                        let displacement = self.branch_displacement(index, *target)?;
                        #[allow(clippy::cast_possible_truncation)]
                        emit_le(buf, displacement as i32);
                    }
                }
                Instr::LabelMark(_) => {}
            }
        }
        Ok(())
    }
}
