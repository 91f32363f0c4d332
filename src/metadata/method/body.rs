//! Method body assembly: header selection, code, and exception sections.
//!
//! After a body's instruction stream has resolved, its total shape is a pure
//! function of resolved state: the tiny 1-byte header when the body qualifies
//! (code under 64 bytes, max-stack at most 8, no locals, no handlers), otherwise
//! the fat 12-byte header, quad-aligned before any exception section.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method bodies

use crate::{
    cilassembly::CilAssembly,
    file::io::{emit_le, pad_to_alignment},
    metadata::method::exceptions::{
        requires_fat_clauses, section_size, write_section, ExceptionHandler, ResolvedClause,
    },
    metadata::method::instructions::CodeBuffer,
    metadata::signatures::TypeSignature,
    metadata::token::Token,
    Result,
};

/// Tiny-format marker in the method header's low two bits.
const TINY_FORMAT: u8 = 0x02;
/// Fat-format marker in the method header flags.
const FAT_FORMAT: u16 = 0x03;
/// Fat-header flag: more sections (an exception table) follow the code.
const FAT_MORE_SECTS: u16 = 0x08;
/// Fat-header flag: zero-initialize locals.
const FAT_INIT_LOCALS: u16 = 0x10;
/// Fat header size in dwords, stored in the upper nibble of the flags word.
const FAT_HEADER_DWORDS: u16 = 3;

/// A complete method body: stack depth, locals, instruction stream and handlers.
///
/// Bodies are attached to method definitions via
/// [`crate::cilassembly::CilAssembly::set_method_body`]; resolution and layout run
/// inside `build_tables`.
#[derive(Debug, Default, Clone)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// True to zero-initialize locals (sets the fat header's init flag)
    pub init_locals: bool,
    /// Local variable types, in slot order
    pub locals: Vec<TypeSignature>,
    /// The instruction stream
    pub code: CodeBuffer,
    /// Exception handler regions
    pub exception_handlers: Vec<ExceptionHandler>,

    /// Blob index of the local signature, interned during resolution
    pub(crate) local_sig_row: Option<u32>,
    /// Resolved clauses, produced during resolution
    pub(crate) clauses: Vec<ResolvedClause>,
    /// True once clauses were measured as needing the fat layout
    pub(crate) fat_clauses: bool,
    /// Byte offset of this body within the image's code region
    pub(crate) code_offset: u32,
}

impl MethodBody {
    /// Creates an empty body with the given maximum stack depth.
    #[must_use]
    pub fn new(max_stack: u16) -> Self {
        MethodBody {
            max_stack,
            init_locals: true,
            ..MethodBody::default()
        }
    }

    /// Resolves the instruction stream, local signature and handler clauses.
    pub(crate) fn resolve(&mut self, asm: &mut CilAssembly) -> Result<()> {
        self.code.resolve(asm)?;

        if !self.locals.is_empty() && self.local_sig_row.is_none() {
            self.local_sig_row = Some(asm.intern_local_signature(&self.locals)?);
        }

        self.clauses = self
            .exception_handlers
            .iter()
            .map(|handler| handler.resolve(asm, &self.code))
            .collect::<Result<Vec<_>>>()?;
        self.fat_clauses = requires_fat_clauses(&self.clauses);

        Ok(())
    }

    /// True when the 1-byte tiny header applies.
    #[must_use]
    pub fn uses_tiny_header(&self) -> bool {
        self.code.code_size() < 64
            && self.max_stack <= 8
            && self.locals.is_empty()
            && self.exception_handlers.is_empty()
    }

    /// The encoded size of header, code and exception section. Valid after resolution.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn encoded_size(&self) -> u32 {
        if self.uses_tiny_header() {
            return 1 + self.code.code_size();
        }

        let mut size = 12 + self.code.code_size();
        if !self.clauses.is_empty() {
            size = crate::file::io::align_up(size, 4);
            size += section_size(self.clauses.len() as u32, self.fat_clauses);
        }
        size
    }

    /// Serializes the complete body. The caller positions `buf` at the body's
    /// (quad-aligned) start offset.
    pub(crate) fn write(&self, asm: &CilAssembly, buf: &mut Vec<u8>) -> Result<()> {
        let body_start = buf.len();

        if self.uses_tiny_header() {
            #[allow(clippy::cast_possible_truncation)]
            buf.push(TINY_FORMAT | ((self.code.code_size() as u8) << 2));
            self.code.write(asm, buf)?;
            return Ok(());
        }

        let mut flags = FAT_FORMAT | (FAT_HEADER_DWORDS << 12);
        if !self.clauses.is_empty() {
            flags |= FAT_MORE_SECTS;
        }
        if self.init_locals && !self.locals.is_empty() {
            flags |= FAT_INIT_LOCALS;
        }

        emit_le(buf, flags);
        emit_le(buf, self.max_stack);
        emit_le(buf, self.code.code_size());
        match self.local_sig_row {
            Some(row) => emit_le(buf, Token::from_parts(0x11, row).value()),
            None => emit_le(buf, 0_u32),
        }

        self.code.write(asm, buf)?;

        if !self.clauses.is_empty() {
            // The section offset is relative to the body start, which the caller
            // quad-aligned; padding relative to the buffer start is equivalent.
            debug_assert_eq!(body_start % 4, 0);
            pad_to_alignment(buf, 4);
            write_section(&self.clauses, self.fat_clauses, buf)?;
        }

        Ok(())
    }
}
