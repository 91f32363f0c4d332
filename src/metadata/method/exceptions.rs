//! Exception handler clauses for CIL method bodies.
//!
//! Handlers are authored as label-pair ranges over a method's instruction stream and
//! serialized after the code, in either the small (12 bytes per clause) or fat
//! (24 bytes per clause) section layout. The layout is decided once per method and
//! applies to every clause in it - small and fat clauses are never mixed.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4.5-6 - Exception Handling

use bitflags::bitflags;

use crate::{
    cilassembly::CilAssembly,
    file::io::emit_le,
    metadata::method::instructions::{CodeBuffer, Label},
    metadata::signatures::TypeDefOrRef,
    Result,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; the clause carries the caught type's token.
        const EXCEPTION = 0x0000;

        /// An exception filter clause; the clause carries the filter code's offset.
        const FILTER = 0x0001;

        /// A finally clause, run on both normal and exceptional exit.
        const FINALLY = 0x0002;

        /// A fault clause, run only on exceptional exit.
        const FAULT = 0x0004;
    }
}

/// One authored try/handler region, in label form.
///
/// Offsets become concrete only after the owning [`CodeBuffer`] has resolved; until
/// then the handler is pure structure.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    /// The clause kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected region
    pub try_start: Label,
    /// End (exclusive) of the protected region
    pub try_end: Label,
    /// Start of the handler region
    pub handler_start: Label,
    /// End (exclusive) of the handler region
    pub handler_end: Label,
    /// The caught type, for [`ExceptionHandlerFlags::EXCEPTION`] clauses
    pub catch_type: Option<TypeDefOrRef>,
    /// Start of the filter code, for [`ExceptionHandlerFlags::FILTER`] clauses
    pub filter_start: Option<Label>,
}

/// One clause with concrete byte offsets, ready for serialization.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedClause {
    flags: u16,
    try_offset: u32,
    try_length: u32,
    handler_offset: u32,
    handler_length: u32,
    /// Class token, filter offset, or zero depending on the clause kind
    extra: u32,
}

impl ExceptionHandler {
    pub(crate) fn resolve(&self, asm: &CilAssembly, code: &CodeBuffer) -> Result<ResolvedClause> {
        let try_offset = code.label_offset(self.try_start);
        let try_end = code.label_offset(self.try_end);
        let handler_offset = code.label_offset(self.handler_start);
        let handler_end = code.label_offset(self.handler_end);

        if [try_offset, try_end, handler_offset, handler_end]
            .iter()
            .any(|offset| *offset == u32::MAX)
        {
            return Err(malformed_error!(
                "exception handler references a label that was never marked"
            ));
        }

        if try_end < try_offset || handler_end < handler_offset {
            return Err(malformed_error!("exception handler range ends before it starts"));
        }

        let extra = if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            let filter = self
                .filter_start
                .ok_or_else(|| malformed_error!("filter clause without a filter label"))?;
            code.label_offset(filter)
        } else if let Some(catch_type) = self.catch_type {
            asm.type_target_token(catch_type).value()
        } else if self.flags.is_empty() {
            return Err(malformed_error!("typed exception clause without a catch type"));
        } else {
            0
        };

        Ok(ResolvedClause {
            flags: self.flags.bits(),
            try_offset,
            try_length: try_end - try_offset,
            handler_offset,
            handler_length: handler_end - handler_offset,
            extra,
        })
    }
}

/// Method-data-section kind byte: exception handler table.
const SECT_EH_TABLE: u8 = 0x01;
/// Method-data-section flag: fat clause layout.
const SECT_FAT_FORMAT: u8 = 0x40;

const SMALL_CLAUSE_SIZE: u32 = 12;
const FAT_CLAUSE_SIZE: u32 = 24;
const SECTION_HEADER_SIZE: u32 = 4;

/// Decides whether a method's clause set requires the fat layout.
///
/// Fat is required when any try length or handler length exceeds 0xFF, any offset
/// exceeds 0xFFFF, or the small section's one-byte data-size field cannot hold the
/// whole table. The decision applies to every clause of the method.
pub(crate) fn requires_fat_clauses(clauses: &[ResolvedClause]) -> bool {
    #[allow(clippy::cast_possible_truncation)]
    let small_table_size = SECTION_HEADER_SIZE + SMALL_CLAUSE_SIZE * clauses.len() as u32;
    if small_table_size > 0xFF {
        return true;
    }
    clauses.iter().any(|clause| {
        clause.try_length > 0xFF
            || clause.handler_length > 0xFF
            || clause.try_offset > 0xFFFF
            || clause.handler_offset > 0xFFFF
    })
}

/// Returns the encoded byte size of the section for the given layout.
pub(crate) fn section_size(clause_count: u32, fat: bool) -> u32 {
    let clause_size = if fat { FAT_CLAUSE_SIZE } else { SMALL_CLAUSE_SIZE };
    SECTION_HEADER_SIZE + clause_size * clause_count
}

/// Serializes the exception section. The caller has already quad-aligned `buf`.
pub(crate) fn write_section(clauses: &[ResolvedClause], fat: bool, buf: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    let data_size = section_size(clauses.len() as u32, fat);

    if fat {
        // Kind byte plus 3-byte little-endian data size.
        emit_le(buf, (data_size << 8) | u32::from(SECT_EH_TABLE | SECT_FAT_FORMAT));
        for clause in clauses {
            emit_le(buf, u32::from(clause.flags));
            emit_le(buf, clause.try_offset);
            emit_le(buf, clause.try_length);
            emit_le(buf, clause.handler_offset);
            emit_le(buf, clause.handler_length);
            emit_le(buf, clause.extra);
        }
    } else {
        buf.push(SECT_EH_TABLE);
        #[allow(clippy::cast_possible_truncation)]
        buf.push(data_size as u8);
        emit_le(buf, 0_u16); // reserved
        for clause in clauses {
            emit_le(buf, clause.flags);
            #[allow(clippy::cast_possible_truncation)]
            emit_le(buf, clause.try_offset as u16);
            #[allow(clippy::cast_possible_truncation)]
            buf.push(clause.try_length as u8);
            #[allow(clippy::cast_possible_truncation)]
            emit_le(buf, clause.handler_offset as u16);
            #[allow(clippy::cast_possible_truncation)]
            buf.push(clause.handler_length as u8);
            emit_le(buf, clause.extra);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> ResolvedClause {
        ResolvedClause {
            flags: 0,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            extra: 0x0100_0001,
        }
    }

    #[test]
    fn small_spans_use_small_clauses() {
        let clauses = [clause(0, 10, 10, 20)];
        assert!(!requires_fat_clauses(&clauses));
        assert_eq!(section_size(1, false), 16);
    }

    #[test]
    fn wide_try_span_forces_fat() {
        let clauses = [clause(0, 0x100, 0x100, 4)];
        assert!(requires_fat_clauses(&clauses));
        assert_eq!(section_size(1, true), 28);
    }

    #[test]
    fn wide_handler_span_forces_fat() {
        let clauses = [clause(0, 4, 4, 0x100)];
        assert!(requires_fat_clauses(&clauses));
    }

    #[test]
    fn far_offset_forces_fat() {
        let clauses = [clause(0x1_0000, 4, 0x1_0010, 4)];
        assert!(requires_fat_clauses(&clauses));
    }

    #[test]
    fn many_clauses_overflow_small_length_field() {
        // 21 small clauses: 4 + 21*12 = 256 > 0xFF.
        let clauses: Vec<ResolvedClause> = (0..21).map(|i| clause(i, 1, i + 1, 1)).collect();
        assert!(requires_fat_clauses(&clauses));
        let small: Vec<ResolvedClause> = (0..20).map(|i| clause(i, 1, i + 1, 1)).collect();
        assert!(!requires_fat_clauses(&small));
    }

    #[test]
    fn small_section_layout() {
        let mut buf = Vec::new();
        write_section(&[clause(2, 6, 8, 4)], false, &mut buf).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[0], 0x01); // kind
        assert_eq!(buf[1], 16); // data size
        assert_eq!(&buf[2..4], &[0, 0]); // reserved
        assert_eq!(&buf[4..6], &[0, 0]); // flags
        assert_eq!(&buf[6..8], &[2, 0]); // try offset
        assert_eq!(buf[8], 6); // try length
        assert_eq!(&buf[9..11], &[8, 0]); // handler offset
        assert_eq!(buf[11], 4); // handler length
        assert_eq!(&buf[12..16], &0x0100_0001_u32.to_le_bytes());
    }

    #[test]
    fn fat_section_layout() {
        let mut buf = Vec::new();
        write_section(&[clause(2, 0x100, 0x102, 4)], true, &mut buf).unwrap();
        assert_eq!(buf.len(), 28);
        assert_eq!(buf[0], 0x41); // kind | fat
        assert_eq!(&buf[1..4], &[28, 0, 0]); // 3-byte data size
        assert_eq!(&buf[4..8], &[0, 0, 0, 0]); // flags
        assert_eq!(&buf[8..12], &2_u32.to_le_bytes());
        assert_eq!(&buf[12..16], &0x100_u32.to_le_bytes());
    }
}
