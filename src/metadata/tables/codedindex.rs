//! # Coded Index Types Module
//!
//! Coded indices are the space-efficient encoding CLI metadata uses to reference one of
//! several possible tables through a single value: the low bits carry a tag selecting the
//! target table, the remaining bits carry the row. This module defines the thirteen coded
//! index categories the emitter serializes, the tag assignment per constituent table, and
//! the encoding itself.
//!
//! Whether a given coded index serializes as 2 or 4 bytes is a *global* decision computed
//! once from final row counts (see [`crate::metadata::tables::TableInfo`]); this module is
//! only concerned with the value, not the width.
//!
//! ## References
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Section II.24.2.6

use strum::{EnumCount, EnumIter};

use crate::{metadata::tables::TableId, Result};

/// Represents all coded index categories the emitter writes, per ECMA-335 II.24.2.6.
///
/// A coded index category defines which combination of metadata tables can be referenced
/// by a particular row field. Each category reserves `ceil(log2(n))` low bits for the
/// table tag, where `n` is the number of constituent tables; more constituents mean more
/// tag bits and therefore a lower row count at which the encoding must widen to 4 bytes.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// References `TypeDef`, `TypeRef`, or `TypeSpec` tables.
    TypeDefOrRef,

    /// References `Field`, `Param`, or `Property` tables - entities carrying constants.
    HasConstant,

    /// References any entity that can have custom attributes attached.
    HasCustomAttribute,

    /// References `Field` or `Param` tables - entities with marshalling info.
    HasFieldMarshal,

    /// References `TypeDef`, `MethodDef`, or `Assembly` tables - security targets.
    HasDeclSecurity,

    /// References `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef`, or `TypeSpec` tables.
    ///
    /// Used as the parent reference for member references.
    MemberRefParent,

    /// References `Event` or `Property` tables - accessor association targets.
    HasSemantics,

    /// References `MethodDef` or `MemberRef` tables.
    MethodDefOrRef,

    /// References `Field` or `MethodDef` tables - P/Invoke forwarding targets.
    MemberForwarded,

    /// References `File`, `AssemblyRef`, or `ExportedType` tables.
    Implementation,

    /// References `MethodDef` or `MemberRef` tables as attribute constructors.
    ///
    /// Tags 0, 1 and 4 are defined but unused by the standard; only tags 2
    /// (`MethodDef`) and 3 (`MemberRef`) are ever emitted.
    CustomAttributeType,

    /// References `Module`, `ModuleRef`, `AssemblyRef`, or `TypeRef` tables.
    ResolutionScope,

    /// References `TypeDef` or `MethodDef` tables - generic parameter owners.
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Returns the constituent tables of this coded index, in tag order.
    ///
    /// The position of a table in the returned slice is its tag value. Repeated
    /// entries mark tag slots the standard defines but never uses.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity, // In the standard PDF, this is wrongly labeled as 'Permission' (although no such table exists)
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Returns the number of low bits reserved for the table tag.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_bits(&self) -> u8 {
        let len = self.tables().len() as u32;
        // Smallest b with 2^b >= len; constituent lists are never empty.
        (32 - (len - 1).leading_zeros()) as u8
    }

    /// Returns the tag value for a constituent table of this coded index.
    ///
    /// For the tag slots the standard defines twice (`CustomAttributeType`), the
    /// first *usable* position is returned: tag 2 for `MethodDef`, tag 3 for
    /// `MemberRef`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalFault`] if `table` is not a constituent of
    /// this coded index - serializing an element through the wrong coded-index
    /// category is an unrecoverable bug, not an input error.
    pub fn tag_for(&self, table: TableId) -> Result<u32> {
        if *self == CodedIndexType::CustomAttributeType {
            return match table {
                TableId::MethodDef => Ok(2),
                TableId::MemberRef => Ok(3),
                _ => Err(internal_fault!(
                    "table {:?} cannot be a custom attribute constructor",
                    table
                )),
            };
        }

        match self.tables().iter().position(|t| *t == table) {
            #[allow(clippy::cast_possible_truncation)]
            Some(position) => Ok(position as u32),
            None => Err(internal_fault!(
                "table {:?} is not a constituent of coded index {:?}",
                table,
                self
            )),
        }
    }

    /// Encodes a `(table, row)` reference as this coded index's value: `(row << tagBits) | tag`.
    ///
    /// A null reference is encoded by passing row 0 with any constituent table; the
    /// result keeps the tag bits so decoders see a well-formed null of the right kind.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalFault`] if `table` is not a constituent of this
    /// coded index.
    pub fn encode(&self, table: TableId, row: u32) -> Result<u32> {
        let tag = self.tag_for(table)?;
        Ok((row << self.tag_bits()) | tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bit_widths() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasSemantics.tag_bits(), 1);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
    }

    #[test]
    fn encode_type_def_or_ref() {
        let ci = CodedIndexType::TypeDefOrRef;
        assert_eq!(ci.encode(TableId::TypeDef, 5).unwrap(), 5 << 2);
        assert_eq!(ci.encode(TableId::TypeRef, 5).unwrap(), (5 << 2) | 1);
        assert_eq!(ci.encode(TableId::TypeSpec, 5).unwrap(), (5 << 2) | 2);
    }

    #[test]
    fn encode_custom_attribute_type_skips_unused_tags() {
        let ci = CodedIndexType::CustomAttributeType;
        assert_eq!(ci.encode(TableId::MethodDef, 1).unwrap(), (1 << 3) | 2);
        assert_eq!(ci.encode(TableId::MemberRef, 1).unwrap(), (1 << 3) | 3);
    }

    #[test]
    fn wrong_category_is_internal_fault() {
        let result = CodedIndexType::HasSemantics.encode(TableId::TypeDef, 1);
        assert!(matches!(
            result,
            Err(crate::Error::InternalFault { .. })
        ));
    }

    #[test]
    fn resolution_scope_tags() {
        let ci = CodedIndexType::ResolutionScope;
        assert_eq!(ci.encode(TableId::Module, 1).unwrap(), 1 << 2);
        assert_eq!(ci.encode(TableId::AssemblyRef, 1).unwrap(), (1 << 2) | 2);
    }
}
