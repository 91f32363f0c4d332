use strum::{EnumCount, EnumIter};

/// Identifiers for the metadata tables defined in the ECMA-335 specification.
///
/// Each variant represents one metadata table an emitted image may contain. The numeric
/// values correspond to the table IDs as defined in the CLI specification and double as
/// the bit positions in the `#~` stream's 64-bit Valid/Sorted bitmasks and as the high
/// byte of metadata tokens referencing the table.
///
/// The `*Ptr` and `EncLog`/`EncMap` indirection tables are part of the table-id space
/// (their bits must stay reserved in the bitmaps) but are never populated by this
/// emitter: they only occur in uncompressed (`#-`) or edit-and-continue images.
///
/// ## Reference
/// * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// `Module` table (0x00) - the one row describing the module being emitted.
    Module = 0x00,
    /// `TypeRef` table (0x01) - references to types defined in external scopes.
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - type definitions, row 1 always the `<Module>` pseudo-class.
    TypeDef = 0x02,
    /// `FieldPtr` table (0x03) - field indirection, never emitted in compressed images.
    FieldPtr = 0x03,
    /// `Field` table (0x04) - field definitions, grouped contiguously per owning type.
    Field = 0x04,
    /// `MethodPtr` table (0x05) - method indirection, never emitted in compressed images.
    MethodPtr = 0x05,
    /// `MethodDef` table (0x06) - method definitions with their body RVAs.
    MethodDef = 0x06,
    /// `ParamPtr` table (0x07) - parameter indirection, never emitted in compressed images.
    ParamPtr = 0x07,
    /// `Param` table (0x08) - parameter rows, grouped contiguously per owning method.
    Param = 0x08,
    /// `InterfaceImpl` table (0x09) - interface implementations, sorted by class.
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A) - references to fields/methods of external types.
    MemberRef = 0x0A,
    /// `Constant` table (0x0B) - default values, sorted by parent coded index.
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C) - attribute applications, sorted by parent.
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D) - marshalling descriptors, sorted by parent.
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E) - security declarations, sorted by parent.
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F) - explicit/sequential layout info per type.
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10) - explicit field offsets.
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11) - local-variable and call-site signatures.
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12) - type-to-event list mapping.
    EventMap = 0x12,
    /// `EventPtr` table (0x13) - event indirection, never emitted in compressed images.
    EventPtr = 0x13,
    /// `Event` table (0x14) - event definitions.
    Event = 0x14,
    /// `PropertyMap` table (0x15) - type-to-property list mapping.
    PropertyMap = 0x15,
    /// `PropertyPtr` table (0x16) - property indirection, never emitted in compressed images.
    PropertyPtr = 0x16,
    /// `Property` table (0x17) - property definitions.
    Property = 0x17,
    /// `MethodSemantics` table (0x18) - accessor associations, sorted by association.
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19) - explicit method overrides.
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A) - references to external modules.
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B) - type specification signature blobs.
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C) - P/Invoke mappings, sorted by forwarded member.
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D) - initial data locations for mapped fields.
    FieldRVA = 0x1D,
    /// `EncLog` table (0x1E) - edit-and-continue log, never emitted.
    EncLog = 0x1E,
    /// `EncMap` table (0x1F) - edit-and-continue map, never emitted.
    EncMap = 0x1F,
    /// `Assembly` table (0x20) - the assembly manifest row.
    Assembly = 0x20,
    /// `AssemblyProcessor` table (0x21) - processor-specific info, never emitted.
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table (0x22) - OS-specific info, never emitted.
    AssemblyOS = 0x22,
    /// `AssemblyRef` table (0x23) - references to external assemblies.
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table (0x24) - never emitted.
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table (0x25) - never emitted.
    AssemblyRefOS = 0x25,
    /// `File` table (0x26) - files belonging to this assembly.
    File = 0x26,
    /// `ExportedType` table (0x27) - types forwarded or exported from other files.
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28) - embedded or linked resources.
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29) - nested type relationships.
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A) - generic parameters, sorted by owner then number.
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B) - generic method instantiations.
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table (0x2C) - constraints, sorted by owner.
    GenericParamConstraint = 0x2C,
}

/// Number of table-id slots this emitter tracks (`GenericParamConstraint` + 1).
pub const TABLE_SLOT_COUNT: usize = TableId::GenericParamConstraint as usize + 1;

/// The tables this emitter keeps sorted by their coded-index key, in table-id order.
///
/// After natural row assignment these tables are re-sorted and re-numbered; any token
/// into them cached before the sort is invalid. `GenericParam` additionally sorts by
/// parameter number within one owner.
pub const SORTED_TABLES: &[TableId] = &[
    TableId::InterfaceImpl,
    TableId::Constant,
    TableId::CustomAttribute,
    TableId::FieldMarshal,
    TableId::DeclSecurity,
    TableId::MethodSemantics,
    TableId::ImplMap,
    TableId::GenericParam,
    TableId::GenericParamConstraint,
];

impl TableId {
    /// Returns the token-prefix byte for this table (identical to the table id).
    #[must_use]
    pub fn token_prefix(self) -> u8 {
        self as u8
    }

    /// Returns this table's bit in the `#~` Valid/Sorted bitmasks.
    #[must_use]
    pub fn bit(self) -> u64 {
        1_u64 << (self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn discriminants_match_ecma_ids() {
        assert_eq!(TableId::Module as u8, 0x00);
        assert_eq!(TableId::TypeDef as u8, 0x02);
        assert_eq!(TableId::MethodDef as u8, 0x06);
        assert_eq!(TableId::GenericParamConstraint as u8, 0x2C);
    }

    #[test]
    fn iteration_is_ascending() {
        let ids: Vec<u8> = TableId::iter().map(|id| id as u8).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 45);
    }

    #[test]
    fn bits_are_distinct() {
        let mut mask = 0_u64;
        for id in TableId::iter() {
            assert_eq!(mask & id.bit(), 0);
            mask |= id.bit();
        }
    }

    #[test]
    fn sorted_tables_are_in_table_order() {
        let mut prev = None;
        for id in SORTED_TABLES {
            if let Some(p) = prev {
                assert!(*id > p);
            }
            prev = Some(*id);
        }
    }
}
