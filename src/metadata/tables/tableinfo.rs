use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{CodedIndexType, TableId, TABLE_SLOT_COUNT};

/// The row-count threshold past which plain table indexes widen to 4 bytes.
const MAX_SMALL_INDEX: u32 = 0xFFFF;

/// Index width information for every table, coded index, and heap of one image.
///
/// All widths are computed exactly once, from the *final* row counts and heap sizes,
/// after every row has been assigned and every heap finalized. They then apply
/// uniformly to every reference in the image, regardless of when that reference was
/// created: a coded index that crossed its threshold retroactively widens references
/// recorded before the crossing.
///
/// A plain table index becomes 4 bytes once the table exceeds 0xFFFF rows. A coded
/// index becomes 4 bytes once *any* constituent table's row count, shifted by the
/// coded index's tag-bit width, would no longer fit a 16-bit field; with 1/2/3/5 tag
/// bits this bounds the safe row count at 0x7FFF/0x3FFF/0x1FFF/0x7FF respectively.
#[derive(Clone)]
pub struct TableInfo {
    rows: [u32; TABLE_SLOT_COUNT],
    large: [bool; TABLE_SLOT_COUNT],
    coded_large: [bool; CodedIndexType::COUNT],
    large_strings: bool,
    large_guid: bool,
    large_blob: bool,
    large_us: bool,
}

impl Default for TableInfo {
    fn default() -> Self {
        TableInfo {
            rows: [0; TABLE_SLOT_COUNT],
            large: [false; TABLE_SLOT_COUNT],
            coded_large: [false; CodedIndexType::COUNT],
            large_strings: false,
            large_guid: false,
            large_blob: false,
            large_us: false,
        }
    }
}

impl TableInfo {
    /// Computes the width set from final row counts and finalized heap lengths.
    ///
    /// # Arguments
    /// * `row_counts` - Per-table final row counts, indexed by [`TableId`]
    /// * `strings_len` / `us_len` / `guid_len` / `blob_len` - Finalized heap byte lengths
    #[must_use]
    pub fn compute(
        row_counts: &[u32; TABLE_SLOT_COUNT],
        strings_len: u32,
        us_len: u32,
        guid_len: u32,
        blob_len: u32,
    ) -> Self {
        let mut info = TableInfo {
            rows: *row_counts,
            large_strings: strings_len > MAX_SMALL_INDEX,
            large_guid: guid_len > MAX_SMALL_INDEX,
            large_blob: blob_len > MAX_SMALL_INDEX,
            large_us: us_len > MAX_SMALL_INDEX,
            ..TableInfo::default()
        };

        for table_id in TableId::iter() {
            info.large[table_id as usize] = row_counts[table_id as usize] > MAX_SMALL_INDEX;
        }

        for ci in CodedIndexType::iter() {
            let threshold = MAX_SMALL_INDEX >> ci.tag_bits();
            info.coded_large[ci as usize] = ci
                .tables()
                .iter()
                .any(|table| row_counts[*table as usize] > threshold);
        }

        info
    }

    /// Returns the final row count of a table.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// Returns true if indexes into `table` serialize as 4 bytes instead of 2.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.large[table as usize]
    }

    /// Returns true if the given coded index serializes as 4 bytes instead of 2.
    #[must_use]
    pub fn is_large_coded(&self, ci: CodedIndexType) -> bool {
        self.coded_large[ci as usize]
    }

    /// Indicates the size of indexes into the `#Strings` heap. True means 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.large_strings
    }

    /// Indicates the size of indexes into the `#GUID` heap. True means 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.large_guid
    }

    /// Indicates the size of indexes into the `#Blob` heap. True means 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.large_blob
    }

    /// Indicates the size of indexes into the `#US` heap.
    ///
    /// `#US` indexes only ever appear inside 4-byte IL tokens, so this width never
    /// affects row layout; it is tracked for completeness.
    #[must_use]
    pub fn is_large_us(&self) -> bool {
        self.large_us
    }

    /// Returns the heap-size-flags byte of the `#~` stream header.
    ///
    /// Bit 0 marks a large `#Strings` heap, bit 1 a large `#GUID` heap, and bit 2 a
    /// large `#Blob` heap.
    #[must_use]
    pub fn heap_size_flags(&self) -> u8 {
        let mut flags = 0;
        if self.large_strings {
            flags |= 0x01;
        }
        if self.large_guid {
            flags |= 0x02;
        }
        if self.large_blob {
            flags |= 0x04;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_with(entries: &[(TableId, u32)]) -> [u32; TABLE_SLOT_COUNT] {
        let mut counts = [0_u32; TABLE_SLOT_COUNT];
        for (table, count) in entries {
            counts[*table as usize] = *count;
        }
        counts
    }

    #[test]
    fn small_everything_by_default() {
        let info = TableInfo::compute(&counts_with(&[(TableId::TypeDef, 2)]), 16, 4, 0, 8);
        assert!(!info.is_large(TableId::TypeDef));
        assert!(!info.is_large_coded(CodedIndexType::TypeDefOrRef));
        assert_eq!(info.heap_size_flags(), 0);
    }

    #[test]
    fn table_index_widens_past_16_bits() {
        let info = TableInfo::compute(&counts_with(&[(TableId::MemberRef, 0x1_0000)]), 0, 0, 0, 0);
        assert!(info.is_large(TableId::MemberRef));
        assert!(!info.is_large(TableId::TypeDef));
    }

    #[test]
    fn coded_index_widens_at_shifted_threshold() {
        // 2 tag bits: safe until 0x3FFF rows in any constituent.
        let info = TableInfo::compute(&counts_with(&[(TableId::TypeDef, 0x3FFF)]), 0, 0, 0, 0);
        assert!(!info.is_large_coded(CodedIndexType::TypeDefOrRef));

        let info = TableInfo::compute(&counts_with(&[(TableId::TypeDef, 0x4000)]), 0, 0, 0, 0);
        assert!(info.is_large_coded(CodedIndexType::TypeDefOrRef));
        // The table index itself is still comfortably small.
        assert!(!info.is_large(TableId::TypeDef));
    }

    #[test]
    fn five_bit_tag_threshold() {
        // HasCustomAttribute has 22 constituents -> 5 tag bits -> 0x7FF safe rows.
        let info = TableInfo::compute(&counts_with(&[(TableId::Param, 0x800)]), 0, 0, 0, 0);
        assert!(info.is_large_coded(CodedIndexType::HasCustomAttribute));
        assert!(!info.is_large_coded(CodedIndexType::HasConstant));
    }

    #[test]
    fn one_bit_tag_threshold() {
        let info = TableInfo::compute(&counts_with(&[(TableId::MethodDef, 0x8000)]), 0, 0, 0, 0);
        assert!(info.is_large_coded(CodedIndexType::MethodDefOrRef));
        assert!(info.is_large_coded(CodedIndexType::MemberForwarded));
        assert!(!info.is_large_coded(CodedIndexType::MemberRefParent));
    }

    #[test]
    fn heap_flags() {
        let info = TableInfo::compute(&counts_with(&[]), 0x1_0000, 0, 0x1_0000, 0x1_0000);
        assert!(info.is_large_str());
        assert!(info.is_large_guid());
        assert!(info.is_large_blob());
        assert!(!info.is_large_us());
        assert_eq!(info.heap_size_flags(), 0b0111);
    }
}
