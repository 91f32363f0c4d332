//! GUID Heap (`#GUID`) writer.
//!
//! Accumulates the raw 16-byte GUIDs referenced by the Module table (the module
//! version id). Unlike the byte-offset-addressed heaps, `#GUID` indexes are 1-based
//! entry numbers; index 0 means "no GUID".
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use uguid::Guid;

use crate::metadata::heaps::{quad_align, MAX_SMALL_HEAP};

/// Writer for the `#GUID` heap.
pub struct GuidHeap {
    data: Vec<u8>,
    index: HashMap<Guid, u32>,
    large: bool,
}

impl GuidHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        GuidHeap {
            data: Vec::new(),
            index: HashMap::new(),
            large: false,
        }
    }

    /// Interns `value`, returning its 1-based entry index.
    ///
    /// Repeated insertion of an equal GUID returns the first insertion's index.
    pub fn add(&mut self, value: Guid) -> u32 {
        if let Some(existing) = self.index.get(&value) {
            return *existing;
        }

        #[allow(clippy::cast_possible_truncation)]
        let entry = (self.data.len() / 16) as u32 + 1;
        self.data.extend_from_slice(&value.to_bytes());
        self.index.insert(value, entry);
        entry
    }

    /// Quad-aligns the heap (a no-op for 16-byte entries) and fixes classification.
    pub fn finalize(&mut self) {
        quad_align(&mut self.data);
        self.large = self.data.len() > MAX_SMALL_HEAP;
    }

    /// True if indexes into this heap serialize as 4 bytes. Valid after [`Self::finalize`].
    #[must_use]
    pub fn is_large(&self) -> bool {
        self.large
    }

    /// The heap's current byte length.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// True if no GUID has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads back the GUID at 1-based `index`, for verification.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<Guid> {
        if index == 0 {
            return None;
        }
        let start = (index as usize - 1) * 16;
        let bytes: [u8; 16] = self.data.get(start..start + 16)?.try_into().ok()?;
        Some(Guid::from_bytes(bytes))
    }
}

impl Default for GuidHeap {
    fn default() -> Self {
        GuidHeap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn entries_are_one_based() {
        let mut heap = GuidHeap::new();
        let a = heap.add(guid!("01020304-0506-0708-090a-0b0c0d0e0f10"));
        let b = heap.add(guid!("11121314-1516-1718-191a-1b1c1d1e1f20"));
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(heap.len(), 32);
    }

    #[test]
    fn interning_returns_first_index() {
        let mut heap = GuidHeap::new();
        let value = guid!("01020304-0506-0708-090a-0b0c0d0e0f10");
        let a = heap.add(value);
        let a2 = heap.add(value);
        assert_eq!(a, a2);
        assert_eq!(heap.len(), 16);
        assert_eq!(heap.get(a), Some(value));
    }

    #[test]
    fn index_zero_is_none() {
        let heap = GuidHeap::new();
        assert_eq!(heap.get(0), None);
    }
}
