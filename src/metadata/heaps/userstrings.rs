//! User String Heap (`#US`) writer.
//!
//! Accumulates the string literals referenced by `ldstr` instructions. Entries are
//! length-prefixed UTF-16LE with a trailing flag byte; IL refers to them through
//! tokens carrying the reserved `0x70` high tag, which distinguishes string-heap
//! lookups from table tokens.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use widestring::U16String;

use crate::{
    metadata::compression::write_compressed_u32,
    metadata::heaps::{quad_align, MAX_SMALL_HEAP},
    Result,
};

/// Writer for the `#US` heap.
///
/// Each entry is `compressed(byte_len * 2 + 1)` followed by the UTF-16LE code units
/// and one terminal byte. The terminal byte is 1 when any code unit needs more than
/// simple ANSI handling (high byte set, or one of the low control/special points),
/// otherwise 0.
pub struct UserStringsHeap {
    data: Vec<u8>,
    index: HashMap<String, u32>,
    large: bool,
}

impl UserStringsHeap {
    /// Creates a heap holding only the empty entry at index 0.
    #[must_use]
    pub fn new() -> Self {
        UserStringsHeap {
            data: vec![0],
            index: HashMap::new(),
            large: false,
        }
    }

    /// Interns `value`, returning its heap index.
    ///
    /// Repeated insertion of an equal string returns the first insertion's index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the encoded entry would exceed the
    /// compressed length-prefix range.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(existing) = self.index.get(value) {
            return Ok(*existing);
        }

        #[allow(clippy::cast_possible_truncation)]
        let offset = self.data.len() as u32;

        let wide = U16String::from_str(value);
        let byte_len = wide.len() * 2;
        write_compressed_u32(u32::try_from(byte_len + 1).map_err(|_| {
            malformed_error!("user string of {} bytes cannot be encoded", byte_len)
        })?, &mut self.data)?;

        let mut needs_flag = false;
        for unit in wide.as_slice() {
            self.data.extend_from_slice(&unit.to_le_bytes());
            needs_flag |= Self::unit_needs_flag(*unit);
        }
        self.data.push(u8::from(needs_flag));

        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    // ECMA-335 II.24.2.4: the terminal byte is 1 when any code unit is outside the
    // simple ANSI range or is one of the enumerated special low code points.
    fn unit_needs_flag(unit: u16) -> bool {
        matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F) || unit >= 0x80
    }

    /// Quad-aligns the heap and fixes its large/small classification.
    pub fn finalize(&mut self) {
        quad_align(&mut self.data);
        self.large = self.data.len() > MAX_SMALL_HEAP;
    }

    /// True if indexes into this heap exceed 16 bits. Valid after [`Self::finalize`].
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

    /// True if the heap holds only the empty entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for UserStringsHeap {
    fn default() -> Self {
        UserStringsHeap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_first_index() {
        let mut heap = UserStringsHeap::new();
        let a = heap.add("hello").unwrap();
        let b = heap.add("world").unwrap();
        let a2 = heap.add("hello").unwrap();
        assert_eq!(a, 1);
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn encoding_is_utf16le_with_flag() {
        let mut heap = UserStringsHeap::new();
        heap.add("Hi").unwrap();
        // len prefix 2*2+1 = 5, 'H' 'i' as UTF-16LE, flag 0.
        assert_eq!(heap.bytes(), &[0, 5, b'H', 0, b'i', 0, 0]);
    }

    #[test]
    fn flag_byte_set_for_non_ansi() {
        let mut heap = UserStringsHeap::new();
        let ix = heap.add("\u{263A}").unwrap() as usize;
        let entry = &heap.bytes()[ix..];
        assert_eq!(entry[0], 3); // 1*2+1
        assert_eq!(&entry[1..3], &0x263A_u16.to_le_bytes());
        assert_eq!(entry[3], 1);
    }

    #[test]
    fn flag_byte_set_for_special_low_points() {
        let mut heap = UserStringsHeap::new();
        let ix = heap.add("a'b").unwrap() as usize;
        let entry = &heap.bytes()[ix..];
        assert_eq!(*entry.get(7).unwrap(), 1);
    }

    #[test]
    fn finalize_aligns() {
        let mut heap = UserStringsHeap::new();
        heap.add("x").unwrap();
        heap.finalize();
        assert_eq!(heap.len() % 4, 0);
        assert!(!heap.is_large());
    }
}
