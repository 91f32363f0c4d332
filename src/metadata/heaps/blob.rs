//! Blob Heap (`#Blob`) writer.
//!
//! Accumulates the binary blobs referenced by metadata table rows - signatures,
//! custom attribute values, public keys, marshalling descriptors. Each entry carries
//! a compressed length prefix; equal blobs are interned to a single index.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use crate::{
    metadata::compression::write_compressed_u32,
    metadata::heaps::{quad_align, MAX_SMALL_HEAP},
    Result,
};

/// Writer for the `#Blob` heap.
///
/// Offset 0 holds the single shared empty blob; inserting an empty byte slice
/// returns index 0 without growing the heap.
pub struct BlobHeap {
    data: Vec<u8>,
    index: HashMap<Vec<u8>, u32>,
    large: bool,
}

impl BlobHeap {
    /// Creates a heap holding only the empty blob at index 0.
    #[must_use]
    pub fn new() -> Self {
        BlobHeap {
            data: vec![0],
            index: HashMap::new(),
            large: false,
        }
    }

    /// Interns `value`, returning its heap index.
    ///
    /// Repeated insertion of byte-equal content returns the first insertion's index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the blob is too long for the
    /// compressed length prefix.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(existing) = self.index.get(value) {
            return Ok(*existing);
        }

        #[allow(clippy::cast_possible_truncation)]
        let offset = self.data.len() as u32;
        let len = u32::try_from(value.len())
            .map_err(|_| malformed_error!("blob of {} bytes cannot be encoded", value.len()))?;
        write_compressed_u32(len, &mut self.data)?;
        self.data.extend_from_slice(value);
        self.index.insert(value.to_vec(), offset);
        Ok(offset)
    }

    /// Quad-aligns the heap and fixes its large/small classification.
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

    /// True if the heap holds only the empty blob.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads back the blob at `index`, for verification.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        let mut offset = index as usize;
        if offset >= self.data.len() {
            return None;
        }
        let len = crate::metadata::compression::read_compressed_u32(&self.data, &mut offset).ok()?;
        self.data.get(offset..offset + len as usize)
    }
}

impl Default for BlobHeap {
    fn default() -> Self {
        BlobHeap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_is_index_zero() {
        let mut heap = BlobHeap::new();
        assert_eq!(heap.add(&[]).unwrap(), 0);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.get(0), Some(&[][..]));
    }

    #[test]
    fn interning_and_readback() {
        let mut heap = BlobHeap::new();
        let a = heap.add(&[1, 2, 3]).unwrap();
        let b = heap.add(&[4, 5]).unwrap();
        let a2 = heap.add(&[1, 2, 3]).unwrap();
        assert_eq!(a, 1);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(heap.get(a), Some(&[1_u8, 2, 3][..]));
        assert_eq!(heap.get(b), Some(&[4_u8, 5][..]));
    }

    #[test]
    fn long_blob_gets_wide_length_prefix() {
        let mut heap = BlobHeap::new();
        let payload = vec![0xAB_u8; 0x90];
        let ix = heap.add(&payload).unwrap();
        let entry = &heap.bytes()[ix as usize..];
        assert_eq!(&entry[..2], &[0x80, 0x90]);
        assert_eq!(heap.get(ix), Some(payload.as_slice()));
    }

    #[test]
    fn finalize_aligns_and_classifies() {
        let mut heap = BlobHeap::new();
        heap.add(&[9, 9, 9]).unwrap();
        heap.finalize();
        assert_eq!(heap.len() % 4, 0);
        assert!(!heap.is_large());
    }
}
