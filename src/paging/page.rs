//! Binary tuple page format.
//!
//! Every page in a relation file has the same layout:
//!
//! ```text
//! +-------------+-------------+------------------------------+-----------+
//! | width (i32) | count (i32) | count * width attributes     | zeroes... |
//! +-------------+-------------+------------------------------+-----------+
//!  0             4             8                                page_size
//! ```
//!
//! All integers are stored big endian. Tuple width is constant for a given
//! file, but each page stores it anyway so pages can be decoded on their own.

use super::io::PageNumber;
use crate::{
    db::DbError,
    storage::tuple::ATTRIBUTE_SIZE,
};

/// `[width][count]`.
pub(crate) const PAGE_HEADER_SIZE: usize = 2 * ATTRIBUTE_SIZE;

/// Maximum number of tuples of `width` attributes that fit in one page.
pub(crate) fn capacity(page_size: usize, width: usize) -> usize {
    if width == 0 {
        return 0;
    }

    page_size.saturating_sub(PAGE_HEADER_SIZE) / (width * ATTRIBUTE_SIZE)
}

/// How many tuples of `width` fit in `pages` full pages worth of memory.
/// Never returns less than 1 so that algorithms always make progress.
pub(crate) fn tuples_per_pages(pages: usize, page_size: usize, width: usize) -> usize {
    let bytes = pages * page_size;
    let tuple_size = width.max(1) * ATTRIBUTE_SIZE;

    (bytes / tuple_size).max(1)
}

/// In-memory representation of one page of tuples.
///
/// Attributes are stored flattened to avoid one allocation per tuple.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct TuplePage {
    width: usize,
    attributes: Vec<i32>,
}

impl TuplePage {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            attributes: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of tuples stored in this page.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.attributes.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn push(&mut self, tuple: &[i32]) {
        debug_assert_eq!(tuple.len(), self.width, "tuple width mismatch");
        self.attributes.extend_from_slice(tuple);
    }

    /// Returns the tuple at `slot`, if any.
    pub fn tuple(&self, slot: usize) -> Option<&[i32]> {
        if slot >= self.len() {
            return None;
        }

        let start = slot * self.width;
        Some(&self.attributes[start..start + self.width])
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Serializes the page into a buffer of exactly `page_size` bytes. The
    /// space after the last tuple is zero filled.
    pub fn serialize(&self, page_size: usize) -> Vec<u8> {
        debug_assert!(
            self.len() <= capacity(page_size, self.width),
            "{} tuples of width {} don't fit in a page of {page_size} bytes",
            self.len(),
            self.width
        );

        let mut buf = Vec::with_capacity(page_size);

        buf.extend_from_slice(&(self.width as i32).to_be_bytes());
        buf.extend_from_slice(&(self.len() as i32).to_be_bytes());

        for attribute in &self.attributes {
            buf.extend_from_slice(&attribute.to_be_bytes());
        }

        buf.resize(page_size, 0);

        buf
    }

    /// Parses a page from `buf`, where only the first `read` bytes are valid.
    ///
    /// Pages that don't contain a full header or claim to store more tuples
    /// than what was read are considered corrupted.
    pub fn deserialize(page_number: PageNumber, buf: &[u8], read: usize) -> Result<Self, DbError> {
        if read < PAGE_HEADER_SIZE {
            return Err(DbError::Corrupted(format!(
                "page {page_number} is {read} bytes long, header alone needs {PAGE_HEADER_SIZE}"
            )));
        }

        let width = read_i32(buf, 0);
        let count = read_i32(buf, ATTRIBUTE_SIZE);

        if width < 0 || count < 0 || (width == 0 && count > 0) {
            return Err(DbError::Corrupted(format!(
                "page {page_number} has invalid header: width {width}, count {count}"
            )));
        }

        let (width, count) = (width as usize, count as usize);
        let end = PAGE_HEADER_SIZE + count * width * ATTRIBUTE_SIZE;

        if end > read {
            return Err(DbError::Corrupted(format!(
                "page {page_number} stores {count} tuples of width {width} but only {read} bytes are available"
            )));
        }

        let attributes = (PAGE_HEADER_SIZE..end)
            .step_by(ATTRIBUTE_SIZE)
            .map(|offset| read_i32(buf, offset))
            .collect();

        Ok(Self { width, attributes })
    }
}

/// Reads a big endian `i32` at `offset`. Caller makes sure the bytes exist.
pub(crate) fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0; ATTRIBUTE_SIZE];
    bytes.copy_from_slice(&buf[offset..offset + ATTRIBUTE_SIZE]);
    i32::from_be_bytes(bytes)
}
