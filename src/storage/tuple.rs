//! Tuple model.
//!
//! Every attribute is a 32 bit signed integer, so a tuple is just a vector of
//! them. Equality and ordering are element-wise, which is exactly what [`Vec`]
//! gives us for free.

use std::{fmt::Display, mem};

/// One row of data.
pub type Tuple = Vec<i32>;

/// Size in bytes of one attribute on disk.
pub(crate) const ATTRIBUTE_SIZE: usize = mem::size_of::<i32>();

/// Locates a tuple inside a relation file.
///
/// `slot` is the index of the tuple within its page, not a byte offset. Byte
/// offsets can be computed from the slot since tuples are fixed width.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct RecordId {
    pub page: u32,
    pub slot: u32,
}

impl RecordId {
    pub fn new(page: u32, slot: u32) -> Self {
        Self { page, slot }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

/// Builds a new tuple with the attributes of `left` followed by the
/// attributes of `right`.
pub fn concat(left: &[i32], right: &[i32]) -> Tuple {
    let mut tuple = Vec::with_capacity(left.len() + right.len());
    tuple.extend_from_slice(left);
    tuple.extend_from_slice(right);
    tuple
}

/// Picks the attributes at `indexes` in that order.
pub(crate) fn project(tuple: &[i32], indexes: &[usize]) -> Tuple {
    indexes.iter().map(|i| tuple[*i]).collect()
}

/// Formats a tuple the way the human readable files store it: `1,2,3`.
pub(crate) fn to_text(tuple: &[i32]) -> String {
    tuple
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
