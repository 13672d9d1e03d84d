//! Disk storage data structures.

pub mod btree;
pub mod index;
pub mod tuple;

pub use btree::{BPlusTree, IndexReader};
pub use tuple::{RecordId, Tuple};
