//! Tuple page IO.
//!
//! Relation files, sort runs and query output all share the same paginated
//! binary format (see [`page`]). [`reader::TupleReader`] and
//! [`writer::TupleWriter`] are the only things that know about it. The
//! [`cache`] module manages the temporary directories where sort runs live.

pub mod cache;
pub mod io;
pub(crate) mod page;
pub mod reader;
pub mod text;
pub mod writer;

use crate::db::DbError;

/// Destination of query output. Implemented by the binary and the human
/// readable writers.
pub trait TupleSink {
    fn write_tuple(&mut self, tuple: &[i32]) -> Result<(), DbError>;

    fn close(&mut self) -> Result<(), DbError>;
}
