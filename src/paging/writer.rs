//! Buffered writes of binary tuple files.

use std::{
    io::{Seek, Write},
    path::Path,
};

use super::{
    io::{FileOps, PageIo, PageNumber},
    page::{capacity, TuplePage},
    TupleSink,
};
use crate::db::DbError;

/// Writes tuples into a paginated binary file.
///
/// Tuples are buffered in one in-memory page which is written to disk when
/// it's full or when [`Self::close`] is called. The width of the file is fixed
/// by the first tuple.
pub struct TupleWriter<I> {
    io: PageIo<I>,
    /// Page being filled. [`None`] until the first tuple arrives.
    page: Option<TuplePage>,
    /// Number of tuples that fit in [`Self::page`].
    capacity: usize,
    /// Where the buffered page will be written.
    next_page: PageNumber,
    /// Total tuples written so far.
    written: usize,
    closed: bool,
}

impl<F: FileOps> TupleWriter<F> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>, page_size: usize) -> Result<Self, DbError> {
        Ok(Self::new(F::create(path)?, page_size))
    }
}

impl<I: Write + Seek> TupleWriter<I> {
    pub fn new(io: I, page_size: usize) -> Self {
        Self {
            io: PageIo::new(io, page_size),
            page: None,
            capacity: 0,
            next_page: 0,
            written: 0,
            closed: false,
        }
    }

    /// Buffers `tuple`, flushing the current page first if it's full.
    pub fn write_tuple(&mut self, tuple: &[i32]) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("attempt to write a tuple after close()".into()));
        }

        if self.page.is_none() {
            let capacity = capacity(self.io.page_size, tuple.len());

            if capacity == 0 {
                return Err(DbError::Other(format!(
                    "tuples of width {} don't fit in pages of {} bytes",
                    tuple.len(),
                    self.io.page_size
                )));
            }

            self.capacity = capacity;
            self.page = Some(TuplePage::new(tuple.len()));
        }

        let full = match &self.page {
            Some(page) if page.width() != tuple.len() => {
                return Err(DbError::Other(format!(
                    "attempt to write tuple of width {} into a file of width {}",
                    tuple.len(),
                    page.width()
                )));
            }
            Some(page) => page.len() >= self.capacity,
            None => false,
        };

        if full {
            self.flush_page()?;
        }

        if let Some(page) = self.page.as_mut() {
            page.push(tuple);
            self.written += 1;
        }

        Ok(())
    }

    /// Writes whatever is buffered and flushes the underlying IO. Writing
    /// after this returns an error. Calling it twice is a no-op.
    pub fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }

        self.flush_page()?;
        self.io.flush()?;
        self.closed = true;

        Ok(())
    }

    /// Number of tuples written so far.
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Returns the wrapped IO resource. Call [`Self::close`] first or the
    /// buffered tuples are lost.
    pub fn into_inner(self) -> I {
        self.io.into_inner()
    }

    fn flush_page(&mut self) -> Result<(), DbError> {
        let Some(page) = self.page.as_mut() else {
            return Ok(());
        };

        if page.is_empty() {
            return Ok(());
        }

        self.io
            .write(self.next_page, &page.serialize(self.io.page_size))?;
        self.next_page += 1;
        page.clear();

        Ok(())
    }
}

impl<I: Write + Seek> TupleSink for TupleWriter<I> {
    fn write_tuple(&mut self, tuple: &[i32]) -> Result<(), DbError> {
        TupleWriter::write_tuple(self, tuple)
    }

    fn close(&mut self) -> Result<(), DbError> {
        TupleWriter::close(self)
    }
}
