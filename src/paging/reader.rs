//! Sequential and random access reads of binary tuple files.

use std::{
    io::{Read, Seek},
    path::Path,
};

use super::{
    io::{FileOps, PageIo, PageNumber},
    page::TuplePage,
};
use crate::{
    db::DbError,
    storage::tuple::{RecordId, Tuple},
};

/// Reads tuples one at a time from a paginated binary file.
///
/// Only one page is kept in memory at any point. [`Self::seek`] can jump to
/// any [`RecordId`] without scanning the pages that come before it, which is
/// what index scans rely on.
pub struct TupleReader<I> {
    io: PageIo<I>,
    /// Reusable page sized buffer.
    buf: Vec<u8>,
    /// Page currently in memory and its number.
    current: Option<(PageNumber, TuplePage)>,
    /// Page that contains the next tuple.
    page_number: PageNumber,
    /// Slot of the next tuple inside [`Self::page_number`].
    slot: usize,
    /// Set once we read past the last page. Cleared by seeks.
    eof: bool,
}

impl<F: FileOps> TupleReader<F> {
    /// Opens the file at `path` for reading.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self, DbError> {
        Ok(Self::new(F::open(path)?, page_size))
    }
}

impl<I: Read + Seek> TupleReader<I> {
    pub fn new(io: I, page_size: usize) -> Self {
        Self {
            io: PageIo::new(io, page_size),
            buf: vec![0; page_size],
            current: None,
            page_number: 0,
            slot: 0,
            eof: false,
        }
    }

    /// Returns the next tuple or [`None`] once the file is exhausted.
    pub fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        Ok(self.next_with_record_id()?.map(|(_, tuple)| tuple))
    }

    /// Same as [`Self::try_next`] but also returns where the tuple is located.
    pub fn next_with_record_id(&mut self) -> Result<Option<(RecordId, Tuple)>, DbError> {
        loop {
            if self.eof {
                return Ok(None);
            }

            if !self.is_loaded(self.page_number) && !self.load(self.page_number)? {
                self.eof = true;
                return Ok(None);
            }

            if let Some((_, page)) = &self.current {
                if let Some(tuple) = page.tuple(self.slot) {
                    let record_id = RecordId::new(self.page_number, self.slot as u32);
                    self.slot += 1;
                    return Ok(Some((record_id, tuple.to_vec())));
                }
            }

            // Page consumed, move on to the next one.
            self.page_number += 1;
            self.slot = 0;
        }
    }

    /// Goes back to the first tuple of the file.
    pub fn reset(&mut self) {
        self.seek(RecordId::new(0, 0));
    }

    /// Positions the reader so that the next call to [`Self::try_next`]
    /// returns the tuple at `record_id`.
    ///
    /// Seeking past the last tuple of a page continues on the next page.
    /// Seeking past the end of the file makes the reader return [`None`].
    pub fn seek(&mut self, record_id: RecordId) {
        self.page_number = record_id.page;
        self.slot = record_id.slot as usize;
        self.eof = false;
    }

    /// Location of the tuple that the next call to [`Self::try_next`] would
    /// return if the current page still has tuples.
    pub fn position(&self) -> RecordId {
        RecordId::new(self.page_number, self.slot as u32)
    }

    /// Reads every remaining tuple.
    pub fn read_all(&mut self) -> Result<Vec<Tuple>, DbError> {
        let mut tuples = Vec::new();

        while let Some(tuple) = self.try_next()? {
            tuples.push(tuple);
        }

        Ok(tuples)
    }

    /// Returns the wrapped IO resource.
    pub fn into_inner(self) -> I {
        self.io.into_inner()
    }

    fn is_loaded(&self, page_number: PageNumber) -> bool {
        matches!(self.current, Some((loaded, _)) if loaded == page_number)
    }

    /// Loads `page_number` into memory. Returns `false` if the page is past
    /// the end of the file.
    fn load(&mut self, page_number: PageNumber) -> Result<bool, DbError> {
        let read = self.io.read(page_number, &mut self.buf)?;

        if read == 0 {
            self.current = None;
            return Ok(false);
        }

        let page = TuplePage::deserialize(page_number, &self.buf, read)?;
        self.current = Some((page_number, page));

        Ok(true)
    }
}
