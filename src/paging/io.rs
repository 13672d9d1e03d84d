//! Page granular IO on top of any [`Read`] + [`Seek`] / [`Write`] + [`Seek`]
//! resource.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Page numbers inside a single file. Page 0 is the first page.
pub(crate) type PageNumber = u32;

/// File system operations that plans need in order to spill data to disk or
/// open relations by path.
///
/// Implemented for [`File`]. Everything that doesn't need paths (page codecs,
/// readers, writers) works with plain [`Read`]/[`Write`]/[`Seek`] so tests can
/// use in-memory buffers.
pub trait FileOps: Seek + Read + Write + Sized {
    /// Creates the file at `path`, truncating it if it already exists.
    fn create(path: impl AsRef<Path>) -> io::Result<Self>;

    /// Opens an existing file for reading.
    fn open(path: impl AsRef<Path>) -> io::Result<Self>;

    /// Deletes the file at `path`.
    fn remove(path: impl AsRef<Path>) -> io::Result<()>;
}

impl FileOps for File {
    fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        File::options()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
    }

    fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        File::open(path)
    }

    fn remove(path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Reads and writes whole pages at `page_number * page_size` offsets.
///
/// ```text
/// OFFSET
///         +-------------+
///       0 |   PAGE 0    |
///         +-------------+
///    4096 |   PAGE 1    |
///         +-------------+
///    8192 |   PAGE 2    |
///         +-------------+
/// ```
pub(crate) struct PageIo<I> {
    io: I,
    pub page_size: usize,
}

impl<I> PageIo<I> {
    pub fn new(io: I, page_size: usize) -> Self {
        Self { io, page_size }
    }

    /// Returns the wrapped IO resource.
    pub fn into_inner(self) -> I {
        self.io
    }

    fn offset_of(&self, page_number: PageNumber) -> u64 {
        (self.page_size as u64) * (page_number as u64)
    }
}

impl<I: Seek + Read> PageIo<I> {
    /// Reads the page into `buf` and returns how many bytes were actually
    /// read.
    ///
    /// A return value of 0 means the page is past the end of the file. Any
    /// other value smaller than [`Self::page_size`] means the file was
    /// truncated in the middle of a page, which callers decide how to handle.
    /// Files written by [`super::writer::TupleWriter`] always end on a page
    /// boundary.
    pub fn read(&mut self, page_number: PageNumber, buf: &mut [u8]) -> io::Result<usize> {
        debug_assert_eq!(
            buf.len(),
            self.page_size,
            "buffer of incorrect length {} given for page size {}",
            buf.len(),
            self.page_size
        );

        self.io.seek(SeekFrom::Start(self.offset_of(page_number)))?;

        // A single read() call is allowed to return less than we asked for,
        // so keep going until the page is full or we hit EOF.
        let mut total = 0;
        while total < buf.len() {
            match self.io.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

impl<I: Seek + Write> PageIo<I> {
    /// Writes the full page at its offset.
    pub fn write(&mut self, page_number: PageNumber, buf: &[u8]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);

        self.io.seek(SeekFrom::Start(self.offset_of(page_number)))?;
        self.io.write_all(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.io.flush()
    }
}
