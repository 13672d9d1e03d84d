//! Human readable tuple files.
//!
//! One tuple per line, attributes separated by commas:
//!
//! ```text
//! 1,200,50
//! 2,200,200
//! ```
//!
//! Only used for fixtures and for eyeballing query output, the engine itself
//! always reads binary files.

use std::io::{BufRead, Seek, SeekFrom, Write};

use super::TupleSink;
use crate::{
    db::DbError,
    storage::tuple::{self, Tuple},
};

/// Reads human readable tuples line by line.
pub struct TextTupleReader<R> {
    reader: R,
    line: String,
    /// Line number of the last line read, for error messages.
    line_number: usize,
}

impl<R: BufRead> TextTupleReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }

    /// Returns the next tuple, skipping blank lines.
    pub fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            self.line.clear();

            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }

            self.line_number += 1;

            let line = self.line.trim();

            if line.is_empty() {
                continue;
            }

            return line
                .split(',')
                .map(|attribute| attribute.trim().parse::<i32>())
                .collect::<Result<Tuple, _>>()
                .map(Some)
                .map_err(|e| {
                    DbError::Corrupted(format!(
                        "line {}: cannot parse '{line}' as a tuple: {e}",
                        self.line_number
                    ))
                });
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<Tuple>, DbError> {
        let mut tuples = Vec::new();

        while let Some(tuple) = self.try_next()? {
            tuples.push(tuple);
        }

        Ok(tuples)
    }
}

impl<R: BufRead + Seek> TextTupleReader<R> {
    /// Goes back to the first line.
    pub fn reset(&mut self) -> Result<(), DbError> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.line_number = 0;
        Ok(())
    }
}

/// Writes tuples as comma separated lines.
pub struct TextTupleWriter<W> {
    writer: W,
    closed: bool,
}

impl<W: Write> TextTupleWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    pub fn write_tuple(&mut self, tuple: &[i32]) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("attempt to write a tuple after close()".into()));
        }

        writeln!(self.writer, "{}", tuple::to_text(tuple))?;

        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DbError> {
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TupleSink for TextTupleWriter<W> {
    fn write_tuple(&mut self, tuple: &[i32]) -> Result<(), DbError> {
        TextTupleWriter::write_tuple(self, tuple)
    }

    fn close(&mut self) -> Result<(), DbError> {
        TextTupleWriter::close(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{TextTupleReader, TextTupleWriter};
    use crate::db::DbError;

    #[test]
    fn write_then_read() -> Result<(), DbError> {
        let mut writer = TextTupleWriter::new(Vec::new());
        writer.write_tuple(&[1, 200, 50])?;
        writer.write_tuple(&[-2, 0, 7])?;
        writer.close()?;

        let text = writer.into_inner();
        assert_eq!(String::from_utf8_lossy(&text), "1,200,50\n-2,0,7\n");

        let mut reader = TextTupleReader::new(io::Cursor::new(text));
        assert_eq!(reader.read_all()?, vec![vec![1, 200, 50], vec![-2, 0, 7]]);

        reader.reset()?;
        assert_eq!(reader.try_next()?, Some(vec![1, 200, 50]));

        Ok(())
    }

    #[test]
    fn blank_lines_and_spaces() -> Result<(), DbError> {
        let mut reader = TextTupleReader::new(io::Cursor::new("\n 1, 2 \n\n3,4\n"));
        assert_eq!(reader.read_all()?, vec![vec![1, 2], vec![3, 4]]);
        Ok(())
    }

    #[test]
    fn garbage_is_corruption() {
        let mut reader = TextTupleReader::new(io::Cursor::new("1,2\n1,x\n"));

        assert!(reader.try_next().is_ok());
        assert!(matches!(reader.try_next(), Err(DbError::Corrupted(_))));
    }
}
