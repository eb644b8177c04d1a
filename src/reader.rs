use std::io::{BufRead, BufReader, Read};

use crate::error::Result;

/// One buffer's worth of input handed to the tokenizer.
///
/// `bytes` ends on a record separator unless `is_final` is set.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub bytes: &'a [u8],
    pub is_final: bool,
}

/// Buffer manager: the only component that reads from the input stream.
///
/// Each call to [`ChunkReader::next_chunk`] fills a reusable buffer with up to
/// `buffer_size` bytes. A full read is then extended through the next record
/// separator so no row is ever split across two chunks, whatever sizes the
/// underlying source hands out per physical read.
pub struct ChunkReader<R: Read> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    buffer_size: usize,
    record_sep: u8,
    exhausted: bool,
    chunks: u64,
    bytes_read: u64,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(input: R, buffer_size: usize, record_sep: u8) -> Self {
        Self {
            inner: BufReader::new(input),
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
            record_sep,
            exhausted: false,
            chunks: 0,
            bytes_read: 0,
        }
    }

    /// Reads the next chunk. Once a final chunk has been returned every
    /// further call yields an empty final chunk.
    pub fn next_chunk(&mut self) -> Result<Chunk<'_>> {
        self.buf.clear();
        if self.exhausted {
            return Ok(Chunk { bytes: &self.buf, is_final: true });
        }

        let n = (&mut self.inner)
            .take(self.buffer_size as u64)
            .read_to_end(&mut self.buf)?;

        let mut is_final = n < self.buffer_size;
        if !is_final {
            // A full read may stop mid-row: pull the rest of it.
            self.inner.read_until(self.record_sep, &mut self.buf)?;
            // read_until only stops short of the separator at end of stream.
            is_final = self.buf.last() != Some(&self.record_sep);
        }

        self.exhausted = is_final;
        if !self.buf.is_empty() {
            self.chunks += 1;
        }
        self.bytes_read += self.buf.len() as u64;

        log::trace!("Chunk #{}: {} bytes (final: {})", self.chunks, self.buf.len(), is_final);
        Ok(Chunk { bytes: &self.buf, is_final })
    }

    /// Reads one record, separator included, into `out`. Used by the driver
    /// to consume the header before chunked scanning starts.
    /// Returns the number of bytes read; 0 means end of stream.
    pub fn read_record(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let n = self.inner.read_until(self.record_sep, out)?;
        self.bytes_read += n as u64;
        if n == 0 {
            self.exhausted = true;
        }
        Ok(n)
    }

    /// Chunks returned so far, empty trailing ones excluded.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Total bytes consumed from the input, header included.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
