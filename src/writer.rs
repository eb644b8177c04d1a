use std::io::Write;

use crc32fast::Hasher;

use crate::error::{Result, ScanError};

/// Fixed-capacity output buffer in front of the downstream writer.
///
/// Bytes `[0, offset)` of the buffer are pending output. The buffer is only
/// handed downstream when an incoming value would not fit, or on an explicit
/// [`OutputWriter::flush`], which the driver always performs at end of
/// stream. A single value larger than the whole buffer is rejected rather
/// than split.
pub struct OutputWriter<W: Write> {
    inner: W,
    buf: Box<[u8]>,
    offset: usize,
    hasher: Hasher,
    bytes_written: u64,
    flushes: u64,
}

impl<W: Write> OutputWriter<W> {
    pub fn with_capacity(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; capacity].into_boxed_slice(),
            offset: 0,
            hasher: Hasher::new(),
            bytes_written: 0,
            flushes: 0,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes buffered but not yet sent downstream.
    #[inline(always)]
    pub fn pending(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let capacity = self.buf.len();
        if bytes.len() > capacity {
            return Err(ScanError::RecordTooLarge { len: bytes.len(), capacity });
        }
        if bytes.len() > capacity - self.offset {
            self.drain()?;
        }
        self.buf[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        Ok(())
    }

    /// Sends everything buffered downstream and flushes the inner writer.
    pub fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.inner.flush()?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if self.offset == 0 {
            return Ok(());
        }
        let pending = &self.buf[..self.offset];
        self.inner.write_all(pending)?;
        self.hasher.update(pending);
        self.bytes_written += pending.len() as u64;
        self.flushes += 1;
        self.offset = 0;
        Ok(())
    }

    /// Bytes handed downstream so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of downstream writes issued.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// CRC32 of every byte handed downstream so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns the inner writer. Buffered bytes that were never flushed are dropped.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
