//! Checked reads of big-endian fields from packet payloads.
//!
//! Telemetry payloads are walked field by field. Every read is bounds
//! checked and fails with [`Error::Malformed`] instead of reading past the
//! end of the buffer.

use crate::error::Error;
use crate::Result;

/// A read cursor over an immutable byte slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(Error::Malformed(format!(
                "Cannot seek to offset {} in a buffer of {} bytes",
                pos,
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Borrow `len` bytes at an absolute offset without moving the cursor.
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "Buffer underflow: {} bytes at offset {} requested but only {} available",
                    len,
                    offset,
                    self.buf.len()
                ))
            })
    }

    /// Take `len` bytes and advance the cursor.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.slice_at(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Read a big-endian integer of `N` bytes at an absolute offset.
    pub fn peek_be<const N: usize>(&self, offset: usize) -> Result<u64> {
        Ok(be_value(self.slice_at(offset, N)?))
    }

    /// Read a big-endian integer of `N` bytes and advance the cursor.
    pub fn take_be<const N: usize>(&mut self) -> Result<u64> {
        Ok(be_value(self.take(N)?))
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take_be::<1>()? as u8)
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        Ok(self.take_be::<2>()? as u16)
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        Ok(self.take_be::<4>()? as u32)
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        self.take_be::<8>()
    }
}

fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"\x00\x00\x00\x00\x00\x00\x00\x00\x01\x01\x02\x03\x05\x08\x0d\x15";

    #[test]
    fn test_peek_be() {
        let cursor = Cursor::new(DATA);
        assert_eq!(cursor.peek_be::<8>(0).unwrap(), 0);
        assert_eq!(cursor.peek_be::<8>(8).unwrap(), 0x0101020305080d15);
        assert_eq!(cursor.peek_be::<4>(6).unwrap(), 0x00000101);
        assert_eq!(cursor.peek_be::<2>(14).unwrap(), 0x0d15);
        assert_eq!(cursor.peek_be::<1>(15).unwrap(), 0x15);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_take_advances() {
        let mut cursor = Cursor::new(DATA);
        assert_eq!(cursor.take_u64().unwrap(), 0);
        assert_eq!(cursor.take_u32().unwrap(), 0x01010203);
        assert_eq!(cursor.take_u16().unwrap(), 0x0508);
        assert_eq!(cursor.take_u8().unwrap(), 0x0d);
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.take(1).unwrap(), b"\x15");
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut cursor = Cursor::new(DATA);
        assert!(matches!(cursor.peek_be::<2>(15), Err(Error::Malformed(_))));
        assert!(cursor.peek_be::<8>(usize::MAX).is_err());

        cursor.seek(12).unwrap();
        assert!(cursor.take_u64().is_err());
        // A failed read leaves the cursor where it was.
        assert_eq!(cursor.position(), 12);
        assert!(cursor.seek(17).is_err());
    }
}
