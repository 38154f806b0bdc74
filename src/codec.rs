//! # Fixed-Width Binary Codec
//!
//! Cursor-positioned readers and writers over a fixed byte region. This is the
//! lowest layer of the crate: index records and meta-page cursors are encoded
//! through [`ByteWriter`] and decoded through [`ByteReader`], always against a
//! view of a memory-mapped page.
//!
//! ## Operations
//!
//! - Fixed-width get/put for 8/16/32/64-bit integers and 32/64-bit floats, in
//!   both endiannesses (`get_u32_be`, `put_f64_le`, ...). The big-endian u64/u32
//!   accessors are the ones used for the on-disk index fields.
//! - Raw byte copy advancing the cursor (`get_bytes`, `put_bytes`).
//! - `flip()` truncates the region to the bytes consumed/produced so far.
//! - Cursor control: `position`, `seek`, `skip`, `remaining`.
//!
//! Any access that would exceed the region bound fails with an out-of-bounds
//! error; the cursor is left unchanged on failure.

use eyre::{ensure, Result};

/// Cursor-positioned reader over a borrowed byte region.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        ensure!(
            pos <= self.buf.len(),
            "seek to {} exceeds region of {} bytes",
            pos,
            self.buf.len()
        );
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Consumes `count` bytes, advancing the cursor.
    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        ensure!(
            count <= self.remaining(),
            "read of {} bytes at offset {} exceeds region of {} bytes",
            count,
            self.pos,
            self.buf.len()
        );
        let bytes = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    reader_accessors! { u16, i16, u32, i32, u64, i64, f32, f64 }

    /// Raw byte copy: returns the next `len` bytes and advances the cursor.
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// The region truncated at the current cursor.
    pub fn flip(&self) -> &'a [u8] {
        &self.buf[..self.pos]
    }
}

/// Cursor-positioned writer over a borrowed mutable byte region.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        ensure!(
            pos <= self.buf.len(),
            "seek to {} exceeds region of {} bytes",
            pos,
            self.buf.len()
        );
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        ensure!(
            count <= self.remaining(),
            "skip of {} bytes at offset {} exceeds region of {} bytes",
            count,
            self.pos,
            self.buf.len()
        );
        self.pos += count;
        Ok(())
    }

    /// Raw byte copy into the region, advancing the cursor by the copied length.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(
            bytes.len() <= self.remaining(),
            "write of {} bytes at offset {} exceeds region of {} bytes",
            bytes.len(),
            self.pos,
            self.buf.len()
        );
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    #[inline]
    pub fn put_i8(&mut self, value: i8) -> Result<()> {
        self.put_bytes(&[value as u8])
    }

    writer_accessors! { u16, i16, u32, i32, u64, i64, f32, f64 }

    /// The region truncated at the current cursor.
    pub fn flip(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trip_both_endians() {
        let mut buf = [0u8; 64];

        let mut writer = ByteWriter::new(&mut buf);
        writer.put_u8(0xAB).unwrap();
        writer.put_u16_le(0x1234).unwrap();
        writer.put_u16_be(0x1234).unwrap();
        writer.put_u32_le(0xDEADBEEF).unwrap();
        writer.put_u32_be(0xDEADBEEF).unwrap();
        writer.put_u64_le(0x0102030405060708).unwrap();
        writer.put_u64_be(0x0102030405060708).unwrap();
        writer.put_i32_be(-42).unwrap();
        let written = writer.position();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.get_u8().unwrap(), 0xAB);
        assert_eq!(reader.get_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.get_u16_be().unwrap(), 0x1234);
        assert_eq!(reader.get_u32_le().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.get_u32_be().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.get_u64_le().unwrap(), 0x0102030405060708);
        assert_eq!(reader.get_u64_be().unwrap(), 0x0102030405060708);
        assert_eq!(reader.get_i32_be().unwrap(), -42);
        assert_eq!(reader.position(), written);
    }

    #[test]
    fn float_round_trip() {
        let mut buf = [0u8; 24];

        let mut writer = ByteWriter::new(&mut buf);
        writer.put_f32_le(1.5).unwrap();
        writer.put_f32_be(-2.25).unwrap();
        writer.put_f64_be(std::f64::consts::PI).unwrap();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.get_f32_le().unwrap(), 1.5);
        assert_eq!(reader.get_f32_be().unwrap(), -2.25);
        assert_eq!(reader.get_f64_be().unwrap(), std::f64::consts::PI);
    }

    #[test]
    fn big_endian_layout_matches_wire_format() {
        let mut buf = [0u8; 8];
        ByteWriter::new(&mut buf).put_u64_be(0x0102030405060708).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn out_of_bounds_read_fails_and_preserves_cursor() {
        let buf = [0u8; 4];
        let mut reader = ByteReader::new(&buf);
        reader.get_u16_le().unwrap();

        assert!(reader.get_u32_le().is_err());
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.get_u16_be().unwrap(), 0);
    }

    #[test]
    fn out_of_bounds_write_fails() {
        let mut buf = [0u8; 4];
        let mut writer = ByteWriter::new(&mut buf);
        writer.put_u32_be(1).unwrap();
        assert!(writer.put_u8(2).is_err());
        assert!(writer.seek(5).is_err());
    }

    #[test]
    fn raw_bytes_advance_cursor() {
        let mut buf = [0u8; 8];
        let mut writer = ByteWriter::new(&mut buf);
        writer.put_bytes(b"abc").unwrap();
        assert_eq!(writer.position(), 3);
        assert_eq!(writer.flip(), b"abc");

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.get_bytes(3).unwrap(), b"abc");
        assert_eq!(reader.flip(), b"abc");
        assert_eq!(reader.remaining(), 5);
    }

    #[test]
    fn seek_and_skip() {
        let buf = [9u8; 16];
        let mut reader = ByteReader::new(&buf);
        reader.seek(10).unwrap();
        reader.skip(4).unwrap();
        assert_eq!(reader.remaining(), 2);
        assert!(reader.skip(3).is_err());
    }
}
