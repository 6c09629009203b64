//! Little-endian binary stream helpers.
//!
//! Every supported wire format is little-endian; the reader maps short reads
//! to [`Error::Parse`] so truncated files surface as parse errors rather
//! than raw I/O failures.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::IVec3;

use crate::{Error, Result};

/// A cursor over a byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(Error::truncated("skipped bytes"));
        }
        self.offset += count;
        Ok(())
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::truncated("seek target"));
        }
        self.offset = offset;
        Ok(())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::truncated("byte run"));
        }
        let bytes = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.chunk().read_u8().map_err(|_| Error::truncated("u8"))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.chunk().read_u16::<LE>().map_err(|_| Error::truncated("u16"))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.chunk().read_u32::<LE>().map_err(|_| Error::truncated("u32"))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.chunk().read_i32::<LE>().map_err(|_| Error::truncated("i32"))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.chunk().read_f32::<LE>().map_err(|_| Error::truncated("f32"))
    }

    /// A `u32` length followed by that many raw bytes, as UTF-8 (lossy).
    pub fn read_str_u32(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_ivec3(&mut self) -> Result<IVec3> {
        Ok(IVec3::new(self.read_i32()?, self.read_i32()?, self.read_i32()?))
    }

    fn chunk(&mut self) -> ByteCursor<'a, '_> {
        ByteCursor { reader: self }
    }
}

/// Adapter so the [`byteorder`] extension traits drive the reader's offset.
struct ByteCursor<'a, 'r> {
    reader: &'r mut Reader<'a>,
}

impl std::io::Read for ByteCursor<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = buf.len().min(self.reader.remaining());
        let offset = self.reader.offset;
        buf[..count].copy_from_slice(&self.reader.data[offset..offset + count]);
        self.reader.offset += count;
        Ok(count)
    }
}

/// A growable little-endian byte buffer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.write_u8(value).unwrap();
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.write_u16::<LE>(value).unwrap();
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.write_u32::<LE>(value).unwrap();
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.write_i32::<LE>(value).unwrap();
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.write_f32::<LE>(value).unwrap();
    }

    /// A `u32` length followed by the raw bytes.
    pub fn write_str_u32(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
    }

    pub fn write_ivec3(&mut self, value: IVec3) {
        self.write_i32(value.x);
        self.write_i32(value.y);
        self.write_i32(value.z);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_scalars_and_strings() {
        let mut writer = Writer::new();
        writer.write_u8(7);
        writer.write_u32(0xDEAD_BEEF);
        writer.write_i32(-5);
        writer.write_f32(1.5);
        writer.write_str_u32("palette");
        writer.write_ivec3(IVec3::new(1, -2, 3));

        let bytes = writer.into_bytes();
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_str_u32().unwrap(), "palette");
        assert_eq!(reader.read_ivec3().unwrap(), IVec3::new(1, -2, 3));
        assert!(reader.is_eof());
    }

    #[test]
    fn truncated_reads_are_parse_errors() {
        let mut reader = Reader::new(&[1, 2]);
        assert!(matches!(reader.read_u32(), Err(Error::Parse(_))));
    }

    #[test]
    fn skip_past_the_end_fails() {
        let mut reader = Reader::new(&[0; 4]);
        assert!(reader.skip(4).is_ok());
        assert!(reader.skip(1).is_err());
    }
}
