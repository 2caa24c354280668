//! Bounds-checked reading and writing over raw file buffers.
//!
//! Every read validates the requested span against the buffer end before
//! touching it and leaves the cursor unmoved on failure. Callers must treat
//! any error as "abort the whole decode": the cursor may already sit past
//! partially-read fields of an enclosing record.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::CatalogError;

/// Length prefix marking an absent equation string. A zero length is a
/// present-but-empty equation, which is a distinct state.
pub const EQUATION_ABSENT: u32 = u32::MAX;

/// Read cursor over an immutable byte buffer.
pub struct FileBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FileBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn check(&self, wanted: usize) -> Result<(), CatalogError> {
        if wanted > self.remaining() {
            return Err(CatalogError::BufferOverrun {
                offset: self.pos,
                wanted,
                size: self.data.len(),
            });
        }
        Ok(())
    }

    /// Advance past `len` bytes without decoding them.
    pub fn skip(&mut self, len: usize) -> Result<(), CatalogError> {
        self.check(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CatalogError> {
        self.check(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, CatalogError> {
        self.check(4)?;
        let value = LittleEndian::read_u32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64, CatalogError> {
        self.check(8)?;
        let value = LittleEndian::read_u64(&self.data[self.pos..]);
        self.pos += 8;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> Result<i64, CatalogError> {
        self.check(8)?;
        let value = LittleEndian::read_i64(&self.data[self.pos..]);
        self.pos += 8;
        Ok(value)
    }

    pub fn read_f32(&mut self) -> Result<f32, CatalogError> {
        self.check(4)?;
        let value = LittleEndian::read_f32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(value)
    }

    /// Length-prefixed string: u32 length + raw bytes, no terminator stored.
    /// A zero length yields an empty string.
    pub fn read_cstring(&mut self) -> Result<String, CatalogError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CatalogError::InvalidFormat("string is not valid UTF-8".into()))
    }

    /// Equation string: like [`read_cstring`](Self::read_cstring) but the
    /// reserved length [`EQUATION_ABSENT`] decodes to `None`.
    pub fn read_equation(&mut self) -> Result<Option<String>, CatalogError> {
        let len = self.read_u32()?;
        if len == EQUATION_ABSENT {
            return Ok(None);
        }
        let bytes = self.read_bytes(len as usize)?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| CatalogError::InvalidFormat("equation is not valid UTF-8".into()))?;
        Ok(Some(text))
    }

    /// Length-prefixed byte array, returned as an owned buffer.
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>, CatalogError> {
        let len = self.read_u32()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

/// Append-only little-endian writer backing the encode path.
#[derive(Default)]
pub struct FileWriter {
    buf: Vec<u8>,
}

impl FileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        // Writing into a Vec cannot fail.
        self.buf.write_u32::<LittleEndian>(value).unwrap();
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.write_u64::<LittleEndian>(value).unwrap();
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.write_i64::<LittleEndian>(value).unwrap();
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.write_f32::<LittleEndian>(value).unwrap();
    }

    pub fn write_cstring(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_equation(&mut self, value: Option<&str>) {
        match value {
            Some(text) => self.write_cstring(text),
            None => self.write_u32(EQUATION_ABSENT),
        }
    }

    pub fn write_byte_array(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }
}
