//! Minimal BCS (Binary Canonical Serialization) support
//!
//! Only the pieces the transaction envelope needs: little-endian integers,
//! ULEB128 lengths, byte vectors and strings. `BcsReader` is used to check
//! caller-supplied pure arguments.

use thiserror::Error;

/// Errors raised while reading BCS input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcsError {
    #[error("Unexpected end of input: needed {needed} bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("ULEB128 length overflows u32")]
    LengthOverflow,

    #[error("Non-canonical ULEB128 encoding")]
    NonCanonicalLength,

    #[error("Invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Append-only BCS writer
#[derive(Debug, Default, Clone)]
pub struct BcsWriter {
    buf: Vec<u8>,
}

impl BcsWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.buf.push(u8::from(v));
        self
    }

    /// Write a sequence/enum length as ULEB128
    pub fn write_uleb128(&mut self, mut v: u32) -> &mut Self {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
        self
    }

    /// Enum variants share the ULEB128 encoding
    pub fn write_variant(&mut self, index: u32) -> &mut Self {
        self.write_uleb128(index)
    }

    /// Fixed-size bytes, no length prefix
    pub fn write_fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// `vector<u8>`: length prefix followed by bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_uleb128(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write_bytes(s.as_bytes())
    }

    pub fn write_seq<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.write_uleb128(items.len() as u32);
        for item in items {
            f(self, item);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a value as a standalone ULEB128 byte string
pub fn uleb128(v: u32) -> Vec<u8> {
    let mut w = BcsWriter::new();
    w.write_uleb128(v);
    w.into_bytes()
}

/// Cursor over BCS input
pub struct BcsReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BcsReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BcsError> {
        if self.data.len() - self.pos < n {
            return Err(BcsError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, BcsError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BcsError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, BcsError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_bool(&mut self) -> Result<bool, BcsError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BcsError::InvalidBool(other)),
        }
    }

    pub fn read_uleb128(&mut self) -> Result<u32, BcsError> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                // A trailing zero group means the encoding was padded
                if shift > 0 && byte == 0 {
                    return Err(BcsError::NonCanonicalLength);
                }
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(BcsError::LengthOverflow);
            }
        }
        u32::try_from(value).map_err(|_| BcsError::LengthOverflow)
    }

    pub fn read_fixed(&mut self, n: usize) -> Result<&'a [u8], BcsError> {
        self.take(n)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], BcsError> {
        let len = self.read_uleb128()? as usize;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, BcsError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| BcsError::InvalidUtf8)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail unless every byte was consumed
    pub fn finish(self) -> Result<(), BcsError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(BcsError::TrailingBytes(n)),
        }
    }
}
