//! Request/reply byte streams.
//!
//! A parcel is a sequence of native-endian values, each padded to a 4-byte
//! boundary. Strings are written as a `u32` length (including the NUL
//! terminator), the bytes, the terminator and padding.

use byteorder::{ByteOrder, NativeEndian};

use crate::error::WireError;

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Growable parcel being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parcel {
    data: Vec<u8>,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a reader positioned at the start of this parcel.
    pub fn reader(&self) -> ParcelReader<'_> {
        ParcelReader::new(&self.data)
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        NativeEndian::write_u32(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut buf = [0u8; 4];
        NativeEndian::write_i32(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        NativeEndian::write_u64(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut buf = [0u8; 8];
        NativeEndian::write_i64(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    /// Writes a byte in its own 4-byte slot.
    pub fn write_u8(&mut self, value: u8) {
        self.write_u32(u32::from(value));
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a C string. Anything from the first interior NUL on is dropped.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let bytes = match bytes.iter().position(|b| *b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        let len_with_nul = bytes.len() + 1;
        self.write_u32(len_with_nul as u32);
        self.data.extend_from_slice(bytes);
        self.data.push(0);
        self.data.resize(self.data.len() + padded_len(len_with_nul) - len_with_nul, 0);
    }
}

/// Cursor over a received parcel.
#[derive(Debug, Clone)]
pub struct ParcelReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ParcelReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        if self.bytes.len() < needed {
            return Err(WireError::NotEnoughData { needed, remaining: self.bytes.len() });
        }
        let (head, tail) = self.bytes.split_at(needed);
        self.bytes = tail;
        Ok(head)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        self.take(4).map(NativeEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        self.take(4).map(NativeEndian::read_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.take(8).map(NativeEndian::read_u64)
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        self.take(8).map(NativeEndian::read_i64)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.read_u32().map(|v| v as u8)
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        self.read_u8().map(|v| v != 0)
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Err(WireError::InvalidString("string length cannot be 0".to_string()));
        }
        let padded = self.take(padded_len(len))?;
        let s = std::ffi::CStr::from_bytes_with_nul(&padded[..len])
            .map_err(|e| WireError::InvalidString(format!("invalid C string: {}", e)))?
            .to_str()
            .map_err(|e| WireError::InvalidString(format!("invalid UTF-8 string: {}", e)))?;
        Ok(s.to_string())
    }
}
