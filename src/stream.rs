//! Big-endian parameter stream used by the packed sound-effect records.

use crate::error::DecodeError;

/// Read cursor over a packed parameter record.
///
/// Multi-byte fields are unsigned big-endian. Running past the end yields
/// [`DecodeError::UnexpectedEof`] instead of panicking.
#[derive(Debug, Clone)]
pub struct ParamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ParamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ParamReader { data, pos: 0 }
    }

    /// Byte offset of the next read.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, expected: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                expected,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self, expected: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, expected)?[0])
    }

    pub fn read_u16(&mut self, expected: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(2, expected)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Write side of [`ParamReader`], used when packing records.
#[derive(Debug, Clone, Default)]
pub struct ParamWriter {
    buf: Vec<u8>,
}

impl ParamWriter {
    pub fn new() -> Self {
        ParamWriter { buf: Vec::new() }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
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
