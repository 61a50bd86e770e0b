//! Byte cursor used by the interface chain and historical byte codecs

use crate::error::{AtrError, Result};

/// Reads single bytes and byte runs from a buffer, failing when it runs dry
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, position: 0 }
    }

    /// Number of bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Read one byte; `what` names it in the error
    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        match self.data.get(self.position) {
            Some(&byte) => {
                self.position += 1;
                Ok(byte)
            }
            None => Err(AtrError::insufficient_data(format!(
                "Expected {} at offset {}, buffer ends",
                what, self.position
            ))),
        }
    }

    /// Read `len` bytes as a slice into the underlying buffer
    pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(AtrError::insufficient_data(format!(
                "Expected {} bytes of {} at offset {}, got {}",
                len,
                what,
                self.position,
                self.remaining()
            )));
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }
}

/// Accumulates bytes for re-encoding
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter::default()
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Write a byte only if it is present
    pub fn write_opt(&mut self, byte: Option<u8>) {
        if let Some(byte) = byte {
            self.data.push(byte);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// XOR of all bytes, as used for TCK
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, byte| acc ^ byte)
}
