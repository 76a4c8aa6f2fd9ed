use alloc::vec::Vec;

use crate::EncodeError;

/// Largest APDU a BACnet/IP device may send without segmentation.
pub const MAX_APDU_LEN: usize = 1476;

/// Upper bound for an NPDU + APDU produced by this crate.
pub const MAX_NPDU_LEN: usize = MAX_APDU_LEN + 21;

/// Growable output buffer with a hard size ceiling.
///
/// Writes that would cross the ceiling fail with
/// [`EncodeError::BufferTooSmall`] and leave the buffer unchanged.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    pub fn new() -> Self {
        Self::with_limit(MAX_NPDU_LEN)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(128)),
            limit,
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&[value])
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.remaining() < data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }
}
