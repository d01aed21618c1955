// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::error::WireError;
use byteorder::{BigEndian, ByteOrder};

/// Raw ed25519 public keys travel as exactly this many bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Hard cap on a DM payload.
pub const MAX_DM_PAYLOAD: usize = 4096;

/// Builds packet-type-specific payloads: length-prefixed UTF-8 strings
/// (1-byte prefix up to 255 bytes, 2-byte up to 65535), 4-byte big-endian
/// counters and fixed 32-byte public keys.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str8(&mut self, value: &str) -> Result<&mut Self, WireError> {
        let bytes = value.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(WireError::StringTooLong(bytes.len(), 1));
        }
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn write_str16(&mut self, value: &str) -> Result<&mut Self, WireError> {
        let bytes = value.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(WireError::StringTooLong(bytes.len(), 2));
        }
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, bytes.len() as u16);
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        let mut out = [0u8; 4];
        BigEndian::write_u32(&mut out, value);
        self.buf.extend_from_slice(&out);
        self
    }

    pub fn write_public_key(&mut self, key: &[u8; PUBLIC_KEY_LEN]) -> &mut Self {
        self.buf.extend_from_slice(key);
        self
    }

    /// DM bodies are raw bytes, capped.
    pub fn write_dm_body(&mut self, body: &[u8]) -> Result<&mut Self, WireError> {
        if body.len() > MAX_DM_PAYLOAD {
            return Err(WireError::DmTooLarge(body.len(), MAX_DM_PAYLOAD));
        }
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, body.len() as u16);
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(body);
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-style reader over a received payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::TruncatedPayload(what));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_str8(&mut self) -> Result<String, WireError> {
        let len = self.take(1, "str8 length")?[0] as usize;
        let bytes = self.take(len, "str8 body")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::BadUtf8)
    }

    pub fn read_str16(&mut self) -> Result<String, WireError> {
        let len = BigEndian::read_u16(self.take(2, "str16 length")?) as usize;
        let bytes = self.take(len, "str16 body")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::BadUtf8)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(BigEndian::read_u32(self.take(4, "u32 counter")?))
    }

    pub fn read_public_key(&mut self) -> Result<[u8; PUBLIC_KEY_LEN], WireError> {
        let bytes = self.take(PUBLIC_KEY_LEN, "public key")?;
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_dm_body(&mut self) -> Result<Vec<u8>, WireError> {
        let len = BigEndian::read_u16(self.take(2, "dm length")?) as usize;
        if len > MAX_DM_PAYLOAD {
            return Err(WireError::DmTooLarge(len, MAX_DM_PAYLOAD));
        }
        Ok(self.take(len, "dm body")?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_payload_round_trip() {
        let mut writer = PayloadWriter::new();
        writer.write_str8("validator-7").unwrap();
        writer.write_u32(88_000);
        writer.write_public_key(&[9u8; PUBLIC_KEY_LEN]);
        writer.write_str16(&"x".repeat(300)).unwrap();
        let payload = writer.finish();

        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.read_str8().unwrap(), "validator-7");
        assert_eq!(reader.read_u32().unwrap(), 88_000);
        assert_eq!(reader.read_public_key().unwrap(), [9u8; PUBLIC_KEY_LEN]);
        assert_eq!(reader.read_str16().unwrap().len(), 300);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_str8_length_limit() {
        let mut writer = PayloadWriter::new();
        assert!(matches!(
            writer.write_str8(&"y".repeat(256)),
            Err(WireError::StringTooLong(256, 1))
        ));
    }

    #[test]
    fn test_truncated_reads() {
        let mut reader = PayloadReader::new(&[5, b'a', b'b']);
        assert!(matches!(
            reader.read_str8(),
            Err(WireError::TruncatedPayload("str8 body"))
        ));
    }

    #[test]
    fn test_dm_cap_both_directions() {
        let mut writer = PayloadWriter::new();
        assert!(writer.write_dm_body(&vec![0u8; MAX_DM_PAYLOAD]).is_ok());
        let mut writer = PayloadWriter::new();
        assert!(matches!(
            writer.write_dm_body(&vec![0u8; MAX_DM_PAYLOAD + 1]),
            Err(WireError::DmTooLarge(_, _))
        ));

        // A forged oversized length prefix is rejected on read.
        let mut forged = Vec::new();
        forged.extend_from_slice(&(MAX_DM_PAYLOAD as u16 + 1).to_be_bytes());
        forged.extend_from_slice(&vec![0u8; MAX_DM_PAYLOAD + 1]);
        let mut reader = PayloadReader::new(&forged);
        assert!(matches!(reader.read_dm_body(), Err(WireError::DmTooLarge(_, _))));
    }
}
