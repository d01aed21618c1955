// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::WireError,
    header::{PacketHeader, HEADER_SIZE},
};
use serde::{Deserialize, Serialize};

/// One decoded frame: the fixed header plus the packet-type-specific bytes
/// after it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WirePacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl WirePacket {
    pub fn new(header: PacketHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Splits a frame into header and payload. Frames shorter than the
    /// header are rejected; unknown packet types are not.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::decode(data)?;
        Ok(Self {
            header,
            payload: data[HEADER_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ProtocolVersion, UserType};

    fn packet(packet_type: u16) -> WirePacket {
        WirePacket::new(
            PacketHeader::new(
                ProtocolVersion {
                    year: 2025,
                    month: 1,
                    day: 2,
                    subversion: 0,
                },
                7,
                packet_type,
                UserType::Partner,
            ),
            b"hello".to_vec(),
        )
    }

    #[test]
    fn test_round_trip() {
        let original = packet(5);
        assert_eq!(WirePacket::decode(&original.encode()).unwrap(), original);
    }

    #[test]
    fn test_unknown_packet_type_still_decodes() {
        let original = packet(60_000);
        let decoded = WirePacket::decode(&original.encode()).unwrap();
        assert_eq!(decoded.header.packet_type, 60_000);
        assert_eq!(crate::PacketType::from_u16(decoded.header.packet_type), None);
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(WirePacket::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_empty_payload_is_fine() {
        let mut original = packet(1);
        original.payload.clear();
        let decoded = WirePacket::decode(&original.encode()).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
