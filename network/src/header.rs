// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::error::WireError;
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the fixed header in front of every frame.
pub const HEADER_SIZE: usize = 16;

const ACK_REQUESTED_BIT: u8 = 0b0000_0001;
const USER_TYPE_SHIFT: u8 = 6;

/// Date-based protocol version: a peer can tell at a glance whether it is
/// talking to an older build.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub subversion: u8,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}.{:02}.{}",
            self.year, self.month, self.day, self.subversion
        )
    }
}

/// Who is speaking, carried in the top two flag bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UserType {
    Client = 0b00,
    Partner = 0b01,
    Validator = 0b10,
    ChainOwner = 0b11,
}

impl UserType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => UserType::Client,
            0b01 => UserType::Partner,
            0b10 => UserType::Validator,
            _ => UserType::ChainOwner,
        }
    }
}

/// The 16-byte big-endian header:
///
/// | offset | size | field |
/// |---|---|---|
/// | 0 | 2 | version.year |
/// | 2 | 1 | version.month |
/// | 3 | 1 | version.day |
/// | 4 | 1 | version.subversion |
/// | 5 | 8 | timestamp (unix seconds) |
/// | 13 | 2 | packet_type |
/// | 15 | 1 | flags |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub version: ProtocolVersion,
    pub timestamp: u64,
    /// Raw registry value; may be unknown to this build.
    pub packet_type: u16,
    pub user_type: UserType,
    /// Only meaningful over unreliable transports.
    pub ack_requested: bool,
}

impl PacketHeader {
    pub fn new(
        version: ProtocolVersion,
        timestamp: u64,
        packet_type: u16,
        user_type: UserType,
    ) -> Self {
        Self {
            version,
            timestamp,
            packet_type,
            user_type,
            ack_requested: false,
        }
    }

    pub fn with_ack_requested(mut self) -> Self {
        self.ack_requested = true;
        self
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        BigEndian::write_u16(&mut out[0..2], self.version.year);
        out[2] = self.version.month;
        out[3] = self.version.day;
        out[4] = self.version.subversion;
        BigEndian::write_u64(&mut out[5..13], self.timestamp);
        BigEndian::write_u16(&mut out[13..15], self.packet_type);
        out[15] = ((self.user_type as u8) << USER_TYPE_SHIFT)
            | if self.ack_requested { ACK_REQUESTED_BIT } else { 0 };
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::TruncatedHeader(data.len(), HEADER_SIZE));
        }
        let flags = data[15];
        Ok(Self {
            version: ProtocolVersion {
                year: BigEndian::read_u16(&data[0..2]),
                month: data[2],
                day: data[3],
                subversion: data[4],
            },
            timestamp: BigEndian::read_u64(&data[5..13]),
            packet_type: BigEndian::read_u16(&data[13..15]),
            user_type: UserType::from_bits(flags >> USER_TYPE_SHIFT),
            ack_requested: flags & ACK_REQUESTED_BIT != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> PacketHeader {
        PacketHeader::new(
            ProtocolVersion {
                year: 2025,
                month: 7,
                day: 20,
                subversion: 1,
            },
            1_753_000_000,
            42,
            UserType::Validator,
        )
    }

    #[test]
    fn test_round_trip() {
        let original = header();
        let encoded = original.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(PacketHeader::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_ack_flag_round_trip() {
        let original = header().with_ack_requested();
        let decoded = PacketHeader::decode(&original.encode()).unwrap();
        assert!(decoded.ack_requested);
        assert_eq!(decoded.user_type, UserType::Validator);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(matches!(
            PacketHeader::decode(&[0u8; 15]),
            Err(WireError::TruncatedHeader(15, HEADER_SIZE))
        ));
    }

    #[test]
    fn test_user_type_occupies_top_bits() {
        let encoded = header().encode();
        assert_eq!(encoded[15] >> 6, UserType::Validator as u8);
    }

    #[test]
    fn test_all_user_types_round_trip() {
        for user_type in [
            UserType::Client,
            UserType::Partner,
            UserType::Validator,
            UserType::ChainOwner,
        ] {
            let mut h = header();
            h.user_type = user_type;
            assert_eq!(PacketHeader::decode(&h.encode()).unwrap().user_type, user_type);
        }
    }
}
