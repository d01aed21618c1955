// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The wire layer: a fixed 16-byte header in front of every frame, a
//! packet-type registry, length-prefixed payload primitives and a
//! [`Transport`] seam with the production TCP implementation behind it.
//!
//! The codec is a pure encode/decode pair. Decoding rejects short buffers
//! with a typed error; an unknown packet type inside a well-formed envelope
//! decodes fine, it is the dispatcher's business what to do with it.

mod error;
mod header;
mod packet;
mod packet_types;
mod payload;
mod transport;

pub use error::WireError;
pub use header::{PacketHeader, ProtocolVersion, UserType, HEADER_SIZE};
pub use packet::WirePacket;
pub use packet_types::PacketType;
pub use payload::{PayloadReader, PayloadWriter, MAX_DM_PAYLOAD, PUBLIC_KEY_LEN};
pub use transport::{Connection, PacketListener, TcpTransport, Transport};
