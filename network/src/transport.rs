// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{error::WireError, packet::WirePacket};
use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use modulr_logger::prelude::*;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Upper bound on one frame; anything larger is a protocol violation.
const MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;

/// One established peer link. Packets on a connection arrive in the order
/// they were sent; nothing is guaranteed across connections.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, packet: &WirePacket) -> Result<(), WireError>;

    /// `Ok(None)` is a clean remote close.
    async fn recv(&mut self) -> Result<Option<WirePacket>, WireError>;

    async fn disconnect(&mut self) -> Result<(), WireError>;
}

#[async_trait]
pub trait PacketListener: Send {
    async fn accept(&mut self) -> Result<(Box<dyn Connection>, SocketAddr), WireError>;

    fn local_addr(&self) -> Result<SocketAddr, WireError>;
}

/// The transport seam: how the node reaches peers. Production is TCP; tests
/// can substitute loopback or in-memory implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn Connection>, WireError>;

    async fn listen(&self, addr: SocketAddr) -> Result<Box<dyn PacketListener>, WireError>;
}

/// TCP with 4-byte big-endian length framing in front of every packet.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpTransport;

pub struct TcpConnection {
    stream: TcpStream,
}

pub struct TcpPacketListener {
    listener: TcpListener,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn Connection>, WireError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = %addr, "Connected");
        Ok(Box::new(TcpConnection { stream }))
    }

    async fn listen(&self, addr: SocketAddr) -> Result<Box<dyn PacketListener>, WireError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Listening");
        Ok(Box::new(TcpPacketListener { listener }))
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, packet: &WirePacket) -> Result<(), WireError> {
        let frame = packet.encode();
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, frame.len() as u32);
        self.stream.write_all(&len).await?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<WirePacket>, WireError> {
        let mut len = [0u8; 4];
        match self.stream.read_exact(&mut len).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let frame_len = BigEndian::read_u32(&len);
        if frame_len > MAX_FRAME_SIZE {
            return Err(WireError::TruncatedPayload("oversized frame"));
        }
        let mut frame = vec![0u8; frame_len as usize];
        self.stream.read_exact(&mut frame).await?;
        Ok(Some(WirePacket::decode(&frame)?))
    }

    async fn disconnect(&mut self) -> Result<(), WireError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl PacketListener for TcpPacketListener {
    async fn accept(&mut self) -> Result<(Box<dyn Connection>, SocketAddr), WireError> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(peer = %addr, "Accepted");
        Ok((Box::new(TcpConnection { stream }), addr))
    }

    fn local_addr(&self) -> Result<SocketAddr, WireError> {
        Ok(self.listener.local_addr()?)
    }
}
