// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-layer PDU headers and the [`HeaderSet`] threaded through decoding.
//!
//! Each inflator fills in its slot of the [`HeaderSet`] as the PDU nest is
//! walked, so a leaf handler sees every enclosing layer's header at once.

use crate::core::Cid;
use std::net::SocketAddrV4;

/// Length of the null-padded source name in E1.31 and E1.33 headers.
pub const SOURCE_NAME_LEN: usize = 64;

/// How a PDU block arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// An ACN UDP datagram.
    Udp,
    /// The E1.33 designated-controller TCP stream.
    Tcp,
}

/// The transport pseudo-header: where the block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    /// Source socket address.
    pub source: SocketAddrV4,
    /// Datagram or stream.
    pub transport: TransportType,
}

impl TransportHeader {
    pub fn new(source: SocketAddrV4, transport: TransportType) -> Self {
        TransportHeader { source, transport }
    }
}

/// The Root layer header: the sender's component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootHeader {
    pub cid: Cid,
}

/// E1.31 framing header.
///
/// Wire layout after the vector: 64 byte null-terminated source name,
/// priority, 2 reserved bytes, sequence, options, 2 byte universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E131Header {
    pub source: String,
    pub priority: u8,
    pub sequence: u8,
    pub universe: u16,
    pub preview: bool,
    pub terminated: bool,
    pub rdm_management: bool,
}

impl E131Header {
    /// Packed size of the header on the wire.
    pub const WIRE_SIZE: usize = SOURCE_NAME_LEN + 7;

    pub const PREVIEW_DATA_MASK: u8 = 0x80;
    pub const STREAM_TERMINATED_MASK: u8 = 0x40;
    pub const RDM_MANAGEMENT_MASK: u8 = 0x20;

    pub fn new(source: &str, priority: u8, sequence: u8, universe: u16) -> Self {
        E131Header {
            source: source.to_string(),
            priority,
            sequence,
            universe,
            preview: false,
            terminated: false,
            rdm_management: false,
        }
    }

    /// Decode from the wire. Returns `None` on short input.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        let options = data[SOURCE_NAME_LEN + 4];
        Some(E131Header {
            source: unpack_source_name(&data[..SOURCE_NAME_LEN]),
            priority: data[SOURCE_NAME_LEN],
            sequence: data[SOURCE_NAME_LEN + 3],
            universe: u16::from_be_bytes([
                data[SOURCE_NAME_LEN + 5],
                data[SOURCE_NAME_LEN + 6],
            ]),
            preview: options & Self::PREVIEW_DATA_MASK != 0,
            terminated: options & Self::STREAM_TERMINATED_MASK != 0,
            rdm_management: options & Self::RDM_MANAGEMENT_MASK != 0,
        })
    }

    /// Encode to the wire form.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        pack_source_name(&self.source, &mut out[..SOURCE_NAME_LEN]);
        out[SOURCE_NAME_LEN] = self.priority;
        // 2 reserved bytes stay zero
        out[SOURCE_NAME_LEN + 3] = self.sequence;
        let mut options = 0u8;
        if self.preview {
            options |= Self::PREVIEW_DATA_MASK;
        }
        if self.terminated {
            options |= Self::STREAM_TERMINATED_MASK;
        }
        if self.rdm_management {
            options |= Self::RDM_MANAGEMENT_MASK;
        }
        out[SOURCE_NAME_LEN + 4] = options;
        out[SOURCE_NAME_LEN + 5..].copy_from_slice(&self.universe.to_be_bytes());
        out
    }
}

/// E1.33 framing header.
///
/// Wire layout after the vector: 64 byte null-terminated source name,
/// 4 byte sequence, 2 byte endpoint, options byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E133Header {
    pub source: String,
    pub sequence: u32,
    pub endpoint: u16,
    /// Sender requests an acknowledgement.
    pub rx_ack: bool,
    /// Sender requests reliable-timeout handling.
    pub timeout: bool,
}

impl E133Header {
    /// Packed size of the header on the wire.
    pub const WIRE_SIZE: usize = SOURCE_NAME_LEN + 7;

    pub const RX_ACK_MASK: u8 = 0x80;
    pub const TIMEOUT_MASK: u8 = 0x40;

    pub fn new(source: &str, sequence: u32, endpoint: u16) -> Self {
        E133Header {
            source: source.to_string(),
            sequence,
            endpoint,
            rx_ack: false,
            timeout: false,
        }
    }

    /// Decode from the wire. Returns `None` on short input.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        let options = data[SOURCE_NAME_LEN + 6];
        Some(E133Header {
            source: unpack_source_name(&data[..SOURCE_NAME_LEN]),
            sequence: u32::from_be_bytes([
                data[SOURCE_NAME_LEN],
                data[SOURCE_NAME_LEN + 1],
                data[SOURCE_NAME_LEN + 2],
                data[SOURCE_NAME_LEN + 3],
            ]),
            endpoint: u16::from_be_bytes([
                data[SOURCE_NAME_LEN + 4],
                data[SOURCE_NAME_LEN + 5],
            ]),
            rx_ack: options & Self::RX_ACK_MASK != 0,
            timeout: options & Self::TIMEOUT_MASK != 0,
        })
    }

    /// Encode to the wire form.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        pack_source_name(&self.source, &mut out[..SOURCE_NAME_LEN]);
        out[SOURCE_NAME_LEN..SOURCE_NAME_LEN + 4]
            .copy_from_slice(&self.sequence.to_be_bytes());
        out[SOURCE_NAME_LEN + 4..SOURCE_NAME_LEN + 6]
            .copy_from_slice(&self.endpoint.to_be_bytes());
        let mut options = 0u8;
        if self.rx_ack {
            options |= Self::RX_ACK_MASK;
        }
        if self.timeout {
            options |= Self::TIMEOUT_MASK;
        }
        out[SOURCE_NAME_LEN + 6] = options;
        out
    }
}

/// Placeholder for the DMP layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmpHeader;

/// The decoded headers of every layer enclosing a PDU.
///
/// Passed by mutable reference down the inflator tree; each layer fills in
/// its own slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderSet {
    pub transport: Option<TransportHeader>,
    pub root: Option<RootHeader>,
    pub e131: Option<E131Header>,
    pub e133: Option<E133Header>,
    pub dmp: Option<DmpHeader>,
}

impl HeaderSet {
    /// A header set seeded with transport information.
    pub fn for_transport(header: TransportHeader) -> Self {
        HeaderSet {
            transport: Some(header),
            ..Self::default()
        }
    }
}

fn pack_source_name(name: &str, out: &mut [u8]) {
    // Truncate to leave room for the terminating null.
    let n = name.len().min(out.len() - 1);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
}

fn unpack_source_name(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
