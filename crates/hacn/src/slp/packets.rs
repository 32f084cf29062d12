// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLPv2 message types and header constants.
//!
//! # Header Wire Format (RFC 2608 section 8)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |  Function-ID  |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Length, contd.|O|F|R|       reserved          |Next Ext Offset|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Next Extension Offset, contd.|              XID              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Language Tag Length      |         Language Tag          \
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All multi-byte fields are big-endian. An SLP-string is a two byte length
//! followed by UTF-8 bytes.

use super::service::UrlEntry;
use std::net::Ipv4Addr;

/// The only SLP version we speak.
pub const SLP_VERSION: u8 = 2;

/// Fixed header bytes before the language tag string.
pub const SLP_HEADER_SIZE: usize = 14;

/// Header flag bits (the high bits of the 16 bit flags field).
pub struct SlpFlags;

impl SlpFlags {
    /// The reply overflowed the datagram; retry over TCP.
    pub const OVERFLOW: u16 = 0x8000;
    /// A SrvReg that replaces rather than updates.
    pub const FRESH: u16 = 0x4000;
    /// The request was multicast.
    pub const MCAST: u16 = 0x2000;
}

/// The eleven SLPv2 function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlpFunction {
    ServiceRequest = 1,
    ServiceReply = 2,
    ServiceRegistration = 3,
    ServiceDeRegistration = 4,
    ServiceAck = 5,
    AttrRequest = 6,
    AttrReply = 7,
    DaAdvert = 8,
    ServiceTypeRequest = 9,
    ServiceTypeReply = 10,
    SaAdvert = 11,
}

impl SlpFunction {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::ServiceRequest,
            2 => Self::ServiceReply,
            3 => Self::ServiceRegistration,
            4 => Self::ServiceDeRegistration,
            5 => Self::ServiceAck,
            6 => Self::AttrRequest,
            7 => Self::AttrReply,
            8 => Self::DaAdvert,
            9 => Self::ServiceTypeRequest,
            10 => Self::ServiceTypeReply,
            11 => Self::SaAdvert,
            _ => return None,
        })
    }
}

/// The decoded common header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpHeader {
    pub function: SlpFunction,
    pub flags: u16,
    pub xid: u16,
    pub language: String,
}

impl SlpHeader {
    pub fn is_multicast(&self) -> bool {
        self.flags & SlpFlags::MCAST != 0
    }

    pub fn is_fresh(&self) -> bool {
        self.flags & SlpFlags::FRESH != 0
    }

    pub fn is_overflow(&self) -> bool {
        self.flags & SlpFlags::OVERFLOW != 0
    }
}

/// SrvRqst payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceRequest {
    pub pr_list: Vec<Ipv4Addr>,
    pub service_type: String,
    /// As received; components are unescaped by `ScopeSet::from_string`.
    pub scope_list: String,
    pub predicate: String,
    pub spi: String,
}

/// SrvRply payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceReply {
    pub error_code: u16,
    pub url_entries: Vec<UrlEntry>,
}

/// SrvReg payload. Auth blocks are length-checked and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub url: UrlEntry,
    pub service_type: String,
    pub scope_list: String,
    pub attr_list: String,
}

/// SrvDeReg payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDeRegistration {
    pub scope_list: String,
    pub url: UrlEntry,
    pub tag_list: String,
}

/// SrvAck payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceAck {
    pub error_code: u16,
}

/// AttrRqst payload. Parsed, not acted on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrRequest {
    pub pr_list: Vec<Ipv4Addr>,
    pub url: String,
    pub scope_list: String,
    pub tag_list: String,
    pub spi: String,
}

/// AttrRply payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrReply {
    pub error_code: u16,
    pub attr_list: String,
}

/// DAAdvert payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DaAdvert {
    pub error_code: u16,
    pub boot_timestamp: u32,
    pub url: String,
    pub scope_list: String,
    pub attr_list: String,
    pub spi: String,
}

/// SrvTypeRqst payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceTypeRequest {
    pub pr_list: Vec<Ipv4Addr>,
    /// A naming-auth length of 0xffff means "all service types".
    pub include_all: bool,
    pub naming_authority: String,
    pub scope_list: String,
}

/// SrvTypeRply payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceTypeReply {
    pub error_code: u16,
    pub service_types: Vec<String>,
}

/// SAAdvert payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaAdvert {
    pub url: String,
    pub scope_list: String,
    pub attr_list: String,
}

/// A fully decoded SLP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlpMessage {
    ServiceRequest(ServiceRequest),
    ServiceReply(ServiceReply),
    ServiceRegistration(ServiceRegistration),
    ServiceDeRegistration(ServiceDeRegistration),
    ServiceAck(ServiceAck),
    AttrRequest(AttrRequest),
    AttrReply(AttrReply),
    DaAdvert(DaAdvert),
    ServiceTypeRequest(ServiceTypeRequest),
    ServiceTypeReply(ServiceTypeReply),
    SaAdvert(SaAdvert),
}

/// Header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpPacket {
    pub header: SlpHeader,
    pub message: SlpMessage,
}
