// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ACN over UDP datagrams.
//!
//! Receive: the datagram's first 16 bytes must exactly match the UDP
//! preamble; the remainder is a PDU block handed to the Root inflator. Short
//! or mismatched datagrams are dropped silently (UDP is a hostile place).
//!
//! Send: the preamble is prepended to the finished block; datagrams larger
//! than [`crate::config::MAX_UDP_PAYLOAD`] are refused, callers split at the
//! block level.

use super::UDP_PREAMBLE;
use crate::config::MAX_UDP_PAYLOAD;
use crate::core::IoStack;
use crate::protocol::inflate::Inflator;
use crate::protocol::{HeaderSet, TransportHeader, TransportType};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Errors from the UDP send path.
#[derive(Debug)]
pub enum UdpSendError {
    /// The block would exceed the largest producible datagram.
    Oversized(usize),
    /// The socket write failed.
    Io(io::Error),
}

impl fmt::Display for UdpSendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized(len) => write!(f, "{} byte datagram exceeds {}", len, MAX_UDP_PAYLOAD),
            Self::Io(err) => write!(f, "udp send failed: {}", err),
        }
    }
}

impl std::error::Error for UdpSendError {}

/// Create a non-blocking UDP socket bound to `addr` with address reuse.
pub fn bind_udp_socket(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&std::net::SocketAddr::V4(addr).into())?;
    socket.set_nonblocking(true)?;
    log::debug!("[UDP] bound {}", addr);
    Ok(socket.into())
}

/// Join an IPv4 multicast group on `iface` and enable loopback.
pub fn join_multicast_group(
    socket: &UdpSocket,
    group: Ipv4Addr,
    iface: Ipv4Addr,
) -> io::Result<()> {
    socket.join_multicast_v4(&group, &iface)?;
    socket.set_multicast_loop_v4(true)?;
    log::debug!("[UDP] joined multicast group {} iface {}", group, iface);
    Ok(())
}

/// Feed a received datagram to the Root inflator.
///
/// Returns true if the datagram carried a well-formed preamble and the block
/// was dispatched; malformed datagrams are dropped silently per the spec.
pub fn handle_datagram(inflator: &mut Inflator, source: SocketAddrV4, data: &[u8]) -> bool {
    if data.len() < UDP_PREAMBLE.len() || data[..UDP_PREAMBLE.len()] != UDP_PREAMBLE {
        log::debug!("[UDP] dropping {} byte datagram from {}", data.len(), source);
        return false;
    }
    let mut headers =
        HeaderSet::for_transport(TransportHeader::new(source, TransportType::Udp));
    inflator.inflate_block(&mut headers, &data[UDP_PREAMBLE.len()..]);
    true
}

/// Prepend the preamble and transmit a PDU block to `dest`.
pub fn send_udp_block(
    socket: &UdpSocket,
    stack: &mut IoStack,
    dest: SocketAddrV4,
) -> Result<(), UdpSendError> {
    super::prepend_udp_preamble(stack);
    let packet = stack.to_vec();
    if packet.len() > MAX_UDP_PAYLOAD {
        return Err(UdpSendError::Oversized(packet.len()));
    }
    socket
        .send_to(&packet, std::net::SocketAddr::V4(dest))
        .map_err(UdpSendError::Io)?;
    Ok(())
}
