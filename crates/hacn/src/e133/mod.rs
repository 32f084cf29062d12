// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 (RDMnet) session layer.
//!
//! Everything between the raw transports and the application: packet
//! construction ([`MessageBuilder`]), the bounded write-side buffer
//! ([`MessageQueue`]), the heartbeat/timeout health check
//! ([`HealthMonitor`]) and the acknowledgement-driven reliable sender for
//! unsolicited RDM responses ([`TcpMessageSender`]).

mod connection;
mod e131_sender;
mod health;
mod message_builder;
mod message_queue;
mod tcp_sender;
mod url;

pub use connection::DesignatedControllerSession;
pub use e131_sender::E131Sender;
pub use health::{HealthMonitor, TcpConnectionStats};
pub use message_builder::MessageBuilder;
pub use message_queue::{MessageQueue, QueueFull, DEFAULT_MAX_BUFFER_SIZE};
pub use tcp_sender::{SendError, TcpMessageSender, DEFAULT_MAX_QUEUE_SIZE};
pub use url::{format_e133_url, parse_e133_url, E133UrlError, UID, E133_SERVICE};

// ===== E1.33 status codes =====
// Carried in the status PDU on the designated-controller channel. Zero is
// the TCP acknowledgement; the rest report delivery failures.

/// Message received and processed.
pub const SC_E133_ACK: u16 = 0x0000;
/// The RDM request timed out at the responder.
pub const SC_E133_RDM_TIMEOUT: u16 = 0x0001;
/// The responder answered with a malformed RDM frame.
pub const SC_E133_RDM_INVALID_RESPONSE: u16 = 0x0002;
/// The receiver has no room to process the request.
pub const SC_E133_BUFFER_FULL: u16 = 0x0003;
/// No device with the addressed UID.
pub const SC_E133_UNKNOWN_UID: u16 = 0x0004;
/// The addressed endpoint does not exist.
pub const SC_E133_NONEXISTENT_ENDPOINT: u16 = 0x0005;
/// The device is not reachable through the addressed endpoint.
pub const SC_E133_WRONG_ENDPOINT: u16 = 0x0006;
/// An ACK_OVERFLOW transaction expired before completion.
pub const SC_E133_ACK_OVERFLOW_CACHE_EXPIRED: u16 = 0x0007;
/// An ACK_OVERFLOW transaction is still in progress.
pub const SC_E133_ACK_OVERFLOW_IN_PROGRESS: u16 = 0x0008;
/// A broadcast request was processed; no response follows.
pub const SC_E133_BROADCAST_COMPLETE: u16 = 0x0009;
