// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HACN - ACN transport stack and SLPv2 discovery
//!
//! A pure Rust implementation of the ESTA E1.17 (ACN) PDU framing with its
//! E1.31 (sACN) and E1.33 (RDMnet) extensions, plus an SLPv2 (RFC 2608)
//! Service Agent / Directory Agent engine with the E1.33 discovery profile.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |   endpoint handlers | status callbacks | SLP register/find         |
//! +--------------------------------------------------------------------+
//! |                      Protocol Layer                                |
//! |   PDU codec | Inflator tree | SLP packet parser/builder            |
//! +--------------------------------------------------------------------+
//! |                      Session Layer                                 |
//! |   MessageQueue | HealthMonitor | TcpMessageSender | SLP agent      |
//! +--------------------------------------------------------------------+
//! |                      Transport Layer                               |
//! |   UDP datagram framing | TCP stream framing | ACN preamble         |
//! +--------------------------------------------------------------------+
//! |                      Engine                                        |
//! |   single-threaded mio reactor | monotonic timer queue              |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Data flow
//!
//! Receive: bytes -> transport (preamble check, block framing) ->
//! [`protocol::inflate::Inflator`] tree -> leaf handler with the decoded
//! [`protocol::HeaderSet`] and payload slice.
//!
//! Send: payload -> [`e133::MessageBuilder`] wraps RDM/E1.33/Root PDUs onto
//! an [`core::IoStack`] (deepest layer first, outer headers prepended) ->
//! preamble -> UDP datagram or [`e133::MessageQueue`].
//!
//! ## Concurrency model
//!
//! Everything runs on one reactor thread ([`engine::Reactor`]). There are no
//! locks; shared components use `Rc<RefCell<..>>` and all IO is non-blocking.
//!
//! ## References
//!
//! - ANSI E1.17 (ACN), ANSI E1.31 (sACN), ANSI E1.33 (RDMnet)
//! - RFC 2608 (SLPv2)

/// Protocol constants: ports, multicast groups, SLP timing parameters.
pub mod config;
/// Core value types (component IDs) and the prepend-capable byte stack.
pub mod core;
/// E1.33 session layer (message builder/queue, health check, reliable sender).
pub mod e133;
/// Single-threaded mio reactor and monotonic timer queue.
pub mod engine;
/// ACN PDU codec, headers and the inflator dispatch tree.
pub mod protocol;
/// SLPv2 service discovery (codec, store, DA tracker, SA/DA engine).
pub mod slp;
/// UDP and TCP carriers for ACN PDU blocks.
pub mod transport;

pub use crate::core::{BlockPool, Cid, IoStack};
pub use protocol::{HeaderSet, TransportHeader, TransportType};

/// HACN version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
