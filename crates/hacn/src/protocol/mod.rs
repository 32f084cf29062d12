// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ACN protocol layer: PDU codec, layer headers and the inflator tree.
//!
//! The ACN wire format is a self-describing nest of PDUs. Each PDU carries a
//! flags byte, a 12- or 20-bit length, an optional vector selecting the next
//! protocol layer, an optional per-layer header and an optional data section.
//! Vectors and headers may be inherited from the previous sibling PDU within
//! a block.
//!
//! Decoding is driven by the [`inflate`] module: a tree of
//! [`inflate::Inflator`] nodes, each owning the per-block inheritance state
//! for its layer and a vector-indexed registry of child inflators.

pub mod headers;
pub mod inflate;
pub mod pdu;
pub mod vectors;

pub use headers::{
    E131Header, E133Header, HeaderSet, RootHeader, TransportHeader, TransportType,
};
pub use pdu::{PduError, VectorSize};
