// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.31 (sACN) send path.
//!
//! Wraps a framing payload in the E1.31 PDU + Root PDU + UDP preamble and
//! resolves the per-universe multicast destination.

use crate::config::{e131_universe_group, E131_PORT};
use crate::core::{BlockPool, Cid, IoStack};
use crate::protocol::headers::E131Header;
use crate::protocol::pdu::{
    encode_vector, prepend_flags_and_length, VectorSize, DFLAG_MASK, HFLAG_MASK, VFLAG_MASK,
};
use crate::protocol::vectors::VECTOR_ROOT_E131;
use std::net::SocketAddrV4;
use std::rc::Rc;

const PDU_FLAGS: u8 = VFLAG_MASK | HFLAG_MASK | DFLAG_MASK;

/// Builds E1.31 packets for one source component.
pub struct E131Sender {
    cid: Cid,
    pool: Rc<BlockPool>,
}

impl E131Sender {
    pub fn new(cid: Cid) -> Self {
        E131Sender {
            cid,
            pool: BlockPool::new(),
        }
    }

    /// A fresh stack drawing from this sender's pool.
    pub fn new_stack(&self) -> IoStack {
        IoStack::new(&self.pool)
    }

    /// The multicast destination for a universe's DMX data, if the universe
    /// is valid.
    pub fn universe_destination(universe: u32) -> Option<SocketAddrV4> {
        e131_universe_group(universe).map(|group| SocketAddrV4::new(group, E131_PORT))
    }

    /// Wrap the stack's contents in an E1.31 framing PDU.
    pub fn prepend_e131_pdu(&self, stack: &mut IoStack, header: &E131Header, vector: u32) {
        stack.prepend(&header.to_wire());
        let mut v = Vec::with_capacity(4);
        encode_vector(vector, VectorSize::Four, &mut v);
        stack.prepend(&v);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
    }

    /// E1.31 framing + Root + UDP preamble around the stack's contents.
    pub fn build_udp_packet(&self, stack: &mut IoStack, header: &E131Header, vector: u32) {
        self.prepend_e131_pdu(stack, header, vector);
        stack.prepend(self.cid.as_bytes());
        let mut v = Vec::with_capacity(4);
        encode_vector(VECTOR_ROOT_E131, VectorSize::Four, &mut v);
        stack.prepend(&v);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
        crate::transport::prepend_udp_preamble(stack);
    }
}
