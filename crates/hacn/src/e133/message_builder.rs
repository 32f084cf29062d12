// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 packet construction.
//!
//! A [`MessageBuilder`] owns the sender identity (CID, source name) and the
//! block pool, and wraps payloads layer by layer onto an [`IoStack`]:
//! RDM or status PDU, then the E1.33 framing PDU, then the Root PDU, then
//! the transport preamble. All PDUs are written with the V/H/D flags set;
//! header-less layers simply contribute zero header bytes.

use crate::core::{BlockPool, Cid, IoStack};
use crate::protocol::headers::E133Header;
use crate::protocol::pdu::{
    encode_vector, prepend_flags_and_length, VectorSize, DFLAG_MASK, HFLAG_MASK, VFLAG_MASK,
};
use crate::protocol::vectors::{VECTOR_RDMNET_DATA, VECTOR_ROOT_E133, VECTOR_ROOT_NULL};
use crate::transport::{prepend_tcp_preamble, prepend_udp_preamble};
use std::rc::Rc;

const PDU_FLAGS: u8 = VFLAG_MASK | HFLAG_MASK | DFLAG_MASK;

/// Builds ACN packet stacks for one sending component.
pub struct MessageBuilder {
    cid: Cid,
    source_name: String,
    pool: Rc<BlockPool>,
}

impl MessageBuilder {
    pub fn new(cid: Cid, source_name: &str) -> Self {
        MessageBuilder {
            cid,
            source_name: source_name.to_string(),
            pool: BlockPool::new(),
        }
    }

    /// The pool stacks should be allocated from.
    pub fn pool(&self) -> &Rc<BlockPool> {
        &self.pool
    }

    /// A fresh stack drawing from this builder's pool.
    pub fn new_stack(&self) -> IoStack {
        IoStack::new(&self.pool)
    }

    /// The component identity packets are stamped with.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// Wrap the stack's contents in an RDM PDU.
    ///
    /// The stack holds a byte-packed RDM message *without* its start code;
    /// the start code is the PDU's one byte vector.
    pub fn prepend_rdm_pdu(&self, stack: &mut IoStack) {
        stack.prepend(&[VECTOR_RDMNET_DATA as u8]);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
    }

    /// Wrap the stack's contents in an E1.33 status PDU.
    pub fn prepend_status_pdu(&self, stack: &mut IoStack, status: u16, description: &str) {
        stack.prepend(description.as_bytes());
        stack.prepend(&status.to_be_bytes());
        // One reserved vector byte; receivers key off the status code.
        stack.prepend(&[0u8]);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
    }

    /// Wrap the stack's contents in an E1.33 framing PDU.
    pub fn prepend_e133_pdu(
        &self,
        stack: &mut IoStack,
        vector: u32,
        sequence: u32,
        endpoint: u16,
    ) {
        let header = E133Header::new(&self.source_name, sequence, endpoint);
        stack.prepend(&header.to_wire());
        let mut v = Vec::with_capacity(4);
        encode_vector(vector, VectorSize::Four, &mut v);
        stack.prepend(&v);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
    }

    /// Wrap the stack's contents in a Root PDU carrying our CID.
    pub fn prepend_root_pdu(&self, stack: &mut IoStack, vector: u32) {
        stack.prepend(self.cid.as_bytes());
        let mut v = Vec::with_capacity(4);
        encode_vector(vector, VectorSize::Four, &mut v);
        stack.prepend(&v);
        let _ = prepend_flags_and_length(stack, PDU_FLAGS, false);
    }

    /// E1.33 framing + Root + TCP preamble around the stack's contents.
    pub fn build_tcp_root_e133(
        &self,
        stack: &mut IoStack,
        vector: u32,
        sequence: u32,
        endpoint: u16,
    ) {
        self.prepend_e133_pdu(stack, vector, sequence, endpoint);
        self.prepend_root_pdu(stack, VECTOR_ROOT_E133);
        prepend_tcp_preamble(stack);
    }

    /// E1.33 framing + Root + UDP preamble around the stack's contents.
    pub fn build_udp_root_e133(
        &self,
        stack: &mut IoStack,
        vector: u32,
        sequence: u32,
        endpoint: u16,
    ) {
        self.prepend_e133_pdu(stack, vector, sequence, endpoint);
        self.prepend_root_pdu(stack, VECTOR_ROOT_E133);
        prepend_udp_preamble(stack);
    }

    /// The TCP heartbeat: an empty Root PDU with the Null vector.
    pub fn build_null_tcp_packet(&self, stack: &mut IoStack) {
        self.prepend_root_pdu(stack, VECTOR_ROOT_NULL);
        prepend_tcp_preamble(stack);
    }

    /// A complete TCP status message (used for acknowledgements).
    pub fn build_tcp_status(
        &self,
        stack: &mut IoStack,
        sequence: u32,
        endpoint: u16,
        status: u16,
        description: &str,
    ) {
        self.prepend_status_pdu(stack, status, description);
        self.build_tcp_root_e133(
            stack,
            crate::protocol::vectors::VECTOR_FRAMING_STATUS,
            sequence,
            endpoint,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headers::{HeaderSet, TransportHeader, TransportType};
    use crate::protocol::inflate::{
        E133Layer, EndpointRegistry, Inflator, NullLayer, RdmLayer, RootLayer, StatusLayer,
    };
    use crate::protocol::vectors::VECTOR_FRAMING_RDMNET;
    use crate::transport::TCP_PREAMBLE;
    use std::cell::RefCell;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::rc::Rc;

    fn tcp_headers() -> HeaderSet {
        HeaderSet::for_transport(TransportHeader::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5569),
            TransportType::Tcp,
        ))
    }

    fn full_tree() -> (
        Inflator,
        Rc<RefCell<Vec<(u16, u32, Vec<u8>)>>>,
        Rc<RefCell<Vec<(u32, u16)>>>,
    ) {
        let rdm_seen = Rc::new(RefCell::new(Vec::new()));
        let status_seen = Rc::new(RefCell::new(Vec::new()));

        let registry = EndpointRegistry::new();
        let rdm_sink = Rc::clone(&rdm_seen);
        registry.borrow_mut().register(
            0,
            Box::new(move |_, e133, data| {
                rdm_sink
                    .borrow_mut()
                    .push((e133.endpoint, e133.sequence, data.to_vec()));
            }),
        );

        let mut status_layer = StatusLayer::new();
        let status_sink = Rc::clone(&status_seen);
        status_layer.set_handler(Box::new(move |_, e133, status, _| {
            status_sink.borrow_mut().push((e133.sequence, status));
        }));

        let mut e133 = Inflator::new(E133Layer::new());
        e133.add_inflator(Inflator::new(RdmLayer::new(registry)));
        e133.add_inflator(Inflator::new(status_layer));

        let mut root = Inflator::new(RootLayer::new());
        root.add_inflator(e133);
        root.add_inflator(Inflator::new(NullLayer::new()));
        (root, rdm_seen, status_seen)
    }

    /// The spec's S1 scenario: Root + E1.33 + RDM to endpoint 0, sequence
    /// 101, payload 01 02 03 04; the handler sees cc 01 02 03 04.
    #[test]
    fn test_rdm_message_round_trip() {
        let builder = MessageBuilder::new(Cid::generate(), "ctrl");
        let mut stack = builder.new_stack();
        stack.append(&[0x01, 0x02, 0x03, 0x04]);
        builder.prepend_rdm_pdu(&mut stack);
        builder.build_tcp_root_e133(&mut stack, VECTOR_FRAMING_RDMNET, 101, 0);

        let bytes = stack.to_vec();
        assert_eq!(&bytes[..16], &TCP_PREAMBLE);
        let block_len = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        assert_eq!(block_len as usize, bytes.len() - 20);

        let (mut root, rdm_seen, _) = full_tree();
        let mut headers = tcp_headers();
        let consumed = root.inflate_block(&mut headers, &bytes[20..]);
        assert_eq!(consumed, bytes.len() - 20);
        assert_eq!(
            rdm_seen.borrow().as_slice(),
            &[(0u16, 101u32, vec![0xcc, 0x01, 0x02, 0x03, 0x04])]
        );
    }

    #[test]
    fn test_status_message_round_trip() {
        let builder = MessageBuilder::new(Cid::generate(), "ctrl");
        let mut stack = builder.new_stack();
        builder.build_tcp_status(&mut stack, 7, 0, crate::e133::SC_E133_ACK, "ok");

        let bytes = stack.to_vec();
        let (mut root, _, status_seen) = full_tree();
        let mut headers = tcp_headers();
        root.inflate_block(&mut headers, &bytes[20..]);
        assert_eq!(status_seen.borrow().as_slice(), &[(7u32, 0u16)]);
    }

    #[test]
    fn test_null_packet_accepted_by_tree() {
        let builder = MessageBuilder::new(Cid::generate(), "dev");
        let mut stack = builder.new_stack();
        builder.build_null_tcp_packet(&mut stack);
        let bytes = stack.to_vec();

        let (mut root, rdm_seen, _) = full_tree();
        let mut headers = tcp_headers();
        let consumed = root.inflate_block(&mut headers, &bytes[20..]);
        assert_eq!(consumed, bytes.len() - 20);
        assert!(rdm_seen.borrow().is_empty());
    }

    #[test]
    fn test_udp_packet_starts_with_udp_preamble() {
        let builder = MessageBuilder::new(Cid::generate(), "ctrl");
        let mut stack = builder.new_stack();
        stack.append(&[0xaa]);
        builder.prepend_rdm_pdu(&mut stack);
        builder.build_udp_root_e133(&mut stack, VECTOR_FRAMING_RDMNET, 1, 2);
        let bytes = stack.to_vec();
        assert_eq!(&bytes[..16], &crate::transport::UDP_PREAMBLE);
    }
}
