// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Root layer: the top of the PDU nest.
//!
//! The Root PDU carries a 4 byte vector selecting the protocol family and a
//! 16 byte CID header identifying the sending component. An optional
//! per-packet hook fires for every Root PDU decoded; the TCP health monitor
//! uses it as its "the peer is alive" signal.

use super::{HeaderSet, InflateLayer, VectorSize};
use crate::core::{Cid, CID_LENGTH};
use crate::protocol::headers::RootHeader;

/// Per-packet hook invoked after the Root header decodes.
pub type PacketHook = Box<dyn FnMut(&HeaderSet)>;

/// The Root inflator layer.
pub struct RootLayer {
    last_cid: Cid,
    on_packet: Option<PacketHook>,
}

impl RootLayer {
    pub fn new() -> Self {
        RootLayer {
            last_cid: Cid::nil(),
            on_packet: None,
        }
    }

    /// Install the per-packet hook.
    pub fn set_packet_hook(&mut self, hook: PacketHook) {
        self.on_packet = Some(hook);
    }
}

impl Default for RootLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl InflateLayer for RootLayer {
    fn id(&self) -> u32 {
        // The root has no parent; it is never registered by vector.
        0
    }

    fn vector_size(&self) -> VectorSize {
        VectorSize::Four
    }

    fn decode_header(&mut self, headers: &mut HeaderSet, data: Option<&[u8]>) -> Option<usize> {
        match data {
            Some(data) => {
                let cid = Cid::from_slice(data)?;
                self.last_cid = cid;
                headers.root = Some(RootHeader { cid });
                Some(CID_LENGTH)
            }
            None => {
                if self.last_cid.is_nil() {
                    log::warn!("[ACN] missing CID data");
                    return None;
                }
                headers.root = Some(RootHeader { cid: self.last_cid });
                Some(0)
            }
        }
    }

    fn reset_header(&mut self) {
        self.last_cid = Cid::nil();
    }

    fn post_header(&mut self, _vector: u32, headers: &mut HeaderSet) -> bool {
        if let Some(hook) = self.on_packet.as_mut() {
            hook(headers);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::inflate::Inflator;
    use crate::protocol::pdu::{self, DFLAG_MASK, HFLAG_MASK, VFLAG_MASK};
    use crate::protocol::vectors::VECTOR_ROOT_E133;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_decode_header_sets_cid() {
        let mut layer = RootLayer::new();
        let mut headers = HeaderSet::default();
        let cid = Cid::generate();
        let used = layer.decode_header(&mut headers, Some(cid.as_bytes())).unwrap();
        assert_eq!(used, CID_LENGTH);
        assert_eq!(headers.root.unwrap().cid, cid);
    }

    #[test]
    fn test_header_inheritance() {
        let mut layer = RootLayer::new();
        let mut headers = HeaderSet::default();
        let cid = Cid::generate();
        layer.decode_header(&mut headers, Some(cid.as_bytes())).unwrap();

        let mut next = HeaderSet::default();
        assert_eq!(layer.decode_header(&mut next, None), Some(0));
        assert_eq!(next.root.unwrap().cid, cid);

        layer.reset_header();
        assert_eq!(layer.decode_header(&mut next, None), None);
    }

    #[test]
    fn test_truncated_cid_rejected() {
        let mut layer = RootLayer::new();
        let mut headers = HeaderSet::default();
        assert_eq!(layer.decode_header(&mut headers, Some(&[0u8; 8])), None);
    }

    #[test]
    fn test_packet_hook_fires_per_pdu() {
        let count = Rc::new(RefCell::new(0));
        let mut layer = RootLayer::new();
        let hook_count = Rc::clone(&count);
        layer.set_packet_hook(Box::new(move |_| *hook_count.borrow_mut() += 1));

        let mut root = Inflator::new(layer);
        let cid = Cid::generate();
        let block = pdu::pack(
            VFLAG_MASK | HFLAG_MASK | DFLAG_MASK,
            Some((VECTOR_ROOT_E133, VectorSize::Four)),
            Some(cid.as_bytes()),
            Some(&[]),
        )
        .unwrap();
        let mut headers = HeaderSet::default();
        root.inflate_block(&mut headers, &block);
        assert_eq!(*count.borrow(), 1);
    }
}
