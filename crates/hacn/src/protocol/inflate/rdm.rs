// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDM layer: RDM commands carried inside E1.33 framing.
//!
//! The RDM PDU's one byte vector is the RDM start code (0xcc). Payloads are
//! routed by the endpoint id of the enclosing E1.33 header, through a
//! registry the application populates. Handlers receive the start code
//! re-attached so the payload is a complete byte-packed RDM message.

use super::{HeaderSet, InflateLayer, VectorSize};
use crate::protocol::headers::{E133Header, TransportHeader};
use crate::protocol::vectors::{VECTOR_FRAMING_RDMNET, VECTOR_RDMNET_DATA};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handler for RDM messages addressed to one endpoint.
pub type RdmHandler = Box<dyn FnMut(&TransportHeader, &E133Header, &[u8])>;

/// Endpoint-id keyed handler registry, shared with the application.
#[derive(Default)]
pub struct EndpointRegistry {
    handlers: HashMap<u16, RdmHandler>,
}

impl EndpointRegistry {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Register a handler for an endpoint. Replaces any existing handler.
    pub fn register(&mut self, endpoint: u16, handler: RdmHandler) {
        self.handlers.insert(endpoint, handler);
    }

    /// Remove the handler for an endpoint.
    pub fn unregister(&mut self, endpoint: u16) -> bool {
        self.handlers.remove(&endpoint).is_some()
    }

    pub fn contains(&self, endpoint: u16) -> bool {
        self.handlers.contains_key(&endpoint)
    }
}

/// Inflator layer for RDM PDUs.
pub struct RdmLayer {
    endpoints: Rc<RefCell<EndpointRegistry>>,
}

impl RdmLayer {
    pub fn new(endpoints: Rc<RefCell<EndpointRegistry>>) -> Self {
        RdmLayer { endpoints }
    }
}

impl InflateLayer for RdmLayer {
    fn id(&self) -> u32 {
        VECTOR_FRAMING_RDMNET
    }

    fn vector_size(&self) -> VectorSize {
        VectorSize::One
    }

    fn decode_header(&mut self, _headers: &mut HeaderSet, _data: Option<&[u8]>) -> Option<usize> {
        // The RDM PDU has a zero length header.
        Some(0)
    }

    fn handle_data(&mut self, vector: u32, headers: &HeaderSet, data: &[u8]) -> bool {
        if vector != VECTOR_RDMNET_DATA {
            log::warn!("[ACN] RDM PDU with unknown start code 0x{:02x}", vector);
            return false;
        }
        let (Some(transport), Some(e133)) = (headers.transport.as_ref(), headers.e133.as_ref())
        else {
            log::warn!("[ACN] RDM PDU without transport/E1.33 headers");
            return false;
        };

        let mut endpoints = self.endpoints.borrow_mut();
        let Some(handler) = endpoints.handlers.get_mut(&e133.endpoint) else {
            log::warn!("[ACN] no handler for endpoint {}", e133.endpoint);
            return false;
        };

        // Hand the handler a complete RDM message, start code included.
        let mut message = Vec::with_capacity(1 + data.len());
        message.push(vector as u8);
        message.extend_from_slice(data);
        handler(transport, e133, &message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headers::TransportType;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn headers_for_endpoint(endpoint: u16) -> HeaderSet {
        let mut headers = HeaderSet::for_transport(TransportHeader::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5569),
            TransportType::Tcp,
        ));
        headers.e133 = Some(E133Header::new("ctrl", 101, endpoint));
        headers
    }

    #[test]
    fn test_routed_by_endpoint_with_start_code() {
        let registry = EndpointRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        registry.borrow_mut().register(
            0,
            Box::new(move |_, e133, data| {
                sink.borrow_mut().push((e133.sequence, data.to_vec()));
            }),
        );

        let mut layer = RdmLayer::new(Rc::clone(&registry));
        let headers = headers_for_endpoint(0);
        assert!(layer.handle_data(0xcc, &headers, &[1, 2, 3, 4]));
        assert_eq!(
            seen.borrow().as_slice(),
            &[(101, vec![0xcc, 1, 2, 3, 4])]
        );
    }

    #[test]
    fn test_unknown_endpoint_dropped() {
        let registry = EndpointRegistry::new();
        let mut layer = RdmLayer::new(registry);
        let headers = headers_for_endpoint(9);
        assert!(!layer.handle_data(0xcc, &headers, &[1]));
    }

    #[test]
    fn test_unknown_start_code_dropped() {
        let registry = EndpointRegistry::new();
        registry.borrow_mut().register(0, Box::new(|_, _, _| {}));
        let mut layer = RdmLayer::new(registry);
        let headers = headers_for_endpoint(0);
        assert!(!layer.handle_data(0x01, &headers, &[1]));
    }

    #[test]
    fn test_unregister() {
        let registry = EndpointRegistry::new();
        registry.borrow_mut().register(3, Box::new(|_, _, _| {}));
        assert!(registry.borrow().contains(3));
        assert!(registry.borrow_mut().unregister(3));
        assert!(!registry.borrow_mut().unregister(3));
    }
}
