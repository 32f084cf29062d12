// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.31 (sACN) framing layer.

use super::{HeaderSet, InflateLayer, VectorSize};
use crate::protocol::headers::E131Header;
use crate::protocol::vectors::VECTOR_ROOT_E131;

/// Handler for E1.31 framing payloads (normally a DMP block).
pub type E131DataHandler = Box<dyn FnMut(u32, &HeaderSet, &[u8]) -> bool>;

/// Inflator layer for the E1.31 framing PDU.
pub struct E131Layer {
    last_header: Option<E131Header>,
    data_handler: Option<E131DataHandler>,
}

impl E131Layer {
    pub fn new() -> Self {
        E131Layer {
            last_header: None,
            data_handler: None,
        }
    }

    /// Install the payload handler (e.g. a DMP consumer).
    pub fn set_data_handler(&mut self, handler: E131DataHandler) {
        self.data_handler = Some(handler);
    }
}

impl Default for E131Layer {
    fn default() -> Self {
        Self::new()
    }
}

impl InflateLayer for E131Layer {
    fn id(&self) -> u32 {
        VECTOR_ROOT_E131
    }

    fn vector_size(&self) -> VectorSize {
        VectorSize::Four
    }

    fn decode_header(&mut self, headers: &mut HeaderSet, data: Option<&[u8]>) -> Option<usize> {
        match data {
            Some(data) => {
                let header = E131Header::from_wire(data)?;
                self.last_header = Some(header.clone());
                headers.e131 = Some(header);
                Some(E131Header::WIRE_SIZE)
            }
            None => match &self.last_header {
                Some(header) => {
                    headers.e131 = Some(header.clone());
                    Some(0)
                }
                None => {
                    log::warn!("[ACN] missing E1.31 header data");
                    None
                }
            },
        }
    }

    fn reset_header(&mut self) {
        self.last_header = None;
    }

    fn handle_data(&mut self, vector: u32, headers: &HeaderSet, data: &[u8]) -> bool {
        match self.data_handler.as_mut() {
            Some(handler) => handler(vector, headers, data),
            None => {
                log::warn!("[ACN] no E1.31 payload handler, vector {}", vector);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_through_layer() {
        let mut layer = E131Layer::new();
        let mut headers = HeaderSet::default();
        let header = E131Header::new("src", 100, 4, 22);
        let used = layer
            .decode_header(&mut headers, Some(&header.to_wire()))
            .unwrap();
        assert_eq!(used, E131Header::WIRE_SIZE);
        assert_eq!(headers.e131.as_ref(), Some(&header));
    }

    #[test]
    fn test_header_inheritance_and_reset() {
        let mut layer = E131Layer::new();
        let mut headers = HeaderSet::default();
        let header = E131Header::new("src", 100, 4, 22);
        layer
            .decode_header(&mut headers, Some(&header.to_wire()))
            .unwrap();

        let mut next = HeaderSet::default();
        assert_eq!(layer.decode_header(&mut next, None), Some(0));
        assert_eq!(next.e131.as_ref(), Some(&header));

        layer.reset_header();
        assert_eq!(layer.decode_header(&mut next, None), None);
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut layer = E131Layer::new();
        let mut headers = HeaderSet::default();
        assert_eq!(layer.decode_header(&mut headers, Some(&[0u8; 10])), None);
    }
}
