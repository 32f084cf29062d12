// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Null layer: the empty Root PDU used as a TCP heartbeat.

use super::{HeaderSet, InflateLayer, VectorSize};
use crate::protocol::vectors::VECTOR_ROOT_NULL;

/// Inflator layer for the Null Root vector. Carries no header and no data.
#[derive(Default)]
pub struct NullLayer;

impl NullLayer {
    pub fn new() -> Self {
        NullLayer
    }
}

impl InflateLayer for NullLayer {
    fn id(&self) -> u32 {
        VECTOR_ROOT_NULL
    }

    fn vector_size(&self) -> VectorSize {
        VectorSize::Four
    }

    fn decode_header(&mut self, _headers: &mut HeaderSet, _data: Option<&[u8]>) -> Option<usize> {
        Some(0)
    }

    fn handle_data(&mut self, _vector: u32, _headers: &HeaderSet, data: &[u8]) -> bool {
        if !data.is_empty() {
            log::warn!("[ACN] Null PDU with {} bytes of data", data.len());
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_data_accepted() {
        let mut layer = NullLayer::new();
        let headers = HeaderSet::default();
        assert!(layer.handle_data(VECTOR_ROOT_NULL, &headers, &[]));
    }

    #[test]
    fn test_nonempty_data_rejected() {
        let mut layer = NullLayer::new();
        let headers = HeaderSet::default();
        assert!(!layer.handle_data(VECTOR_ROOT_NULL, &headers, &[1]));
    }
}
