// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 (RDMnet) framing layer.

use super::{HeaderSet, InflateLayer, VectorSize};
use crate::protocol::headers::E133Header;
use crate::protocol::vectors::VECTOR_ROOT_E133;

/// Inflator layer for the E1.33 framing PDU.
pub struct E133Layer {
    last_header: Option<E133Header>,
}

impl E133Layer {
    pub fn new() -> Self {
        E133Layer { last_header: None }
    }
}

impl Default for E133Layer {
    fn default() -> Self {
        Self::new()
    }
}

impl InflateLayer for E133Layer {
    fn id(&self) -> u32 {
        VECTOR_ROOT_E133
    }

    fn vector_size(&self) -> VectorSize {
        VectorSize::Four
    }

    fn decode_header(&mut self, headers: &mut HeaderSet, data: Option<&[u8]>) -> Option<usize> {
        match data {
            Some(data) => {
                let header = E133Header::from_wire(data)?;
                self.last_header = Some(header.clone());
                headers.e133 = Some(header);
                Some(E133Header::WIRE_SIZE)
            }
            None => match &self.last_header {
                Some(header) => {
                    headers.e133 = Some(header.clone());
                    Some(0)
                }
                None => {
                    log::warn!("[ACN] missing E1.33 header data");
                    None
                }
            },
        }
    }

    fn reset_header(&mut self) {
        self.last_header = None;
    }
}
