// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ACN over a TCP byte stream.
//!
//! TCP delivers bytes, not packets, so the receiver runs an incremental
//! state machine:
//!
//! | state                | waits for          | then                        |
//! |----------------------|--------------------|-----------------------------|
//! | `WaitingForPreamble` | 20 bytes           | verify preamble, read block |
//! | `WaitingForPduFlags` | 1 byte             | pick 2 or 3 length bytes    |
//! | `WaitingForPduLength`| 1 or 2 more bytes  | decode PDU length           |
//! | `WaitingForPdu`      | rest of the PDU    | inflate, account block      |
//!
//! Any malformity (bad preamble, impossible length, a PDU overrunning its
//! declared block, inflator/PDU length disagreement) marks the stream
//! invalid; the caller is expected to close the connection.

use super::TCP_PREAMBLE;
use crate::core::IoStack;
use crate::protocol::inflate::Inflator;
use crate::protocol::pdu::{LENGTH_MASK, LFLAG_MASK};
use crate::protocol::{HeaderSet, TransportHeader, TransportType};
use std::io::{self, Read};
use std::net::SocketAddrV4;

/// Preamble plus the 4 byte block length.
const PREAMBLE_WAIT: usize = TCP_PREAMBLE.len() + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    WaitingForPreamble,
    WaitingForPduFlags,
    WaitingForPduLength,
    WaitingForPdu,
}

/// Prepend the TCP preamble and block length to a finished PDU block.
pub fn prepend_tcp_preamble(stack: &mut IoStack) {
    let block_length = stack.len() as u32;
    stack.prepend(&block_length.to_be_bytes());
    stack.prepend(&TCP_PREAMBLE);
}

/// The receive half of an ACN TCP connection.
pub struct IncomingStreamTransport {
    transport_header: TransportHeader,
    state: StreamState,
    buffer: Vec<u8>,
    /// Bytes still required before the current state can run.
    outstanding: usize,
    block_size: usize,
    consumed_block: usize,
    pdu_length_size: usize,
    pdu_size: usize,
    stream_valid: bool,
}

impl IncomingStreamTransport {
    /// Create a transport for a connection from `source`.
    pub fn new(source: SocketAddrV4) -> Self {
        let mut transport = IncomingStreamTransport {
            transport_header: TransportHeader::new(source, TransportType::Tcp),
            state: StreamState::WaitingForPreamble,
            buffer: Vec::with_capacity(512),
            outstanding: 0,
            block_size: 0,
            consumed_block: 0,
            pdu_length_size: 2,
            pdu_size: 0,
            stream_valid: true,
        };
        transport.enter_waiting_for_preamble();
        transport
    }

    /// True until a protocol violation is detected.
    pub fn stream_valid(&self) -> bool {
        self.stream_valid
    }

    /// Pull bytes from `reader` and decode as much as possible.
    ///
    /// Returns false once the stream is inconsistent; the caller should
    /// close the connection, the remaining data cannot be trusted.
    pub fn receive<R: Read + ?Sized>(
        &mut self,
        inflator: &mut Inflator,
        reader: &mut R,
    ) -> bool {
        while self.stream_valid {
            if !self.read_required(reader) {
                return self.stream_valid;
            }
            if self.outstanding > 0 {
                // Not enough data yet; wait for the next readable event.
                return true;
            }

            match self.state {
                StreamState::WaitingForPreamble => self.handle_preamble(),
                StreamState::WaitingForPduFlags => self.handle_pdu_flags(),
                StreamState::WaitingForPduLength => self.handle_pdu_length(),
                StreamState::WaitingForPdu => self.handle_pdu(inflator),
            }
        }
        false
    }

    /// Read until `outstanding` is satisfied or the reader runs dry.
    ///
    /// Returns false when no further progress is possible right now.
    fn read_required<R: Read + ?Sized>(&mut self, reader: &mut R) -> bool {
        while self.outstanding > 0 {
            let start = self.buffer.len();
            self.buffer.resize(start + self.outstanding, 0);
            match reader.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    self.buffer.truncate(start);
                    log::debug!(
                        "[TCP] connection from {} closed",
                        self.transport_header.source
                    );
                    self.stream_valid = false;
                    return false;
                }
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    self.outstanding -= n;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.buffer.truncate(start);
                    return false;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {
                    self.buffer.truncate(start);
                }
                Err(err) => {
                    self.buffer.truncate(start);
                    log::warn!("[TCP] rx failed: {}", err);
                    self.stream_valid = false;
                    return false;
                }
            }
        }
        true
    }

    /// 20 bytes buffered: check the preamble and read the block length.
    fn handle_preamble(&mut self) {
        if self.buffer[..TCP_PREAMBLE.len()] != TCP_PREAMBLE {
            log::warn!("[TCP] bad ACN preamble from {}", self.transport_header.source);
            self.stream_valid = false;
            return;
        }
        self.block_size = u32::from_be_bytes([
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        ]) as usize;

        if self.block_size > 0 {
            self.consumed_block = 0;
            self.enter_waiting_for_pdu();
        } else {
            self.enter_waiting_for_preamble();
        }
    }

    /// 1 byte buffered: the flags tell us the width of the length field.
    fn handle_pdu_flags(&mut self) {
        self.pdu_length_size = if self.buffer[0] & LFLAG_MASK != 0 { 3 } else { 2 };
        self.outstanding = self.pdu_length_size - 1;
        self.state = StreamState::WaitingForPduLength;
    }

    /// The full length field is buffered: decode and validate it.
    fn handle_pdu_length(&mut self) {
        self.pdu_size = if self.pdu_length_size == 3 {
            usize::from(self.buffer[2])
                + (usize::from(self.buffer[1]) << 8)
                + (usize::from(self.buffer[0] & LENGTH_MASK) << 16)
        } else {
            usize::from(self.buffer[1]) + (usize::from(self.buffer[0] & LENGTH_MASK) << 8)
        };

        if self.pdu_size < self.pdu_length_size {
            log::warn!(
                "[TCP] PDU length {} smaller than its {} length bytes",
                self.pdu_size,
                self.pdu_length_size
            );
            self.stream_valid = false;
            return;
        }
        if self.consumed_block + self.pdu_size > self.block_size {
            log::warn!(
                "[TCP] PDU of {} bytes overruns the {} byte block",
                self.pdu_size,
                self.block_size
            );
            self.stream_valid = false;
            return;
        }

        self.outstanding = self.pdu_size - self.pdu_length_size;
        self.state = StreamState::WaitingForPdu;
    }

    /// The whole PDU is buffered: inflate it and account the block.
    fn handle_pdu(&mut self, inflator: &mut Inflator) {
        let mut headers = HeaderSet::for_transport(self.transport_header);
        let consumed = inflator.inflate_block(&mut headers, &self.buffer[..self.pdu_size]);
        if consumed != self.pdu_size {
            log::warn!(
                "[TCP] PDU inflation size mismatch, {} != {}",
                self.pdu_size,
                consumed
            );
            self.stream_valid = false;
            return;
        }

        self.consumed_block += self.pdu_size;
        if self.consumed_block == self.block_size {
            self.enter_waiting_for_preamble();
        } else {
            self.enter_waiting_for_pdu();
        }
    }

    fn enter_waiting_for_preamble(&mut self) {
        self.buffer.clear();
        self.state = StreamState::WaitingForPreamble;
        self.outstanding = PREAMBLE_WAIT;
    }

    fn enter_waiting_for_pdu(&mut self) {
        self.buffer.clear();
        self.state = StreamState::WaitingForPduFlags;
        self.outstanding = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockPool, Cid};
    use crate::protocol::inflate::InflateLayer;
    use crate::protocol::inflate::RootLayer;
    use crate::protocol::pdu::{self, VectorSize, DFLAG_MASK, HFLAG_MASK, VFLAG_MASK};
    use std::cell::RefCell;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    /// A reader that yields its chunks one at a time, with WouldBlock
    /// between them (a non-blocking socket on a slow peer).
    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        starved: bool,
    }

    impl ChunkedReader {
        fn new(data: &[u8], chunk_size: usize) -> Self {
            let mut chunks: Vec<Vec<u8>> =
                data.chunks(chunk_size).map(<[u8]>::to_vec).collect();
            chunks.reverse();
            ChunkedReader {
                chunks,
                starved: false,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.starved {
                self.starved = false;
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            match self.chunks.last_mut() {
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
                Some(chunk) => {
                    let n = buf.len().min(chunk.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.pop();
                        self.starved = true;
                    }
                    Ok(n)
                }
            }
        }
    }

    struct LeafLayer {
        id: u32,
        seen: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl InflateLayer for LeafLayer {
        fn id(&self) -> u32 {
            self.id
        }
        fn vector_size(&self) -> VectorSize {
            VectorSize::Four
        }
        fn decode_header(&mut self, _: &mut HeaderSet, _: Option<&[u8]>) -> Option<usize> {
            Some(0)
        }
        fn handle_data(&mut self, _: u32, _: &HeaderSet, data: &[u8]) -> bool {
            self.seen.borrow_mut().push(data.to_vec());
            true
        }
    }

    fn root_with_leaf(id: u32) -> (Inflator, Rc<RefCell<Vec<Vec<u8>>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut root = Inflator::new(RootLayer::new());
        root.add_inflator(Inflator::new(LeafLayer {
            id,
            seen: Rc::clone(&seen),
        }));
        (root, seen)
    }

    fn source() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 5569)
    }

    /// A full TCP frame: preamble + block length + one Root PDU carrying an
    /// inner data PDU for vector `leaf`.
    fn frame_for_leaf(leaf: u32, payload: &[u8]) -> Vec<u8> {
        let inner = pdu::pack(
            VFLAG_MASK | DFLAG_MASK,
            Some((2, VectorSize::Four)),
            None,
            Some(payload),
        )
        .unwrap();
        let cid = Cid::generate();
        let root_pdu = pdu::pack(
            VFLAG_MASK | HFLAG_MASK | DFLAG_MASK,
            Some((leaf, VectorSize::Four)),
            Some(cid.as_bytes()),
            Some(&inner),
        )
        .unwrap();

        let pool = BlockPool::new();
        let mut stack = IoStack::new(&pool);
        stack.append(&root_pdu);
        prepend_tcp_preamble(&mut stack);
        stack.to_vec()
    }

    #[test]
    fn test_single_frame_decoded() {
        let (mut root, seen) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let frame = frame_for_leaf(80, b"hello");
        let mut reader = ChunkedReader::new(&frame, frame.len());
        assert!(transport.receive(&mut root, &mut reader));
        assert_eq!(seen.borrow().as_slice(), &[b"hello".to_vec()]);
    }

    #[test]
    fn test_byte_at_a_time_decoding() {
        let (mut root, seen) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let frame = frame_for_leaf(80, b"drip");
        let mut reader = ChunkedReader::new(&frame, 1);
        for _ in 0..frame.len() * 2 + 2 {
            assert!(transport.receive(&mut root, &mut reader));
        }
        assert_eq!(seen.borrow().as_slice(), &[b"drip".to_vec()]);
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let (mut root, seen) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let mut data = frame_for_leaf(80, b"one");
        data.extend(frame_for_leaf(80, b"two"));
        let mut reader = ChunkedReader::new(&data, data.len());
        // Drain both frames; the reader blocks between internal chunks.
        while transport.receive(&mut root, &mut reader) {
            if seen.borrow().len() == 2 {
                break;
            }
        }
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_bad_preamble_invalidates_stream() {
        let (mut root, _) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let mut frame = frame_for_leaf(80, b"x");
        frame[4] = b'Z';
        let mut reader = ChunkedReader::new(&frame, frame.len());
        assert!(!transport.receive(&mut root, &mut reader));
        assert!(!transport.stream_valid());
    }

    #[test]
    fn test_zero_length_block_returns_to_preamble() {
        let (mut root, seen) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let mut data = TCP_PREAMBLE.to_vec();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend(frame_for_leaf(80, b"after"));
        let mut reader = ChunkedReader::new(&data, data.len());
        while transport.receive(&mut root, &mut reader) {
            if seen.borrow().len() == 1 {
                break;
            }
        }
        assert_eq!(seen.borrow().as_slice(), &[b"after".to_vec()]);
    }

    #[test]
    fn test_pdu_overrunning_block_invalidates_stream() {
        let (mut root, _) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        // Declare a 4 byte block, then start a PDU claiming 100 bytes.
        let mut data = TCP_PREAMBLE.to_vec();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(&[0x40, 100, 0, 0]);
        let mut reader = ChunkedReader::new(&data, data.len());
        assert!(!transport.receive(&mut root, &mut reader));
    }

    #[test]
    fn test_pdu_length_below_field_width_invalidates_stream() {
        let (mut root, _) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        let mut data = TCP_PREAMBLE.to_vec();
        data.extend_from_slice(&10u32.to_be_bytes());
        // Flags byte with length 1: impossible.
        data.extend_from_slice(&[0x00, 0x01]);
        let mut reader = ChunkedReader::new(&data, data.len());
        assert!(!transport.receive(&mut root, &mut reader));
    }

    #[test]
    fn test_peer_close_invalidates_stream() {
        struct Eof;
        impl Read for Eof {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }
        let (mut root, _) = root_with_leaf(80);
        let mut transport = IncomingStreamTransport::new(source());
        assert!(!transport.receive(&mut root, &mut Eof));
    }
}
