// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable delivery of unsolicited RDM responses over the
//! designated-controller TCP channel.
//!
//! Each message gets a monotonically increasing sequence number and is held
//! until the controller acknowledges it with an E1.33 status PDU carrying
//! [`crate::e133::SC_E133_ACK`] and the same sequence in its E1.33 header.
//! If the connection drops, the queue detaches; on the next attach every
//! outstanding message is resent. The buffer is bounded: once
//! `max_queue_size` messages are outstanding, new messages are refused and
//! the caller is told synchronously.

use super::message_builder::MessageBuilder;
use super::message_queue::MessageQueue;
use crate::protocol::vectors::VECTOR_FRAMING_RDMNET;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Default cap on outstanding (un-acked) messages.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10;

/// The outstanding-message buffer is full; the message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reliable send buffer full")
    }
}

impl std::error::Error for SendError {}

struct OutstandingMessage {
    endpoint: u16,
    /// Byte-packed RDM response, start code not included.
    response: Vec<u8>,
    was_sent: bool,
}

/// Sequence-numbered, acknowledgement-tracked resend buffer.
pub struct TcpMessageSender {
    builder: Rc<MessageBuilder>,
    queue: Option<Rc<RefCell<MessageQueue>>>,
    unacked: BTreeMap<u32, OutstandingMessage>,
    next_sequence: u32,
    max_queue_size: usize,
    /// Some messages could not be handed to the queue yet.
    unsent_pending: bool,
}

impl TcpMessageSender {
    pub fn new(builder: Rc<MessageBuilder>, max_queue_size: usize) -> Self {
        TcpMessageSender {
            builder,
            queue: None,
            unacked: BTreeMap::new(),
            next_sequence: 0,
            max_queue_size,
            unsent_pending: false,
        }
    }

    /// Number of messages waiting for an acknowledgement.
    pub fn queue_size(&self) -> usize {
        self.unacked.len()
    }

    /// Queue an RDM response for reliable delivery to `endpoint`.
    ///
    /// Returns the assigned sequence number. The record is retained until
    /// acknowledged even if the connection is currently down.
    pub fn add(&mut self, endpoint: u16, response: Vec<u8>) -> Result<u32, SendError> {
        if self.unacked.len() >= self.max_queue_size {
            log::warn!("[E133] reliable send buffer full, dropping message");
            return Err(SendError);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let mut message = OutstandingMessage {
            endpoint,
            response,
            was_sent: false,
        };
        if self.queue.is_some() {
            message.was_sent = self.try_send(sequence, endpoint, &message.response);
            if !message.was_sent {
                self.unsent_pending = true;
            }
        }
        self.unacked.insert(sequence, message);
        Ok(sequence)
    }

    /// A connection came up (or went away with `None`).
    ///
    /// On attach every unsent record is (re)sent; a detach clears the sent
    /// flags so the next connection gets everything again.
    pub fn set_message_queue(&mut self, queue: Option<Rc<RefCell<MessageQueue>>>) {
        self.queue = queue;
        if self.queue.is_some() {
            log::info!(
                "[E133] new connection, sending {} outstanding messages",
                self.unacked.len()
            );
            self.send_unsent();
        } else {
            for message in self.unacked.values_mut() {
                message.was_sent = false;
            }
        }
    }

    /// The controller acknowledged `sequence`.
    pub fn acknowledge(&mut self, sequence: u32) {
        if self.unacked.remove(&sequence).is_none() {
            log::debug!("[E133] ack for unknown sequence {}", sequence);
            return;
        }
        let limit_reached = self
            .queue
            .as_ref()
            .is_some_and(|queue| queue.borrow().limit_reached());
        if self.unsent_pending && !limit_reached {
            self.send_unsent();
        }
    }

    fn send_unsent(&mut self) {
        let mut sent_all = true;
        let pending: Vec<(u32, u16, Vec<u8>)> = self
            .unacked
            .iter()
            .filter(|(_, message)| !message.was_sent)
            .map(|(sequence, message)| (*sequence, message.endpoint, message.response.clone()))
            .collect();
        for (sequence, endpoint, response) in pending {
            let was_sent = self.try_send(sequence, endpoint, &response);
            sent_all &= was_sent;
            if let Some(message) = self.unacked.get_mut(&sequence) {
                message.was_sent = was_sent;
            }
        }
        self.unsent_pending = !sent_all;
    }

    /// Build the full packet and hand it to the message queue.
    fn try_send(&self, sequence: u32, endpoint: u16, response: &[u8]) -> bool {
        let Some(queue) = self.queue.as_ref() else {
            return false;
        };
        if queue.borrow().limit_reached() {
            return false;
        }

        let mut stack = self.builder.new_stack();
        stack.append(response);
        self.builder.prepend_rdm_pdu(&mut stack);
        self.builder
            .build_tcp_root_e133(&mut stack, VECTOR_FRAMING_RDMNET, sequence, endpoint);
        queue.borrow_mut().send(&mut stack).is_ok()
    }
}
