// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The device side of the designated-controller TCP channel.
//!
//! A [`DesignatedControllerSession`] composes the per-connection pieces:
//! the [`MessageQueue`] buffering writes, the [`HealthMonitor`] heartbeat,
//! and the [`TcpMessageSender`] holding unsolicited RDM responses until the
//! controller acknowledges them. The session owns the sender for the life
//! of the device; the queue and monitor come and go with each connection.
//!
//! Wiring expected from the owner:
//!
//! - the Root inflator's packet hook calls [`pdu_received`],
//! - the status inflator's handler calls [`status_message`],
//! - a reactor interval timer at the heartbeat cadence calls
//!   [`heartbeat_tick`].
//!
//! [`pdu_received`]: DesignatedControllerSession::pdu_received
//! [`status_message`]: DesignatedControllerSession::status_message
//! [`heartbeat_tick`]: DesignatedControllerSession::heartbeat_tick

use super::health::{HealthMonitor, TcpConnectionStats};
use super::message_builder::MessageBuilder;
use super::message_queue::MessageQueue;
use super::tcp_sender::{SendError, TcpMessageSender, DEFAULT_MAX_QUEUE_SIZE};
use super::SC_E133_ACK;
use crate::protocol::headers::E133Header;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// Session state for the (at most one) designated-controller connection.
pub struct DesignatedControllerSession {
    builder: Rc<MessageBuilder>,
    sender: TcpMessageSender,
    queue: Option<Rc<RefCell<MessageQueue>>>,
    health: Option<HealthMonitor>,
    stats: TcpConnectionStats,
}

impl DesignatedControllerSession {
    pub fn new(builder: Rc<MessageBuilder>) -> Self {
        DesignatedControllerSession {
            sender: TcpMessageSender::new(Rc::clone(&builder), DEFAULT_MAX_QUEUE_SIZE),
            builder,
            queue: None,
            health: None,
            stats: TcpConnectionStats::default(),
        }
    }

    /// A controller connected; outstanding messages are resent.
    pub fn connection_established(
        &mut self,
        now: Instant,
        queue: Rc<RefCell<MessageQueue>>,
        on_timeout: Box<dyn FnOnce()>,
    ) {
        self.stats.connection_events += 1;
        self.health = Some(HealthMonitor::new(now, on_timeout));
        self.queue = Some(Rc::clone(&queue));
        self.sender.set_message_queue(Some(queue));
        log::info!("[E133] designated controller connected");
    }

    /// The connection went away (peer close or health timeout).
    pub fn connection_closed(&mut self) {
        if let Some(health) = self.health.take() {
            self.stats.unhealthy_events += health.stats().unhealthy_events;
        }
        self.queue = None;
        self.sender.set_message_queue(None);
        log::info!("[E133] designated controller connection closed");
    }

    pub fn connected(&self) -> bool {
        self.queue.is_some()
    }

    /// Queue an unsolicited RDM response for reliable delivery.
    pub fn send_status_message(
        &mut self,
        endpoint: u16,
        response: Vec<u8>,
    ) -> Result<u32, SendError> {
        self.sender.add(endpoint, response)
    }

    /// Messages still awaiting a controller acknowledgement.
    pub fn outstanding_messages(&self) -> usize {
        self.sender.queue_size()
    }

    /// Any ACN PDU arrived on the connection.
    pub fn pdu_received(&mut self, now: Instant) {
        if let Some(health) = self.health.as_mut() {
            health.pdu_received(now);
        }
    }

    /// Heartbeat timer fired: send the Null Root PDU, or tear down on
    /// silence. Returns false once the connection has timed out.
    pub fn heartbeat_tick(&mut self, now: Instant) -> bool {
        let Some(health) = self.health.as_mut() else {
            return false;
        };
        if !health.tick(now) {
            return false;
        }
        if let Some(queue) = self.queue.as_ref() {
            let mut stack = self.builder.new_stack();
            self.builder.build_null_tcp_packet(&mut stack);
            if queue.borrow_mut().send(&mut stack).is_err() {
                // The buffer is backed up; the pending data already proves
                // the connection has outbound traffic.
                log::debug!("[E133] heartbeat skipped, queue full");
            }
        }
        true
    }

    /// An E1.33 status PDU arrived; acks prune the reliable sender.
    pub fn status_message(&mut self, header: &E133Header, status: u16, description: &str) {
        if status == SC_E133_ACK {
            self.sender.acknowledge(header.sequence);
        } else {
            log::warn!(
                "[E133] controller status {} for sequence {}: {}",
                status,
                header.sequence,
                description
            );
        }
    }

    pub fn stats(&self) -> TcpConnectionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Cid;
    use crate::e133::message_queue::DEFAULT_MAX_BUFFER_SIZE;
    use std::time::Duration;

    fn session() -> (DesignatedControllerSession, Rc<RefCell<MessageQueue>>) {
        let builder = Rc::new(MessageBuilder::new(Cid::generate(), "device"));
        let queue = Rc::new(RefCell::new(MessageQueue::new(
            builder.pool(),
            DEFAULT_MAX_BUFFER_SIZE,
            Box::new(|_| {}),
        )));
        (DesignatedControllerSession::new(builder), queue)
    }

    /// The spec's S4 scenario: an ack with matching sequence empties the
    /// outstanding set.
    #[test]
    fn test_ack_prunes_outstanding() {
        let (mut session, queue) = session();
        let now = Instant::now();
        session.connection_established(now, queue, Box::new(|| {}));

        let sequence = session.send_status_message(0, vec![0x01, 0x02]).unwrap();
        assert_eq!(session.outstanding_messages(), 1);

        let header = E133Header::new("ctrl", sequence, 0);
        session.status_message(&header, SC_E133_ACK, "");
        assert_eq!(session.outstanding_messages(), 0);
    }

    #[test]
    fn test_non_ack_status_keeps_message() {
        let (mut session, queue) = session();
        let now = Instant::now();
        session.connection_established(now, queue, Box::new(|| {}));
        let sequence = session.send_status_message(0, vec![0x01]).unwrap();

        let header = E133Header::new("ctrl", sequence, 0);
        session.status_message(&header, super::super::SC_E133_BUFFER_FULL, "busy");
        assert_eq!(session.outstanding_messages(), 1);
    }

    #[test]
    fn test_heartbeat_written_to_queue() {
        let (mut session, queue) = session();
        let now = Instant::now();
        session.connection_established(now, Rc::clone(&queue), Box::new(|| {}));

        assert!(session.heartbeat_tick(now + Duration::from_secs(2)));
        assert!(queue.borrow().buffered() > 0);
    }

    #[test]
    fn test_timeout_fires_and_disables_heartbeats() {
        let (mut session, queue) = session();
        let now = Instant::now();
        let timed_out = Rc::new(std::cell::Cell::new(false));
        let hit = Rc::clone(&timed_out);
        session.connection_established(now, queue, Box::new(move || hit.set(true)));

        // Silence for three heartbeat intervals.
        assert!(session.heartbeat_tick(now + Duration::from_secs(2)));
        assert!(session.heartbeat_tick(now + Duration::from_secs(4)));
        assert!(!session.heartbeat_tick(now + Duration::from_secs(6)));
        assert!(timed_out.get());

        session.connection_closed();
        assert!(!session.connected());
        assert_eq!(session.stats().unhealthy_events, 1);
    }

    #[test]
    fn test_messages_survive_reconnect() {
        let (mut session, queue) = session();
        let now = Instant::now();

        // Queued while disconnected.
        session.send_status_message(1, vec![0xaa]).unwrap();
        assert_eq!(session.outstanding_messages(), 1);

        session.connection_established(now, Rc::clone(&queue), Box::new(|| {}));
        assert!(queue.borrow().buffered() > 0);
        assert_eq!(session.stats().connection_events, 1);
    }
}
