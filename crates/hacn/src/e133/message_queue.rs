// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded write-side buffer over a connected byte stream.
//!
//! Sends are non-blocking: [`MessageQueue::send`] moves a finished stack's
//! blocks into the internal queue and asks the reactor for writable events;
//! [`MessageQueue::on_writable`] drains what the socket will take and drops
//! the writable interest once empty. Callers never touch the reactor
//! directly - the queue owns its interest lifecycle through a callback.

use crate::core::{BlockPool, IoStack};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Default cap on buffered bytes. 1k is plenty for userspace; the kernel
/// socket buffer does the real work.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024;

/// The queue refused a message because the buffer cap is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message queue buffer limit reached")
    }
}

impl std::error::Error for QueueFull {}

/// Write-side buffer for one connection.
pub struct MessageQueue {
    blocks: VecDeque<Vec<u8>>,
    /// Bytes of blocks[0] already written.
    front_written: usize,
    buffered: usize,
    max_buffer_size: usize,
    pool: Rc<BlockPool>,
    associated: bool,
    /// Toggles writable interest with the reactor.
    interest: Box<dyn FnMut(bool)>,
}

impl MessageQueue {
    /// Create a queue. `interest(true)` must arm writable notifications for
    /// the connection, `interest(false)` must disarm them.
    pub fn new(
        pool: &Rc<BlockPool>,
        max_buffer_size: usize,
        interest: Box<dyn FnMut(bool)>,
    ) -> Self {
        MessageQueue {
            blocks: VecDeque::new(),
            front_written: 0,
            buffered: 0,
            max_buffer_size,
            pool: Rc::clone(pool),
            associated: false,
            interest,
        }
    }

    /// True when no further messages will be accepted until the buffer
    /// drains.
    pub fn limit_reached(&self) -> bool {
        self.buffered >= self.max_buffer_size
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Queue a finished stack for transmission. The stack is emptied.
    pub fn send(&mut self, stack: &mut IoStack) -> Result<(), QueueFull> {
        if self.limit_reached() {
            return Err(QueueFull);
        }
        for block in stack.take_blocks() {
            self.buffered += block.len();
            self.blocks.push_back(block);
        }
        self.associate_if_required();
        Ok(())
    }

    /// The connection is writable: drain what we can.
    ///
    /// Errors other than `WouldBlock` are returned for the caller to tear
    /// the connection down.
    pub fn on_writable<W: Write + ?Sized>(&mut self, stream: &mut W) -> io::Result<()> {
        while let Some(front) = self.blocks.front() {
            match stream.write(&front[self.front_written..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.front_written += n;
                    self.buffered -= n;
                    if self.front_written == front.len() {
                        let done = self.blocks.pop_front().unwrap_or_default();
                        self.pool.release(done);
                        self.front_written = 0;
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }

        if self.blocks.is_empty() && self.associated {
            (self.interest)(false);
            self.associated = false;
        }
        Ok(())
    }

    fn associate_if_required(&mut self) {
        if self.blocks.is_empty() || self.associated {
            return;
        }
        (self.interest)(true);
        self.associated = true;
    }
}
