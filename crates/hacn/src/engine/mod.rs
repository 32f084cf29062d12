// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The single-threaded event reactor.
//!
//! One [`Reactor`] owns a `mio::Poll`, a token-indexed handler table and a
//! monotonic [`timer::TimerQueue`]. Sockets and timers are multiplexed on
//! the calling thread; every protocol component in this crate is driven from
//! reactor callbacks and none of them may block.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------------------+
//! |                        Reactor                            |
//! |  +-----------------------------------------------------+  |
//! |  |                     mio::Poll                       |  |
//! |  |  - UDP sockets (SLP 427, ACN 5568)                  |  |
//! |  |  - TCP listener / designated-controller streams     |  |
//! |  +-----------------------------------------------------+  |
//! |                            |                              |
//! |         Token -> EventHandler dispatch                    |
//! |                            |                              |
//! |  +-----------------------------------------------------+  |
//! |  |   TimerQueue: heartbeats, SLP backoff, store aging  |  |
//! |  +-----------------------------------------------------+  |
//! +-----------------------------------------------------------+
//! ```
//!
//! Handlers and timer callbacks share state through `Rc<RefCell<..>>`; the
//! reactor never holds a borrow across a callback.

pub mod timer;

pub use timer::{TimerHandle, TimerId};

use mio::event::{Event, Source};
use mio::{Events, Interest, Poll, Registry, Token};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Maximum events drained per poll.
const MAX_EVENTS: usize = 128;

/// Poll timeout when no timer is pending (bounds shutdown latency).
const IDLE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Receiver of IO readiness for one registered source.
pub trait EventHandler {
    /// The source identified by the event's token is ready.
    fn ready(&mut self, event: &Event);
}

struct Shared {
    handlers: RefCell<HashMap<Token, Rc<RefCell<dyn EventHandler>>>>,
    next_token: Cell<usize>,
    timers: TimerHandle,
}

/// Capability to register sources and timers, cloneable into handlers.
pub struct ReactorHandle {
    shared: Rc<Shared>,
    registry: Registry,
}

impl ReactorHandle {
    /// Register an IO source and the handler for its events.
    pub fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        interests: Interest,
        handler: Rc<RefCell<dyn EventHandler>>,
    ) -> io::Result<Token> {
        let token = Token(self.shared.next_token.get());
        self.shared.next_token.set(token.0 + 1);
        self.registry.register(source, token, interests)?;
        self.shared.handlers.borrow_mut().insert(token, handler);
        Ok(token)
    }

    /// Change the interest set of a registered source.
    pub fn reregister<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.registry.reregister(source, token, interests)
    }

    /// Remove a source and its handler.
    pub fn deregister<S: Source + ?Sized>(&self, source: &mut S, token: Token) -> io::Result<()> {
        self.shared.handlers.borrow_mut().remove(&token);
        self.registry.deregister(source)
    }

    /// The reactor's timer queue.
    pub fn timers(&self) -> TimerHandle {
        self.shared.timers.clone()
    }

    /// A further handle (for another component).
    pub fn try_clone(&self) -> io::Result<ReactorHandle> {
        Ok(ReactorHandle {
            shared: Rc::clone(&self.shared),
            registry: self.registry.try_clone()?,
        })
    }
}

/// The reactor: poll loop plus timer dispatch.
pub struct Reactor {
    poll: Poll,
    shared: Rc<Shared>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Reactor {
            poll: Poll::new()?,
            shared: Rc::new(Shared {
                handlers: RefCell::new(HashMap::new()),
                next_token: Cell::new(0),
                timers: TimerHandle::new(),
            }),
        })
    }

    /// A handle for registering sources and timers.
    pub fn handle(&self) -> io::Result<ReactorHandle> {
        Ok(ReactorHandle {
            shared: Rc::clone(&self.shared),
            registry: self.poll.registry().try_clone()?,
        })
    }

    /// The reactor's timer queue.
    pub fn timers(&self) -> TimerHandle {
        self.shared.timers.clone()
    }

    /// Run until `running` goes false.
    pub fn run(&mut self, running: &AtomicBool) -> io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);
        while running.load(Ordering::SeqCst) {
            self.turn(&mut events)?;
        }
        log::info!("[ENGINE] reactor stopped");
        Ok(())
    }

    /// A single poll-and-dispatch turn. Exposed for tests.
    pub fn turn(&mut self, events: &mut Events) -> io::Result<()> {
        let now = Instant::now();
        let timeout = match self.shared.timers.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(IDLE_POLL_TIMEOUT),
            None => IDLE_POLL_TIMEOUT,
        };

        match self.poll.poll(events, Some(timeout)) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err),
        }

        for event in events.iter() {
            let handler = self
                .shared
                .handlers
                .borrow()
                .get(&event.token())
                .map(Rc::clone);
            if let Some(handler) = handler {
                handler.borrow_mut().ready(event);
            }
        }

        self.shared.timers.run_expired(Instant::now());
        Ok(())
    }
}
