// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monotonic timer queue for the reactor.
//!
//! Timers are callbacks keyed by an opaque [`TimerId`]; one-shot timers run
//! once and vanish, interval timers re-arm themselves after each run.
//! Cancellation is by id and is safe against already-fired one-shots.
//!
//! All methods take an explicit `now` so tests can drive time without
//! sleeping; the reactor passes `Instant::now()`.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

enum TimerKind {
    OneShot(Option<Box<dyn FnOnce(Instant)>>),
    Interval(Duration, Box<dyn FnMut(Instant)>),
}

struct TimerEntry {
    kind: TimerKind,
}

/// The queue itself. Shared via [`TimerHandle`] so callbacks can schedule
/// and cancel timers while the queue is mid-dispatch.
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    entries: HashMap<u64, TimerEntry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next_id: 0,
        }
    }

    fn insert(&mut self, deadline: Instant, kind: TimerKind) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, TimerEntry { kind });
        self.heap.push(Reverse((deadline, id)));
        TimerId(id)
    }

    /// When the next live timer is due, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.entries.contains_key(&id) {
                return Some(deadline);
            }
            // Cancelled entry, discard lazily.
            self.heap.pop();
        }
        None
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to a [`TimerQueue`].
#[derive(Clone)]
pub struct TimerHandle {
    queue: Rc<RefCell<TimerQueue>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        TimerHandle {
            queue: Rc::new(RefCell::new(TimerQueue::new())),
        }
    }

    /// Schedule a one-shot callback `delay` after `now`. The callback
    /// receives the fire time.
    pub fn schedule(
        &self,
        now: Instant,
        delay: Duration,
        callback: Box<dyn FnOnce(Instant)>,
    ) -> TimerId {
        self.queue
            .borrow_mut()
            .insert(now + delay, TimerKind::OneShot(Some(callback)))
    }

    /// Schedule a repeating callback every `interval` after `now`.
    pub fn schedule_interval(
        &self,
        now: Instant,
        interval: Duration,
        callback: Box<dyn FnMut(Instant)>,
    ) -> TimerId {
        self.queue
            .borrow_mut()
            .insert(now + interval, TimerKind::Interval(interval, callback))
    }

    /// Cancel a timer. Harmless if it already fired or never existed.
    pub fn cancel(&self, id: TimerId) {
        self.queue.borrow_mut().entries.remove(&id.0);
    }

    /// When the next live timer is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.borrow_mut().next_deadline()
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run every timer due at `now`. Callbacks may schedule or cancel
    /// further timers; newly scheduled timers due at `now` also run.
    pub fn run_expired(&self, now: Instant) {
        loop {
            let due = {
                let mut queue = self.queue.borrow_mut();
                match queue.heap.peek().copied() {
                    Some(Reverse((deadline, id))) if deadline <= now => {
                        queue.heap.pop();
                        queue.entries.remove(&id).map(|entry| (id, entry))
                    }
                    _ => break,
                }
            };
            // The borrow is released before the callback runs, so callbacks
            // are free to use this handle.
            let Some((id, entry)) = due else { continue };
            match entry.kind {
                TimerKind::OneShot(Some(callback)) => callback(now),
                TimerKind::OneShot(None) => {}
                TimerKind::Interval(interval, mut callback) => {
                    callback(now);
                    let mut queue = self.queue.borrow_mut();
                    queue.entries.insert(
                        id,
                        TimerEntry {
                            kind: TimerKind::Interval(interval, callback),
                        },
                    );
                    queue.heap.push(Reverse((now + interval, id)));
                }
            }
        }
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}
