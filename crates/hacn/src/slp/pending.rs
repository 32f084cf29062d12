// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State records for in-flight SLP requests.
//!
//! Every outbound request carries an XID and a retry timer; the records here
//! are keyed by XID in the server's maps and mutated by ack/timeout
//! callbacks. Retry intervals double up to the configured maximum.

use super::scope::ScopeSet;
use super::service::{ServiceEntry, UrlEntry};
use crate::engine::TimerId;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

/// Whether a pending DA operation registers or de-registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    Register,
    DeRegister,
}

/// A unicast SrvReg/SrvDeReg awaiting its SrvAck.
pub struct PendingRegistration {
    pub xid: u16,
    pub timer: Option<TimerId>,
    /// Current retry interval; doubles up to the configured maximum.
    pub retry: Duration,
    /// Transmissions so far.
    pub sends: u8,
    pub da_url: String,
    pub service: ServiceEntry,
    pub kind: RegKind,
}

/// A unicast SrvRqst to one DA, part of a find operation.
pub struct PendingDaFind {
    pub xid: u16,
    pub timer: Option<TimerId>,
    pub retry: Duration,
    pub sends: u8,
    pub da_url: String,
    /// The scopes this DA is answering for.
    pub scopes: ScopeSet,
    pub parent: Rc<RefCell<PendingFind>>,
}

/// A multicast SrvRqst burst with previous-responder suppression.
///
/// Used both for active DA discovery (no parent) and for find operations
/// over scopes no DA covers.
pub struct PendingMulticastFind {
    pub xid: u16,
    pub timer: Option<TimerId>,
    pub retry: Duration,
    pub sends: u8,
    pub service_type: String,
    pub scopes: ScopeSet,
    pub pr_list: BTreeSet<Ipv4Addr>,
    /// Set when a responder was added since the last transmission.
    pub pr_list_changed: bool,
    pub parent: Option<Rc<RefCell<PendingFind>>>,
}

impl PendingMulticastFind {
    /// Record a responder; returns true (and marks the burst live) when the
    /// address is new.
    pub fn add_pr(&mut self, address: Ipv4Addr) -> bool {
        let added = self.pr_list.insert(address);
        if added {
            self.pr_list_changed = true;
        }
        added
    }
}

/// A find_service operation spanning several DA queries and/or a multicast
/// burst. Completes (and runs its callback once) when every scope is done.
pub struct PendingFind {
    pub service_type: String,
    scope_complete: HashMap<String, bool>,
    pub urls: Vec<UrlEntry>,
    callback: Option<Box<dyn FnOnce(Vec<UrlEntry>)>>,
}

impl PendingFind {
    pub fn new(
        service_type: &str,
        scopes: &ScopeSet,
        callback: Box<dyn FnOnce(Vec<UrlEntry>)>,
    ) -> Self {
        PendingFind {
            service_type: service_type.to_string(),
            scope_complete: scopes.iter().map(|s| (s.clone(), false)).collect(),
            urls: Vec::new(),
            callback: Some(callback),
        }
    }

    /// Mark one scope as answered.
    pub fn mark_scope_done(&mut self, scope: &str) {
        if let Some(done) = self.scope_complete.get_mut(scope) {
            *done = true;
        }
    }

    /// Mark every scope in `scopes` as answered.
    pub fn mark_scopes_done(&mut self, scopes: &ScopeSet) {
        for scope in scopes.iter() {
            self.mark_scope_done(scope);
        }
    }

    /// True once every scope has completed.
    pub fn complete(&self) -> bool {
        self.scope_complete.values().all(|done| *done)
    }

    /// Run the completion callback, at most once, de-duplicating URLs.
    pub fn run_callback(&mut self) {
        if let Some(callback) = self.callback.take() {
            let mut urls = std::mem::take(&mut self.urls);
            let mut seen = BTreeSet::new();
            urls.retain(|entry| seen.insert(entry.url().to_string()));
            callback(urls);
        }
    }
}
