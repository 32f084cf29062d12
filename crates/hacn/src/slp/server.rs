// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The SLP Service Agent engine, with optional Directory Agent behaviour.
//!
//! Three interlocking state machines run here, all driven by reactor timers
//! and incoming packets:
//!
//! - **Active DA discovery**: multicast SrvRqst bursts for
//!   `service:directory-agent` with previous-responder suppression, repeated
//!   every `SLP_CONFIG_DA_FIND`.
//! - **Passive DA discovery**: every unsolicited multicast DAAdvert feeds
//!   the [`DaTracker`]; new or rebooted DAs trigger registration
//!   bookkeeping.
//! - **Registration**: for each (local service, covering DA) pair a unicast
//!   SrvReg after a jittered delay, acknowledged by SrvAck, retried with
//!   doubling backoff, the DA marked bad after the retry budget.
//!   De-registration follows the same pattern. For a given pair the two are
//!   mutually exclusive; a new request supersedes a pending one.
//!
//! Incoming queries (SrvRqst, SrvTypeRqst) are answered from the
//! [`SlpStore`]; with the DA role enabled, SrvReg/SrvDeReg mutate the store
//! and DAAdverts are emitted.

use super::builder;
use super::da_tracker::{DaTracker, DirectoryAgent};
use super::packets::{
    DaAdvert, ServiceAck, ServiceReply, ServiceRequest, ServiceTypeRequest, SlpHeader,
    SlpMessage,
};
use super::parser;
use super::pending::{
    PendingDaFind, PendingFind, PendingMulticastFind, PendingRegistration, RegKind,
};
use super::scope::ScopeSet;
use super::service::{ServiceEntry, UrlEntry};
use super::store::{InsertResult, ScopeCheck, SlpStore};
use super::strings;
use super::{
    DIRECTORY_AGENT_SERVICE, INVALID_REGISTRATION, INVALID_UPDATE, SCOPE_NOT_SUPPORTED,
    SERVICE_AGENT_SERVICE, SLP_OK,
};
use crate::config;
use crate::engine::{TimerHandle, TimerId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// How often the store drops expired entries.
const STORE_CLEAN_INTERVAL: Duration = Duration::from_secs(30);

/// (DA URL, service URL): the unit of registration mutual exclusion.
type PairKey = (String, String);

/// Outbound UDP abstraction; the daemon wraps the SLP socket, tests record.
pub trait SlpSender {
    fn send_to(&mut self, data: &[u8], dest: SocketAddrV4);
}

/// Server parameters. The timing knobs default to the RFC 2608 values and
/// exist separately so tests can compress time.
pub struct ServerConfig {
    pub ip: Ipv4Addr,
    pub scopes: ScopeSet,
    pub enable_da: bool,
    /// Seconds-since-epoch at startup; advertised in DAAdverts.
    pub boot_timestamp: u32,
    pub slp_port: u16,
    pub start_wait: Duration,
    pub retry: Duration,
    pub retry_max: Duration,
    pub retry_count: u8,
    pub da_find_interval: Duration,
    pub reg_active_min: Duration,
    pub reg_active_max: Duration,
    pub reg_refresh: Duration,
}

impl ServerConfig {
    pub fn new(ip: Ipv4Addr, scopes: ScopeSet) -> Self {
        ServerConfig {
            ip,
            scopes,
            enable_da: false,
            boot_timestamp: 1,
            slp_port: config::SLP_PORT,
            start_wait: config::SLP_CONFIG_START_WAIT,
            retry: config::SLP_CONFIG_RETRY,
            retry_max: config::SLP_CONFIG_RETRY_MAX,
            retry_count: config::SLP_CONFIG_RETRY_COUNT,
            da_find_interval: config::SLP_CONFIG_DA_FIND,
            reg_active_min: config::SLP_CONFIG_REG_ACTIVE_MIN,
            reg_active_max: config::SLP_CONFIG_REG_ACTIVE_MAX,
            reg_refresh: config::SLP_CONFIG_REG_REFRESH,
        }
    }
}

/// The SA/DA engine.
pub struct SlpServer {
    config: ServerConfig,
    store: SlpStore,
    tracker: DaTracker,
    /// DAs the tracker flagged as new/rebooted, drained after each advert.
    da_events: Rc<RefCell<Vec<DirectoryAgent>>>,
    timers: TimerHandle,
    sender: Rc<RefCell<dyn SlpSender>>,
    myself: Weak<RefCell<SlpServer>>,
    next_xid: u16,
    /// xid -> pending SrvReg/SrvDeReg.
    pending_regs: HashMap<u16, PendingRegistration>,
    /// In-flight operation per pair, for mutual exclusion.
    reg_by_pair: HashMap<PairKey, u16>,
    /// Jitter/refresh timers per pair, cancelled on supersession.
    delayed_by_pair: HashMap<PairKey, TimerId>,
    /// xid -> pending unicast find leg.
    da_finds: HashMap<u16, PendingDaFind>,
    /// xid -> pending multicast burst.
    multicast_finds: HashMap<u16, PendingMulticastFind>,
    /// The burst currently doing active DA discovery, if any.
    da_discovery_xid: Option<u16>,
}

impl SlpServer {
    /// Create the server and wire its internal callbacks.
    pub fn new(
        config: ServerConfig,
        timers: TimerHandle,
        sender: Rc<RefCell<dyn SlpSender>>,
    ) -> Rc<RefCell<SlpServer>> {
        let da_events = Rc::new(RefCell::new(Vec::new()));
        let server = Rc::new(RefCell::new(SlpServer {
            config,
            store: SlpStore::new(),
            tracker: DaTracker::new(),
            da_events: Rc::clone(&da_events),
            timers,
            sender,
            myself: Weak::new(),
            next_xid: fastrand::u16(..),
            pending_regs: HashMap::new(),
            reg_by_pair: HashMap::new(),
            delayed_by_pair: HashMap::new(),
            da_finds: HashMap::new(),
            multicast_finds: HashMap::new(),
            da_discovery_xid: None,
        }));
        {
            let mut this = server.borrow_mut();
            this.myself = Rc::downgrade(&server);
            let events = da_events;
            this.tracker.add_new_da_callback(Box::new(move |da| {
                events.borrow_mut().push(da.clone());
            }));
        }
        server
    }

    /// Start the periodic machinery.
    ///
    /// Active DA discovery kicks off after a uniform random delay in
    /// [0, start_wait]; further rounds run every `da_find_interval`. A DA
    /// announces itself with an unsolicited multicast DAAdvert.
    pub fn start(&mut self, now: Instant) {
        let initial = fastrand::u64(0..=self.config.start_wait.as_millis() as u64);
        self.schedule(now, Duration::from_millis(initial), |server, fire| {
            server.start_active_da_discovery(fire);
        });

        let find_interval = self.config.da_find_interval;
        self.schedule_repeating(now, find_interval, |server, fire| {
            server.start_active_da_discovery(fire);
        });

        self.schedule_repeating(now, STORE_CLEAN_INTERVAL, |server, fire| {
            server.store.clean(fire);
        });

        if self.config.enable_da {
            let packet = builder::build_da_advert(
                0,
                true,
                SLP_OK,
                self.config.boot_timestamp,
                &self.da_url(),
                &self.config.scopes,
            );
            self.send_multicast(&packet);
        }
        log::info!(
            "[SLP] server started, scopes [{}], DA {}",
            self.config.scopes,
            if self.config.enable_da { "on" } else { "off" }
        );
    }

    // ===== Public SA API =====

    /// Register a local service. Returns an SLP error code.
    pub fn register_service(&mut self, now: Instant, mut service: ServiceEntry) -> u16 {
        if service.url().lifetime() == 0 {
            return INVALID_REGISTRATION;
        }
        if !self.config.scopes.intersects(service.scopes()) {
            return SCOPE_NOT_SUPPORTED;
        }
        service.set_local(true);
        match self.store.insert(now, &service, true) {
            InsertResult::ScopeMismatch => return SCOPE_NOT_SUPPORTED,
            InsertResult::InvalidUpdate => return INVALID_UPDATE,
            InsertResult::Ok => {}
        }

        let mut das = Vec::new();
        self.tracker.get_das_for_scopes(service.scopes(), &mut das);
        for da in das {
            self.schedule_registration(now, &da, service.clone(), RegKind::Register);
        }
        SLP_OK
    }

    /// De-register a local service. Returns an SLP error code.
    pub fn deregister_service(&mut self, now: Instant, service: &ServiceEntry) -> u16 {
        match self.store.check_scopes(now, service) {
            ScopeCheck::ScopeMismatch => return SCOPE_NOT_SUPPORTED,
            ScopeCheck::NotFound => return SLP_OK,
            ScopeCheck::Ok => {}
        }
        self.store.remove(service);

        let mut das = Vec::new();
        self.tracker.get_das_for_scopes(service.scopes(), &mut das);
        for da in das {
            self.schedule_registration(now, &da, service.clone(), RegKind::DeRegister);
        }
        SLP_OK
    }

    /// Locate services of `service_type` in `scopes`.
    ///
    /// DAs covering some of the scopes are queried unicast (minimal covering
    /// set); scopes no DA covers go through a multicast burst. The callback
    /// runs exactly once with the de-duplicated URL entries.
    pub fn find_service(
        &mut self,
        now: Instant,
        service_type: &str,
        scopes: &ScopeSet,
        callback: Box<dyn FnOnce(Vec<UrlEntry>)>,
    ) {
        let scopes = scopes.intersection(&self.config.scopes);
        if scopes.is_empty() {
            callback(Vec::new());
            return;
        }
        let find = Rc::new(RefCell::new(PendingFind::new(
            service_type,
            &scopes,
            callback,
        )));

        let mut covering = Vec::new();
        self.tracker.get_minimal_covering_list(&scopes, &mut covering);
        let mut covered = ScopeSet::new();
        for da in covering {
            let da_scopes = da.scopes().intersection(&scopes);
            covered.update(&da_scopes);
            self.send_da_find(now, &da, da_scopes, Rc::clone(&find));
        }

        let uncovered = scopes.difference(&covered);
        if !uncovered.is_empty() {
            self.start_multicast_find(now, service_type, uncovered, Some(Rc::clone(&find)));
        }
        Self::maybe_complete_find(&find);
    }

    /// Number of DAs currently known.
    pub fn da_count(&self) -> usize {
        self.tracker.da_count()
    }

    /// Seed the store with services from a registration file.
    pub fn bulk_load(&mut self, now: Instant, services: Vec<ServiceEntry>) {
        for service in services {
            let code = self.register_service(now, service);
            if code != SLP_OK {
                log::warn!("[SLP] bulk load registration failed with code {}", code);
            }
        }
    }

    // ===== Packet entry point =====

    /// Dispatch one received SLP datagram.
    pub fn on_packet(&mut self, now: Instant, source: SocketAddrV4, data: &[u8]) {
        let Some(packet) = parser::parse(data) else {
            return;
        };
        let header = packet.header;
        match packet.message {
            SlpMessage::ServiceRequest(request) => {
                self.handle_service_request(now, source, &header, &request);
            }
            SlpMessage::ServiceReply(reply) => {
                self.handle_service_reply(source, &header, reply);
            }
            SlpMessage::ServiceRegistration(reg) => {
                if self.config.enable_da {
                    let entry = ServiceEntry::from_strings(
                        &reg.scope_list,
                        reg.url.url(),
                        reg.url.lifetime(),
                    );
                    let code = if self.config.scopes.is_superset(entry.scopes()) {
                        match self.store.insert(now, &entry, header.is_fresh()) {
                            InsertResult::Ok => SLP_OK,
                            InsertResult::ScopeMismatch => SCOPE_NOT_SUPPORTED,
                            InsertResult::InvalidUpdate => INVALID_UPDATE,
                        }
                    } else {
                        SCOPE_NOT_SUPPORTED
                    };
                    let ack = builder::build_service_ack(header.xid, &header.language, code);
                    self.send_unicast(&ack, source);
                } else {
                    log::debug!("[SLP] ignoring SrvReg from {}, not a DA", source);
                }
            }
            SlpMessage::ServiceDeRegistration(dereg) => {
                if self.config.enable_da {
                    let entry = ServiceEntry::from_strings(
                        &dereg.scope_list,
                        dereg.url.url(),
                        dereg.url.lifetime(),
                    );
                    let code = match self.store.check_scopes(now, &entry) {
                        ScopeCheck::ScopeMismatch => SCOPE_NOT_SUPPORTED,
                        _ => {
                            self.store.remove(&entry);
                            SLP_OK
                        }
                    };
                    let ack = builder::build_service_ack(header.xid, &header.language, code);
                    self.send_unicast(&ack, source);
                } else {
                    log::debug!("[SLP] ignoring SrvDeReg from {}, not a DA", source);
                }
            }
            SlpMessage::ServiceAck(ack) => self.handle_service_ack(now, &header, ack),
            SlpMessage::DaAdvert(advert) => self.handle_da_advert(now, source, &advert),
            SlpMessage::ServiceTypeRequest(request) => {
                self.handle_service_type_request(source, &header, &request);
            }
            SlpMessage::AttrRequest(_)
            | SlpMessage::AttrReply(_)
            | SlpMessage::ServiceTypeReply(_)
            | SlpMessage::SaAdvert(_) => {
                log::debug!("[SLP] ignoring {:?} from {}", header.function, source);
            }
        }
    }

    // ===== Query answering =====

    fn handle_service_request(
        &mut self,
        now: Instant,
        source: SocketAddrV4,
        header: &SlpHeader,
        request: &ServiceRequest,
    ) {
        if request.pr_list.contains(source.ip()) || request.pr_list.contains(&self.config.ip) {
            return;
        }
        let service_type = strings::canonicalize(&request.service_type);
        let query_scopes = ScopeSet::from_string(&request.scope_list);

        if service_type == DIRECTORY_AGENT_SERVICE {
            if self.config.enable_da && query_scopes.intersects(&self.config.scopes) {
                let advert = builder::build_da_advert(
                    header.xid,
                    false,
                    SLP_OK,
                    self.config.boot_timestamp,
                    &self.da_url(),
                    &self.config.scopes,
                );
                self.send_unicast(&advert, source);
            }
            return;
        }

        if service_type == SERVICE_AGENT_SERVICE {
            if query_scopes.intersects(&self.config.scopes) {
                let advert = builder::build_sa_advert(
                    header.xid,
                    false,
                    &self.sa_url(),
                    &self.config.scopes,
                );
                self.send_unicast(&advert, source);
            }
            return;
        }

        let scopes = query_scopes.intersection(&self.config.scopes);
        if scopes.is_empty() {
            // Unicast requests get the error back; multicast mismatches are
            // silently dropped per the RFC.
            if !header.is_multicast() {
                let reply = builder::build_service_reply(
                    header.xid,
                    &header.language,
                    SCOPE_NOT_SUPPORTED,
                    &[],
                );
                self.send_unicast(&reply, source);
            }
            return;
        }

        let mut urls = Vec::new();
        self.store.lookup(now, &scopes, &service_type, &mut urls, 0);
        if urls.is_empty() && header.is_multicast() {
            return;
        }
        let reply = builder::build_service_reply(header.xid, &header.language, SLP_OK, &urls);
        self.send_unicast(&reply, source);
    }

    fn handle_service_type_request(
        &mut self,
        source: SocketAddrV4,
        header: &SlpHeader,
        request: &ServiceTypeRequest,
    ) {
        if request.pr_list.contains(source.ip()) || request.pr_list.contains(&self.config.ip) {
            return;
        }
        let scopes = ScopeSet::from_string(&request.scope_list);
        let scopes = scopes.intersection(&self.config.scopes);
        if scopes.is_empty() {
            if !header.is_multicast() {
                let reply =
                    builder::build_service_type_reply(header.xid, SCOPE_NOT_SUPPORTED, &[]);
                self.send_unicast(&reply, source);
            }
            return;
        }

        let mut types = Vec::new();
        if request.include_all {
            self.store.get_all_service_types(&scopes, &mut types);
        } else {
            self.store.get_service_types_by_naming_auth(
                &request.naming_authority,
                &scopes,
                &mut types,
            );
        }
        if types.is_empty() && header.is_multicast() {
            return;
        }
        let reply = builder::build_service_type_reply(header.xid, SLP_OK, &types);
        self.send_unicast(&reply, source);
    }

    // ===== DA discovery =====

    /// Begin a multicast DA discovery burst; a no-op while one is running.
    pub fn start_active_da_discovery(&mut self, now: Instant) {
        if self.da_discovery_xid.is_some() {
            return;
        }
        let scopes = self.config.scopes.clone();
        let xid = self.start_multicast_find(now, DIRECTORY_AGENT_SERVICE, scopes, None);
        self.da_discovery_xid = Some(xid);
        log::debug!("[SLP] active DA discovery started, xid {}", xid);
    }

    fn handle_da_advert(&mut self, now: Instant, source: SocketAddrV4, advert: &DaAdvert) {
        self.tracker.da_advert(advert);

        // Solicited adverts grow the discovery burst's PR list.
        if let Some(xid) = self.da_discovery_xid {
            if let Some(op) = self.multicast_finds.get_mut(&xid) {
                op.add_pr(*source.ip());
            }
        }

        // Registration bookkeeping for DAs the tracker called new/rebooted.
        let events: Vec<DirectoryAgent> = self.da_events.borrow_mut().drain(..).collect();
        for da in events {
            let mut local = Vec::new();
            self.store.get_local_services(now, da.scopes(), &mut local);
            for service in local {
                self.schedule_registration(now, &da, service, RegKind::Register);
            }
        }
    }

    // ===== Multicast find bursts =====

    /// Create a burst and send its first request.
    fn start_multicast_find(
        &mut self,
        now: Instant,
        service_type: &str,
        scopes: ScopeSet,
        parent: Option<Rc<RefCell<PendingFind>>>,
    ) -> u16 {
        let xid = self.allocate_xid();
        let op = PendingMulticastFind {
            xid,
            timer: None,
            retry: self.config.retry,
            sends: 0,
            service_type: service_type.to_string(),
            scopes,
            pr_list: Default::default(),
            pr_list_changed: false,
            parent,
        };
        self.multicast_finds.insert(xid, op);
        self.send_multicast_find(now, xid);
        xid
    }

    fn send_multicast_find(&mut self, now: Instant, xid: u16) {
        let (packet, retry) = match self.multicast_finds.get_mut(&xid) {
            Some(op) => {
                let pr_list: Vec<Ipv4Addr> = op.pr_list.iter().copied().collect();
                let packet = builder::build_service_request(
                    xid,
                    true,
                    &pr_list,
                    &op.service_type,
                    &op.scopes,
                    "",
                );
                op.sends += 1;
                op.pr_list_changed = false;
                (packet, op.retry)
            }
            None => return,
        };
        let timer = self.schedule(now, retry, move |server, fire| {
            server.multicast_find_timeout(fire, xid);
        });
        if let Some(op) = self.multicast_finds.get_mut(&xid) {
            op.timer = Some(timer);
        }
        self.send_multicast(&packet);
    }

    fn multicast_find_timeout(&mut self, now: Instant, xid: u16) {
        let retry_count = self.config.retry_count;
        let retry_max = self.config.retry_max;
        let keep_going = match self.multicast_finds.get_mut(&xid) {
            Some(op) => {
                // The burst goes on while the PR list keeps growing; it
                // always gets its confirming second transmission, and never
                // exceeds the send budget.
                let continue_burst =
                    (op.pr_list_changed || op.sends < 2) && op.sends <= retry_count;
                if continue_burst {
                    op.retry = (op.retry * 2).min(retry_max);
                }
                continue_burst
            }
            None => return,
        };
        if keep_going {
            self.send_multicast_find(now, xid);
        } else {
            self.finish_multicast_find(xid);
        }
    }

    fn finish_multicast_find(&mut self, xid: u16) {
        let Some(op) = self.multicast_finds.remove(&xid) else {
            return;
        };
        if let Some(timer) = op.timer {
            self.timers.cancel(timer);
        }
        if self.da_discovery_xid == Some(xid) {
            self.da_discovery_xid = None;
            log::debug!(
                "[SLP] active DA discovery finished, {} DAs known",
                self.tracker.da_count()
            );
        }
        if let Some(parent) = op.parent {
            parent.borrow_mut().mark_scopes_done(&op.scopes);
            Self::maybe_complete_find(&parent);
        }
    }

    // ===== Unicast find legs =====

    fn send_da_find(
        &mut self,
        now: Instant,
        da: &DirectoryAgent,
        scopes: ScopeSet,
        parent: Rc<RefCell<PendingFind>>,
    ) {
        let xid = self.allocate_xid();
        let service_type = parent.borrow().service_type.clone();
        let packet = builder::build_service_request(xid, false, &[], &service_type, &scopes, "");
        let dest = SocketAddrV4::new(da.address(), self.config.slp_port);
        let retry = self.config.retry;
        let timer = self.schedule(now, retry, move |server, fire| {
            server.da_find_timeout(fire, xid);
        });
        self.da_finds.insert(
            xid,
            PendingDaFind {
                xid,
                timer: Some(timer),
                retry,
                sends: 1,
                da_url: da.url().to_string(),
                scopes,
                parent,
            },
        );
        self.send_unicast(&packet, dest);
    }

    fn da_find_timeout(&mut self, now: Instant, xid: u16) {
        let retry_count = self.config.retry_count;
        let retry_max = self.config.retry_max;

        // Snapshot, then act: the record must not stay borrowed across the
        // timer and send calls.
        let retransmit = match self.da_finds.get_mut(&xid) {
            Some(op) if op.sends < retry_count => {
                op.sends += 1;
                op.retry = (op.retry * 2).min(retry_max);
                let packet = builder::build_service_request(
                    xid,
                    false,
                    &[],
                    &op.parent.borrow().service_type.clone(),
                    &op.scopes,
                    "",
                );
                Some((packet, op.retry, op.da_url.clone()))
            }
            Some(_) => None,
            None => return,
        };

        if let Some((packet, retry, da_url)) = retransmit {
            let timer = self.schedule(now, retry, move |server, fire| {
                server.da_find_timeout(fire, xid);
            });
            if let Some(op) = self.da_finds.get_mut(&xid) {
                op.timer = Some(timer);
            }
            if let Some(da) = self.tracker.lookup(&da_url) {
                let dest = SocketAddrV4::new(da.address(), self.config.slp_port);
                self.send_unicast(&packet, dest);
            }
            return;
        }

        // Retry budget exhausted: the DA is gone. Its scopes complete empty
        // rather than blocking the find forever.
        let Some(op) = self.da_finds.remove(&xid) else {
            return;
        };
        log::warn!("[SLP] DA {} stopped answering queries", op.da_url);
        self.tracker.mark_as_bad(&op.da_url);
        op.parent.borrow_mut().mark_scopes_done(&op.scopes);
        Self::maybe_complete_find(&op.parent);
    }

    fn handle_service_reply(
        &mut self,
        source: SocketAddrV4,
        header: &SlpHeader,
        reply: ServiceReply,
    ) {
        if let Some(op) = self.da_finds.remove(&header.xid) {
            if let Some(timer) = op.timer {
                self.timers.cancel(timer);
            }
            if reply.error_code != SLP_OK {
                log::warn!(
                    "[SLP] SrvRply from {} with error {}",
                    op.da_url,
                    reply.error_code
                );
            }
            {
                let mut parent = op.parent.borrow_mut();
                parent.urls.extend(reply.url_entries);
                parent.mark_scopes_done(&op.scopes);
            }
            Self::maybe_complete_find(&op.parent);
            return;
        }

        if let Some(op) = self.multicast_finds.get_mut(&header.xid) {
            if reply.error_code == SLP_OK {
                op.add_pr(*source.ip());
                if let Some(parent) = op.parent.as_ref() {
                    parent.borrow_mut().urls.extend(reply.url_entries);
                }
            }
            return;
        }

        log::debug!("[SLP] SrvRply with unknown xid {}", header.xid);
    }

    fn maybe_complete_find(find: &Rc<RefCell<PendingFind>>) {
        let complete = find.borrow().complete();
        if complete {
            find.borrow_mut().run_callback();
        }
    }

    // ===== Registration state machine =====

    /// Schedule a (de-)registration after the jittered reg-active delay,
    /// superseding any pending operation for the same (DA, service) pair.
    fn schedule_registration(
        &mut self,
        now: Instant,
        da: &DirectoryAgent,
        service: ServiceEntry,
        kind: RegKind,
    ) {
        let key: PairKey = (da.url().to_string(), service.url_string().to_string());
        self.cancel_pending_for_pair(&key);

        let min = self.config.reg_active_min.as_millis() as u64;
        let max = (self.config.reg_active_max.as_millis() as u64).max(min);
        let delay = Duration::from_millis(fastrand::u64(min..=max));
        let da_url = key.0.clone();
        let fire_key = key.clone();
        let timer = self.schedule(now, delay, move |server, fire| {
            server.delayed_by_pair.remove(&fire_key);
            server.send_registration(fire, &da_url, service, kind);
        });
        self.delayed_by_pair.insert(key, timer);
    }

    fn send_registration(
        &mut self,
        now: Instant,
        da_url: &str,
        service: ServiceEntry,
        kind: RegKind,
    ) {
        let (scopes, dest) = match self.tracker.lookup(da_url) {
            Some(da) => (
                da.scopes().intersection(service.scopes()),
                SocketAddrV4::new(da.address(), self.config.slp_port),
            ),
            None => return,
        };
        if scopes.is_empty() {
            return;
        }

        let xid = self.allocate_xid();
        let packet = match kind {
            RegKind::Register => builder::build_service_registration(xid, true, &scopes, &service),
            RegKind::DeRegister => builder::build_service_deregistration(xid, &scopes, &service),
        };

        let retry = self.config.retry;
        let timer = self.schedule(now, retry, move |server, fire| {
            server.registration_timeout(fire, xid);
        });
        self.reg_by_pair
            .insert((da_url.to_string(), service.url_string().to_string()), xid);
        self.pending_regs.insert(
            xid,
            PendingRegistration {
                xid,
                timer: Some(timer),
                retry,
                sends: 1,
                da_url: da_url.to_string(),
                service,
                kind,
            },
        );
        self.send_unicast(&packet, dest);
    }

    fn registration_timeout(&mut self, now: Instant, xid: u16) {
        let retry_count = self.config.retry_count;
        let retry_max = self.config.retry_max;

        let retransmit = match self.pending_regs.get_mut(&xid) {
            Some(op) if op.sends < retry_count => {
                op.sends += 1;
                op.retry = (op.retry * 2).min(retry_max);
                Some((op.retry, op.da_url.clone(), op.service.clone(), op.kind))
            }
            Some(_) => None,
            None => return,
        };

        if let Some((retry, da_url, service, kind)) = retransmit {
            let da_info = self
                .tracker
                .lookup(&da_url)
                .map(|da| (da.scopes().intersection(service.scopes()), da.address()));
            let Some((scopes, address)) = da_info else {
                self.drop_pending_registration(xid);
                return;
            };
            let dest = SocketAddrV4::new(address, self.config.slp_port);
            // Retransmissions keep the original XID.
            let packet = match kind {
                RegKind::Register => {
                    builder::build_service_registration(xid, true, &scopes, &service)
                }
                RegKind::DeRegister => {
                    builder::build_service_deregistration(xid, &scopes, &service)
                }
            };
            let timer = self.schedule(now, retry, move |server, fire| {
                server.registration_timeout(fire, xid);
            });
            if let Some(op) = self.pending_regs.get_mut(&xid) {
                op.timer = Some(timer);
            }
            self.send_unicast(&packet, dest);
            return;
        }

        let Some(op) = self.pending_regs.remove(&xid) else {
            return;
        };
        self.reg_by_pair
            .remove(&(op.da_url.clone(), op.service.url_string().to_string()));
        log::warn!("[SLP] no SrvAck from {} after {} tries", op.da_url, op.sends);
        self.tracker.mark_as_bad(&op.da_url);
    }

    fn handle_service_ack(&mut self, now: Instant, header: &SlpHeader, ack: ServiceAck) {
        let Some(op) = self.pending_regs.remove(&header.xid) else {
            // A cancelled operation's late ack is dropped silently.
            log::debug!("[SLP] SrvAck with unknown xid {}", header.xid);
            return;
        };
        if let Some(timer) = op.timer {
            self.timers.cancel(timer);
        }
        let key: PairKey = (op.da_url.clone(), op.service.url_string().to_string());
        self.reg_by_pair.remove(&key);

        if ack.error_code != SLP_OK {
            // Logged, not retried; the DA stays healthy.
            log::warn!(
                "[SLP] {} answered {:?} with error {}",
                op.da_url,
                op.kind,
                ack.error_code
            );
            return;
        }

        if op.kind == RegKind::Register {
            // Refresh before the registration lapses: reg_refresh early, but
            // never before 75% of the lifetime has passed.
            let lifetime = Duration::from_secs(u64::from(op.service.url().lifetime()));
            let refresh = lifetime
                .saturating_sub(self.config.reg_refresh)
                .max(lifetime.mul_f64(0.75));
            let da_url = op.da_url.clone();
            let service = op.service.clone();
            let fire_key = key.clone();
            let timer = self.schedule(now, refresh, move |server, fire| {
                server.delayed_by_pair.remove(&fire_key);
                // The service may have been de-registered in the meantime.
                if server.store.check_scopes(fire, &service) == ScopeCheck::Ok {
                    server.send_registration(fire, &da_url, service, RegKind::Register);
                }
            });
            self.delayed_by_pair.insert(key, timer);
        }
    }

    fn cancel_pending_for_pair(&mut self, key: &PairKey) {
        if let Some(timer) = self.delayed_by_pair.remove(key) {
            self.timers.cancel(timer);
        }
        if let Some(xid) = self.reg_by_pair.remove(key) {
            self.drop_pending_registration(xid);
        }
    }

    fn drop_pending_registration(&mut self, xid: u16) {
        if let Some(op) = self.pending_regs.remove(&xid) {
            if let Some(timer) = op.timer {
                self.timers.cancel(timer);
            }
            self.reg_by_pair
                .remove(&(op.da_url.clone(), op.service.url_string().to_string()));
        }
    }

    // ===== Plumbing =====

    fn allocate_xid(&mut self) -> u16 {
        self.next_xid = self.next_xid.wrapping_add(1);
        self.next_xid
    }

    fn da_url(&self) -> String {
        format!("{}://{}", DIRECTORY_AGENT_SERVICE, self.config.ip)
    }

    fn sa_url(&self) -> String {
        format!("{}://{}", SERVICE_AGENT_SERVICE, self.config.ip)
    }

    fn send_unicast(&self, data: &[u8], dest: SocketAddrV4) {
        self.sender.borrow_mut().send_to(data, dest);
    }

    fn send_multicast(&self, data: &[u8]) {
        let dest = SocketAddrV4::new(config::SLP_MULTICAST_GROUP, self.config.slp_port);
        self.sender.borrow_mut().send_to(data, dest);
    }

    /// Schedule a one-shot method call on this server.
    fn schedule(
        &self,
        now: Instant,
        delay: Duration,
        body: impl FnOnce(&mut SlpServer, Instant) + 'static,
    ) -> TimerId {
        let weak = self.myself.clone();
        self.timers.schedule(
            now,
            delay,
            Box::new(move |fire| {
                if let Some(server) = weak.upgrade() {
                    body(&mut server.borrow_mut(), fire);
                }
            }),
        )
    }

    /// Schedule a repeating method call on this server.
    fn schedule_repeating(
        &self,
        now: Instant,
        interval: Duration,
        mut body: impl FnMut(&mut SlpServer, Instant) + 'static,
    ) -> TimerId {
        let weak = self.myself.clone();
        self.timers.schedule_interval(
            now,
            interval,
            Box::new(move |fire| {
                if let Some(server) = weak.upgrade() {
                    body(&mut server.borrow_mut(), fire);
                }
            }),
        )
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
