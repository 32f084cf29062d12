// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracking of Directory Agents observed on the network.
//!
//! Every DAAdvert (solicited or not) is fed through [`DaTracker::da_advert`].
//! A boot timestamp of zero announces shutdown; an increased boot timestamp
//! or a changed scope set means the DA rebooted and prior registrations are
//! gone, so the new-DA callbacks re-fire.

use super::packets::DaAdvert;
use super::scope::ScopeSet;
use super::SLP_OK;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

const DA_SERVICE_PREFIX: &str = "service:directory-agent://";

/// One observed Directory Agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAgent {
    url: String,
    address: Ipv4Addr,
    scopes: ScopeSet,
    boot_timestamp: u32,
    min_refresh_interval: u32,
}

impl DirectoryAgent {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn boot_timestamp(&self) -> u32 {
        self.boot_timestamp
    }

    pub fn min_refresh_interval(&self) -> u32 {
        self.min_refresh_interval
    }
}

impl fmt::Display for DirectoryAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}), [{}]", self.url, self.boot_timestamp, self.scopes)
    }
}

/// Callback invoked for a DA that is new (or effectively new: rebooted).
pub type NewDaCallback = Box<dyn FnMut(&DirectoryAgent)>;

/// The set of DAs we currently believe in.
pub struct DaTracker {
    agents: HashMap<String, DirectoryAgent>,
    new_da_callbacks: Vec<NewDaCallback>,
}

impl DaTracker {
    pub fn new() -> Self {
        DaTracker {
            agents: HashMap::new(),
            new_da_callbacks: Vec::new(),
        }
    }

    /// Register for new/rebooted DA notifications.
    pub fn add_new_da_callback(&mut self, callback: NewDaCallback) {
        self.new_da_callbacks.push(callback);
    }

    pub fn da_count(&self) -> usize {
        self.agents.len()
    }

    /// Process a DAAdvert.
    pub fn da_advert(&mut self, advert: &DaAdvert) {
        if advert.error_code != SLP_OK {
            log::info!(
                "[SLP] DAAdvert from {} with error {}",
                advert.url,
                advert.error_code
            );
            return;
        }
        let Some(address) = Self::address_from_url(&advert.url) else {
            log::warn!("[SLP] failed to extract IP from DA URL {}", advert.url);
            return;
        };
        let scopes = ScopeSet::from_string(&advert.scope_list);

        if advert.boot_timestamp == 0 {
            // The DA is shutting down.
            if self.agents.remove(&advert.url).is_some() {
                log::info!("[SLP] DA {} is shutting down", advert.url);
            }
            return;
        }

        match self.agents.get_mut(&advert.url) {
            None => {
                let agent = DirectoryAgent {
                    url: advert.url.clone(),
                    address,
                    scopes,
                    boot_timestamp: advert.boot_timestamp,
                    min_refresh_interval: 0,
                };
                log::info!("[SLP] new DA {}", agent);
                self.agents.insert(advert.url.clone(), agent.clone());
                self.run_callbacks(&agent);
            }
            Some(existing) => {
                let rebooted = advert.boot_timestamp > existing.boot_timestamp;
                let scopes_changed = existing.scopes != scopes;
                if !rebooted && !scopes_changed {
                    return;
                }
                existing.boot_timestamp = advert.boot_timestamp;
                existing.scopes = scopes;
                let agent = existing.clone();
                log::info!("[SLP] DA {} rebooted or changed scopes", agent.url());
                self.run_callbacks(&agent);
            }
        }
    }

    /// All known DAs.
    pub fn get_directory_agents(&self, output: &mut Vec<DirectoryAgent>) {
        output.extend(self.agents.values().cloned());
    }

    /// The DAs whose scopes intersect `scopes`.
    pub fn get_das_for_scopes(&self, scopes: &ScopeSet, output: &mut Vec<DirectoryAgent>) {
        output.extend(
            self.agents
                .values()
                .filter(|agent| agent.scopes.intersects(scopes))
                .cloned(),
        );
    }

    /// Greedy minimal covering set: repeatedly pick the DA covering the
    /// most still-uncovered scopes. Scopes no DA covers are skipped.
    pub fn get_minimal_covering_list(&self, scopes: &ScopeSet, output: &mut Vec<DirectoryAgent>) {
        let mut uncovered = scopes.clone();
        // Iterate in URL order so ties break deterministically.
        let mut candidates: Vec<&DirectoryAgent> = self.agents.values().collect();
        candidates.sort_by(|a, b| a.url.cmp(&b.url));

        while !uncovered.is_empty() {
            let mut best: Option<(&DirectoryAgent, usize)> = None;
            for agent in candidates.iter().copied() {
                let count = agent.scopes.intersection_count(&uncovered);
                if count > 0 && best.map_or(true, |(_, best_count)| count > best_count) {
                    best = Some((agent, count));
                }
            }
            let Some((agent, _)) = best else {
                break;
            };
            uncovered = uncovered.difference(&agent.scopes);
            output.push(agent.clone());
        }
    }

    /// Fetch a DA by URL.
    pub fn lookup(&self, url: &str) -> Option<&DirectoryAgent> {
        self.agents.get(url)
    }

    /// Forget a DA that stopped answering.
    pub fn mark_as_bad(&mut self, url: &str) {
        if self.agents.remove(url).is_some() {
            log::info!("[SLP] marking DA {} as bad", url);
        }
    }

    fn run_callbacks(&mut self, agent: &DirectoryAgent) {
        for callback in &mut self.new_da_callbacks {
            callback(agent);
        }
    }

    fn address_from_url(url: &str) -> Option<Ipv4Addr> {
        url.strip_prefix(DA_SERVICE_PREFIX)?.parse().ok()
    }
}

impl Default for DaTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn advert(url: &str, scopes: &str, boot: u32) -> DaAdvert {
        DaAdvert {
            error_code: 0,
            boot_timestamp: boot,
            url: url.to_string(),
            scope_list: scopes.to_string(),
            attr_list: String::new(),
            spi: String::new(),
        }
    }

    fn tracker_with_callback() -> (DaTracker, Rc<RefCell<Vec<String>>>) {
        let mut tracker = DaTracker::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        tracker.add_new_da_callback(Box::new(move |da| {
            sink.borrow_mut().push(da.url().to_string());
        }));
        (tracker, seen)
    }

    #[test]
    fn test_new_da_fires_callback() {
        let (mut tracker, seen) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 100));
        assert_eq!(tracker.da_count(), 1);
        assert_eq!(seen.borrow().len(), 1);

        let da = tracker.lookup("service:directory-agent://10.0.0.1").unwrap();
        assert_eq!(da.address(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(da.boot_timestamp(), 100);
    }

    #[test]
    fn test_duplicate_advert_is_noop() {
        let (mut tracker, seen) = tracker_with_callback();
        let a = advert("service:directory-agent://10.0.0.1", "one", 100);
        tracker.da_advert(&a);
        tracker.da_advert(&a);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_reboot_refires_callback() {
        let (mut tracker, seen) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 100));
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 200));
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(
            tracker
                .lookup("service:directory-agent://10.0.0.1")
                .unwrap()
                .boot_timestamp(),
            200
        );
    }

    #[test]
    fn test_scope_change_refires_callback() {
        let (mut tracker, seen) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 100));
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one,two", 100));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_zero_boot_time_removes() {
        let (mut tracker, _) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 100));
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 0));
        assert_eq!(tracker.da_count(), 0);
    }

    #[test]
    fn test_bad_url_rejected() {
        let (mut tracker, _) = tracker_with_callback();
        tracker.da_advert(&advert("service:printer://10.0.0.1", "one", 100));
        tracker.da_advert(&advert("service:directory-agent://not-an-ip", "one", 100));
        assert_eq!(tracker.da_count(), 0);
    }

    #[test]
    fn test_error_advert_ignored() {
        let (mut tracker, _) = tracker_with_callback();
        let mut a = advert("service:directory-agent://10.0.0.1", "one", 100);
        a.error_code = 4;
        tracker.da_advert(&a);
        assert_eq!(tracker.da_count(), 0);
    }

    #[test]
    fn test_das_for_scopes() {
        let (mut tracker, _) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "one", 1));
        tracker.da_advert(&advert("service:directory-agent://10.0.0.2", "two", 1));

        let mut out = Vec::new();
        tracker.get_das_for_scopes(&ScopeSet::from_string("one"), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address(), Ipv4Addr::new(10, 0, 0, 1));
    }

    /// The spec's covering-set topology: A={s1,s2}, B={s3,s4},
    /// C={s1,s2,s3,s4}.
    #[test]
    fn test_minimal_covering_set() {
        let (mut tracker, _) = tracker_with_callback();
        tracker.da_advert(&advert("service:directory-agent://10.0.0.1", "s1,s2", 1));
        tracker.da_advert(&advert("service:directory-agent://10.0.0.2", "s3,s4", 1));
        tracker.da_advert(&advert(
            "service:directory-agent://10.0.0.3",
            "s1,s2,s3,s4",
            1,
        ));

        let mut out = Vec::new();
        tracker.get_minimal_covering_list(&ScopeSet::from_string("s1,s2,s3,s4"), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address(), Ipv4Addr::new(10, 0, 0, 3));

        // {s1,s4}: either {A,B} or {C} is a legal minimum; the greedy pick
        // with deterministic tie-breaks lands on a 2 cover at most.
        let mut out = Vec::new();
        tracker.get_minimal_covering_list(&ScopeSet::from_string("s1,s4"), &mut out);
        assert!(out.len() <= 2 && !out.is_empty());

        // A scope nobody covers is skipped, not fatal.
        let mut out = Vec::new();
        tracker.get_minimal_covering_list(&ScopeSet::from_string("s1,zz"), &mut out);
        assert_eq!(out.len(), 1);
    }
}
