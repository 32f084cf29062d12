// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The aged registry of services a DA or SA answers queries from.
//!
//! State per canonical service type: the time the URL list was last aged
//! and the list itself. Lifetimes are stored relative to that timestamp and
//! aged lazily - any read or insert for a service type first subtracts the
//! elapsed seconds and drops what expired.
//!
//! Invariants: within one service type URLs are unique, and the scope set
//! attached to a URL is immutable for the life of the entry - a re-insert
//! with different scopes is refused with `SCOPE_NOT_SUPPORTED`.

use super::scope::ScopeSet;
use super::service::{ServiceEntry, UrlEntry};
use super::strings;
use std::collections::HashMap;
use std::time::Instant;

/// Result of an insert, mapped onto SLP error codes by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Ok,
    /// The URL exists with a different scope set.
    ScopeMismatch,
    /// A non-fresh update for a URL we do not have.
    InvalidUpdate,
}

/// Result of a scope pre-check before de-registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeCheck {
    Ok,
    ScopeMismatch,
    NotFound,
}

struct ServiceList {
    last_cleaned: Instant,
    services: Vec<ServiceEntry>,
}

/// The store: canonical service type -> aged URL list.
pub struct SlpStore {
    services: HashMap<String, ServiceList>,
}

impl SlpStore {
    pub fn new() -> Self {
        SlpStore {
            services: HashMap::new(),
        }
    }

    /// Insert or update an entry.
    ///
    /// `fresh` distinguishes a registration from an incremental update; an
    /// update for an unknown URL is refused with `InvalidUpdate`. An
    /// existing URL keeps the larger of the two lifetimes.
    pub fn insert(&mut self, now: Instant, service: &ServiceEntry, fresh: bool) -> InsertResult {
        let list = self
            .services
            .entry(service.service_type().to_string())
            .or_insert_with(|| ServiceList {
                last_cleaned: now,
                services: Vec::new(),
            });
        Self::age_list(now, list);

        match list
            .services
            .iter_mut()
            .find(|existing| existing.url_string() == service.url_string())
        {
            None => {
                if !fresh {
                    return InsertResult::InvalidUpdate;
                }
                list.services.push(service.clone());
                InsertResult::Ok
            }
            Some(existing) => {
                if existing.scopes() != service.scopes() {
                    return InsertResult::ScopeMismatch;
                }
                if service.url().lifetime() > existing.url().lifetime() {
                    existing.url_mut().set_lifetime(service.url().lifetime());
                }
                if service.local() {
                    existing.set_local(true);
                }
                InsertResult::Ok
            }
        }
    }

    /// Remove an entry.
    ///
    /// Removing a URL we do not have is a no-op success (idempotent); a URL
    /// held with different scopes is refused.
    pub fn remove(&mut self, service: &ServiceEntry) -> InsertResult {
        let Some(list) = self.services.get_mut(service.service_type()) else {
            return InsertResult::Ok;
        };
        let Some(index) = list
            .services
            .iter()
            .position(|existing| existing.url_string() == service.url_string())
        else {
            return InsertResult::Ok;
        };

        if list.services[index].scopes() != service.scopes() {
            return InsertResult::ScopeMismatch;
        }
        list.services.remove(index);
        if list.services.is_empty() {
            self.services.remove(service.service_type());
        }
        InsertResult::Ok
    }

    /// Append the URL entries for `service_type` whose scopes intersect
    /// `scopes`. `limit` of zero means unlimited. The service type need not
    /// be canonical.
    pub fn lookup(
        &mut self,
        now: Instant,
        scopes: &ScopeSet,
        service_type: &str,
        output: &mut Vec<UrlEntry>,
        limit: usize,
    ) {
        let service_type = strings::canonicalize(service_type);
        let Some(list) = self.services.get_mut(&service_type) else {
            return;
        };
        Self::age_list(now, list);

        for (i, service) in list.services.iter().enumerate() {
            if !service.scopes().intersects(scopes) {
                continue;
            }
            if limit != 0 && i >= limit {
                break;
            }
            output.push(service.url().clone());
        }
    }

    /// Check whether `service` could be removed: present, and scope-equal.
    /// Expired entries count as absent.
    pub fn check_scopes(&self, now: Instant, service: &ServiceEntry) -> ScopeCheck {
        let Some(list) = self.services.get(service.service_type()) else {
            return ScopeCheck::NotFound;
        };
        let elapsed = now.saturating_duration_since(list.last_cleaned).as_secs();

        for existing in &list.services {
            if existing.url_string() != service.url_string() {
                continue;
            }
            if u64::from(existing.url().lifetime()) <= elapsed {
                return ScopeCheck::NotFound;
            }
            return if existing.scopes() == service.scopes() {
                ScopeCheck::Ok
            } else {
                ScopeCheck::ScopeMismatch
            };
        }
        ScopeCheck::NotFound
    }

    /// All live locally registered services intersecting `scopes`, with
    /// lifetimes adjusted for the time already elapsed.
    pub fn get_local_services(
        &self,
        now: Instant,
        scopes: &ScopeSet,
        output: &mut Vec<ServiceEntry>,
    ) {
        for list in self.services.values() {
            let elapsed = now.saturating_duration_since(list.last_cleaned).as_secs();
            for service in &list.services {
                if !service.local() || u64::from(service.url().lifetime()) <= elapsed {
                    continue;
                }
                if service.scopes().intersects(scopes) {
                    let mut aged = service.clone();
                    aged.url_mut().age_lifetime(elapsed);
                    output.push(aged);
                }
            }
        }
    }

    /// All canonical service types with at least one entry in `scopes`.
    /// Lifetimes are not checked here; the answer is advisory.
    pub fn get_all_service_types(&self, scopes: &ScopeSet, output: &mut Vec<String>) {
        for (service_type, list) in &self.services {
            if Self::any_service_matches(scopes, &list.services) {
                output.push(service_type.clone());
            }
        }
    }

    /// Service types filtered by naming authority: the substring after the
    /// last `.` of the type (an empty authority selects IANA types).
    pub fn get_service_types_by_naming_auth(
        &self,
        naming_auth: &str,
        scopes: &ScopeSet,
        output: &mut Vec<String>,
    ) {
        for (service_type, list) in &self.services {
            let auth = match service_type.rfind('.') {
                Some(pos) => &service_type[pos + 1..],
                None => "",
            };
            if auth == naming_auth && Self::any_service_matches(scopes, &list.services) {
                output.push(service_type.clone());
            }
        }
    }

    /// Drop expired entries and empty service type buckets.
    pub fn clean(&mut self, now: Instant) {
        self.services.retain(|_, list| {
            Self::age_list(now, list);
            !list.services.is_empty()
        });
    }

    /// Drop everything.
    pub fn reset(&mut self) {
        self.services.clear();
    }

    /// Number of distinct service types held.
    pub fn service_type_count(&self) -> usize {
        self.services.len()
    }

    /// Age a URL list if at least a second has passed since the last aging.
    fn age_list(now: Instant, list: &mut ServiceList) {
        let elapsed = now.saturating_duration_since(list.last_cleaned).as_secs();
        if elapsed == 0 {
            return;
        }
        list.services.retain_mut(|service| {
            if u64::from(service.url().lifetime()) <= elapsed {
                return false;
            }
            service.url_mut().age_lifetime(elapsed);
            true
        });
        list.last_cleaned = now;
    }

    fn any_service_matches(scopes: &ScopeSet, services: &[ServiceEntry]) -> bool {
        services.iter().any(|s| s.scopes().intersects(scopes))
    }
}

impl Default for SlpStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(scopes: &str, url: &str, lifetime: u16) -> ServiceEntry {
        ServiceEntry::from_strings(scopes, url, lifetime)
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_insert_and_lookup_ages_lifetime() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        let service = entry("one,two", "service:foo://10.0.0.1", 300);
        assert_eq!(store.insert(base, &service, true), InsertResult::Ok);

        let mut urls = Vec::new();
        store.lookup(
            at(base, 10),
            &ScopeSet::from_string("one"),
            "service:foo",
            &mut urls,
            0,
        );
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].lifetime(), 290);
    }

    #[test]
    fn test_lookup_after_expiry_returns_nothing() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        store.insert(base, &entry("one", "service:foo://10.0.0.1", 300), true);

        let mut urls = Vec::new();
        store.lookup(
            at(base, 301),
            &ScopeSet::from_string("one"),
            "service:foo",
            &mut urls,
            0,
        );
        assert!(urls.is_empty());
    }

    #[test]
    fn test_scope_set_immutable_per_url() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        store.insert(base, &entry("one,two", "service:foo://10.0.0.1", 300), true);
        assert_eq!(
            store.insert(base, &entry("one", "service:foo://10.0.0.1", 300), true),
            InsertResult::ScopeMismatch
        );

        // Stored scopes remain the original ones.
        let mut urls = Vec::new();
        store.lookup(
            base,
            &ScopeSet::from_string("two"),
            "service:foo",
            &mut urls,
            0,
        );
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_update_without_prior_entry_is_invalid() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        assert_eq!(
            store.insert(base, &entry("one", "service:foo://10.0.0.1", 300), false),
            InsertResult::InvalidUpdate
        );
    }

    #[test]
    fn test_reinsert_takes_max_lifetime() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        store.insert(base, &entry("one", "service:foo://x", 300), true);
        store.insert(base, &entry("one", "service:foo://x", 100), true);

        let mut urls = Vec::new();
        store.lookup(base, &ScopeSet::from_string("one"), "service:foo", &mut urls, 0);
        assert_eq!(urls[0].lifetime(), 300);

        store.insert(base, &entry("one", "service:foo://x", 500), true);
        urls.clear();
        store.lookup(base, &ScopeSet::from_string("one"), "service:foo", &mut urls, 0);
        assert_eq!(urls[0].lifetime(), 500);
    }

    #[test]
    fn test_remove_is_idempotent_but_scope_checked() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        let service = entry("one,two", "service:foo://x", 300);
        store.insert(base, &service, true);

        assert_eq!(
            store.remove(&entry("one", "service:foo://x", 300)),
            InsertResult::ScopeMismatch
        );
        assert_eq!(store.remove(&service), InsertResult::Ok);
        assert_eq!(store.remove(&service), InsertResult::Ok);
        assert_eq!(store.service_type_count(), 0);
    }

    #[test]
    fn test_check_scopes() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        let service = entry("one", "service:foo://x", 100);
        store.insert(base, &service, true);

        assert_eq!(store.check_scopes(base, &service), ScopeCheck::Ok);
        assert_eq!(
            store.check_scopes(base, &entry("two", "service:foo://x", 100)),
            ScopeCheck::ScopeMismatch
        );
        assert_eq!(
            store.check_scopes(base, &entry("one", "service:foo://y", 100)),
            ScopeCheck::NotFound
        );
        assert_eq!(
            store.check_scopes(at(base, 200), &service),
            ScopeCheck::NotFound
        );
    }

    #[test]
    fn test_local_services_aged_and_filtered() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        let mut local = entry("one", "service:foo://local", 300);
        local.set_local(true);
        store.insert(base, &local, true);
        store.insert(base, &entry("one", "service:foo://remote", 300), true);

        let mut out = Vec::new();
        store.get_local_services(at(base, 50), &ScopeSet::from_string("one"), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url_string(), "service:foo://local");
        assert_eq!(out[0].url().lifetime(), 250);
    }

    #[test]
    fn test_service_type_queries() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        store.insert(base, &entry("one", "service:foo://x", 300), true);
        store.insert(base, &entry("one", "service:bar.esta://y", 300), true);
        store.insert(base, &entry("two", "service:baz://z", 300), true);

        let scopes = ScopeSet::from_string("one");
        let mut types = Vec::new();
        store.get_all_service_types(&scopes, &mut types);
        types.sort();
        assert_eq!(types, vec!["service:bar.esta", "service:foo"]);

        let mut esta = Vec::new();
        store.get_service_types_by_naming_auth("esta", &scopes, &mut esta);
        assert_eq!(esta, vec!["service:bar.esta"]);

        let mut iana = Vec::new();
        store.get_service_types_by_naming_auth("", &scopes, &mut iana);
        assert_eq!(iana, vec!["service:foo"]);
    }

    #[test]
    fn test_clean_drops_expired_buckets() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        store.insert(base, &entry("one", "service:foo://x", 10), true);
        store.insert(base, &entry("one", "service:bar://y", 1000), true);

        store.clean(at(base, 100));
        assert_eq!(store.service_type_count(), 1);
    }

    #[test]
    fn test_lookup_respects_limit() {
        let base = Instant::now();
        let mut store = SlpStore::new();
        for i in 0..5 {
            store.insert(
                base,
                &entry("one", &format!("service:foo://10.0.0.{}", i), 300),
                true,
            );
        }
        let mut urls = Vec::new();
        store.lookup(base, &ScopeSet::from_string("one"), "service:foo", &mut urls, 2);
        assert_eq!(urls.len(), 2);
    }
}
