// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service URLs and their registrations.

use super::scope::ScopeSet;
use super::strings;
use std::fmt;

/// A URL with a registration lifetime.
///
/// # Wire Format
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Reserved    |          Lifetime             |   URL Length  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |URL len, contd.|            URL (variable length)              \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |# of URL auths |            Auth. blocks (if any)              \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// A lifetime of zero signals de-registration (or an expired entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    url: String,
    lifetime: u16,
}

impl UrlEntry {
    pub fn new(url: &str, lifetime: u16) -> Self {
        UrlEntry {
            url: url.to_string(),
            lifetime,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn lifetime(&self) -> u16 {
        self.lifetime
    }

    pub fn set_lifetime(&mut self, lifetime: u16) {
        self.lifetime = lifetime;
    }

    /// Subtract elapsed seconds, saturating at zero.
    pub fn age_lifetime(&mut self, elapsed: u64) {
        self.lifetime = u16::try_from(u64::from(self.lifetime).saturating_sub(elapsed))
            .unwrap_or(0);
    }
}

impl fmt::Display for UrlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}s)", self.url, self.lifetime)
    }
}

/// A registered service: scopes, service type and URL entry.
///
/// The service type is derived from the URL's scheme prefix and kept in
/// canonical form. `local` marks services registered by this agent (as
/// opposed to learned from the network).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    scopes: ScopeSet,
    service_type: String,
    url: UrlEntry,
    local: bool,
}

impl ServiceEntry {
    pub fn new(scopes: ScopeSet, url: &str, lifetime: u16) -> Self {
        ServiceEntry {
            scopes,
            service_type: strings::service_from_url(url),
            url: UrlEntry::new(url, lifetime),
            local: false,
        }
    }

    /// Build from a comma separated scope string.
    pub fn from_strings(scopes: &str, url: &str, lifetime: u16) -> Self {
        Self::new(ScopeSet::from_string(scopes), url, lifetime)
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn url(&self) -> &UrlEntry {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut UrlEntry {
        &mut self.url
    }

    pub fn url_string(&self) -> &str {
        self.url.url()
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn set_local(&mut self, local: bool) {
        self.local = local;
    }
}

impl fmt::Display for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.scopes)
    }
}
