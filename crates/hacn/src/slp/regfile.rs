// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The boot-time service registration file.
//!
//! One record per line, whitespace separated:
//!
//! ```text
//! scope1,scope2  url  lifetime-seconds
//! ```
//!
//! Lines starting with `#` or `;` and blank lines are comments. A URL that
//! appears twice keeps its first record.

use super::service::ServiceEntry;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Parse a registration file from disk.
pub fn parse_file(path: &Path) -> io::Result<Vec<ServiceEntry>> {
    let file = File::open(path).map_err(|err| {
        log::warn!("[SLP] could not open {}: {}", path.display(), err);
        err
    })?;
    parse_stream(file)
}

/// Parse registrations from any reader.
pub fn parse_stream<R: Read>(input: R) -> io::Result<Vec<ServiceEntry>> {
    let mut services = Vec::new();
    let mut seen_urls = HashSet::new();

    for line in BufReader::new(input).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            log::info!("[SLP] skipping registration line: {}", line);
            continue;
        }

        let Ok(lifetime) = tokens[2].parse::<u16>() else {
            log::info!("[SLP] invalid lifetime in registration line: {}", line);
            continue;
        };

        let scopes = tokens[0];
        let url = tokens[1];
        if !seen_urls.insert(url.to_string()) {
            log::warn!("[SLP] {} appears more than once in registration file", url);
            continue;
        }
        services.push(ServiceEntry::from_strings(scopes, url, lifetime));
    }
    Ok(services)
}
