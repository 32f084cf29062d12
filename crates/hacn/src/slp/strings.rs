// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RFC 2608 string handling.
//!
//! SLP reserves `(),\!<=>~;*+` inside strings; reserved bytes travel as
//! `\HH` escapes. Comparisons happen in canonical form: ASCII lowercased
//! with whitespace runs folded to single spaces and trimmed.

/// Bytes that must be escaped in SLP strings.
const RESERVED: &[u8] = b"(),\\!<=>~;*+";

const WHITESPACE: &[char] = &[' ', '\t', '\r', '\n'];

/// Escape reserved characters as `\HH` (lowercase hex).
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii() && RESERVED.contains(&(c as u8)) {
            out.push_str(&format!("\\{:02x}", c as u8));
        } else {
            out.push(c);
        }
    }
    out
}

/// Undo `\HH` escapes.
///
/// A malformed escape (truncated, non-hex, or a value above 0x7f) drops the
/// remainder of the string, mirroring the tolerant parser behaviour the
/// protocol expects.
pub fn unescape(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        if i + 2 >= bytes.len() {
            log::warn!("[SLP] truncated escape in {:?}", input);
            break;
        }
        let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(value) if value <= 0x7f => {
                out.push(value);
                i += 3;
            }
            Some(_) => {
                log::warn!("[SLP] escaped value above 0x7f in {:?}", input);
                break;
            }
            None => {
                log::warn!("[SLP] invalid hex escape in {:?}", input);
                break;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn fold_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if WHITESPACE.contains(&c) {
            in_run = true;
            continue;
        }
        if in_run && !out.is_empty() {
            out.push(' ');
        }
        in_run = false;
        out.push(c);
    }
    out
}

/// The canonical form: lowercased, whitespace folded.
pub fn canonicalize(input: &str) -> String {
    fold_whitespace(&input.to_ascii_lowercase())
}

/// The service type of a URL: everything before `://`, canonicalized.
/// Without a `://` the whole string is the service.
pub fn service_from_url(url: &str) -> String {
    let service = match url.find("://") {
        Some(pos) => &url[..pos],
        None => url,
    };
    canonicalize(service)
}

/// Everything after the `://` of a URL, or empty without one.
pub fn strip_service_from_url(url: &str) -> &str {
    match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => "",
    }
}
