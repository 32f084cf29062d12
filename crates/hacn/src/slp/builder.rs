// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLPv2 packet construction.
//!
//! Builders assemble the payload, then emit the common header with the
//! computed total length in front of it. Scope lists travel escaped;
//! everything is big-endian.

use super::packets::{SlpFlags, SlpFunction, SLP_HEADER_SIZE, SLP_VERSION};
use super::scope::ScopeSet;
use super::service::ServiceEntry;
use super::strings;
use super::DEFAULT_LANGUAGE;
use std::net::Ipv4Addr;

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

fn push_string(out: &mut Vec<u8>, value: &str) {
    push_u16(out, value.len() as u16);
    out.extend_from_slice(value.as_bytes());
}

fn push_url_entry(out: &mut Vec<u8>, url: &str, lifetime: u16) {
    out.push(0); // reserved
    push_u16(out, lifetime);
    push_string(out, url);
    out.push(0); // no auth blocks
}

fn address_list(addresses: &[Ipv4Addr]) -> String {
    let parts: Vec<String> = addresses.iter().map(Ipv4Addr::to_string).collect();
    parts.join(",")
}

/// Emit the header + body as a finished packet.
fn finish(function: SlpFunction, flags: u16, xid: u16, language: &str, body: &[u8]) -> Vec<u8> {
    let length = SLP_HEADER_SIZE + language.len() + body.len();
    let mut out = Vec::with_capacity(length);
    out.push(SLP_VERSION);
    out.push(function as u8);
    push_u24(&mut out, length as u32);
    push_u16(&mut out, flags);
    push_u24(&mut out, 0); // next extension offset
    push_u16(&mut out, xid);
    push_string(&mut out, language);
    out.extend_from_slice(body);
    out
}

/// Build a SrvRqst.
pub fn build_service_request(
    xid: u16,
    multicast: bool,
    pr_list: &[Ipv4Addr],
    service_type: &str,
    scopes: &ScopeSet,
    predicate: &str,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_string(&mut body, &address_list(pr_list));
    push_string(&mut body, &strings::escape(service_type));
    push_string(&mut body, &scopes.to_escaped_string());
    push_string(&mut body, predicate);
    push_string(&mut body, ""); // SPI
    let flags = if multicast { SlpFlags::MCAST } else { 0 };
    finish(SlpFunction::ServiceRequest, flags, xid, DEFAULT_LANGUAGE, &body)
}

/// Build a SrvRply.
pub fn build_service_reply(
    xid: u16,
    language: &str,
    error_code: u16,
    urls: &[super::service::UrlEntry],
) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, error_code);
    push_u16(&mut body, urls.len() as u16);
    for url in urls {
        push_url_entry(&mut body, url.url(), url.lifetime());
    }
    finish(SlpFunction::ServiceReply, 0, xid, language, &body)
}

/// Build a SrvReg. `scopes` is the scope set to register under (usually an
/// intersection, not necessarily the service's full set).
pub fn build_service_registration(
    xid: u16,
    fresh: bool,
    scopes: &ScopeSet,
    service: &ServiceEntry,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_url_entry(&mut body, service.url_string(), service.url().lifetime());
    push_string(&mut body, &strings::escape(service.service_type()));
    push_string(&mut body, &scopes.to_escaped_string());
    push_string(&mut body, ""); // attr list
    body.push(0); // no URL auth blocks
    let flags = if fresh { SlpFlags::FRESH } else { 0 };
    finish(
        SlpFunction::ServiceRegistration,
        flags,
        xid,
        DEFAULT_LANGUAGE,
        &body,
    )
}

/// Build a SrvDeReg.
pub fn build_service_deregistration(
    xid: u16,
    scopes: &ScopeSet,
    service: &ServiceEntry,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_string(&mut body, &scopes.to_escaped_string());
    // De-registration carries lifetime 0.
    push_url_entry(&mut body, service.url_string(), 0);
    push_string(&mut body, ""); // tag list
    finish(
        SlpFunction::ServiceDeRegistration,
        0,
        xid,
        DEFAULT_LANGUAGE,
        &body,
    )
}

/// Build a SrvAck.
pub fn build_service_ack(xid: u16, language: &str, error_code: u16) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, error_code);
    finish(SlpFunction::ServiceAck, 0, xid, language, &body)
}

/// Build a DAAdvert.
pub fn build_da_advert(
    xid: u16,
    multicast: bool,
    error_code: u16,
    boot_timestamp: u32,
    url: &str,
    scopes: &ScopeSet,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, error_code);
    body.extend_from_slice(&boot_timestamp.to_be_bytes());
    push_string(&mut body, url);
    push_string(&mut body, &scopes.to_escaped_string());
    push_string(&mut body, ""); // attr list
    push_string(&mut body, ""); // SPI
    body.push(0); // no auth blocks
    let flags = if multicast { SlpFlags::MCAST } else { 0 };
    finish(SlpFunction::DaAdvert, flags, xid, DEFAULT_LANGUAGE, &body)
}

/// Build a SrvTypeRqst. `naming_auth` of `None` asks for all naming
/// authorities; an empty string asks for IANA types.
pub fn build_service_type_request(
    xid: u16,
    multicast: bool,
    pr_list: &[Ipv4Addr],
    naming_auth: Option<&str>,
    scopes: &ScopeSet,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_string(&mut body, &address_list(pr_list));
    match naming_auth {
        None => push_u16(&mut body, 0xffff),
        Some(auth) => push_string(&mut body, &strings::escape(auth)),
    }
    push_string(&mut body, &scopes.to_escaped_string());
    let flags = if multicast { SlpFlags::MCAST } else { 0 };
    finish(
        SlpFunction::ServiceTypeRequest,
        flags,
        xid,
        DEFAULT_LANGUAGE,
        &body,
    )
}

/// Build a SrvTypeRply.
pub fn build_service_type_reply(xid: u16, error_code: u16, service_types: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, error_code);
    let escaped: Vec<String> = service_types.iter().map(|s| strings::escape(s)).collect();
    push_string(&mut body, &escaped.join(","));
    finish(
        SlpFunction::ServiceTypeReply,
        0,
        xid,
        DEFAULT_LANGUAGE,
        &body,
    )
}

/// Build an SAAdvert.
pub fn build_sa_advert(xid: u16, multicast: bool, url: &str, scopes: &ScopeSet) -> Vec<u8> {
    let mut body = Vec::new();
    push_string(&mut body, url);
    push_string(&mut body, &scopes.to_escaped_string());
    push_string(&mut body, ""); // attr list
    body.push(0); // no auth blocks
    let flags = if multicast { SlpFlags::MCAST } else { 0 };
    finish(SlpFunction::SaAdvert, flags, xid, DEFAULT_LANGUAGE, &body)
}

/// Build a bare-header error reply for an unsupported request.
pub fn build_error(
    function: SlpFunction,
    xid: u16,
    language: &str,
    error_code: u16,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, error_code);
    finish(function, 0, xid, language, &body)
}
