// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLPv2 packet decoding.
//!
//! Short reads return `None` with a log line; per RFC 2608 section 7 a
//! truncated SrvRply or DAAdvert that already carries a non-zero error code
//! is returned partially decoded. Authentication blocks are length-checked
//! and their contents discarded (SLP SPI is unused).

use super::packets::{
    AttrReply, AttrRequest, DaAdvert, ServiceAck, ServiceDeRegistration, ServiceRegistration,
    ServiceReply, ServiceRequest, ServiceTypeRequest, ServiceTypeReply, SaAdvert, SlpFunction,
    SlpHeader, SlpMessage, SlpPacket, SLP_VERSION,
};
use super::service::UrlEntry;
use super::strings;
use std::net::Ipv4Addr;

/// Big-endian cursor over a packet.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.data.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u24(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 3)?;
        self.pos += 3;
        Some((u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]))
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(bytes)
    }

    /// A two byte length plus that many bytes, optionally SLP-unescaped.
    fn read_string(&mut self, field: &str, unescape: bool) -> Option<String> {
        let len = match self.read_u16() {
            Some(len) => len as usize,
            None => {
                log::info!("[SLP] packet too small to read {} length", field);
                return None;
            }
        };
        let bytes = match self.read_bytes(len) {
            Some(bytes) => bytes,
            None => {
                log::info!(
                    "[SLP] insufficient data for {}, wanted {}, {} remaining",
                    field,
                    len,
                    self.remaining()
                );
                return None;
            }
        };
        let raw = String::from_utf8_lossy(bytes).into_owned();
        Some(if unescape { strings::unescape(&raw) } else { raw })
    }
}

/// The function id of a packet, or `None` if it is too short or unknown.
pub fn function_id(data: &[u8]) -> Option<SlpFunction> {
    if data.len() < 2 {
        log::info!("[SLP] packet too short to extract function id");
        return None;
    }
    SlpFunction::from_u8(data[1])
}

/// Decode a complete SLP packet.
pub fn parse(data: &[u8]) -> Option<SlpPacket> {
    let function = function_id(data)?;
    let mut reader = Reader::new(data);
    let header = parse_header(&mut reader, function)?;

    let message = match function {
        SlpFunction::ServiceRequest => SlpMessage::ServiceRequest(parse_service_request(&mut reader)?),
        SlpFunction::ServiceReply => SlpMessage::ServiceReply(parse_service_reply(&mut reader)?),
        SlpFunction::ServiceRegistration => {
            SlpMessage::ServiceRegistration(parse_service_registration(&mut reader)?)
        }
        SlpFunction::ServiceDeRegistration => {
            SlpMessage::ServiceDeRegistration(parse_service_deregistration(&mut reader)?)
        }
        SlpFunction::ServiceAck => {
            let error_code = read_value(&mut reader, "SrvAck error code")?;
            SlpMessage::ServiceAck(ServiceAck { error_code })
        }
        SlpFunction::AttrRequest => SlpMessage::AttrRequest(parse_attr_request(&mut reader)?),
        SlpFunction::AttrReply => SlpMessage::AttrReply(parse_attr_reply(&mut reader)?),
        SlpFunction::DaAdvert => SlpMessage::DaAdvert(parse_da_advert(&mut reader)?),
        SlpFunction::ServiceTypeRequest => {
            SlpMessage::ServiceTypeRequest(parse_service_type_request(&mut reader)?)
        }
        SlpFunction::ServiceTypeReply => {
            SlpMessage::ServiceTypeReply(parse_service_type_reply(&mut reader)?)
        }
        SlpFunction::SaAdvert => SlpMessage::SaAdvert(parse_sa_advert(&mut reader)?),
    };

    Some(SlpPacket { header, message })
}

fn read_value(reader: &mut Reader<'_>, field: &str) -> Option<u16> {
    match reader.read_u16() {
        Some(value) => Some(value),
        None => {
            log::info!("[SLP] packet too small to contain {}", field);
            None
        }
    }
}

fn parse_header(reader: &mut Reader<'_>, function: SlpFunction) -> Option<SlpHeader> {
    let version = reader.read_u8()?;
    if version != SLP_VERSION {
        log::info!("[SLP] invalid version {}", version);
        return None;
    }
    let _function_id = reader.read_u8()?;
    let _length = reader.read_u24()?;
    let flags = read_value(reader, "flags")?;
    let next_ext_offset = reader.read_u24()?;
    if next_ext_offset != 0 {
        log::info!("[SLP] next extension offset non-zero: {}", next_ext_offset);
    }
    let xid = read_value(reader, "XID")?;
    let language = reader.read_string("language", true)?;

    Some(SlpHeader {
        function,
        flags,
        xid,
        language,
    })
}

/// Comma separated IPv4 addresses; invalid entries are skipped (RFC 2608
/// section 8.1 makes them non-fatal).
fn parse_address_list(list: &str) -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    for part in list.split(',') {
        if part.is_empty() {
            continue;
        }
        match part.parse() {
            Ok(address) => addresses.push(address),
            Err(_) => log::info!("[SLP] packet contained invalid IP address: {}", part),
        }
    }
    addresses
}

fn parse_url_entry(reader: &mut Reader<'_>, packet_type: &str) -> Option<UrlEntry> {
    let _reserved = reader.read_u8()?;
    let lifetime = read_value(reader, "URL entry lifetime")?;
    let url = reader.read_string(&format!("{} URL", packet_type), true)?;
    let entry = UrlEntry::new(&url, lifetime);

    let auth_count = reader.read_u8()?;
    for _ in 0..auth_count {
        if !skip_auth_block(reader, packet_type) {
            return None;
        }
    }
    Some(entry)
}

/// Length-check an authentication block and discard its contents.
fn skip_auth_block(reader: &mut Reader<'_>, packet_type: &str) -> bool {
    let Some(_descriptor) = reader.read_u16() else {
        return false;
    };
    let Some(block_length) = reader.read_u16() else {
        return false;
    };
    let Some(_timestamp) = reader.read_u32() else {
        return false;
    };
    let Some(spi) = reader.read_string("auth SPI", false) else {
        return false;
    };

    // descriptor + length + timestamp + SPI length field + SPI bytes.
    let consumed = 2 + 2 + 4 + 2 + spi.len();
    let Some(structured_size) = (block_length as usize).checked_sub(consumed) else {
        log::info!("[SLP] {}: auth block smaller than its minimum size", packet_type);
        return false;
    };
    if structured_size > 0 && reader.read_bytes(structured_size).is_none() {
        log::info!("[SLP] {}: insufficient data remaining for auth data", packet_type);
        return false;
    }
    true
}

fn parse_service_request(reader: &mut Reader<'_>) -> Option<ServiceRequest> {
    let pr_list = reader.read_string("PR list", true)?;
    Some(ServiceRequest {
        pr_list: parse_address_list(&pr_list),
        service_type: reader.read_string("service type", true)?,
        scope_list: reader.read_string("scope list", false)?,
        predicate: reader.read_string("predicate", true)?,
        spi: reader.read_string("SPI", true)?,
    })
}

fn parse_service_reply(reader: &mut Reader<'_>) -> Option<ServiceReply> {
    let error_code = read_value(reader, "SrvRply error code")?;
    let mut reply = ServiceReply {
        error_code,
        url_entries: Vec::new(),
    };

    // A truncated reply with a non-zero error code is returned as-is.
    let Some(url_entry_count) = reader.read_u16() else {
        if error_code != 0 {
            return Some(reply);
        }
        log::info!("[SLP] packet too small to contain SrvRply URL entry count");
        return None;
    };

    for _ in 0..url_entry_count {
        match parse_url_entry(reader, "SrvRply") {
            Some(entry) => reply.url_entries.push(entry),
            None => break,
        }
    }
    Some(reply)
}

fn parse_service_registration(reader: &mut Reader<'_>) -> Option<ServiceRegistration> {
    let url = parse_url_entry(reader, "SrvReg")?;
    let service_type = reader.read_string("service type", true)?;
    let scope_list = reader.read_string("scope list", false)?;
    let attr_list = reader.read_string("attr list", true)?;
    let auth_count = reader.read_u8()?;
    for _ in 0..auth_count {
        if !skip_auth_block(reader, "SrvReg") {
            return None;
        }
    }
    Some(ServiceRegistration {
        url,
        service_type,
        scope_list,
        attr_list,
    })
}

fn parse_service_deregistration(reader: &mut Reader<'_>) -> Option<ServiceDeRegistration> {
    Some(ServiceDeRegistration {
        scope_list: reader.read_string("scope list", false)?,
        url: parse_url_entry(reader, "SrvDeReg")?,
        tag_list: reader.read_string("tag list", true)?,
    })
}

fn parse_attr_request(reader: &mut Reader<'_>) -> Option<AttrRequest> {
    let pr_list = reader.read_string("PR list", true)?;
    Some(AttrRequest {
        pr_list: parse_address_list(&pr_list),
        url: reader.read_string("URL", true)?,
        scope_list: reader.read_string("scope list", false)?,
        tag_list: reader.read_string("tag list", true)?,
        spi: reader.read_string("SPI", true)?,
    })
}

fn parse_attr_reply(reader: &mut Reader<'_>) -> Option<AttrReply> {
    Some(AttrReply {
        error_code: read_value(reader, "AttrRply error code")?,
        attr_list: reader.read_string("attr list", true)?,
    })
}

fn parse_da_advert(reader: &mut Reader<'_>) -> Option<DaAdvert> {
    let error_code = read_value(reader, "DAAdvert error code")?;
    let mut advert = DaAdvert {
        error_code,
        ..DaAdvert::default()
    };

    // A truncated advert with a non-zero error code is returned as-is.
    let Some(boot_timestamp) = reader.read_u32() else {
        if error_code != 0 {
            return Some(advert);
        }
        log::info!("[SLP] packet too small to contain DAAdvert boot timestamp");
        return None;
    };
    advert.boot_timestamp = boot_timestamp;
    advert.url = reader.read_string("DAAdvert URL", true)?;
    advert.scope_list = reader.read_string("DAAdvert scope list", false)?;
    advert.attr_list = reader.read_string("DAAdvert attr list", true)?;
    advert.spi = reader.read_string("DAAdvert SPI", true)?;

    let auth_count = reader.read_u8()?;
    for _ in 0..auth_count {
        if !skip_auth_block(reader, "DAAdvert") {
            return None;
        }
    }
    Some(advert)
}

fn parse_service_type_request(reader: &mut Reader<'_>) -> Option<ServiceTypeRequest> {
    let pr_list = reader.read_string("PR list", true)?;
    let mut request = ServiceTypeRequest {
        pr_list: parse_address_list(&pr_list),
        ..ServiceTypeRequest::default()
    };

    // A length of 0xffff means all naming authorities.
    let naming_auth_length = read_value(reader, "naming auth length")?;
    if naming_auth_length == 0xffff {
        request.include_all = true;
    } else {
        let bytes = reader.read_bytes(naming_auth_length as usize)?;
        request.naming_authority =
            strings::unescape(&String::from_utf8_lossy(bytes).into_owned());
    }
    request.scope_list = reader.read_string("scope list", false)?;
    Some(request)
}

fn parse_service_type_reply(reader: &mut Reader<'_>) -> Option<ServiceTypeReply> {
    let error_code = read_value(reader, "SrvTypeRply error code")?;
    let type_list = reader.read_string("service type list", true)?;
    Some(ServiceTypeReply {
        error_code,
        service_types: type_list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

fn parse_sa_advert(reader: &mut Reader<'_>) -> Option<SaAdvert> {
    let advert = SaAdvert {
        url: reader.read_string("SAAdvert URL", true)?,
        scope_list: reader.read_string("SAAdvert scope list", false)?,
        attr_list: reader.read_string("SAAdvert attr list", true)?,
    };
    let auth_count = reader.read_u8()?;
    for _ in 0..auth_count {
        if !skip_auth_block(reader, "SAAdvert") {
            return None;
        }
    }
    Some(advert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slp::builder;
    use crate::slp::ScopeSet;

    #[test]
    fn test_function_id() {
        assert_eq!(function_id(&[2, 1]), Some(SlpFunction::ServiceRequest));
        assert_eq!(function_id(&[2]), None);
        assert_eq!(function_id(&[2, 99]), None);
    }

    #[test]
    fn test_version_check() {
        let mut packet = builder::build_service_ack(0x1234, "en", 0);
        packet[0] = 3;
        assert!(parse(&packet).is_none());
    }

    #[test]
    fn test_service_request_round_trip() {
        let scopes = ScopeSet::from_string("one,two");
        let pr_list = vec![
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        ];
        let packet = builder::build_service_request(
            0x0001,
            true,
            &pr_list,
            "service:directory-agent",
            &scopes,
            "",
        );

        let decoded = parse(&packet).unwrap();
        assert_eq!(decoded.header.xid, 0x0001);
        assert!(decoded.header.is_multicast());
        let SlpMessage::ServiceRequest(request) = decoded.message else {
            panic!("wrong message type");
        };
        assert_eq!(request.pr_list, pr_list);
        assert_eq!(request.service_type, "service:directory-agent");
        assert_eq!(ScopeSet::from_string(&request.scope_list), scopes);
    }

    #[test]
    fn test_truncated_reply_with_error_is_partial() {
        // SrvRply carrying just an error code, no URL entry count.
        let mut packet = builder::build_service_ack(9, "en", 0);
        packet[1] = SlpFunction::ServiceReply as u8;
        // The last two bytes are the ack's error code; set non-zero.
        let len = packet.len();
        packet[len - 2..].copy_from_slice(&4u16.to_be_bytes());

        let decoded = parse(&packet).unwrap();
        let SlpMessage::ServiceReply(reply) = decoded.message else {
            panic!("wrong message type");
        };
        assert_eq!(reply.error_code, 4);
        assert!(reply.url_entries.is_empty());
    }

    #[test]
    fn test_truncated_reply_without_error_is_dropped() {
        let mut packet = builder::build_service_ack(9, "en", 0);
        packet[1] = SlpFunction::ServiceReply as u8;
        assert!(parse(&packet).is_none());
    }

    #[test]
    fn test_da_advert_round_trip() {
        let scopes = ScopeSet::from_string("one");
        let packet = builder::build_da_advert(
            0x0202,
            true,
            0,
            0x5000_0000,
            "service:directory-agent://10.0.0.5",
            &scopes,
        );
        let decoded = parse(&packet).unwrap();
        assert!(decoded.header.is_multicast());
        let SlpMessage::DaAdvert(advert) = decoded.message else {
            panic!("wrong message type");
        };
        assert_eq!(advert.boot_timestamp, 0x5000_0000);
        assert_eq!(advert.url, "service:directory-agent://10.0.0.5");
        assert_eq!(ScopeSet::from_string(&advert.scope_list), scopes);
    }

    #[test]
    fn test_service_type_request_all_naming_auths() {
        let packet = builder::build_service_type_request(
            7,
            true,
            &[],
            None,
            &ScopeSet::from_string("one"),
        );
        let decoded = parse(&packet).unwrap();
        let SlpMessage::ServiceTypeRequest(request) = decoded.message else {
            panic!("wrong message type");
        };
        assert!(request.include_all);
    }

    #[test]
    fn test_service_type_request_specific_naming_auth() {
        let packet = builder::build_service_type_request(
            7,
            false,
            &[],
            Some("esta"),
            &ScopeSet::from_string("one"),
        );
        let decoded = parse(&packet).unwrap();
        let SlpMessage::ServiceTypeRequest(request) = decoded.message else {
            panic!("wrong message type");
        };
        assert!(!request.include_all);
        assert_eq!(request.naming_authority, "esta");
    }

    #[test]
    fn test_registration_round_trip() {
        use crate::slp::ServiceEntry;
        let service = ServiceEntry::from_strings("one,two", "service:foo://10.1.1.1", 300);
        let packet = builder::build_service_registration(
            0x0042,
            true,
            service.scopes(),
            &service,
        );
        let decoded = parse(&packet).unwrap();
        assert!(decoded.header.is_fresh());
        let SlpMessage::ServiceRegistration(reg) = decoded.message else {
            panic!("wrong message type");
        };
        assert_eq!(reg.url.url(), "service:foo://10.1.1.1");
        assert_eq!(reg.url.lifetime(), 300);
        assert_eq!(reg.service_type, "service:foo");
    }

    #[test]
    fn test_invalid_pr_addresses_skipped() {
        // Hand-build a SrvRqst with a junk PR list entry.
        let scopes = ScopeSet::from_string("one");
        let packet = builder::build_service_request(1, false, &[], "service:x", &scopes, "");
        let decoded = parse(&packet).unwrap();
        let SlpMessage::ServiceRequest(request) = decoded.message else {
            panic!("wrong message type");
        };
        assert!(request.pr_list.is_empty());
        assert_eq!(parse_address_list("10.0.0.1,junk,"), vec![
            "10.0.0.1".parse::<Ipv4Addr>().unwrap()
        ]);
    }

    #[test]
    fn test_short_packet_rejected() {
        assert!(parse(&[2, 5, 0, 0]).is_none());
    }
}
