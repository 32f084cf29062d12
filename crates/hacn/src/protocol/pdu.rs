// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ACN PDU header codec.
//!
//! # Wire Format
//!
//! ```text
//!  0                   1                   2
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |L|V|H|D| len-hi|    length-lo  | (length-lo2)  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            vector (1, 2 or 4 bytes)           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            header ...  |  data ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Flags live in the high nibble of the first byte. When the L bit is clear
//! the length is 12 bits spanning 2 bytes; when set it is 20 bits spanning
//! 3 bytes. The length counts the whole PDU including the flags/length bytes
//! themselves. V, H and D signal the presence of the vector, header and data
//! sections; an absent vector or header is inherited from the previous PDU
//! at the same nesting level.

use crate::core::IoStack;
use std::fmt;

/// Extended-length flag: a 20-bit length over 3 bytes.
pub const LFLAG_MASK: u8 = 0x80;
/// Vector-present flag.
pub const VFLAG_MASK: u8 = 0x40;
/// Header-present flag.
pub const HFLAG_MASK: u8 = 0x20;
/// Data-present flag.
pub const DFLAG_MASK: u8 = 0x10;
/// The low nibble of the first byte carries the top length bits.
pub const LENGTH_MASK: u8 = 0x0f;

/// Largest PDU length representable in the 2-byte form.
pub const TWO_BYTE_LENGTH_LIMIT: usize = 0x0fff;
/// Largest PDU length representable at all.
pub const THREE_BYTE_LENGTH_LIMIT: usize = 0x000f_ffff;

/// The width of a layer's vector field. Fixed per inflator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSize {
    /// A single byte vector (RDM start code, E1.33 status).
    One = 1,
    /// A two byte vector.
    Two = 2,
    /// A four byte vector (root, framing layers).
    Four = 4,
}

/// Errors from the PDU header codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduError {
    /// The length field is truncated or smaller than its own encoding.
    InvalidLength,
    /// The vector field is truncated, or absent with nothing to inherit.
    InvalidVector,
    /// A PDU would exceed the representable 20-bit length.
    OversizedPdu(usize),
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "invalid PDU length field"),
            Self::InvalidVector => write!(f, "invalid or missing PDU vector"),
            Self::OversizedPdu(len) => {
                write!(f, "PDU of {} bytes exceeds the 20 bit length form", len)
            }
        }
    }
}

impl std::error::Error for PduError {}

/// Decode the flags/length prefix of a PDU.
///
/// Returns `(pdu_length, bytes_used)` where `pdu_length` counts the entire
/// PDU (flags and length bytes included) and `bytes_used` is 2 or 3.
pub fn decode_length(data: &[u8]) -> Result<(usize, usize), PduError> {
    if data.is_empty() {
        return Err(PduError::InvalidLength);
    }
    let flags = data[0];
    let (pdu_length, bytes_used) = if flags & LFLAG_MASK != 0 {
        if data.len() < 3 {
            log::warn!("[ACN] {} byte PDU with the L bit set", data.len());
            return Err(PduError::InvalidLength);
        }
        (
            usize::from(data[2])
                + (usize::from(data[1]) << 8)
                + (usize::from(data[0] & LENGTH_MASK) << 16),
            3,
        )
    } else {
        if data.len() < 2 {
            log::warn!("[ACN] {} byte PDU is too short for a length", data.len());
            return Err(PduError::InvalidLength);
        }
        (
            usize::from(data[1]) + (usize::from(data[0] & LENGTH_MASK) << 8),
            2,
        )
    };

    if pdu_length < bytes_used {
        log::warn!(
            "[ACN] PDU length {} smaller than its {} length bytes",
            pdu_length,
            bytes_used
        );
        return Err(PduError::InvalidLength);
    }
    Ok((pdu_length, bytes_used))
}

/// Decode the vector of a PDU body.
///
/// `data` points just past the flags/length bytes. When the V flag is clear
/// the vector is inherited from `last_vector`; with no prior vector the PDU
/// is invalid (the first PDU of a block must carry one). Returns
/// `(vector, bytes_used)`.
pub fn decode_vector(
    flags: u8,
    data: &[u8],
    last_vector: Option<u32>,
    size: VectorSize,
) -> Result<(u32, usize), PduError> {
    if flags & VFLAG_MASK == 0 {
        return match last_vector {
            Some(vector) => Ok((vector, 0)),
            None => {
                log::warn!("[ACN] vector not set and no field to inherit from");
                Err(PduError::InvalidVector)
            }
        };
    }

    let width = size as usize;
    if data.len() < width {
        return Err(PduError::InvalidVector);
    }
    let vector = match size {
        VectorSize::One => u32::from(data[0]),
        VectorSize::Two => u32::from(u16::from_be_bytes([data[0], data[1]])),
        VectorSize::Four => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
    };
    Ok((vector, width))
}

/// Encode a vector value at the given width, big-endian.
pub fn encode_vector(vector: u32, size: VectorSize, out: &mut Vec<u8>) {
    match size {
        VectorSize::One => out.push(vector as u8),
        VectorSize::Two => out.extend_from_slice(&(vector as u16).to_be_bytes()),
        VectorSize::Four => out.extend_from_slice(&vector.to_be_bytes()),
    }
}

/// Pack a complete PDU into a fresh buffer.
///
/// The V/H/D bits of `flags` must match the presence of the optional
/// sections; mismatches are a caller bug and reported as an error rather
/// than silently encoded.
pub fn pack(
    flags: u8,
    vector: Option<(u32, VectorSize)>,
    header: Option<&[u8]>,
    data: Option<&[u8]>,
) -> Result<Vec<u8>, PduError> {
    if (flags & VFLAG_MASK != 0) != vector.is_some()
        || (flags & HFLAG_MASK != 0) != header.is_some()
        || (flags & DFLAG_MASK != 0) != data.is_some()
    {
        return Err(PduError::InvalidLength);
    }

    let body_len = vector.map_or(0, |(_, s)| s as usize)
        + header.map_or(0, <[u8]>::len)
        + data.map_or(0, <[u8]>::len);

    let mut total = body_len + 2;
    let extended = total > TWO_BYTE_LENGTH_LIMIT;
    if extended {
        total += 1;
        if total > THREE_BYTE_LENGTH_LIMIT {
            return Err(PduError::OversizedPdu(total));
        }
    }

    let mut out = Vec::with_capacity(total);
    if extended {
        out.push(flags | LFLAG_MASK | ((total >> 16) as u8 & LENGTH_MASK));
        out.push((total >> 8) as u8);
        out.push(total as u8);
    } else {
        out.push((flags & !LFLAG_MASK) | ((total >> 8) as u8 & LENGTH_MASK));
        out.push(total as u8);
    }
    if let Some((v, size)) = vector {
        encode_vector(v, size, &mut out);
    }
    if let Some(h) = header {
        out.extend_from_slice(h);
    }
    if let Some(d) = data {
        out.extend_from_slice(d);
    }
    Ok(out)
}

/// Prepend a flags/length prefix covering everything already in `stack`.
///
/// This is the streaming encode path: the caller writes the vector, header
/// and payload first (deepest layer outward) and each layer finishes by
/// prepending its prefix. `force_extended` selects the 3-byte form even for
/// short PDUs.
pub fn prepend_flags_and_length(
    stack: &mut IoStack,
    flags: u8,
    force_extended: bool,
) -> Result<(), PduError> {
    let mut total = stack.len() + 2;
    if force_extended || total > TWO_BYTE_LENGTH_LIMIT {
        total += 1;
        if total > THREE_BYTE_LENGTH_LIMIT {
            return Err(PduError::OversizedPdu(total));
        }
        stack.prepend(&[
            flags | LFLAG_MASK | ((total >> 16) as u8 & LENGTH_MASK),
            (total >> 8) as u8,
            total as u8,
        ]);
    } else {
        stack.prepend(&[
            (flags & !LFLAG_MASK) | ((total >> 8) as u8 & LENGTH_MASK),
            total as u8,
        ]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockPool;

    const VHD: u8 = VFLAG_MASK | HFLAG_MASK | DFLAG_MASK;

    #[test]
    fn test_decode_length_two_byte_form() {
        let (len, used) = decode_length(&[0x02, 0x30]).unwrap();
        assert_eq!(len, 0x230);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_decode_length_three_byte_form() {
        let (len, used) = decode_length(&[0x80 | 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(len, 0x0001_0203);
        assert_eq!(used, 3);
    }

    #[test]
    fn test_decode_length_truncated() {
        assert_eq!(decode_length(&[]), Err(PduError::InvalidLength));
        assert_eq!(decode_length(&[0x00]), Err(PduError::InvalidLength));
        assert_eq!(decode_length(&[0x80, 0x00]), Err(PduError::InvalidLength));
    }

    #[test]
    fn test_decode_length_smaller_than_field() {
        // Length 1 cannot cover its own 2 encoding bytes.
        assert_eq!(decode_length(&[0x00, 0x01]), Err(PduError::InvalidLength));
        // Length 2 in the 3 byte form is equally impossible.
        assert_eq!(
            decode_length(&[0x80, 0x00, 0x02]),
            Err(PduError::InvalidLength)
        );
    }

    #[test]
    fn test_decode_vector_widths() {
        let data = [0x0a, 0x0b, 0x0c, 0x0d];
        assert_eq!(
            decode_vector(VFLAG_MASK, &data, None, VectorSize::One).unwrap(),
            (0x0a, 1)
        );
        assert_eq!(
            decode_vector(VFLAG_MASK, &data, None, VectorSize::Two).unwrap(),
            (0x0a0b, 2)
        );
        assert_eq!(
            decode_vector(VFLAG_MASK, &data, None, VectorSize::Four).unwrap(),
            (0x0a0b_0c0d, 4)
        );
    }

    #[test]
    fn test_decode_vector_inherits() {
        assert_eq!(
            decode_vector(0, &[], Some(42), VectorSize::Four).unwrap(),
            (42, 0)
        );
    }

    #[test]
    fn test_decode_vector_nothing_to_inherit() {
        assert_eq!(
            decode_vector(0, &[], None, VectorSize::Four),
            Err(PduError::InvalidVector)
        );
    }

    #[test]
    fn test_decode_vector_truncated() {
        assert_eq!(
            decode_vector(VFLAG_MASK, &[0x01, 0x02], None, VectorSize::Four),
            Err(PduError::InvalidVector)
        );
    }

    #[test]
    fn test_pack_round_trip_short() {
        let header = [0xaa; 4];
        let data = [0xbb; 8];
        let buf = pack(
            VHD,
            Some((7, VectorSize::Four)),
            Some(&header),
            Some(&data),
        )
        .unwrap();

        let (len, used) = decode_length(&buf).unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(used, 2);
        let (vector, v_used) =
            decode_vector(buf[0], &buf[used..], None, VectorSize::Four).unwrap();
        assert_eq!(vector, 7);
        assert_eq!(&buf[used + v_used..used + v_used + 4], &header);
        assert_eq!(&buf[used + v_used + 4..], &data);
    }

    #[test]
    fn test_pack_round_trip_extended() {
        let data = vec![0xcc; 0x1000];
        let buf = pack(
            VFLAG_MASK | DFLAG_MASK,
            Some((1, VectorSize::One)),
            None,
            Some(&data),
        )
        .unwrap();

        let (len, used) = decode_length(&buf).unwrap();
        assert_eq!(used, 3);
        assert_eq!(len, buf.len());
        assert_eq!(buf.len(), 3 + 1 + 0x1000);
    }

    #[test]
    fn test_pack_flag_mismatch() {
        assert!(pack(VFLAG_MASK, None, None, None).is_err());
        assert!(pack(0, Some((1, VectorSize::One)), None, None).is_err());
    }

    #[test]
    fn test_prepend_matches_pack() {
        let pool = BlockPool::new();
        let mut stack = IoStack::new(&pool);
        stack.append(&[0xbb; 8]);
        stack.prepend(&[0xaa; 4]);
        let mut vector = Vec::new();
        encode_vector(7, VectorSize::Four, &mut vector);
        stack.prepend(&vector);
        prepend_flags_and_length(&mut stack, VHD, false).unwrap();

        let packed = pack(
            VHD,
            Some((7, VectorSize::Four)),
            Some(&[0xaa; 4]),
            Some(&[0xbb; 8]),
        )
        .unwrap();
        assert_eq!(stack.to_vec(), packed);
    }

    #[test]
    fn test_prepend_forced_extended() {
        let pool = BlockPool::new();
        let mut stack = IoStack::new(&pool);
        stack.append(&[0x01, 0x02]);
        prepend_flags_and_length(&mut stack, DFLAG_MASK, true).unwrap();
        let buf = stack.to_vec();
        assert_eq!(buf.len(), 5);
        let (len, used) = decode_length(&buf).unwrap();
        assert_eq!((len, used), (5, 3));
    }
}
