//! # VarInt Codec
//!
//! Variable-length integers as used by the Minecraft protocol: 7 payload bits
//! per byte, least significant group first, high bit set on every byte except
//! the last.
//!
//! Negative values are biased into the unsigned 32-bit range before encoding
//! (so `-1` becomes `0xFFFF_FFFF`, five bytes on the wire) and un-biased on
//! decode when the top bit of the reconstructed value is set.

use crate::error::{ProtocolError, Result};
use bytes::BufMut;

/// A 32-bit varint never needs more than five bytes
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u32 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Encode `value` into a freshly allocated buffer
pub fn encode_varint(value: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_len(value));
    put_varint(&mut out, value);
    out
}

/// Append the varint encoding of `value` to `buf`
pub fn put_varint<B: BufMut>(buf: &mut B, value: i32) {
    let mut remaining = value as u32;
    loop {
        let byte = (remaining & SEGMENT_BITS) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | CONTINUE_BIT);
    }
}

/// Number of bytes `value` occupies on the wire
pub fn varint_len(value: i32) -> usize {
    let mut remaining = value as u32;
    let mut len = 1;
    while remaining >= 0x80 {
        remaining >>= 7;
        len += 1;
    }
    len
}

/// Decode a varint from the start of `data`.
///
/// Returns `Ok(None)` when `data` ends before the varint does (the caller
/// should wait for more bytes), `Ok(Some((value, consumed)))` on success.
///
/// # Errors
/// `ProtocolError::InvalidVarint` if more than five bytes carry the continuation bit
pub fn decode_varint(data: &[u8]) -> Result<Option<(i32, usize)>> {
    let mut result: u32 = 0;

    for (index, &byte) in data.iter().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(ProtocolError::InvalidVarint);
        }

        result |= ((byte as u32) & SEGMENT_BITS) << (7 * index as u32);

        if byte & CONTINUE_BIT == 0 {
            // Reinterpreting the reconstructed bits restores negative values
            return Ok(Some((result as i32, index + 1)));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        return Err(ProtocolError::InvalidVarint);
    }

    Ok(None)
}
