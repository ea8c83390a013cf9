//! BER length encoding and decoding (X.690 §8.1.3).
//!
//! Short form covers 0..=127 in one octet. Long form is a count octet with the
//! high bit set followed by up to four big-endian length octets. The
//! indefinite form (0x80) never appears in SNMP and is rejected.

use crate::error::{DecodeErrorKind, Error, Result};

/// Largest content length accepted by the decoder.
///
/// Real SNMP messages are a few KB at most; anything beyond 2 MiB is treated
/// as corrupt rather than allocated for.
pub const MAX_LENGTH: usize = 0x20_0000;

/// Encode `len` in minimal form.
///
/// The returned bytes are in reverse wire order, ready to be appended to an
/// [`EncodeBuf`](super::EncodeBuf).
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    let mut buf = [0u8; 5];
    if len < 0x80 {
        buf[0] = len as u8;
        return (buf, 1);
    }

    let mut n = 0;
    let mut rest = len;
    while rest > 0 && n < 4 {
        buf[n] = rest as u8;
        rest >>= 8;
        n += 1;
    }
    buf[n] = 0x80 | n as u8;
    (buf, n + 1)
}

/// Decode a length header, returning `(length, header_octets)`.
///
/// `base_offset` is the absolute position of `data[0]`, used for error
/// reporting only. The caller is responsible for checking that `length`
/// bytes are actually available.
pub fn decode_length(data: &[u8], base_offset: usize) -> Result<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let octets = (first & 0x7F) as usize;
    if octets == 0 {
        return Err(Error::decode(base_offset, DecodeErrorKind::IndefiniteLength));
    }
    if octets > 4 {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthTooLong { octets },
        ));
    }
    let Some(body) = data.get(1..=octets) else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    let len = body.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if len > MAX_LENGTH {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthExceedsMax {
                length: len,
                max: MAX_LENGTH,
            },
        ));
    }

    Ok((len, 1 + octets))
}
