//! BER decoding.
//!
//! Zero-copy decoding using `Bytes`. Sub-decoders for constructed types share
//! the parent's buffer and remember their absolute position, so every error
//! reports an offset into the original message.

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use bytes::Bytes;

/// BER decoder that reads from a byte buffer.
pub struct Decoder {
    data: Bytes,
    offset: usize,
    // Absolute position of `data[0]` in the outermost message.
    base: usize,
}

impl Decoder {
    /// Create a new decoder from bytes.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            base: 0,
        }
    }

    /// Create a decoder from a byte slice (copies the data).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Absolute offset of the read cursor.
    pub fn offset(&self) -> usize {
        self.base + self.offset
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Check if we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn fail(&self, at: usize, kind: DecodeErrorKind) -> Error {
        let offset = self.base + at;
        tracing::debug!(target: "snmp_wire::ber", { snmp.offset = offset, %kind }, "decode failed");
        Error::decode(offset, kind)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        let Some(&byte) = self.data.get(self.offset) else {
            return Err(self.fail(self.offset, DecodeErrorKind::TruncatedData));
        };
        self.offset += 1;
        Ok(byte)
    }

    /// Read a length header.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) =
            decode_length(&self.data[self.offset..], self.offset()).inspect_err(|e| {
                tracing::debug!(target: "snmp_wire::ber", { snmp.offset = self.offset() }, "bad length: {}", e);
            })?;
        self.offset += consumed;
        Ok(len)
    }

    /// Read raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        // saturating_add keeps a hostile length from wrapping past the check
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(self.fail(
                self.offset,
                DecodeErrorKind::InsufficientData {
                    needed: len,
                    available: self.remaining(),
                },
            ));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Read and expect a specific tag, returning the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let tag = self.read_tag()?;
        if tag != expected {
            return Err(self.fail(
                self.offset - 1,
                DecodeErrorKind::UnexpectedTag {
                    expected,
                    actual: tag,
                },
            ));
        }
        self.read_length()
    }

    /// Read a BER integer (signed).
    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        self.read_integer_value(len)
    }

    /// Read integer value given the length.
    ///
    /// Octets past the fourth are tolerated only as sign extension; anything
    /// else cannot be represented in an `i32`.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        if len == 0 {
            return Err(self.fail(self.offset, DecodeErrorKind::ZeroLengthInteger));
        }
        let start = self.offset;
        let bytes = self.read_bytes(len)?;
        let (padding, value) = bytes.split_at(len.saturating_sub(4));
        let seed: i32 = if value[0] & 0x80 != 0 { -1 } else { 0 };
        if !padding.is_empty() {
            let sign = seed as u8;
            if padding.iter().any(|&b| b != sign) {
                return Err(self.fail(start, DecodeErrorKind::IntegerOverflow { length: len }));
            }
            tracing::warn!(target: "snmp_wire::ber", { snmp.offset = self.base + start, length = len }, "non-minimal integer encoding");
        }
        Ok(value.iter().fold(seed, |acc, &b| (acc << 8) | b as i32))
    }

    /// Read 64-bit unsigned integer value given the length.
    pub fn read_integer64_value(&mut self, len: usize) -> Result<u64> {
        if len == 0 {
            return Err(self.fail(self.offset, DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 9 {
            // 9 octets max: a leading zero plus eight value octets
            return Err(self.fail(
                self.offset,
                DecodeErrorKind::Integer64TooLong { length: len },
            ));
        }
        let start = self.offset;
        let bytes = self.read_bytes(len)?;
        if len == 9 && bytes[0] != 0 {
            return Err(self.fail(start, DecodeErrorKind::IntegerOverflow { length: len }));
        }
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Read an unsigned 32-bit integer with specific tag.
    pub fn read_unsigned32(&mut self, expected_tag: u8) -> Result<u32> {
        let len = self.expect_tag(expected_tag)?;
        self.read_unsigned32_value(len)
    }

    /// Read unsigned 32-bit integer value given length.
    ///
    /// Leading zero octets are padding; a fifth significant octet overflows.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        if len == 0 {
            return Err(self.fail(self.offset, DecodeErrorKind::ZeroLengthInteger));
        }
        let start = self.offset;
        let bytes = self.read_bytes(len)?;
        let (padding, value) = bytes.split_at(len.saturating_sub(4));
        if padding.iter().any(|&b| b != 0) {
            return Err(self.fail(start, DecodeErrorKind::IntegerOverflow { length: len }));
        }
        if len > 5 {
            tracing::warn!(target: "snmp_wire::ber", { snmp.offset = self.base + start, length = len }, "non-minimal unsigned integer encoding");
        }
        Ok(value.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        let len = self.expect_tag(tag::universal::NULL)?;
        if len != 0 {
            return Err(self.fail(self.offset, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        self.read_oid_value(len)
    }

    /// Read an OID given a pre-read length.
    pub fn read_oid_value(&mut self, len: usize) -> Result<Oid> {
        let at = self.offset;
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes).map_err(|_| self.fail(at, DecodeErrorKind::InvalidOidEncoding))
    }

    /// Read a SEQUENCE, returning a decoder for its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Read a constructed type with a specific tag, returning a decoder for its contents.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        self.sub_decoder(len)
    }

    /// Read an IP address.
    pub fn read_ip_address_value(&mut self, len: usize) -> Result<[u8; 4]> {
        if len != 4 {
            return Err(self.fail(
                self.offset,
                DecodeErrorKind::InvalidIpAddressLength { length: len },
            ));
        }
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Skip a TLV (tag-length-value) without parsing.
    pub fn skip_tlv(&mut self) -> Result<()> {
        self.read_tag()?;
        let len = self.read_length()?;
        let new_offset = self.offset.saturating_add(len);
        if new_offset > self.data.len() {
            return Err(self.fail(self.offset, DecodeErrorKind::TlvOverflow));
        }
        self.offset = new_offset;
        Ok(())
    }

    /// Create a sub-decoder for the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let base = self.offset();
        let content = self.read_bytes(len)?;
        Ok(Decoder {
            data: content,
            offset: 0,
            base,
        })
    }

    /// Fail unless every byte has been consumed.
    pub fn expect_end(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.fail(
                self.offset,
                DecodeErrorKind::TrailingData {
                    remaining: self.remaining(),
                },
            ))
        }
    }

    /// Get the underlying bytes for the entire buffer.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }
}
