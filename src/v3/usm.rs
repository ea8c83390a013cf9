//! USM security parameters (RFC 3414 Section 2.4).
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```
//!
//! On the wire the SEQUENCE is itself wrapped in an OCTET STRING.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::v3::engine::MAX_ENGINE_TIME;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub username: Bytes,
    /// Truncated HMAC, a zero placeholder while signing, or empty.
    pub auth_params: Bytes,
    /// Salt, or empty when the message is not encrypted.
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    /// Boots and time are clamped to RFC 3414's 0..=2147483647.
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: u32,
        engine_time: u32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots: engine_boots.min(MAX_ENGINE_TIME),
            engine_time: engine_time.min(MAX_ENGINE_TIME),
            username: username.into(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// All-empty parameters, as sent in a discovery request.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fill msgAuthenticationParameters with `mac_len` zero bytes.
    pub fn with_auth_placeholder(mut self, mac_len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; mac_len]);
        self
    }

    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Encode the inner SEQUENCE.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode_to_buf(&mut buf);
        buf.finish()
    }

    pub fn encode_to_buf(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_integer(clamp_counter(self.engine_time));
            buf.push_integer(clamp_counter(self.engine_boots));
            buf.push_octet_string(&self.engine_id);
        });
    }

    /// Decode the inner SEQUENCE from a standalone buffer.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        Self::decode_from(&mut decoder)
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let engine_id = seq.read_octet_string()?;
        let engine_boots = read_non_negative(&mut seq)?;
        let engine_time = read_non_negative(&mut seq)?;
        let username = seq.read_octet_string()?;
        let auth_params = seq.read_octet_string()?;
        let priv_params = seq.read_octet_string()?;
        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params,
            priv_params,
        })
    }

    /// Locate msgAuthenticationParameters inside a complete v3 message.
    ///
    /// Returns the absolute `(offset, length)` of the field's content.
    pub fn find_auth_params_offset(message: &Bytes) -> Result<(usize, usize)> {
        let mut decoder = Decoder::new(message.clone());
        let mut outer = decoder.read_sequence()?;
        outer.read_integer()?; // msgVersion
        outer.skip_tlv()?; // msgGlobalData
        let wrapper_len = outer.expect_tag(tag::universal::OCTET_STRING)?;
        let mut wrapper = outer.sub_decoder(wrapper_len)?;
        let mut usm = wrapper.read_sequence()?;
        for _ in 0..4 {
            // engine id, boots, time, user name
            usm.skip_tlv()?;
        }
        let len = usm.expect_tag(tag::universal::OCTET_STRING)?;
        let offset = usm.offset();
        if len > usm.remaining() {
            return Err(Error::decode(
                offset,
                DecodeErrorKind::InsufficientData {
                    needed: len,
                    available: usm.remaining(),
                },
            ));
        }
        Ok((offset, len))
    }
}

fn clamp_counter(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn read_non_negative(decoder: &mut Decoder) -> Result<u32> {
    let at = decoder.offset();
    let value = decoder.read_integer()?;
    u32::try_from(value).map_err(|_| {
        tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, value }, "negative engine counter");
        Error::decode(at, DecodeErrorKind::NegativeCounter { value })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_raw(boots: i32, time: i32) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(&[]);
            buf.push_octet_string(&[]);
            buf.push_octet_string(&[]);
            buf.push_integer(time);
            buf.push_integer(boots);
            buf.push_octet_string(&[]);
        });
        buf.finish()
    }

    #[test]
    fn test_roundtrip() {
        let params = UsmSecurityParams::new(&b"engine-id"[..], 1234, 5678, &b"admin"[..])
            .with_auth_placeholder(12)
            .with_priv_params(&b"priv1234"[..]);
        let decoded = UsmSecurityParams::decode(params.encode()).unwrap();
        assert_eq!(decoded, params);
        assert!(decoded.auth_params.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_roundtrip() {
        let decoded = UsmSecurityParams::decode(UsmSecurityParams::empty().encode()).unwrap();
        assert_eq!(decoded, UsmSecurityParams::empty());
    }

    #[test]
    fn test_rejects_negative_counters() {
        assert!(matches!(
            UsmSecurityParams::decode(encode_raw(-1, 100)),
            Err(Error::MalformedPdu {
                kind: DecodeErrorKind::NegativeCounter { value: -1 },
                ..
            })
        ));
        assert!(UsmSecurityParams::decode(encode_raw(100, -1)).is_err());
    }

    #[test]
    fn test_accepts_max_counters() {
        let decoded = UsmSecurityParams::decode(encode_raw(i32::MAX, i32::MAX)).unwrap();
        assert_eq!(decoded.engine_boots, i32::MAX as u32);
        assert_eq!(decoded.engine_time, i32::MAX as u32);
    }

    #[test]
    fn test_counters_above_i32_clamp() {
        let params = UsmSecurityParams::new(&b"engine-id"[..], u32::MAX, 0x8000_0000, &b"u"[..]);
        assert_eq!(params.engine_boots, MAX_ENGINE_TIME);
        assert_eq!(params.engine_time, MAX_ENGINE_TIME);

        let decoded = UsmSecurityParams::decode(params.encode()).unwrap();
        assert_eq!(decoded, params);

        // fields set directly still encode as four-octet INTEGERs
        let raw = UsmSecurityParams {
            engine_time: u32::MAX,
            ..UsmSecurityParams::empty()
        };
        let encoded = raw.encode();
        assert!(!encoded.windows(3).any(|w| w == [0x02, 0x05, 0x00]));
        assert_eq!(
            UsmSecurityParams::decode(encoded).unwrap().engine_time,
            MAX_ENGINE_TIME
        );
    }

    #[test]
    fn test_find_auth_params_offset() {
        let params = UsmSecurityParams::new(&b"engine123"[..], 100, 200, &b"testuser"[..])
            .with_auth_placeholder(12);

        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_sequence(|_| {}); // scoped PDU stand-in
            let usm = params.encode();
            buf.push_octet_string(&usm);
            buf.push_sequence(|buf| buf.push_integer(1));
            buf.push_integer(3);
        });
        let encoded = buf.finish();

        let (offset, len) = UsmSecurityParams::find_auth_params_offset(&encoded).unwrap();
        assert_eq!(len, 12);
        assert!(encoded[offset..offset + len].iter().all(|&b| b == 0));
        // privParameters header follows the auth slot
        assert_eq!(encoded[offset + len], tag::universal::OCTET_STRING);
    }

    #[test]
    fn test_find_auth_params_on_garbage() {
        let garbage = Bytes::from_static(&[0x30, 0x03, 0x02, 0x01, 0x03]);
        assert!(UsmSecurityParams::find_auth_params_offset(&garbage).is_err());
    }
}
