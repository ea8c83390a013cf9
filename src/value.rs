//! SNMP value types.
//!
//! The `Value` enum covers the SMIv2 value space plus the three v2c exception
//! markers an agent may return in place of a value.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::format::hex;
use crate::oid::Oid;
use bytes::Bytes;

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER (signed 32-bit)
    Integer(i32),

    /// OCTET STRING (arbitrary bytes).
    ///
    /// The SMIv2 65535-octet limit is not enforced on decode.
    OctetString(Bytes),

    /// NULL, the placeholder value in request varbinds.
    Null,

    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),

    /// IpAddress (4 bytes, network order)
    IpAddress([u8; 4]),

    /// Counter32 (wrapping)
    Counter32(u32),

    /// Gauge32 / Unsigned32
    Gauge32(u32),

    /// TimeTicks (hundredths of a second)
    TimeTicks(u32),

    /// Opaque (legacy wrapped BER)
    Opaque(Bytes),

    /// Counter64. Not valid in SNMPv1 messages.
    Counter64(u64),

    /// noSuchObject exception: the object type is unknown to the agent.
    NoSuchObject,

    /// noSuchInstance exception: the object exists but this instance does not.
    NoSuchInstance,

    /// endOfMibView exception: nothing follows this OID in the agent's view.
    ///
    /// ```
    /// use snmp_wire::Value;
    ///
    /// assert!(Value::EndOfMibView.is_exception());
    /// ```
    EndOfMibView,

    /// Unrecognised tag, kept verbatim so one odd varbind doesn't sink the PDU.
    Unknown { tag: u8, data: Bytes },
}

impl Value {
    /// The BER tag this value is encoded with.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Integer(_) => tag::universal::INTEGER,
            Value::OctetString(_) => tag::universal::OCTET_STRING,
            Value::Null => tag::universal::NULL,
            Value::ObjectIdentifier(_) => tag::universal::OBJECT_IDENTIFIER,
            Value::IpAddress(_) => tag::application::IP_ADDRESS,
            Value::Counter32(_) => tag::application::COUNTER32,
            Value::Gauge32(_) => tag::application::GAUGE32,
            Value::TimeTicks(_) => tag::application::TIMETICKS,
            Value::Opaque(_) => tag::application::OPAQUE,
            Value::Counter64(_) => tag::application::COUNTER64,
            Value::NoSuchObject => tag::context::NO_SUCH_OBJECT,
            Value::NoSuchInstance => tag::context::NO_SUCH_INSTANCE,
            Value::EndOfMibView => tag::context::END_OF_MIB_VIEW,
            Value::Unknown { tag, .. } => *tag,
        }
    }

    /// Get the value as i32 (Integer only).
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as u32 (Counter32, Gauge32, TimeTicks, or a non-negative Integer).
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v),
            Value::Integer(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as u64 (any unsigned type).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            other => other.as_u32().map(u64::from),
        }
    }

    /// Raw bytes of an OctetString or Opaque.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(data) | Value::Opaque(data) => Some(data),
            _ => None,
        }
    }

    /// OctetString content as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::OctetString(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<std::net::Ipv4Addr> {
        match self {
            Value::IpAddress(addr) => Some(std::net::Ipv4Addr::from(*addr)),
            _ => None,
        }
    }

    /// Whether this is one of the v2c exception markers.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => {
                buf.push_unsigned32(self.tag(), *v)
            }
            Value::Counter64(v) => buf.push_integer64(*v),
            Value::Opaque(data) | Value::Unknown { data, .. } => {
                buf.push_bytes(data);
                buf.push_length(data.len());
                buf.push_tag(self.tag());
            }
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => {
                buf.push_length(0);
                buf.push_tag(self.tag());
            }
        }
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag = decoder.read_tag()?;
        let len = decoder.read_length()?;

        let value = match tag {
            tag::universal::INTEGER => Value::Integer(decoder.read_integer_value(len)?),
            tag::universal::OCTET_STRING => Value::OctetString(decoder.read_bytes(len)?),
            tag::universal::NULL => {
                if len != 0 {
                    return Err(Error::decode(
                        decoder.offset(),
                        DecodeErrorKind::InvalidNull,
                    ));
                }
                Value::Null
            }
            tag::universal::OBJECT_IDENTIFIER => {
                Value::ObjectIdentifier(decoder.read_oid_value(len)?)
            }
            tag::application::IP_ADDRESS => {
                Value::IpAddress(decoder.read_ip_address_value(len)?)
            }
            tag::application::COUNTER32 => Value::Counter32(decoder.read_unsigned32_value(len)?),
            tag::application::GAUGE32 => Value::Gauge32(decoder.read_unsigned32_value(len)?),
            tag::application::TIMETICKS => Value::TimeTicks(decoder.read_unsigned32_value(len)?),
            tag::application::OPAQUE => Value::Opaque(decoder.read_bytes(len)?),
            tag::application::COUNTER64 => Value::Counter64(decoder.read_integer64_value(len)?),
            tag::context::NO_SUCH_OBJECT
            | tag::context::NO_SUCH_INSTANCE
            | tag::context::END_OF_MIB_VIEW => {
                // Content should be empty; skip it rather than fail if not.
                decoder.read_bytes(len)?;
                match tag {
                    tag::context::NO_SUCH_OBJECT => Value::NoSuchObject,
                    tag::context::NO_SUCH_INSTANCE => Value::NoSuchInstance,
                    _ => Value::EndOfMibView,
                }
            }
            _ => {
                tracing::debug!(target: "snmp_wire::ber", { snmp.offset = decoder.offset(), tag }, "keeping unknown value tag");
                Value::Unknown {
                    tag,
                    data: decoder.read_bytes(len)?,
                }
            }
        };
        Ok(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => f.write_str(s),
                Err(_) => write!(f, "0x{}", hex::encode(data)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(addr) => write!(f, "{}", std::net::Ipv4Addr::from(*addr)),
            Value::Counter32(v) | Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                write!(
                    f,
                    "{}d {}h {}m {}s",
                    secs / 86400,
                    (secs % 86400) / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                )
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", hex::encode(data)),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
            Value::Unknown { tag, data } => {
                write!(f, "Unknown(tag=0x{:02X}, data=0x{})", tag, hex::encode(data))
            }
        }
    }
}

/// Compare an OctetString against text.
///
/// ```
/// use snmp_wire::Value;
///
/// assert_eq!(Value::from("test"), "test");
/// assert_ne!(Value::Integer(1), "1");
/// ```
impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Value::OctetString(data) if data.as_ref() == other.as_bytes())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Self {
        Value::OctetString(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::OctetString(data)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}

impl From<std::net::Ipv4Addr> for Value {
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Counter64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn roundtrip(value: Value) -> Value {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Value::decode(&mut decoder).unwrap();
        assert!(decoder.is_empty());
        decoded
    }

    fn encoded(value: &Value) -> Vec<u8> {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        buf.finish().to_vec()
    }

    #[test]
    fn test_wire_tags() {
        assert_eq!(encoded(&Value::from("test")), b"\x04\x04test");
        assert_eq!(encoded(&Value::Null), [0x05, 0x00]);
        assert_eq!(
            encoded(&Value::IpAddress([10, 0, 0, 1])),
            [0x40, 0x04, 10, 0, 0, 1]
        );
        assert_eq!(encoded(&Value::Counter32(1)), [0x41, 0x01, 0x01]);
        assert_eq!(encoded(&Value::Gauge32(128)), [0x42, 0x02, 0x00, 0x80]);
        assert_eq!(encoded(&Value::TimeTicks(0)), [0x43, 0x01, 0x00]);
        assert_eq!(encoded(&Value::Opaque(Bytes::from_static(&[0xAA]))), [0x44, 0x01, 0xAA]);
        assert_eq!(encoded(&Value::Counter64(1)), [0x46, 0x01, 0x01]);
        assert_eq!(encoded(&Value::NoSuchObject), [0x80, 0x00]);
        assert_eq!(encoded(&Value::NoSuchInstance), [0x81, 0x00]);
        assert_eq!(encoded(&Value::EndOfMibView), [0x82, 0x00]);
    }

    #[test]
    fn test_roundtrip_each_kind() {
        let values = [
            Value::Integer(i32::MIN),
            Value::Integer(-1),
            Value::Integer(i32::MAX),
            Value::OctetString(Bytes::new()),
            Value::OctetString(Bytes::from_static(&[0x00, 0xFF, 0x80])),
            Value::Null,
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 8072)),
            Value::IpAddress([255, 255, 255, 255]),
            Value::Counter32(u32::MAX),
            Value::Gauge32(0),
            Value::TimeTicks(123_456),
            Value::Opaque(Bytes::from_static(b"\x9f\x78\x04")),
            Value::Counter64(u64::MAX),
            Value::NoSuchObject,
            Value::NoSuchInstance,
            Value::EndOfMibView,
        ];
        for value in values {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn test_unknown_tag_preserved() {
        let mut decoder = Decoder::from_slice(&[0x47, 0x02, 0xAB, 0xCD]);
        let value = Value::decode(&mut decoder).unwrap();
        assert_eq!(
            value,
            Value::Unknown {
                tag: 0x47,
                data: Bytes::from_static(&[0xAB, 0xCD])
            }
        );
        assert_eq!(encoded(&value), [0x47, 0x02, 0xAB, 0xCD]);
    }

    #[test]
    fn test_bad_ip_length_rejected() {
        let mut decoder = Decoder::from_slice(&[0x40, 0x03, 1, 2, 3]);
        assert!(matches!(
            Value::decode(&mut decoder),
            Err(Error::MalformedPdu {
                kind: DecodeErrorKind::InvalidIpAddressLength { length: 3 },
                ..
            })
        ));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Integer(5).as_u32(), Some(5));
        assert_eq!(Value::Integer(-5).as_u32(), None);
        assert_eq!(Value::TimeTicks(9).as_u64(), Some(9));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(
            Value::IpAddress([192, 0, 2, 1]).as_ip(),
            Some("192.0.2.1".parse().unwrap())
        );
        assert!(!Value::Null.is_exception());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("test").to_string(), "test");
        assert_eq!(
            Value::OctetString(Bytes::from_static(&[0xff, 0x00])).to_string(),
            "0xff00"
        );
        assert_eq!(Value::IpAddress([10, 1, 2, 3]).to_string(), "10.1.2.3");
        assert_eq!(Value::TimeTicks(8_640_000 + 366_100).to_string(), "1d 1h 1m 1s");
        assert_eq!(Value::EndOfMibView.to_string(), "endOfMibView");
    }
}
