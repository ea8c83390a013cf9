//! SNMPv3 header fields and scoped PDU (RFC 3412 Section 6).

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;

/// msgMaxSize lower bound (RFC 3412 HeaderData).
pub const MSG_MAX_SIZE_MINIMUM: i32 = 484;

/// SNMPv3 security model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecurityModel {
    /// User-based Security Model (RFC 3414)
    Usm = 3,
}

impl SecurityModel {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Usm),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// SNMPv3 security level, ordered from least to most secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SecurityLevel {
    #[default]
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    /// Decode the auth/priv bits of msgFlags. Privacy without
    /// authentication is not a valid level.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    /// Encode to msgFlags bits (without the reportable flag).
    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, Self::AuthNoPriv | Self::AuthPriv)
    }

    pub fn requires_priv(self) -> bool {
        matches!(self, Self::AuthPriv)
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NoAuthNoPriv => "noAuthNoPriv",
            Self::AuthNoPriv => "authNoPriv",
            Self::AuthPriv => "authPriv",
        })
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "noauthnopriv" | "noauth" => Ok(Self::NoAuthNoPriv),
            "authnopriv" | "auth" => Ok(Self::AuthNoPriv),
            "authpriv" | "priv" => Ok(Self::AuthPriv),
            _ => Err(Error::Config(format!("unknown security level {:?}", s))),
        }
    }
}

/// msgFlags (RFC 3412 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub security_level: SecurityLevel,
    /// The receiver may answer with a Report PDU.
    pub reportable: bool,
}

impl MsgFlags {
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    /// Decode a msgFlags octet; `at` is its offset for error reporting.
    pub fn from_byte(byte: u8, at: usize) -> Result<Self> {
        let Some(security_level) = SecurityLevel::from_flags(byte) else {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, byte }, "privacy flag without authentication");
            return Err(Error::decode(at, DecodeErrorKind::InvalidMsgFlags));
        };
        Ok(Self {
            security_level,
            reportable: byte & 0x04 != 0,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut flags = self.security_level.to_flags();
        if self.reportable {
            flags |= 0x04;
        }
        flags
    }
}

/// msgGlobalData header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgGlobalData {
    pub msg_id: i32,
    /// Largest message the sender can accept.
    pub msg_max_size: i32,
    pub msg_flags: MsgFlags,
    pub msg_security_model: SecurityModel,
}

impl MsgGlobalData {
    pub fn new(msg_id: i32, msg_max_size: i32, msg_flags: MsgFlags) -> Self {
        Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model: SecurityModel::Usm,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.msg_security_model.as_i32());
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_integer(self.msg_max_size);
            buf.push_integer(self.msg_id);
        });
    }

    /// Decode and range-check msgID, msgMaxSize, msgFlags and the model.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;

        let at = seq.offset();
        let msg_id = seq.read_integer()?;
        if msg_id < 0 {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, msg_id }, "negative msgID");
            return Err(Error::decode(at, DecodeErrorKind::NegativeCounter { value: msg_id }));
        }

        let at = seq.offset();
        let msg_max_size = seq.read_integer()?;
        if msg_max_size < MSG_MAX_SIZE_MINIMUM {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, msg_max_size }, "msgMaxSize below minimum");
            return Err(Error::decode(
                at,
                DecodeErrorKind::MsgMaxSizeTooSmall {
                    value: msg_max_size,
                    minimum: MSG_MAX_SIZE_MINIMUM,
                },
            ));
        }

        let at = seq.offset();
        let flags = seq.read_octet_string()?;
        let [byte] = flags[..] else {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, length = flags.len() }, "msgFlags must be one octet");
            return Err(Error::decode(at, DecodeErrorKind::InvalidMsgFlags));
        };
        let msg_flags = MsgFlags::from_byte(byte, at)?;

        let at = seq.offset();
        let raw_model = seq.read_integer()?;
        let Some(msg_security_model) = SecurityModel::from_i32(raw_model) else {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, model = raw_model }, "unknown security model");
            return Err(Error::decode(at, DecodeErrorKind::UnknownSecurityModel(raw_model)));
        };
        seq.expect_end()?;

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        })
    }
}

/// ScopedPDU: contextEngineID, contextName and the PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPdu {
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub pdu: Pdu,
}

impl ScopedPdu {
    pub fn new(context_engine_id: impl Into<Bytes>, context_name: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: context_name.into(),
            pdu,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode_body(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode(&mut buf);
        buf.finish()
    }

    /// Decode one ScopedPDU SEQUENCE. Bytes after it (DES padding) are
    /// left in `decoder`.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = Pdu::decode_body(&mut seq, Version::V3, Bytes::new())?;
        seq.expect_end()?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn test_security_level_flags() {
        assert_eq!(SecurityLevel::AuthPriv.to_flags(), 0x03);
        assert_eq!(SecurityLevel::from_flags(0x01), Some(SecurityLevel::AuthNoPriv));
        assert_eq!(SecurityLevel::from_flags(0x02), None);
        assert!(SecurityLevel::AuthPriv > SecurityLevel::AuthNoPriv);
    }

    #[test]
    fn test_msg_flags_reportable() {
        let flags = MsgFlags::new(SecurityLevel::AuthNoPriv, true);
        assert_eq!(flags.to_byte(), 0x05);
        assert_eq!(MsgFlags::from_byte(0x05, 0).unwrap(), flags);
        assert!(matches!(
            MsgFlags::from_byte(0x06, 7),
            Err(Error::MalformedPdu {
                offset: 7,
                kind: DecodeErrorKind::InvalidMsgFlags
            })
        ));
    }

    #[test]
    fn test_global_data_roundtrip() {
        let global = MsgGlobalData::new(42, 65507, MsgFlags::new(SecurityLevel::AuthPriv, false));
        let mut buf = EncodeBuf::new();
        global.encode(&mut buf);
        let decoded = MsgGlobalData::decode(&mut Decoder::new(buf.finish())).unwrap();
        assert_eq!(decoded, global);
    }

    #[test]
    fn test_global_data_rejects_small_max_size() {
        let global = MsgGlobalData::new(1, 483, MsgFlags::new(SecurityLevel::NoAuthNoPriv, true));
        let mut buf = EncodeBuf::new();
        global.encode(&mut buf);
        assert!(matches!(
            MsgGlobalData::decode(&mut Decoder::new(buf.finish())),
            Err(Error::MalformedPdu {
                kind: DecodeErrorKind::MsgMaxSizeTooSmall { value: 483, minimum: 484 },
                ..
            })
        ));
    }

    #[test]
    fn test_global_data_rejects_unknown_model() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_integer(2);
            buf.push_octet_string(&[0x04]);
            buf.push_integer(1500);
            buf.push_integer(1);
        });
        assert!(matches!(
            MsgGlobalData::decode(&mut Decoder::new(buf.finish())),
            Err(Error::MalformedPdu {
                kind: DecodeErrorKind::UnknownSecurityModel(2),
                ..
            })
        ));
    }

    #[test]
    fn test_scoped_pdu_ignores_trailing_padding() {
        let pdu = Pdu::get_request(Version::V3, "", &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
        let scoped = ScopedPdu::new(&b"engine"[..], Bytes::new(), pdu);
        let mut padded = scoped.to_bytes().to_vec();
        padded.extend_from_slice(&[0, 0, 0]);
        let decoded = ScopedPdu::decode(&mut Decoder::new(Bytes::from(padded))).unwrap();
        assert_eq!(decoded, scoped);
    }
}
