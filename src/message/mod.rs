//! SNMPv3 message envelope (RFC 3412, RFC 3414).
//!
//! ```text
//! SEQUENCE {
//!     INTEGER msgVersion (3)
//!     SEQUENCE msgGlobalData { msgID, msgMaxSize, msgFlags, msgSecurityModel }
//!     OCTET STRING msgSecurityParameters (USM SEQUENCE)
//!     msgData: ScopedPDU SEQUENCE, or OCTET STRING ciphertext under authPriv
//! }
//! ```
//!
//! A [`Message`] holds plaintext. Security is applied when it is serialized
//! with [`Message::to_bytes`] and removed when it is read with
//! [`Message::decode`].
//!
//! v1/v2c framing lives on [`Pdu`] itself.

mod v3;

pub use v3::{MSG_MAX_SIZE_MINIMUM, MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, SecurityModel};

use std::sync::Arc;

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{
    AuthErrorKind, CryptoErrorKind, DecodeErrorKind, EncodeErrorKind, Error, Result,
};
use crate::format::hex;
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::v3::{MAC_LEN, UsmKeys, UsmSecurityParams, auth};
use crate::value::Value;
use crate::version::Version;

/// Largest UDP payload over IPv4; the default msgMaxSize.
pub const DEFAULT_MSG_MAX_SIZE: i32 = 65507;

/// Inputs to [`Message::build`] besides the PDU.
#[derive(Debug, Clone)]
pub struct MessageOptions {
    pub level: SecurityLevel,
    pub reportable: bool,
    pub msg_max_size: i32,
    /// Authoritative engine id, boots and time plus user name. Auth and
    /// privacy parameters are filled in by [`Message::to_bytes`].
    pub security: UsmSecurityParams,
    /// Defaults to the authoritative engine id when empty.
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub keys: Option<Arc<UsmKeys>>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            level: SecurityLevel::NoAuthNoPriv,
            reportable: true,
            msg_max_size: DEFAULT_MSG_MAX_SIZE,
            security: UsmSecurityParams::empty(),
            context_engine_id: Bytes::new(),
            context_name: Bytes::new(),
            keys: None,
        }
    }
}

/// An SNMPv3 message with its scoped PDU in plaintext.
#[derive(Debug, Clone)]
pub struct Message {
    global: MsgGlobalData,
    security: UsmSecurityParams,
    scoped_pdu: ScopedPdu,
    keys: Option<Arc<UsmKeys>>,
}

enum MsgData {
    Plaintext(ScopedPdu),
    Encrypted(Bytes),
}

impl Message {
    /// Wrap a v3 PDU. The PDU's request id becomes the msgID.
    ///
    /// Fails with [`Error::Config`] when the level needs a key that
    /// `options.keys` does not hold.
    pub fn build(pdu: Pdu, options: &MessageOptions) -> Result<Self> {
        if pdu.version() != Version::V3 {
            return Err(Error::VersionMismatch {
                expected: Version::V3,
                actual: pdu.version(),
            });
        }
        let level = options.level;
        let keys_ok = match &options.keys {
            Some(keys) => keys.supports(level),
            None => !level.requires_auth(),
        };
        if !keys_ok {
            return Err(Error::Config(format!("{} requires localized USM keys", level)));
        }

        let context_engine_id = if options.context_engine_id.is_empty() {
            options.security.engine_id.clone()
        } else {
            options.context_engine_id.clone()
        };
        let mut security = options.security.clone();
        security.auth_params = Bytes::new();
        security.priv_params = Bytes::new();

        Ok(Self {
            global: MsgGlobalData::new(
                pdu.request_id(),
                options.msg_max_size,
                MsgFlags::new(level, options.reportable),
            ),
            security,
            scoped_pdu: ScopedPdu::new(context_engine_id, options.context_name.clone(), pdu),
            keys: options.keys.clone(),
        })
    }

    /// The RFC 3414 Section 4 discovery request: noAuthNoPriv, reportable,
    /// empty security parameters and an empty GetRequest.
    pub fn discovery(msg_id: i32) -> Self {
        let mut pdu = Pdu::get_request(Version::V3, Bytes::new(), &[]);
        pdu.set_request_id(msg_id);
        Self {
            global: MsgGlobalData::new(
                msg_id,
                DEFAULT_MSG_MAX_SIZE,
                MsgFlags::new(SecurityLevel::NoAuthNoPriv, true),
            ),
            security: UsmSecurityParams::empty(),
            scoped_pdu: ScopedPdu::new(Bytes::new(), Bytes::new(), pdu),
            keys: None,
        }
    }

    pub fn pdu(&self) -> &Pdu {
        &self.scoped_pdu.pdu
    }

    pub fn pdu_mut(&mut self) -> &mut Pdu {
        &mut self.scoped_pdu.pdu
    }

    pub fn into_pdu(self) -> Pdu {
        self.scoped_pdu.pdu
    }

    pub fn scoped_pdu(&self) -> &ScopedPdu {
        &self.scoped_pdu
    }

    /// Append a varbind to the wrapped PDU.
    pub fn add_varbind(&mut self, oid: Oid, value: Value) -> &mut Self {
        self.scoped_pdu.pdu.add_varbind(oid, value);
        self
    }

    pub fn msg_id(&self) -> i32 {
        self.global.msg_id
    }

    pub fn global_data(&self) -> &MsgGlobalData {
        &self.global
    }

    /// USM parameters as sent or received, including auth and priv params
    /// for decoded messages.
    pub fn security_params(&self) -> &UsmSecurityParams {
        &self.security
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.global.msg_flags.security_level
    }

    /// Serialize, encrypting the scoped PDU under authPriv and then
    /// authenticating the whole envelope under authNoPriv or authPriv.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.scoped_pdu.pdu.validate()?;
        let level = self.security_level();
        let keys = self.keys.as_deref();
        let mut security = self.security.clone();

        let data = if level.requires_priv() {
            let privacy = keys
                .and_then(|k| k.privacy.as_ref())
                .ok_or_else(|| Error::encode(EncodeErrorKind::NoPrivKey))?;
            let plaintext = self.scoped_pdu.to_bytes();
            let (ciphertext, salt) =
                privacy.encrypt(&plaintext, security.engine_boots, security.engine_time)?;
            security.priv_params = salt;
            MsgData::Encrypted(ciphertext)
        } else {
            MsgData::Plaintext(self.scoped_pdu.clone())
        };

        let auth_key = if level.requires_auth() {
            let key = keys
                .and_then(|k| k.auth.as_ref())
                .ok_or_else(|| Error::encode(EncodeErrorKind::MissingAuthKey))?;
            security = security.with_auth_placeholder(MAC_LEN);
            Some(key)
        } else {
            None
        };

        let encoded = encode_envelope(&self.global, &security, &data);
        let Some(key) = auth_key else {
            tracing::trace!(target: "snmp_wire::v3", { snmp.msg_id = self.global.msg_id, bytes = %hex::Bytes(&encoded) }, "encoded message");
            return Ok(encoded);
        };

        let (offset, _) = UsmSecurityParams::find_auth_params_offset(&encoded)
            .map_err(|_| Error::encode(EncodeErrorKind::MissingAuthParams))?;
        let mut signed = encoded.to_vec();
        auth::authenticate_message(key, &mut signed, offset)?;
        tracing::trace!(target: "snmp_wire::v3", { snmp.msg_id = self.global.msg_id, bytes = %hex::Bytes(&signed) }, "encoded message");
        Ok(Bytes::from(signed))
    }

    /// Parse, verify and decrypt an incoming message.
    ///
    /// The level is taken from the received msgFlags: the HMAC is checked
    /// when they say auth and the payload decrypted when they say priv.
    /// Callers compare [`security_level`](Self::security_level) against
    /// what they sent.
    pub fn decode(data: Bytes, keys: Option<&UsmKeys>) -> Result<Self> {
        let (global, security, msg_data) = decode_envelope(&data)?;
        let level = global.msg_flags.security_level;

        if level.requires_auth() {
            let key = keys.and_then(|k| k.auth.as_ref()).ok_or_else(|| {
                tracing::debug!(target: "snmp_wire::v3", { snmp.msg_id = global.msg_id }, "authenticated message but no auth key");
                Error::auth(AuthErrorKind::NoAuthKey)
            })?;
            let (offset, len) = UsmSecurityParams::find_auth_params_offset(&data)?;
            auth::verify_message(key, &data, offset, len)?;
        }

        let scoped_pdu = match msg_data {
            MsgData::Plaintext(scoped) => scoped,
            MsgData::Encrypted(ciphertext) => {
                let privacy = keys.and_then(|k| k.privacy.as_ref()).ok_or_else(|| {
                    tracing::debug!(target: "snmp_wire::v3", { snmp.msg_id = global.msg_id }, "encrypted message but no privacy key");
                    Error::decrypt(CryptoErrorKind::NoPrivKey)
                })?;
                let plaintext = privacy.decrypt(
                    &ciphertext,
                    security.engine_boots,
                    security.engine_time,
                    &security.priv_params,
                )?;
                // garbage from a wrong key surfaces as a decode failure
                ScopedPdu::decode(&mut Decoder::new(plaintext)).inspect_err(|_| {
                    tracing::debug!(target: "snmp_wire::v3", { snmp.msg_id = global.msg_id }, "decrypted payload is not a scoped PDU");
                })?
            }
        };

        Ok(Self {
            global,
            security,
            scoped_pdu,
            keys: None,
        })
    }

    /// Parse without any security processing.
    ///
    /// Used for discovery and time-window Reports, which are read before
    /// keys exist or to learn the values keys depend on. Encrypted messages
    /// fail with [`Error::DecryptionFailed`].
    pub fn parse(data: Bytes) -> Result<Self> {
        let (global, security, msg_data) = decode_envelope(&data)?;
        match msg_data {
            MsgData::Plaintext(scoped_pdu) => Ok(Self {
                global,
                security,
                scoped_pdu,
                keys: None,
            }),
            MsgData::Encrypted(_) => Err(Error::decrypt(CryptoErrorKind::NoPrivKey)),
        }
    }
}

fn encode_envelope(global: &MsgGlobalData, security: &UsmSecurityParams, data: &MsgData) -> Bytes {
    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        match data {
            MsgData::Plaintext(scoped) => scoped.encode(buf),
            MsgData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
        }
        let usm = security.encode();
        buf.push_octet_string(&usm);
        global.encode(buf);
        buf.push_integer(Version::V3.as_i32());
    });
    buf.finish()
}

fn decode_envelope(data: &Bytes) -> Result<(MsgGlobalData, UsmSecurityParams, MsgData)> {
    let mut decoder = Decoder::new(data.clone());
    let mut seq = decoder.read_sequence()?;

    let at = seq.offset();
    let version = seq.read_integer()?;
    if version != Version::V3.as_i32() {
        tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at, version }, "not an SNMPv3 message");
        return Err(Error::decode(at, DecodeErrorKind::UnknownVersion(version)));
    }

    let global = MsgGlobalData::decode(&mut seq)?;

    let len = seq.expect_tag(tag::universal::OCTET_STRING)?;
    let mut wrapper = seq.sub_decoder(len)?;
    let security = UsmSecurityParams::decode_from(&mut wrapper)?;
    wrapper.expect_end()?;

    let at = seq.offset();
    let encrypted = global.msg_flags.security_level.requires_priv();
    let msg_data = match (seq.peek_tag(), encrypted) {
        (Some(tag::universal::OCTET_STRING), true) => MsgData::Encrypted(seq.read_octet_string()?),
        (Some(tag::universal::SEQUENCE), false) => MsgData::Plaintext(ScopedPdu::decode(&mut seq)?),
        (Some(_), true) => {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at }, "privacy flag set but msgData is plaintext");
            return Err(Error::decode(at, DecodeErrorKind::ExpectedEncryption));
        }
        (Some(tag::universal::OCTET_STRING), false) => {
            tracing::debug!(target: "snmp_wire::v3", { snmp.offset = at }, "msgData encrypted without privacy flag");
            return Err(Error::decode(at, DecodeErrorKind::UnexpectedEncryption));
        }
        (_, false) => MsgData::Plaintext(ScopedPdu::decode(&mut seq)?),
        (None, true) => MsgData::Encrypted(seq.read_octet_string()?),
    };
    seq.expect_end()?;
    decoder.expect_end()?;

    Ok((global, security, msg_data))
}
