//! SNMP Protocol Data Units (PDUs).
//!
//! A [`Pdu`] carries everything the request/response exchange needs: the
//! protocol version, the community (v1/v2c), the request id, the kind-specific
//! header fields, and the ordered varbind list.
//!
//! ```
//! use snmp_wire::{Pdu, PduKind, Version, oid};
//!
//! let mut pdu = Pdu::build(PduKind::GetRequest, Version::V1, 16170, "public");
//! pdu.add_null(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));
//!
//! let bytes = pdu.to_bytes().unwrap();
//! assert_eq!(&bytes[..2], &[0x30, 0x27]);
//! assert_eq!(Pdu::decode(bytes).unwrap(), pdu);
//! ```

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};
use crate::version::Version;
use bytes::Bytes;

/// PDU kind, with the header fields meaningful to that kind.
///
/// The two INTEGER slots after request-id are shared on the wire: requests
/// send zeros, GetBulk repurposes them, and only Response/Report carry an
/// error status and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetNextRequest,
    GetBulkRequest {
        non_repeaters: i32,
        max_repetitions: i32,
    },
    SetRequest,
    Response {
        error_status: ErrorStatus,
        error_index: i32,
    },
    InformRequest,
    /// SNMPv2 trap.
    Trap,
    /// SNMPv3 Report (USM statistics, engine discovery).
    Report {
        error_status: ErrorStatus,
        error_index: i32,
    },
}

impl PduKind {
    /// A successful Response header.
    pub const RESPONSE: PduKind = PduKind::Response {
        error_status: ErrorStatus::NoError,
        error_index: 0,
    };

    /// The context-class constructed tag for this kind.
    pub fn tag(&self) -> u8 {
        match self {
            PduKind::GetRequest => tag::pdu::GET_REQUEST,
            PduKind::GetNextRequest => tag::pdu::GET_NEXT_REQUEST,
            PduKind::GetBulkRequest { .. } => tag::pdu::GET_BULK_REQUEST,
            PduKind::SetRequest => tag::pdu::SET_REQUEST,
            PduKind::Response { .. } => tag::pdu::RESPONSE,
            PduKind::InformRequest => tag::pdu::INFORM_REQUEST,
            PduKind::Trap => tag::pdu::TRAP,
            PduKind::Report { .. } => tag::pdu::REPORT,
        }
    }

    /// Rebuild a kind from its tag and the two header integers.
    fn from_wire(tag: u8, first: i32, second: i32) -> Option<Self> {
        let kind = match tag {
            tag::pdu::GET_REQUEST => PduKind::GetRequest,
            tag::pdu::GET_NEXT_REQUEST => PduKind::GetNextRequest,
            tag::pdu::GET_BULK_REQUEST => PduKind::GetBulkRequest {
                non_repeaters: first,
                max_repetitions: second,
            },
            tag::pdu::SET_REQUEST => PduKind::SetRequest,
            tag::pdu::RESPONSE => PduKind::Response {
                error_status: ErrorStatus::from_i32(first),
                error_index: second,
            },
            tag::pdu::INFORM_REQUEST => PduKind::InformRequest,
            tag::pdu::TRAP => PduKind::Trap,
            tag::pdu::REPORT => PduKind::Report {
                error_status: ErrorStatus::from_i32(first),
                error_index: second,
            },
            _ => return None,
        };
        Some(kind)
    }

    /// The two header integers as they go on the wire.
    fn wire_fields(&self) -> (i32, i32) {
        match *self {
            PduKind::GetBulkRequest {
                non_repeaters,
                max_repetitions,
            } => (non_repeaters, max_repetitions),
            PduKind::Response {
                error_status,
                error_index,
            }
            | PduKind::Report {
                error_status,
                error_index,
            } => (error_status.as_i32(), error_index),
            _ => (0, 0),
        }
    }

    /// Whether the agent is expected to answer this kind.
    pub fn is_confirmed(&self) -> bool {
        !matches!(
            self,
            PduKind::Response { .. } | PduKind::Trap | PduKind::Report { .. }
        )
    }
}

impl std::fmt::Display for PduKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PduKind::GetRequest => "GetRequest",
            PduKind::GetNextRequest => "GetNextRequest",
            PduKind::GetBulkRequest { .. } => "GetBulkRequest",
            PduKind::SetRequest => "SetRequest",
            PduKind::Response { .. } => "Response",
            PduKind::InformRequest => "InformRequest",
            PduKind::Trap => "Trap",
            PduKind::Report { .. } => "Report",
        })
    }
}

/// SNMP PDU plus its version/community framing.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    version: Version,
    community: Bytes,
    request_id: i32,
    kind: PduKind,
    varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Start an empty PDU of `kind`.
    ///
    /// The community is only serialized for v1/v2c; SNMPv3 PDUs ignore it.
    pub fn build(
        kind: PduKind,
        version: Version,
        request_id: i32,
        community: impl Into<Bytes>,
    ) -> Self {
        let community = if version.uses_community() {
            community.into()
        } else {
            Bytes::new()
        };
        Self {
            version,
            community,
            request_id,
            kind,
            varbinds: Vec::new(),
        }
    }

    /// GetRequest with a NULL varbind per OID.
    pub fn get_request(version: Version, community: impl Into<Bytes>, oids: &[Oid]) -> Self {
        Self::build(PduKind::GetRequest, version, 0, community).with_nulls(oids)
    }

    /// GetNextRequest with a NULL varbind per OID.
    pub fn get_next_request(version: Version, community: impl Into<Bytes>, oids: &[Oid]) -> Self {
        Self::build(PduKind::GetNextRequest, version, 0, community).with_nulls(oids)
    }

    /// SetRequest carrying `varbinds`.
    pub fn set_request(
        version: Version,
        community: impl Into<Bytes>,
        varbinds: Vec<VarBind>,
    ) -> Self {
        let mut pdu = Self::build(PduKind::SetRequest, version, 0, community);
        pdu.varbinds = varbinds;
        pdu
    }

    /// GetBulkRequest (v2c/v3 only).
    pub fn get_bulk(
        version: Version,
        community: impl Into<Bytes>,
        non_repeaters: i32,
        max_repetitions: i32,
        oids: &[Oid],
    ) -> Self {
        let kind = PduKind::GetBulkRequest {
            non_repeaters,
            max_repetitions,
        };
        Self::build(kind, version, 0, community).with_nulls(oids)
    }

    fn with_nulls(mut self, oids: &[Oid]) -> Self {
        self.varbinds.extend(oids.iter().cloned().map(VarBind::null));
        self
    }

    /// Append one binding.
    pub fn add_varbind(&mut self, oid: Oid, value: Value) -> &mut Self {
        self.varbinds.push(VarBind::new(oid, value));
        self
    }

    /// Append one binding with a NULL value.
    pub fn add_null(&mut self, oid: Oid) -> &mut Self {
        self.add_varbind(oid, Value::Null)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Community string; empty for SNMPv3.
    pub fn community(&self) -> &Bytes {
        &self.community
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn kind(&self) -> PduKind {
        self.kind
    }

    pub fn varbinds(&self) -> &[VarBind] {
        &self.varbinds
    }

    /// Consume the PDU, keeping only its varbinds.
    pub fn into_varbinds(self) -> Vec<VarBind> {
        self.varbinds
    }

    /// Error status of a Response or Report; `NoError` for every other kind.
    pub fn error_status(&self) -> ErrorStatus {
        match self.kind {
            PduKind::Response { error_status, .. } | PduKind::Report { error_status, .. } => {
                error_status
            }
            _ => ErrorStatus::NoError,
        }
    }

    /// Error index of a Response or Report; 0 for every other kind.
    pub fn error_index(&self) -> i32 {
        match self.kind {
            PduKind::Response { error_index, .. } | PduKind::Report { error_index, .. } => {
                error_index
            }
            _ => 0,
        }
    }

    /// Whether the agent reported an error status.
    pub fn is_error(&self) -> bool {
        self.error_status() != ErrorStatus::NoError
    }

    pub(crate) fn set_request_id(&mut self, request_id: i32) {
        self.request_id = request_id;
    }

    /// Check every OID the PDU would put on the wire, varbind names and
    /// OID values alike.
    pub fn validate(&self) -> Result<()> {
        for vb in &self.varbinds {
            let value_oid = match &vb.value {
                Value::ObjectIdentifier(oid) => Some(oid),
                _ => None,
            };
            for oid in std::iter::once(&vb.oid).chain(value_oid) {
                oid.validate().map_err(|e| match e {
                    Error::InvalidOid { kind, .. } => {
                        tracing::debug!(target: "snmp_wire::pdu", { snmp.request_id = self.request_id, %oid, %kind }, "refusing to encode OID");
                        Error::invalid_oid_with_input(kind, oid.to_string())
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    /// Serialize.
    ///
    /// v1/v2c produce a complete community message; v3 produces the bare PDU
    /// TLV that [`Message`](crate::message::Message) wraps. An OID that fails
    /// [`Oid::validate`] is an [`Error::InvalidOid`], since BER could not
    /// carry it faithfully.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.validate()?;
        let mut buf = EncodeBuf::new();
        if self.version.uses_community() {
            buf.push_sequence(|buf| {
                self.encode_body(buf);
                buf.push_octet_string(&self.community);
                buf.push_integer(self.version.as_i32());
            });
        } else {
            self.encode_body(&mut buf);
        }
        Ok(buf.finish())
    }

    /// Encode the PDU TLV (tag, request-id, header integers, varbinds).
    pub(crate) fn encode_body(&self, buf: &mut EncodeBuf) {
        let (first, second) = self.kind.wire_fields();
        buf.push_constructed(self.kind.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(second);
            buf.push_integer(first);
            buf.push_integer(self.request_id);
        });
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    ///
    /// A community message decodes with its version and community; a bare
    /// PDU TLV decodes as SNMPv3. Trailing bytes, an unknown version or PDU
    /// tag, and any BER violation fail with [`Error::MalformedPdu`].
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let pdu = match decoder.peek_tag() {
            Some(t) if tag::pdu::is_pdu(t) => {
                Self::decode_body(&mut decoder, Version::V3, Bytes::new())?
            }
            _ => Self::decode_community(&mut decoder)?,
        };
        decoder.expect_end()?;
        Ok(pdu)
    }

    fn decode_community(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let at = seq.offset();
        let raw = seq.read_integer()?;
        let version = match Version::from_i32(raw) {
            Some(Version::V3) => {
                tracing::debug!(target: "snmp_wire::pdu", { snmp.offset = at }, "v3 message passed to community decoder");
                return Err(Error::decode(at, DecodeErrorKind::CommunityV3));
            }
            Some(v) => v,
            None => {
                tracing::debug!(target: "snmp_wire::pdu", { snmp.offset = at, version = raw }, "unknown version");
                return Err(Error::decode(at, DecodeErrorKind::UnknownVersion(raw)));
            }
        };
        let community = seq.read_octet_string()?;
        let pdu = Self::decode_body(&mut seq, version, community)?;
        seq.expect_end()?;
        Ok(pdu)
    }

    /// Decode a PDU TLV with framing supplied by the caller.
    pub(crate) fn decode_body(
        decoder: &mut Decoder,
        version: Version,
        community: Bytes,
    ) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.read_tag()?;
        if !tag::pdu::is_pdu(tag) {
            tracing::debug!(target: "snmp_wire::pdu", { snmp.offset = at, tag }, "unknown PDU tag");
            return Err(Error::decode(at, DecodeErrorKind::UnknownPduType(tag)));
        }
        let len = decoder.read_length()?;
        let mut body = decoder.sub_decoder(len)?;

        let request_id = body.read_integer()?;
        let first = body.read_integer()?;
        let second = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;
        body.expect_end()?;

        // 0xA4 (v1 Trap) sits inside the tag range but has a different body
        let kind = PduKind::from_wire(tag, first, second)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;

        Ok(Pdu {
            version,
            community,
            request_id,
            kind,
            varbinds,
        })
    }
}
