//! Property-based tests for the wire codec.
//!
//! Round-trip properties cover OIDs, values, varbinds, PDUs and SNMPv3
//! messages. Robustness properties feed arbitrary and truncated input to the
//! decoders, which must fail cleanly rather than panic.

use bytes::Bytes;
use proptest::prelude::*;
use snmp_wire::ber::{Decoder, EncodeBuf};
use snmp_wire::message::{Message, MessageOptions, SecurityLevel};
use snmp_wire::oid::Oid;
use snmp_wire::v3::UsmSecurityParams;
use snmp_wire::{Error, ErrorStatus, Pdu, PduKind, Value, VarBind, Version};

// =============================================================================
// Strategies
// =============================================================================

/// OIDs that survive BER.
///
/// - arc1 is 0, 1 or 2
/// - arc2 is at most 39 below arc1 2, and small enough that `80 + arc2`
///   fits in a u32 under it
/// - single-arc OIDs are excluded: they decode as two arcs
fn arb_oid() -> impl Strategy<Value = Oid> {
    prop_oneof![
        Just(Oid::empty()),
        (0u32..=2, prop::collection::vec(any::<u32>(), 1..=19)).prop_map(|(arc1, rest)| {
            let arc2 = if arc1 < 2 {
                rest[0] % 40
            } else {
                rest[0] % (u32::MAX - 80)
            };
            let mut arcs = vec![arc1, arc2];
            arcs.extend_from_slice(&rest[1..]);
            Oid::from_slice(&arcs)
        }),
    ]
}

/// OIDs that also survive dotted-string formatting (which rejects empty).
fn arb_nonempty_oid() -> impl Strategy<Value = Oid> {
    arb_oid().prop_filter("non-empty", |oid| !oid.is_empty())
}

fn arb_bytes() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=256).prop_map(Bytes::from)
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Integer),
        arb_bytes().prop_map(Value::OctetString),
        Just(Value::Null),
        arb_oid().prop_map(Value::ObjectIdentifier),
        any::<[u8; 4]>().prop_map(Value::IpAddress),
        any::<u32>().prop_map(Value::Counter32),
        any::<u32>().prop_map(Value::Gauge32),
        any::<u32>().prop_map(Value::TimeTicks),
        arb_bytes().prop_map(Value::Opaque),
        any::<u64>().prop_map(Value::Counter64),
        Just(Value::NoSuchObject),
        Just(Value::NoSuchInstance),
        Just(Value::EndOfMibView),
    ]
}

fn arb_varbind() -> impl Strategy<Value = VarBind> {
    (arb_oid(), arb_value()).prop_map(|(oid, value)| VarBind::new(oid, value))
}

fn arb_varbinds() -> impl Strategy<Value = Vec<VarBind>> {
    prop::collection::vec(arb_varbind(), 0..=10)
}

fn arb_kind() -> impl Strategy<Value = PduKind> {
    prop_oneof![
        Just(PduKind::GetRequest),
        Just(PduKind::GetNextRequest),
        Just(PduKind::SetRequest),
        Just(PduKind::InformRequest),
        Just(PduKind::Trap),
        (any::<i32>(), any::<i32>()).prop_map(|(non_repeaters, max_repetitions)| {
            PduKind::GetBulkRequest {
                non_repeaters,
                max_repetitions,
            }
        }),
        (any::<i32>(), any::<i32>()).prop_map(|(status, error_index)| PduKind::Response {
            error_status: ErrorStatus::from_i32(status),
            error_index,
        }),
        (any::<i32>(), any::<i32>()).prop_map(|(status, error_index)| PduKind::Report {
            error_status: ErrorStatus::from_i32(status),
            error_index,
        }),
    ]
}

fn arb_version() -> impl Strategy<Value = Version> {
    prop_oneof![Just(Version::V1), Just(Version::V2c), Just(Version::V3)]
}

fn arb_pdu() -> impl Strategy<Value = Pdu> {
    (
        arb_kind(),
        arb_version(),
        any::<i32>(),
        prop::collection::vec(any::<u8>(), 0..=32),
        arb_varbinds(),
    )
        .prop_map(|(kind, version, request_id, community, varbinds)| {
            let community = if version == Version::V3 {
                Bytes::new()
            } else {
                Bytes::from(community)
            };
            let mut pdu = Pdu::build(kind, version, request_id, community);
            for vb in varbinds {
                pdu.add_varbind(vb.oid, vb.value);
            }
            pdu
        })
}

/// A plaintext noAuthNoPriv v3 message; the msgID is the PDU's request id.
fn arb_message() -> impl Strategy<Value = Message> {
    (
        0..=i32::MAX,
        arb_varbinds(),
        prop::collection::vec(any::<u8>(), 5..=32),
        any::<u32>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..=32),
        any::<bool>(),
    )
        .prop_map(
            |(request_id, varbinds, engine_id, boots, time, user, reportable)| {
                let mut pdu = Pdu::build(PduKind::GetRequest, Version::V3, request_id, Bytes::new());
                for vb in varbinds {
                    pdu.add_varbind(vb.oid, vb.value);
                }
                let options = MessageOptions {
                    reportable,
                    security: UsmSecurityParams::new(engine_id, boots, time, user),
                    ..MessageOptions::default()
                };
                Message::build(pdu, &options).unwrap()
            },
        )
}

// =============================================================================
// Round trips
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn oid_ber_roundtrip(oid in arb_oid()) {
        let decoded = Oid::from_ber(&oid.to_ber()).unwrap();
        prop_assert_eq!(decoded, oid);
    }

    #[test]
    fn oid_display_parse_roundtrip(oid in arb_nonempty_oid()) {
        let text = oid.to_string();
        prop_assert_eq!(Oid::parse(&text).unwrap(), oid.clone());
        // net-snmp style leading dot
        prop_assert_eq!(Oid::parse(&format!(".{}", text)).unwrap(), oid);
    }

    #[test]
    fn oid_ordering_is_lexicographic(a in arb_oid(), b in arb_oid()) {
        prop_assert_eq!(a.cmp(&b), a.arcs().cmp(b.arcs()));
    }

    #[test]
    fn value_ber_roundtrip(value in arb_value()) {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        prop_assert_eq!(Value::decode(&mut decoder).unwrap(), value);
        prop_assert!(decoder.is_empty());
    }

    #[test]
    fn varbind_ber_roundtrip(varbind in arb_varbind()) {
        let mut buf = EncodeBuf::new();
        varbind.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        prop_assert_eq!(VarBind::decode(&mut decoder).unwrap(), varbind);
    }

    #[test]
    fn pdu_roundtrip(pdu in arb_pdu()) {
        let decoded = Pdu::decode(pdu.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(decoded, pdu);
    }

    #[test]
    fn message_roundtrip(message in arb_message()) {
        let bytes = message.to_bytes().unwrap();
        let parsed = Message::parse(bytes.clone()).unwrap();
        prop_assert_eq!(parsed.msg_id(), message.msg_id());
        prop_assert_eq!(parsed.security_params(), message.security_params());
        prop_assert_eq!(parsed.security_level(), SecurityLevel::NoAuthNoPriv);
        prop_assert_eq!(parsed.pdu(), message.pdu());
        // re-encoding is stable
        prop_assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn integer_minimal_encoding(value: i32) {
        let mut buf = EncodeBuf::new();
        buf.push_integer(value);
        let bytes = buf.finish();
        // tag, length, 1..=4 content octets
        prop_assert!(bytes.len() >= 3 && bytes.len() <= 6);
        if bytes.len() > 3 {
            let (first, second) = (bytes[2], bytes[3]);
            prop_assert!(!(first == 0x00 && second & 0x80 == 0));
            prop_assert!(!(first == 0xff && second & 0x80 != 0));
        }
        prop_assert_eq!(Decoder::new(bytes).read_integer().unwrap(), value);
    }

    #[test]
    fn wide_integer_decodes_exactly_or_fails(value: i64) {
        let octets = value.to_be_bytes();
        let mut start = 0;
        while start < 7
            && ((octets[start] == 0x00 && octets[start + 1] & 0x80 == 0)
                || (octets[start] == 0xFF && octets[start + 1] & 0x80 != 0))
        {
            start += 1;
        }
        let mut data = vec![0x02, (8 - start) as u8];
        data.extend_from_slice(&octets[start..]);

        let decoded = Decoder::new(Bytes::from(data)).read_integer();
        match i32::try_from(value) {
            Ok(expected) => prop_assert_eq!(decoded.unwrap(), expected),
            Err(_) => prop_assert!(decoded.is_err()),
        }
    }
}

// =============================================================================
// Robustness
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1024))]

    #[test]
    fn pdu_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..=512)) {
        let _ = Pdu::decode(Bytes::from(data));
    }

    #[test]
    fn message_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..=512)) {
        let _ = Message::parse(Bytes::from(data));
    }

    #[test]
    fn oid_from_ber_never_panics(data in prop::collection::vec(any::<u8>(), 0..=64)) {
        let _ = Oid::from_ber(&data);
    }

    #[test]
    fn oid_parse_never_panics(text in "[0-9.]{0,40}") {
        let _ = Oid::parse(&text);
    }

    #[test]
    fn truncated_pdu_is_malformed(pdu in arb_pdu(), cut in any::<prop::sample::Index>()) {
        let bytes = pdu.to_bytes().unwrap();
        let len = cut.index(bytes.len());
        match Pdu::decode(bytes.slice(..len)) {
            Err(Error::MalformedPdu { offset, .. }) => prop_assert!(offset <= len),
            other => prop_assert!(false, "expected MalformedPdu, got {:?}", other),
        }
    }

    #[test]
    fn truncated_message_fails(message in arb_message(), cut in any::<prop::sample::Index>()) {
        let bytes = message.to_bytes().unwrap();
        let len = cut.index(bytes.len());
        prop_assert!(Message::parse(bytes.slice(..len)).is_err());
    }

    #[test]
    fn trailing_bytes_rejected(pdu in arb_pdu(), extra in prop::collection::vec(any::<u8>(), 1..=8)) {
        let mut data = pdu.to_bytes().unwrap().to_vec();
        data.extend_from_slice(&extra);
        prop_assert!(Pdu::decode(Bytes::from(data)).is_err());
    }
}

// =============================================================================
// Boundaries
// =============================================================================

#[test]
fn integer_boundary_values() {
    for value in [0, 1, -1, 127, 128, -128, -129, 255, 256, i32::MIN, i32::MAX] {
        let mut buf = EncodeBuf::new();
        buf.push_integer(value);
        assert_eq!(
            Decoder::new(buf.finish()).read_integer().unwrap(),
            value,
            "value {}",
            value
        );
    }
}

#[test]
fn counter64_boundary_values() {
    for value in [0, 1, 127, 128, u32::MAX as u64, u64::MAX - 1, u64::MAX] {
        let mut buf = EncodeBuf::new();
        Value::Counter64(value).encode(&mut buf);
        let decoded = Value::decode(&mut Decoder::new(buf.finish())).unwrap();
        assert_eq!(decoded, Value::Counter64(value));
    }
}

#[test]
fn oid_max_second_arc_under_two() {
    let oid = Oid::from_slice(&[2, u32::MAX - 80, 1]);
    assert_eq!(Oid::from_ber(&oid.to_ber()).unwrap(), oid);
}

#[test]
fn empty_input_is_malformed() {
    assert!(matches!(
        Pdu::decode(Bytes::new()),
        Err(Error::MalformedPdu { offset: 0, .. })
    ));
}
