//! Shared test infrastructure: scripted agents behind the mock transport.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use snmp_wire::message::{Message, MessageOptions, SecurityLevel};
use snmp_wire::oid;
use snmp_wire::session::{Session, SessionConfig};
use snmp_wire::testing::{MockReply, MockTransport, RecordedRequest};
use snmp_wire::transport::completion_channel;
use snmp_wire::v3::{UsmConfig, UsmKeys, UsmSecurityParams, usm_stats};
use snmp_wire::{ErrorStatus, Oid, Pdu, PduKind, Value, Version};

pub const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x80\x5a\x1b\x00\x01";
pub const ENGINE_BOOTS: u32 = 7;
pub const ENGINE_TIME: u32 = 1200;
pub const USERNAME: &str = "wireuser";
pub const AUTH_PASSWORD: &str = "authpassword";
pub const PRIV_PASSWORD: &str = "privpassword";
/// RFC 3414 Section 3.2 step 7: 150 seconds either way.
pub const TIME_WINDOW: u32 = 150;

pub fn target() -> SocketAddr {
    "192.0.2.10:161".parse().unwrap()
}

pub fn sys_descr() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)
}

pub fn sys_uptime() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
}

/// Route `snmp_wire` events to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("snmp_wire=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A session over a fresh mock, plus a handle to the mock for scripting.
pub fn mock_session(config: SessionConfig) -> (Session<MockTransport>, MockTransport) {
    init_tracing();
    let (tx, rx) = completion_channel();
    let mock = MockTransport::new(target(), tx);
    let session = Session::new(mock.clone(), rx, config).unwrap();
    (session, mock)
}

/// Value an agent returns for `oid`.
pub fn value_for(oid: &Oid) -> Value {
    if *oid == sys_descr() {
        Value::OctetString(Bytes::from_static(b"snmp-wire test agent"))
    } else if *oid == sys_uptime() {
        Value::TimeTicks(4242)
    } else {
        Value::NoSuchObject
    }
}

/// v1/v2c agent: answers every request with a Response carrying its id.
pub fn community_agent() -> MockReply {
    MockReply::respond(|req| {
        let request = Pdu::decode(req.data.clone()).ok()?;
        community_response(&request).to_bytes().ok()
    })
}

pub fn community_response(request: &Pdu) -> Pdu {
    let mut response = Pdu::build(
        PduKind::RESPONSE,
        request.version(),
        request.request_id(),
        request.community().clone(),
    );
    for vb in request.varbinds() {
        response.add_varbind(vb.oid.clone(), value_for(&vb.oid));
    }
    response
}

pub fn usm_config(level: SecurityLevel, privacy: snmp_wire::PrivProtocol) -> UsmConfig {
    let usm = UsmConfig::new(USERNAME);
    if !level.requires_auth() {
        return usm;
    }
    let usm = usm
        .auth(snmp_wire::AuthProtocol::Sha1, AUTH_PASSWORD)
        .unwrap();
    if !level.requires_priv() {
        return usm;
    }
    usm.privacy(privacy, PRIV_PASSWORD).unwrap()
}

/// An authoritative SNMPv3 engine living inside a mock responder.
///
/// Answers discovery requests with an unknownEngineIDs Report, enforces the
/// time window on authenticated requests and otherwise echoes the
/// requested varbinds at the configured response level.
pub struct FakeEngine {
    keys: Arc<UsmKeys>,
    level: SecurityLevel,
    /// Keys used to secure responses; differs from `keys` to simulate a
    /// misconfigured agent.
    response_keys: Arc<UsmKeys>,
    /// Level the agent answers at.
    response_level: SecurityLevel,
    /// Answer the next secured request with usmStatsNotInTimeWindows even
    /// when its boots and time are in window.
    clock_skewed: AtomicBool,
    /// Answer secured requests with this usmStats Report.
    report: Option<Oid>,
    secured_requests: AtomicUsize,
}

impl FakeEngine {
    pub fn new(usm: &UsmConfig) -> Self {
        let keys = Arc::new(usm.localize(ENGINE_ID).unwrap());
        Self {
            response_keys: Arc::clone(&keys),
            keys,
            level: usm.level(),
            response_level: usm.level(),
            clock_skewed: AtomicBool::new(false),
            report: None,
            secured_requests: AtomicUsize::new(0),
        }
    }

    pub fn with_clock_skew(self) -> Self {
        self.clock_skewed.store(true, Ordering::Relaxed);
        self
    }

    pub fn with_report(mut self, oid: Oid) -> Self {
        self.report = Some(oid);
        self
    }

    pub fn with_response_level(mut self, level: SecurityLevel) -> Self {
        self.response_level = level;
        self
    }

    pub fn with_response_keys(mut self, usm: &UsmConfig) -> Self {
        self.response_keys = Arc::new(usm.localize(ENGINE_ID).unwrap());
        self
    }

    pub fn reply(self: Arc<Self>) -> MockReply {
        MockReply::respond(move |req| self.respond(req))
    }

    pub fn secured_requests(&self) -> usize {
        self.secured_requests.load(Ordering::Relaxed)
    }

    fn respond(&self, req: &RecordedRequest) -> Option<Bytes> {
        let request = Message::decode(req.data.clone(), Some(&*self.keys)).ok()?;
        let request_id = request.pdu().request_id();

        if request.security_params().engine_id.is_empty() {
            return self.report_message(
                request_id,
                usm_stats::unknown_engine_ids(),
                SecurityLevel::NoAuthNoPriv,
            );
        }

        self.secured_requests.fetch_add(1, Ordering::Relaxed);
        if let Some(oid) = &self.report {
            return self.report_message(request_id, oid.clone(), SecurityLevel::NoAuthNoPriv);
        }
        let params = request.security_params();
        let out_of_window = params.engine_boots != ENGINE_BOOTS
            || params.engine_time.abs_diff(ENGINE_TIME) > TIME_WINDOW;
        let skewed = self.clock_skewed.swap(false, Ordering::Relaxed);
        if self.level.requires_auth() && (out_of_window || skewed) {
            return self.report_message(
                request_id,
                usm_stats::not_in_time_windows(),
                SecurityLevel::AuthNoPriv,
            );
        }

        let mut response = Pdu::build(PduKind::RESPONSE, Version::V3, request_id, Bytes::new());
        for vb in request.pdu().varbinds() {
            response.add_varbind(vb.oid.clone(), value_for(&vb.oid));
        }
        self.encode(response, self.response_level, Arc::clone(&self.response_keys))
    }

    fn report_message(&self, request_id: i32, oid: Oid, level: SecurityLevel) -> Option<Bytes> {
        let mut report = Pdu::build(
            PduKind::Report {
                error_status: ErrorStatus::NoError,
                error_index: 0,
            },
            Version::V3,
            request_id,
            Bytes::new(),
        );
        report.add_varbind(oid, Value::Counter32(1));
        self.encode(report, level, Arc::clone(&self.keys))
    }

    fn encode(&self, pdu: Pdu, level: SecurityLevel, keys: Arc<UsmKeys>) -> Option<Bytes> {
        let username = if level.requires_auth() {
            keys.username.clone()
        } else {
            Bytes::new()
        };
        let options = MessageOptions {
            level,
            reportable: false,
            security: UsmSecurityParams::new(ENGINE_ID, ENGINE_BOOTS, ENGINE_TIME, username),
            keys: Some(keys),
            ..MessageOptions::default()
        };
        Message::build(pdu, &options).ok()?.to_bytes().ok()
    }
}

pub fn v3_config(usm: UsmConfig) -> SessionConfig {
    SessionConfig::v3(usm)
}
