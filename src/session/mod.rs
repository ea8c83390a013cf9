//! Request/response correlation.
//!
//! A [`Session`] serializes a PDU, hands it to its [`Transport`] and waits
//! for the matching [`Completion`]. At most one request is in flight per
//! session; a concurrent [`Session::send`] fails fast with
//! [`Error::RequestInFlight`] instead of queueing.
//!
//! For SNMPv3 the session also discovers the authoritative engine, derives
//! the localized keys and keeps the engine clock in sync.
//!
//! ```rust,no_run
//! use snmp_wire::oid;
//! use snmp_wire::session::{Options, Session};
//!
//! # async fn example() -> snmp_wire::Result<()> {
//! let options = Options::new().with("community", "public")?.with("timeout", "2")?;
//! let session: Session = Session::open("192.0.2.1", 161, &options).await?;
//!
//! let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//! for vb in response.varbinds() {
//!     println!("{}", vb);
//! }
//! # Ok(())
//! # }
//! ```

mod options;

pub use options::{COMPLETION_GRACE, MAX_TIMEOUT, Options, SessionConfig};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{Span, instrument};

use crate::error::{AuthErrorKind, Error, Result};
use crate::format::hex;
use crate::message::{DEFAULT_MSG_MAX_SIZE, Message, MessageOptions};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::transport::{
    Completion, CompletionReceiver, Outcome, Transport, UdpTransport, completion_channel,
};
use crate::v3::{
    EngineState, UsmConfig, UsmKeys, UsmReport, UsmSecurityParams, report_kind, usm_stats,
};
use crate::varbind::VarBind;
use crate::version::Version;

/// Stand-in deadline when the wait budget does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Engine knowledge and keys for the configured USM user.
#[derive(Debug, Clone)]
struct UsmState {
    engine: EngineState,
    keys: Arc<UsmKeys>,
}

/// A client session to one agent.
pub struct Session<T: Transport = UdpTransport> {
    transport: T,
    config: SessionConfig,
    completions: tokio::sync::Mutex<CompletionReceiver>,
    /// Request id currently awaiting its completion.
    pending: Mutex<Option<i32>>,
    next_id: AtomicI32,
    usm: Mutex<Option<UsmState>>,
}

/// Clears the pending slot when the request resolves, however it resolves.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<i32>>,
}

impl SlotGuard<'_> {
    fn set(&self, request_id: i32) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(request_id);
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<T: Transport> Session<T> {
    /// Resolve `options`, look up `host` and open a transport to it.
    ///
    /// Option errors surface before any socket is created.
    pub async fn open(host: &str, port: u16, options: &Options) -> Result<Self> {
        let config = options.resolve()?;
        let target = resolve_target(host, port).await?;
        let (tx, rx) = completion_channel();
        let transport = T::open(target, &config.transport_settings(), tx).await?;
        Self::new(transport, rx, config)
    }

    /// Wire an already opened transport and its completion channel into a
    /// session.
    ///
    /// With a configured engine id the v3 keys are localized here and
    /// discovery is skipped.
    pub fn new(
        transport: T,
        completions: CompletionReceiver,
        config: SessionConfig,
    ) -> Result<Self> {
        let usm = match (config.version, &config.usm) {
            (Version::V3, None) => {
                return Err(Error::Config("SNMPv3 requires a username".into()));
            }
            (Version::V3, Some(usm)) => {
                usm.validate()?;
                match &config.engine_id {
                    Some(engine_id) => Some(UsmState {
                        engine: EngineState::new(engine_id.clone(), 0, 0),
                        keys: Arc::new(usm.localize(engine_id)?),
                    }),
                    None => None,
                }
            }
            _ => None,
        };

        tracing::debug!(target: "snmp_wire::session", {
            snmp.target = %transport.peer_addr(),
            snmp.version = %config.version,
            snmp.security_level = %config.security_level(),
        }, "session opened");

        Ok(Self {
            transport,
            config,
            completions: tokio::sync::Mutex::new(completions),
            pending: Mutex::new(None),
            next_id: AtomicI32::new(initial_request_id()),
            usm: Mutex::new(usm),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.transport.peer_addr()
    }

    /// Request id of the outstanding request, if any.
    pub fn pending_request(&self) -> Option<i32> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authoritative engine id learned by discovery or configuration.
    pub fn engine_id(&self) -> Option<Bytes> {
        self.usm_state().map(|state| state.engine.engine_id)
    }

    /// Close the transport. Later sends fail with [`Error::Send`].
    pub fn close(&self) {
        tracing::debug!(target: "snmp_wire::session", { snmp.target = %self.peer_addr() }, "closing session");
        self.transport.close();
    }

    /// GetRequest for `oids` using the session's version and community.
    pub async fn get(&self, oids: &[Oid]) -> Result<Pdu> {
        self.send(Pdu::get_request(self.config.version, self.config.community.clone(), oids))
            .await
    }

    pub async fn get_next(&self, oids: &[Oid]) -> Result<Pdu> {
        self.send(Pdu::get_next_request(
            self.config.version,
            self.config.community.clone(),
            oids,
        ))
        .await
    }

    pub async fn get_bulk(
        &self,
        non_repeaters: i32,
        max_repetitions: i32,
        oids: &[Oid],
    ) -> Result<Pdu> {
        self.send(Pdu::get_bulk(
            self.config.version,
            self.config.community.clone(),
            non_repeaters,
            max_repetitions,
            oids,
        ))
        .await
    }

    pub async fn set(&self, varbinds: Vec<VarBind>) -> Result<Pdu> {
        self.send(Pdu::set_request(
            self.config.version,
            self.config.community.clone(),
            varbinds,
        ))
        .await
    }

    /// Send `pdu` and wait for its response.
    ///
    /// The session assigns the request id. The response is returned as
    /// decoded; checking its error status is up to the caller.
    #[instrument(
        level = "debug",
        skip(self, pdu),
        fields(
            snmp.target = %self.peer_addr(),
            snmp.pdu = %pdu.kind(),
            snmp.request_id = tracing::field::Empty,
        )
    )]
    pub async fn send(&self, mut pdu: Pdu) -> Result<Pdu> {
        if pdu.version() != self.config.version {
            return Err(Error::VersionMismatch {
                expected: self.config.version,
                actual: pdu.version(),
            });
        }
        pdu.validate()?;

        let request_id = self.next_request_id();
        let slot = self.claim(request_id)?;
        Span::current().record("snmp.request_id", request_id);
        pdu.set_request_id(request_id);

        match self.config.version {
            Version::V3 => self.send_v3(pdu, &slot).await,
            Version::V1 | Version::V2c => self.send_community(pdu).await,
        }
    }

    fn claim(&self, request_id: i32) -> Result<SlotGuard<'_>> {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = *slot {
            tracing::debug!(target: "snmp_wire::session", { snmp.request_id = in_flight }, "rejecting send while a request is in flight");
            return Err(Error::RequestInFlight {
                request_id: in_flight,
            });
        }
        *slot = Some(request_id);
        Ok(SlotGuard {
            slot: &self.pending,
        })
    }

    /// Positive ids only; wraps back to 1.
    fn next_request_id(&self) -> i32 {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= i32::MAX { 1 } else { id + 1 })
            })
            .unwrap_or_else(|id| id)
    }

    fn usm_state(&self) -> Option<UsmState> {
        self.usm.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store_usm_state(&self, state: Option<UsmState>) {
        *self.usm.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn send_community(&self, pdu: Pdu) -> Result<Pdu> {
        let request_id = pdu.request_id();
        let data = pdu.to_bytes()?;
        tracing::trace!(target: "snmp_wire::session", {
            snmp.request_id = request_id,
            snmp.bytes = data.len(),
            data = %hex::Bytes(&data),
        }, "sending request");

        self.round_trip(request_id, data, |bytes| {
            let response = Pdu::decode(bytes)?;
            if response.request_id() != request_id {
                tracing::warn!(target: "snmp_wire::session", {
                    snmp.request_id = request_id,
                    received = response.request_id(),
                }, "ignoring response with stale request id");
                return Ok(None);
            }
            Ok(Some(response))
        })
        .await
    }

    async fn send_v3(&self, mut pdu: Pdu, slot: &SlotGuard<'_>) -> Result<Pdu> {
        let usm = self
            .config
            .usm
            .as_ref()
            .ok_or_else(|| Error::Config("SNMPv3 requires a username".into()))?;
        let level = usm.level();

        let mut state = match self.usm_state() {
            Some(state) => state,
            None => {
                let state = self.discover(usm).await?;
                self.store_usm_state(Some(state.clone()));
                state
            }
        };

        let mut request_id = pdu.request_id();
        let mut resynced = false;
        loop {
            let options = MessageOptions {
                level,
                reportable: true,
                msg_max_size: i32::try_from(self.config.max_message_size)
                    .unwrap_or(DEFAULT_MSG_MAX_SIZE),
                security: UsmSecurityParams::new(
                    state.engine.engine_id.clone(),
                    state.engine.engine_boots,
                    state.engine.estimated_time(),
                    usm.username.clone(),
                ),
                context_engine_id: Bytes::new(),
                context_name: self.config.context_name.clone(),
                keys: Some(Arc::clone(&state.keys)),
            };
            let data = Message::build(pdu.clone(), &options)?.to_bytes()?;
            tracing::trace!(target: "snmp_wire::session", {
                snmp.msg_id = request_id,
                snmp.bytes = data.len(),
                snmp.security_level = %level,
            }, "sending v3 request");

            let keys = Arc::clone(&state.keys);
            let response = self
                .round_trip(request_id, data, |bytes| {
                    let message = Message::decode(bytes, Some(&*keys))?;
                    if message.msg_id() != request_id {
                        return Ok(None);
                    }
                    let is_report = report_kind(message.pdu()).is_some();
                    if !is_report && message.pdu().request_id() != request_id {
                        tracing::warn!(target: "snmp_wire::session", {
                            snmp.request_id = request_id,
                            received = message.pdu().request_id(),
                        }, "ignoring v3 response with stale request id");
                        return Ok(None);
                    }
                    Ok(Some(message))
                })
                .await?;

            let params = response.security_params();
            if let Some((kind, oid)) = report_kind(response.pdu()) {
                match kind {
                    UsmReport::NotInTimeWindow if !resynced => {
                        state
                            .engine
                            .resync(params.engine_boots, params.engine_time);
                        self.store_usm_state(Some(state.clone()));
                        resynced = true;
                        request_id = self.next_request_id();
                        slot.set(request_id);
                        pdu.set_request_id(request_id);
                        Span::current().record("snmp.request_id", request_id);
                        continue;
                    }
                    UsmReport::UnknownEngineId => {
                        // Force rediscovery on the next request.
                        self.store_usm_state(None);
                    }
                    _ => {}
                }
                tracing::debug!(target: "snmp_wire::session", { snmp.request_id = request_id, report = %oid }, "agent answered with a Report");
                return Err(Error::Report { oid });
            }

            if response.security_level() < level {
                tracing::debug!(target: "snmp_wire::session", {
                    snmp.request_id = request_id,
                    requested = %level,
                    received = %response.security_level(),
                }, "response security level below request");
                return Err(Error::auth(AuthErrorKind::SecurityLevelDowngrade));
            }

            if level.requires_auth()
                && state
                    .engine
                    .update_time(params.engine_boots, params.engine_time)
            {
                self.store_usm_state(Some(state));
            }
            return Ok(response.into_pdu());
        }
    }

    /// Learn the authoritative engine and localize the user's keys.
    #[instrument(
        level = "debug",
        skip(self, usm),
        fields(snmp.target = %self.peer_addr(), snmp.msg_id = tracing::field::Empty)
    )]
    async fn discover(&self, usm: &UsmConfig) -> Result<UsmState> {
        let msg_id = self.next_request_id();
        Span::current().record("snmp.msg_id", msg_id);
        let data = Message::discovery(msg_id).to_bytes()?;

        let report = self
            .round_trip(msg_id, data, |bytes| {
                let message = Message::parse(bytes)?;
                Ok((message.msg_id() == msg_id).then_some(message))
            })
            .await?;

        let Some(engine) = EngineState::from_discovery(report.security_params()) else {
            let oid = report_kind(report.pdu())
                .map_or_else(usm_stats::unknown_engine_ids, |(_, oid)| oid);
            return Err(Error::Report { oid });
        };
        tracing::debug!(target: "snmp_wire::session", {
            snmp.engine_id = %hex::Bytes(&engine.engine_id),
            snmp.engine_boots = engine.engine_boots,
            snmp.engine_time = engine.engine_time,
        }, "discovered engine");

        let keys = Arc::new(usm.localize(&engine.engine_id)?);
        Ok(UsmState { engine, keys })
    }

    /// Send `data` and wait for the completion carrying `request_id`.
    ///
    /// `accept` decodes a successful completion; `Ok(None)` marks it stale
    /// and keeps waiting.
    async fn round_trip<R>(
        &self,
        request_id: i32,
        data: Bytes,
        mut accept: impl FnMut(Bytes) -> Result<Option<R>>,
    ) -> Result<R> {
        let mut completions = self.completions.lock().await;
        while let Ok(stale) = completions.try_recv() {
            log_stale(&stale, request_id);
        }

        self.transport.async_send(data, request_id).await?;

        let budget = self.config.wait_budget();
        let now = tokio::time::Instant::now();
        let deadline = now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE);
        loop {
            let completion = match tokio::time::timeout_at(deadline, completions.recv()).await {
                Ok(Some(completion)) => completion,
                Ok(None) => {
                    tracing::debug!(target: "snmp_wire::session", { snmp.request_id = request_id }, "completion channel closed");
                    return Err(Error::NotificationChannelClosed { request_id });
                }
                Err(_) => {
                    tracing::debug!(target: "snmp_wire::session", { snmp.request_id = request_id }, "no completion within the wait budget");
                    return Err(Error::Timeout {
                        target: Some(self.peer_addr()),
                        elapsed: budget,
                        request_id,
                    });
                }
            };

            if completion.request_id != request_id {
                log_stale(&completion, request_id);
                continue;
            }
            match completion.outcome {
                Outcome::Success(bytes) => {
                    tracing::trace!(target: "snmp_wire::session", {
                        snmp.request_id = request_id,
                        snmp.bytes = bytes.len(),
                    }, "received response");
                    if let Some(response) = accept(bytes)? {
                        return Ok(response);
                    }
                }
                Outcome::Timeout => {
                    return Err(Error::Timeout {
                        target: Some(self.peer_addr()),
                        elapsed: self.config.transport_settings().deadline(),
                        request_id,
                    });
                }
                Outcome::SendFailed => {
                    return Err(Error::Send {
                        request_id,
                        source: None,
                    });
                }
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.peer_addr())
            .field("version", &self.config.version)
            .field("pending", &self.pending_request())
            .finish_non_exhaustive()
    }
}

fn log_stale(completion: &Completion, expected: i32) {
    tracing::warn!(target: "snmp_wire::session", {
        snmp.request_id = completion.request_id,
        expected,
    }, "ignoring stale completion");
}

async fn resolve_target(host: &str, port: u16) -> Result<SocketAddr> {
    let connection_failed = |source| Error::ConnectionFailed {
        target: format!("{}:{}", host, port),
        source,
    };
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(connection_failed)?;
    addrs.next().ok_or_else(|| {
        connection_failed(io::Error::new(
            io::ErrorKind::NotFound,
            "host resolved to no addresses",
        ))
    })
}

/// Random positive starting point for request ids.
fn initial_request_id() -> i32 {
    let mut seed = [0u8; 4];
    if let Err(e) = getrandom::fill(&mut seed) {
        tracing::warn!(target: "snmp_wire::session", { error = %e }, "no OS randomness for request ids");
        return 1;
    }
    // Leave headroom below i32::MAX before the first wrap.
    (i32::from_be_bytes(seed) & 0x3fff_ffff).max(1)
}
