//! Authoritative engine discovery and time tracking (RFC 3414 Section 4).
//!
//! A secured request must carry the agent's engine id, boots and an engine
//! time inside its 150 second window. The client learns them from the
//! Report answering an empty noAuthNoPriv request, then estimates the current
//! time from the local clock. A usmStatsNotInTimeWindows Report carries
//! fresh values and triggers a resync.

use bytes::Bytes;
use tokio::time::Instant;

use crate::oid::Oid;
use crate::pdu::{Pdu, PduKind};
use crate::v3::UsmSecurityParams;

/// Maximum snmpEngineTime (RFC 3414 Section 2.2.1).
pub const MAX_ENGINE_TIME: u32 = 2_147_483_647;

/// usmStats counters an agent returns in Report PDUs (RFC 3414 Section 5).
pub mod usm_stats {
    use crate::oid::Oid;

    pub const PREFIX: [u32; 9] = [1, 3, 6, 1, 6, 3, 15, 1, 1];

    pub fn unsupported_sec_levels() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 1, 0)
    }

    pub fn not_in_time_windows() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 2, 0)
    }

    pub fn unknown_user_names() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 3, 0)
    }

    pub fn unknown_engine_ids() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0)
    }

    pub fn wrong_digests() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 5, 0)
    }

    pub fn decryption_errors() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 6, 0)
    }
}

/// Which usmStats counter a Report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsmReport {
    UnsupportedSecLevel,
    NotInTimeWindow,
    UnknownUserName,
    UnknownEngineId,
    WrongDigest,
    DecryptionError,
    /// Some other counter, e.g. from snmpMPDStats.
    Other,
}

/// Classify a Report PDU by its first varbind.
///
/// Returns `None` for anything that is not a Report.
pub fn report_kind(pdu: &Pdu) -> Option<(UsmReport, Oid)> {
    if !matches!(pdu.kind(), PduKind::Report { .. }) {
        return None;
    }
    let Some(vb) = pdu.varbinds().first() else {
        return Some((UsmReport::Other, Oid::empty()));
    };
    let arcs = vb.oid.arcs();
    let kind = match arcs {
        [p @ .., n, 0] if p == &usm_stats::PREFIX[..] => match *n {
            1 => UsmReport::UnsupportedSecLevel,
            2 => UsmReport::NotInTimeWindow,
            3 => UsmReport::UnknownUserName,
            4 => UsmReport::UnknownEngineId,
            5 => UsmReport::WrongDigest,
            6 => UsmReport::DecryptionError,
            _ => UsmReport::Other,
        },
        _ => UsmReport::Other,
    };
    Some((kind, vb.oid.clone()))
}

/// What the client knows about the authoritative engine.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    /// Engine time at `synced_at`.
    pub engine_time: u32,
    pub synced_at: Instant,
}

impl EngineState {
    pub fn new(engine_id: impl Into<Bytes>, engine_boots: u32, engine_time: u32) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            synced_at: Instant::now(),
        }
    }

    /// Take engine id, boots and time from a discovery Report.
    ///
    /// `None` if the agent left the engine id empty.
    pub fn from_discovery(params: &UsmSecurityParams) -> Option<Self> {
        if params.engine_id.is_empty() {
            tracing::debug!(target: "snmp_wire::v3", "discovery Report carried an empty engine id");
            return None;
        }
        Some(Self::new(
            params.engine_id.clone(),
            params.engine_boots,
            params.engine_time,
        ))
    }

    /// Synced engine time plus local elapsed seconds, capped at [`MAX_ENGINE_TIME`].
    pub fn estimated_time(&self) -> u32 {
        let elapsed = u32::try_from(self.synced_at.elapsed().as_secs()).unwrap_or(u32::MAX);
        self.engine_time
            .saturating_add(elapsed)
            .min(MAX_ENGINE_TIME)
    }

    /// Adopt boots/time from an authenticated message.
    ///
    /// Only moves forward: a higher boots value, or the same boots with a
    /// later time. Returns whether anything changed.
    pub fn update_time(&mut self, boots: u32, time: u32) -> bool {
        let newer = boots > self.engine_boots
            || (boots == self.engine_boots && time > self.estimated_time());
        if newer {
            self.engine_boots = boots;
            self.engine_time = time;
            self.synced_at = Instant::now();
        }
        newer
    }

    /// Unconditionally take boots/time from a notInTimeWindow Report.
    pub fn resync(&mut self, boots: u32, time: u32) {
        tracing::debug!(target: "snmp_wire::v3", {
            from_boots = self.engine_boots,
            to_boots = boots,
            to_time = time,
        }, "engine time resync");
        self.engine_boots = boots;
        self.engine_time = time;
        self.synced_at = Instant::now();
    }
}
