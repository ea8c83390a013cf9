//! Transport provider contract.
//!
//! A transport moves encoded messages to one agent and reports what
//! happened to each request asynchronously: every accepted
//! [`Transport::async_send`] eventually yields exactly one [`Completion`]
//! on the channel handed to [`Transport::open`], unless the transport is
//! closed first. Retransmission is the transport's business; the session
//! only sees the final outcome.

mod udp;

#[cfg(any(test, feature = "testing"))]
mod mock;

pub use udp::UdpTransport;

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockReply, MockTransport, RecordedRequest, Responder};

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::ber::{Decoder, tag};
use crate::error::Result;

/// What became of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A datagram carrying the request's id arrived.
    Success(Bytes),
    /// Every attempt went unanswered.
    Timeout,
    /// A retransmission could not be sent.
    SendFailed,
}

/// A transport notification, keyed by request id (msgID for SNMPv3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: i32,
    pub outcome: Outcome,
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// Create the channel a transport reports completions on.
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Per-transport timing and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Wait per attempt.
    pub timeout: Duration,
    /// Retransmissions after the first attempt.
    pub retries: u32,
    /// Receive buffer size.
    pub max_message_size: usize,
}

impl TransportSettings {
    /// Time from the first send until a silent request is reported as
    /// [`Outcome::Timeout`].
    pub fn deadline(&self) -> Duration {
        self.timeout.saturating_mul(self.retries.saturating_add(1))
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 1,
            max_message_size: 65507,
        }
    }
}

/// Client-side transport to a single agent.
pub trait Transport: Send + Sync + Sized + 'static {
    /// Establish a handle to `target`. Failure is
    /// [`Error::ConnectionFailed`](crate::Error::ConnectionFailed).
    fn open(
        target: SocketAddr,
        settings: &TransportSettings,
        completions: CompletionSender,
    ) -> impl Future<Output = Result<Self>> + Send;

    /// Queue `data` for delivery. An immediate rejection is
    /// [`Error::Send`](crate::Error::Send) and produces no completion.
    fn async_send(&self, data: Bytes, request_id: i32) -> impl Future<Output = Result<()>> + Send;

    /// Stop receiving and drop every pending request without completing it.
    fn close(&self);

    fn peer_addr(&self) -> SocketAddr;
}

/// Pull the correlation id out of an encoded message: msgID for SNMPv3,
/// the PDU request-id for v1/v2c.
pub(crate) fn extract_request_id(data: &Bytes) -> Option<i32> {
    let mut decoder = Decoder::new(data.clone());
    let mut message = decoder.read_sequence().ok()?;
    let version = message.read_integer().ok()?;
    if version == 3 {
        let mut global = message.read_sequence().ok()?;
        return global.read_integer().ok();
    }
    message.read_octet_string().ok()?;
    let pdu_tag = message.read_tag().ok()?;
    if !tag::pdu::is_pdu(pdu_tag) {
        return None;
    }
    let len = message.read_length().ok()?;
    let mut body = message.sub_decoder(len).ok()?;
    body.read_integer().ok()
}
