//! Scripted transport for tests.
//!
//! Each [`Transport::async_send`] consumes the next queued [`MockReply`]
//! (falling back to the default reply once the queue is empty) and records
//! the request. Completions are pushed onto the channel immediately, or
//! after the configured latency.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use super::{Completion, CompletionSender, Outcome, Transport, TransportSettings};
use crate::error::{Error, Result};

/// Builds a reply datagram from the recorded request. `None` means stay
/// silent.
pub type Responder = Arc<dyn Fn(&RecordedRequest) -> Option<Bytes> + Send + Sync>;

/// What the mock does with one request.
#[derive(Clone)]
pub enum MockReply {
    /// Complete with these bytes as-is.
    Data(Bytes),
    /// Complete with whatever the responder builds.
    Respond(Responder),
    /// Complete with [`Outcome::Timeout`].
    Timeout,
    /// Complete with [`Outcome::SendFailed`].
    SendFailed,
    /// Accept the request and never complete it.
    Silent,
    /// Fail `async_send` with [`Error::Send`].
    Reject,
    /// Deliver the inner reply's completion twice.
    Duplicate(Box<MockReply>),
}

impl MockReply {
    pub fn respond<F>(f: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Option<Bytes> + Send + Sync + 'static,
    {
        Self::Respond(Arc::new(f))
    }

    fn outcome(&self, request: &RecordedRequest) -> Option<Outcome> {
        match self {
            Self::Data(data) => Some(Outcome::Success(data.clone())),
            Self::Respond(f) => f(request).map(Outcome::Success),
            Self::Timeout => Some(Outcome::Timeout),
            Self::SendFailed => Some(Outcome::SendFailed),
            Self::Silent | Self::Reject => None,
            Self::Duplicate(inner) => inner.outcome(request),
        }
    }
}

impl fmt::Debug for MockReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            Self::Respond(_) => f.write_str("Respond(..)"),
            Self::Timeout => f.write_str("Timeout"),
            Self::SendFailed => f.write_str("SendFailed"),
            Self::Silent => f.write_str("Silent"),
            Self::Reject => f.write_str("Reject"),
            Self::Duplicate(inner) => f.debug_tuple("Duplicate").field(inner).finish(),
        }
    }
}

/// A request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub data: Bytes,
    pub request_id: i32,
}

#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    target: SocketAddr,
}

struct Inner {
    completions: CompletionSender,
    script: VecDeque<MockReply>,
    default_reply: MockReply,
    requests: Vec<RecordedRequest>,
    latency: Option<Duration>,
    closed: bool,
}

impl MockTransport {
    pub fn new(target: SocketAddr, completions: CompletionSender) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                completions,
                script: VecDeque::new(),
                default_reply: MockReply::Silent,
                requests: Vec::new(),
                latency: None,
                closed: false,
            })),
            target,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the reply for the next unscripted request.
    pub fn queue(&self, reply: MockReply) {
        self.lock().script.push_back(reply);
    }

    /// Queue raw response bytes.
    pub fn queue_data(&self, data: impl Into<Bytes>) {
        self.queue(MockReply::Data(data.into()));
    }

    /// Reply used once the script runs dry. Starts as [`MockReply::Silent`].
    pub fn set_default(&self, reply: MockReply) {
        self.lock().default_reply = reply;
    }

    /// Deliver completions after `latency` instead of immediately.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Push a completion that no request asked for.
    pub fn inject(&self, completion: Completion) {
        let _ = self.lock().completions.send(completion);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.lock().requests.last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Transport for MockTransport {
    async fn open(
        target: SocketAddr,
        _settings: &TransportSettings,
        completions: CompletionSender,
    ) -> Result<Self> {
        Ok(Self::new(target, completions))
    }

    async fn async_send(&self, data: Bytes, request_id: i32) -> Result<()> {
        let (reply, request, completions, latency) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(Error::Send {
                    request_id,
                    source: Some(io::Error::new(io::ErrorKind::NotConnected, "mock closed")),
                });
            }
            let reply = match inner.script.pop_front() {
                Some(reply) => reply,
                None => inner.default_reply.clone(),
            };
            let request = RecordedRequest { data, request_id };
            if matches!(reply, MockReply::Reject) {
                return Err(Error::Send {
                    request_id,
                    source: Some(io::Error::new(io::ErrorKind::ConnectionRefused, "mock rejected")),
                });
            }
            inner.requests.push(request.clone());
            (reply, request, inner.completions.clone(), inner.latency)
        };

        let Some(outcome) = reply.outcome(&request) else {
            return Ok(());
        };
        let copies = if matches!(reply, MockReply::Duplicate(_)) {
            2
        } else {
            1
        };
        let deliver = move || {
            for _ in 0..copies {
                let _ = completions.send(Completion {
                    request_id,
                    outcome: outcome.clone(),
                });
            }
        };
        match latency {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    deliver();
                });
            }
            None => deliver(),
        }
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.script.clear();
    }

    fn peer_addr(&self) -> SocketAddr {
        self.target
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::completion_channel;

    fn target() -> SocketAddr {
        "192.0.2.1:161".parse().unwrap()
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let (tx, mut rx) = completion_channel();
        let mock = MockTransport::new(target(), tx);
        mock.queue_data(&b"first"[..]);
        mock.set_default(MockReply::SendFailed);

        mock.async_send(Bytes::from_static(b"a"), 1).await.unwrap();
        mock.async_send(Bytes::from_static(b"b"), 2).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap().outcome,
            Outcome::Success(Bytes::from_static(b"first"))
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Completion {
                request_id: 2,
                outcome: Outcome::SendFailed
            }
        );
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let (tx, mut rx) = completion_channel();
        let mock = MockTransport::new(target(), tx);
        mock.queue(MockReply::respond(|req| {
            let mut echoed = req.data.to_vec();
            echoed.reverse();
            Some(Bytes::from(echoed))
        }));

        mock.async_send(Bytes::from_static(b"abc"), 3).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().outcome,
            Outcome::Success(Bytes::from_static(b"cba"))
        );
    }

    #[tokio::test]
    async fn test_reject_and_duplicate() {
        let (tx, mut rx) = completion_channel();
        let mock = MockTransport::new(target(), tx);
        mock.queue(MockReply::Reject);
        mock.queue(MockReply::Duplicate(Box::new(MockReply::Timeout)));

        assert!(matches!(
            mock.async_send(Bytes::new(), 4).await,
            Err(Error::Send { request_id: 4, .. })
        ));
        assert!(mock.requests().is_empty());

        mock.async_send(Bytes::new(), 5).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().request_id, 5);
        assert_eq!(rx.recv().await.unwrap().request_id, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_completion() {
        let (tx, mut rx) = completion_channel();
        let mock = MockTransport::new(target(), tx);
        mock.set_latency(Duration::from_millis(300));
        mock.queue(MockReply::Timeout);

        mock.async_send(Bytes::new(), 6).await.unwrap();
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(301)).await;
        assert_eq!(rx.recv().await.unwrap().outcome, Outcome::Timeout);
    }

    #[tokio::test]
    async fn test_closed_rejects() {
        let (tx, _rx) = completion_channel();
        let mock = MockTransport::new(target(), tx);
        mock.close();
        assert!(mock.is_closed());
        assert!(mock.async_send(Bytes::new(), 1).await.is_err());
    }
}
