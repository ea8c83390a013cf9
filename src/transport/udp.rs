//! UDP transport with per-request retransmission.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use super::{
    Completion, CompletionSender, Outcome, Transport, TransportSettings, extract_request_id,
};
use crate::error::{Error, Result};
use crate::message::MSG_MAX_SIZE_MINIMUM;
use crate::util::bind_ephemeral_udp_socket;

/// Connected UDP socket to one agent.
///
/// A background task reads datagrams and matches them to pending requests
/// by id. Each pending request owns a timer task that retransmits the
/// datagram every `timeout` and reports [`Outcome::Timeout`] once the
/// retries are spent. Dropping the transport closes it.
pub struct UdpTransport {
    inner: Arc<Inner>,
    recv_task: JoinHandle<()>,
}

struct Inner {
    socket: UdpSocket,
    target: SocketAddr,
    local_addr: SocketAddr,
    settings: TransportSettings,
    completions: CompletionSender,
    pending: Mutex<Option<HashMap<i32, JoinHandle<()>>>>,
}

impl Inner {
    /// Remove `request_id` from the pending table and report `outcome`.
    ///
    /// Returns false when the request was not pending (already completed,
    /// never sent, or the transport is closed).
    fn complete(&self, request_id: i32, outcome: Outcome) -> bool {
        let timer = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_mut().and_then(|p| p.remove(&request_id)) {
                Some(timer) => timer,
                None => return false,
            }
        };
        timer.abort();
        if self
            .completions
            .send(Completion {
                request_id,
                outcome,
            })
            .is_err()
        {
            tracing::debug!(target: "snmp_wire::transport::udp", { snmp.request_id = request_id }, "completion receiver gone");
        }
        true
    }

    fn is_pending(&self, request_id: i32) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| p.contains_key(&request_id))
    }

    fn shutdown(&self) {
        let drained = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pending) = drained {
            for timer in pending.into_values() {
                timer.abort();
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; self.settings.max_message_size.max(MSG_MAX_SIZE_MINIMUM as usize)];
        loop {
            let len = match self.socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(e) => {
                    // ICMP errors from a connected socket surface here
                    tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, error = %e }, "UDP recv error");
                    continue;
                }
            };
            let data = Bytes::copy_from_slice(&buf[..len]);
            let Some(request_id) = extract_request_id(&data) else {
                tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.bytes = len }, "dropping datagram without request id");
                continue;
            };
            if self.complete(request_id, Outcome::Success(data)) {
                tracing::trace!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.request_id = request_id, snmp.bytes = len }, "UDP response matched");
            } else {
                tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.request_id = request_id }, "dropping response with no pending request");
            }
        }
    }

    /// Retransmit until answered or out of retries.
    async fn retransmit(self: Arc<Self>, data: Bytes, request_id: i32) {
        let TransportSettings {
            timeout, retries, ..
        } = self.settings;
        for attempt in 1..=retries {
            tokio::time::sleep(timeout).await;
            if !self.is_pending(request_id) {
                return;
            }
            tracing::trace!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.request_id = request_id, attempt }, "UDP retransmit");
            if let Err(e) = self.socket.send(&data).await {
                tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.request_id = request_id, error = %e }, "UDP retransmit failed");
                self.complete(request_id, Outcome::SendFailed);
                return;
            }
        }
        tokio::time::sleep(timeout).await;
        if self.complete(request_id, Outcome::Timeout) {
            tracing::trace!(target: "snmp_wire::transport::udp", { snmp.target = %self.target, snmp.request_id = request_id, retries }, "UDP request timed out");
        }
    }
}

impl UdpTransport {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Number of requests awaiting a completion.
    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, HashMap::len)
    }
}

impl Transport for UdpTransport {
    async fn open(
        target: SocketAddr,
        settings: &TransportSettings,
        completions: CompletionSender,
    ) -> Result<Self> {
        tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %target }, "connecting UDP transport");

        let connection_failed = |source| Error::ConnectionFailed {
            target: target.to_string(),
            source,
        };
        let socket = bind_ephemeral_udp_socket(target)
            .await
            .map_err(connection_failed)?;
        socket.connect(target).await.map_err(connection_failed)?;
        let local_addr = socket.local_addr().map_err(connection_failed)?;

        tracing::debug!(target: "snmp_wire::transport::udp", {
            snmp.target = %target,
            snmp.local_addr = %local_addr,
        }, "UDP transport connected");

        let inner = Arc::new(Inner {
            socket,
            target,
            local_addr,
            settings: *settings,
            completions,
            pending: Mutex::new(Some(HashMap::new())),
        });
        let recv_task = tokio::spawn(Inner::receive_loop(Arc::clone(&inner)));
        Ok(Self { inner, recv_task })
    }

    async fn async_send(&self, data: Bytes, request_id: i32) -> Result<()> {
        tracing::trace!(target: "snmp_wire::transport::udp", {
            snmp.target = %self.inner.target,
            snmp.request_id = request_id,
            snmp.bytes = data.len(),
        }, "UDP send");

        // Register before sending so a fast reply always finds its entry.
        {
            let mut pending = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(pending) = pending.as_mut() else {
                return Err(Error::Send {
                    request_id,
                    source: None,
                });
            };
            let timer = tokio::spawn(Inner::retransmit(
                Arc::clone(&self.inner),
                data.clone(),
                request_id,
            ));
            if let Some(previous) = pending.insert(request_id, timer) {
                previous.abort();
            }
        }

        if let Err(e) = self.inner.socket.send(&data).await {
            let timer = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
                .and_then(|p| p.remove(&request_id));
            if let Some(timer) = timer {
                timer.abort();
            }
            return Err(Error::Send {
                request_id,
                source: Some(e),
            });
        }
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(target: "snmp_wire::transport::udp", { snmp.target = %self.inner.target }, "closing UDP transport");
        self.recv_task.abort();
        self.inner.shutdown();
    }

    fn peer_addr(&self) -> SocketAddr {
        self.inner.target
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("target", &self.inner.target)
            .field("local_addr", &self.inner.local_addr)
            .finish()
    }
}
