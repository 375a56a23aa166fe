//! Channel-backed [`ProbeTransport`].
//!
//! The liveness loop hands each probe to this transport, which queues it for
//! the control-channel writer task.  Queuing keeps the probe round free of
//! socket I/O: a slow or stuck writer shows up as missed probes, not as a
//! stalled round.

use async_trait::async_trait;
use kvm_core::ClientId;
use tokio::sync::mpsc;

use crate::application::liveness::ProbeTransport;

/// A probe waiting to be written to a client's control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    pub client_id: ClientId,
    pub seq: u64,
}

/// [`ProbeTransport`] that forwards probes over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProbeTransport {
    tx: mpsc::Sender<ProbeRequest>,
}

impl ChannelProbeTransport {
    /// Creates the transport and the receiver the writer task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProbeRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ProbeTransport for ChannelProbeTransport {
    async fn send_probe(&self, client_id: ClientId, seq: u64) -> Result<(), String> {
        self.tx
            .try_send(ProbeRequest { client_id, seq })
            .map_err(|e| format!("probe queue: {e}"))
    }
}
