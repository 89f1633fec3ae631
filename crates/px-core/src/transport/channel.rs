//! In-process channel transport

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Transport;
use crate::error::TransportError;
use px_protocol::{InboundEnvelope, OutboundEnvelope};

/// Transport backed by a pair of tokio channels
///
/// Used when the backend runs in the same process, and by tests that script
/// the backend side.
#[derive(Clone)]
pub struct ChannelTransport {
    outbound: mpsc::Sender<OutboundEnvelope>,
}

/// The backend's view of a [`ChannelTransport`]
pub struct BackendEndpoint {
    /// Requests sent by the client
    pub requests: mpsc::Receiver<OutboundEnvelope>,
    /// Responses delivered to the client's inbound listener
    pub responses: mpsc::Sender<InboundEnvelope>,
}

impl ChannelTransport {
    /// Create a connected transport, its inbound receiver and the backend end
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<InboundEnvelope>, BackendEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

        let transport = Self {
            outbound: outbound_tx,
        };
        let backend = BackendEndpoint {
            requests: outbound_rx,
            responses: inbound_tx,
        };

        (transport, inbound_rx, backend)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| TransportError::severed("backend channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use px_protocol::{RequestId, Verb};

    #[tokio::test]
    async fn test_envelopes_flow_both_ways() {
        let (transport, mut inbound, mut backend) = ChannelTransport::pair(4);

        transport
            .send(OutboundEnvelope::new(RequestId::new(1), Verb::Get, "/version"))
            .await
            .unwrap();

        let request = backend.requests.recv().await.unwrap();
        assert_eq!(request.path, "/version");

        backend
            .responses
            .send(InboundEnvelope::ok(request.request_id, "{}"))
            .await
            .unwrap();
        assert_eq!(inbound.recv().await.unwrap().request_id, RequestId::new(1));
    }

    #[tokio::test]
    async fn test_send_after_backend_dropped_is_severed() {
        let (transport, _inbound, backend) = ChannelTransport::pair(4);
        drop(backend);

        let err = transport
            .send(OutboundEnvelope::new(RequestId::new(1), Verb::Get, "/version"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Severed);
    }
}
