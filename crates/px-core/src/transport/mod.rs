//! Transport seam between the correlation layer and the backend
//!
//! A transport only moves envelopes. Outbound envelopes go through
//! [`Transport::send`]; inbound envelopes are pushed into an
//! `mpsc::Receiver<InboundEnvelope>` that the transport hands out when it is
//! created and that is consumed by the single inbound listener.

mod channel;
mod stream;

pub use channel::{BackendEndpoint, ChannelTransport};
pub use stream::StreamTransport;

use async_trait::async_trait;

use crate::error::TransportError;
use px_protocol::OutboundEnvelope;

/// Default capacity of the inbound envelope channel
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Outbound half of a message channel to the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one envelope
    ///
    /// Returns once the envelope has been handed to the channel. A failure
    /// here means the request never left the client.
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError>;
}
