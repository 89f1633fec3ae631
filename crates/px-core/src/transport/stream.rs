//! TCP stream transport
//!
//! Uses TCP on localhost for cross-platform compatibility. One JSON envelope
//! per line in each direction. The connection is opened lazily on the first
//! send and re-opened on the next send after it breaks.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::{Transport, INBOUND_CHANNEL_CAPACITY};
use crate::error::{TransportError, TransportErrorKind};
use px_protocol::{EnvelopeCodec, InboundEnvelope, OutboundEnvelope, ProtocolError};

/// Transport that talks to the backend controller over TCP
pub struct StreamTransport {
    address: String,
    max_frame_length: usize,
    /// Feeds the inbound listener; shared by every connection's reader
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    /// Current connection, if any
    connection: Mutex<Option<Connection>>,
    /// Stops reader tasks on shutdown
    cancel: CancellationToken,
}

/// One established connection
struct Connection {
    sink: FramedWrite<OwnedWriteHalf, EnvelopeCodec<OutboundEnvelope>>,
    /// Cancelled when the reader stops or the connection is dropped
    closed: CancellationToken,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl StreamTransport {
    /// Create a transport for `address` and the receiver for its responses
    ///
    /// No connection is made until the first envelope is sent.
    pub fn new(
        address: impl Into<String>,
        max_frame_length: usize,
    ) -> (Self, mpsc::Receiver<InboundEnvelope>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let transport = Self {
            address: address.into(),
            max_frame_length,
            inbound_tx,
            connection: Mutex::new(None),
            cancel: CancellationToken::new(),
        };

        (transport, inbound_rx)
    }

    /// Backend address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the current connection and refuse further sends
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.connection.lock().await.take();
    }

    async fn connect(&self) -> Result<Connection, TransportError> {
        tracing::debug!("Connecting to backend at {}", self.address);

        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let closed = self.cancel.child_token();

        let reader = FramedRead::new(
            read_half,
            EnvelopeCodec::<InboundEnvelope>::with_max_length(self.max_frame_length),
        );
        tokio::spawn(read_loop(reader, self.inbound_tx.clone(), closed.clone()));

        tracing::info!("Connected to backend at {}", self.address);

        Ok(Connection {
            sink: FramedWrite::new(
                write_half,
                EnvelopeCodec::<OutboundEnvelope>::with_max_length(self.max_frame_length),
            ),
            closed,
        })
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::new(
                TransportErrorKind::Closed,
                "transport shut down",
            ));
        }

        let mut guard = self.connection.lock().await;

        let mut conn = match guard.take() {
            Some(conn) if !conn.closed.is_cancelled() => conn,
            stale => {
                if stale.is_some() {
                    tracing::debug!("Previous backend connection closed, reconnecting");
                }
                self.connect().await?
            }
        };

        // Held outside the slot while writing, so a send abandoned mid-frame
        // drops the connection instead of leaving a partial line behind
        match conn.sink.send(envelope).await {
            Ok(()) => {
                *guard = Some(conn);
                Ok(())
            }
            Err(ProtocolError::Io(e)) => {
                tracing::warn!("Write to backend failed: {}", e);
                Err(TransportError::severed(e.to_string()))
            }
            Err(e) => {
                *guard = Some(conn);
                Err(e.into())
            }
        }
    }
}

/// Decode inbound envelopes until the connection ends
async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, EnvelopeCodec<InboundEnvelope>>,
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,

            frame = reader.next() => {
                match frame {
                    Some(Ok(envelope)) => {
                        if inbound_tx.send(envelope).await.is_err() {
                            tracing::debug!("Inbound listener gone, stopping reader");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Dropping backend connection after read error: {}", e);
                        break;
                    }
                    None => {
                        tracing::info!("Backend closed the connection");
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_protocol::{RequestId, Verb, DEFAULT_MAX_FRAME_LENGTH};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_refused_connection_is_not_ready() {
        // Bind then drop to obtain a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (transport, _inbound) = StreamTransport::new(address, DEFAULT_MAX_FRAME_LENGTH);
        let err = transport
            .send(OutboundEnvelope::new(RequestId::new(1), Verb::Get, "/version"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::NotReady);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_closed() {
        let (transport, _inbound) = StreamTransport::new("127.0.0.1:9", DEFAULT_MAX_FRAME_LENGTH);
        transport.shutdown().await;

        let err = transport
            .send(OutboundEnvelope::new(RequestId::new(1), Verb::Get, "/version"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Closed);
    }
}
