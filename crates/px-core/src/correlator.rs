//! Request/response correlation
//!
//! The transport only moves envelopes; it does not pair a response with the
//! request that caused it, and responses for distinct requests may arrive in
//! any order. The [`RequestCorrelator`] restores pairing by explicit id:
//!
//! 1. [`RequestCorrelator::allocate`] registers a pending call under a fresh
//!    [`RequestId`] and returns a [`PendingResponse`] handle.
//! 2. The caller sends an envelope carrying that id.
//! 3. The single inbound listener hands every response to
//!    [`RequestCorrelator::dispatch`], which resolves the matching handle and
//!    removes the entry.
//!
//! A pending entry is removed exactly once: by a matching response, by
//! timeout, or by cancellation. Dropping an unresolved [`PendingResponse`]
//! counts as cancellation, so a late response for an abandoned call is
//! discarded as "unmatched" instead of resolving a slot nobody awaits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use px_protocol::{InboundEnvelope, RequestId};

/// Reason a [`PendingResponse`] finished without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// No response arrived within the given duration
    TimedOut(Duration),
    /// The pending entry was removed by someone else
    Cancelled,
}

/// A registered, not yet resolved call
struct PendingCall {
    /// Sequence number the id was derived from
    seq: u64,
    /// Single-assignment completion slot
    tx: oneshot::Sender<InboundEnvelope>,
    /// When the call was registered
    created_at: Instant,
}

/// Owner of the pending-call map
pub struct RequestCorrelator {
    /// Pending calls indexed by request ID
    pending: DashMap<RequestId, PendingCall>,
    /// Source of request ids
    next_seq: AtomicU64,
}

impl RequestCorrelator {
    /// Create a new correlator
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a new pending call under a fresh id
    ///
    /// The id is unique among currently pending calls. After the id space
    /// wraps, ids still held by an unresolved call are skipped.
    pub fn allocate(self: &Arc<Self>) -> PendingResponse {
        let (tx, rx) = oneshot::channel();

        loop {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let id = RequestId::from_sequence(seq);

            match self.pending.entry(id) {
                Entry::Occupied(_) => {
                    tracing::debug!(request_id = %id, "Request id still pending after wrap, skipping");
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(PendingCall {
                        seq,
                        tx,
                        created_at: Instant::now(),
                    });
                    tracing::trace!(request_id = %id, "Allocated request id");

                    return PendingResponse {
                        id,
                        seq,
                        rx,
                        correlator: Arc::clone(self),
                        settled: false,
                    };
                }
            }
        }
    }

    /// Resolve the pending call matching `envelope.request_id`
    ///
    /// Returns `true` if the envelope was delivered. Envelopes with no pending
    /// call are discarded; this is expected after a caller has timed out.
    pub fn dispatch(&self, envelope: InboundEnvelope) -> bool {
        let Some((id, call)) = self.pending.remove(&envelope.request_id) else {
            tracing::debug!(
                request_id = %envelope.request_id,
                success = envelope.success,
                "Discarding unmatched response"
            );
            return false;
        };

        let elapsed = call.created_at.elapsed();
        if call.tx.send(envelope).is_err() {
            tracing::debug!(request_id = %id, "Caller gone before response was delivered");
            return false;
        }

        tracing::trace!(request_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Resolved request");
        true
    }

    /// Remove a pending call without resolving it
    ///
    /// The waiter, if any, observes [`WaitError::Cancelled`].
    pub fn cancel(&self, id: RequestId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            tracing::debug!(request_id = %id, "Cancelled pending request");
        }
        removed
    }

    /// Remove every pending call, returning how many were removed
    pub fn cancel_all(&self) -> usize {
        let mut removed = 0;
        self.pending.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    /// Number of calls currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` is currently pending
    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Remove the entry only if it still belongs to the call that created it
    fn cancel_exact(&self, id: RequestId, seq: u64) -> bool {
        self.pending
            .remove_if(&id, |_, call| call.seq == seq)
            .is_some()
    }

    #[cfg(test)]
    fn set_next_sequence(&self, seq: u64) {
        self.next_seq.store(seq, Ordering::Relaxed);
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one pending call
///
/// Awaiting consumes the handle, so a call can be awaited at most once.
/// Dropping the handle before it resolves cancels the pending entry.
pub struct PendingResponse {
    id: RequestId,
    seq: u64,
    rx: oneshot::Receiver<InboundEnvelope>,
    correlator: Arc<RequestCorrelator>,
    settled: bool,
}

impl PendingResponse {
    /// The id allocated for this call
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the matching response with no deadline
    pub async fn wait(mut self) -> Result<InboundEnvelope, WaitError> {
        let result = (&mut self.rx).await;
        self.settled = true;
        result.map_err(|_| WaitError::Cancelled)
    }

    /// Wait for the matching response for at most `timeout`
    ///
    /// On expiry the pending entry is removed before returning, so a response
    /// arriving later is discarded by the correlator.
    pub async fn wait_timeout(mut self, timeout: Duration) -> Result<InboundEnvelope, WaitError> {
        let result = tokio::time::timeout(timeout, &mut self.rx).await;

        if result.is_err() {
            self.correlator.cancel_exact(self.id, self.seq);
        }
        self.settled = true;

        match result {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(WaitError::Cancelled),
            Err(_) => Err(WaitError::TimedOut(timeout)),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.settled && self.correlator.cancel_exact(self.id, self.seq) {
            tracing::debug!(request_id = %self.id, "Pending request abandoned");
        }
    }
}

/// Spawn the single inbound listener
pub fn spawn_inbound_listener(
    correlator: Arc<RequestCorrelator>,
    inbound: mpsc::Receiver<InboundEnvelope>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_inbound_listener(correlator, inbound, cancel))
}

/// Forward inbound envelopes to the correlator until the channel closes
///
/// The loop never waits on a particular request; each envelope costs one
/// map removal. When the listener stops, calls still pending can no longer
/// be answered and are cancelled.
pub async fn run_inbound_listener(
    correlator: Arc<RequestCorrelator>,
    mut inbound: mpsc::Receiver<InboundEnvelope>,
    cancel: CancellationToken,
) {
    tracing::debug!("Starting inbound listener");

    loop {
        tokio::select! {
            envelope = inbound.recv() => {
                match envelope {
                    Some(envelope) => {
                        correlator.dispatch(envelope);
                    }
                    None => {
                        tracing::info!("Inbound channel closed");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Inbound listener shutting down");
                break;
            }
        }
    }

    let abandoned = correlator.cancel_all();
    if abandoned > 0 {
        tracing::warn!("Inbound listener stopped with {} pending requests", abandoned);
    }
}
