//! Bounded-retry call path
//!
//! [`RetryingCaller`] turns one logical controller call into
//! allocate → send → await-with-timeout → classify, repeated up to the
//! configured attempt budget for transport failures only.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::correlator::{RequestCorrelator, WaitError};
use crate::error::{CallError, TransportError, TransportErrorKind};
use crate::policy::{CallPolicy, OperationClass};
use crate::transport::Transport;
use px_protocol::{FailureKind, InboundEnvelope, OutboundEnvelope, RequestId, Verb};

/// Verb, path and body of a call, without a request id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Verb semantics
    pub verb: Verb,
    /// Resource path, including any query string
    pub path: String,
    /// Optional JSON body
    pub body: Option<String>,
}

impl ApiRequest {
    /// Create a request
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            body: None,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Verb::Get, path)
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Verb::Delete, path)
    }

    /// POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Verb::Post, path)
    }

    /// PUT request with a JSON body
    pub fn put(path: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Verb::Put, path).with_json(body)
    }

    /// PATCH request with a JSON body
    pub fn patch(path: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Verb::Patch, path).with_json(body)
    }

    /// Attach a JSON body
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Build the envelope for one attempt
    pub fn envelope(&self, request_id: RequestId) -> OutboundEnvelope {
        OutboundEnvelope {
            request_id,
            verb: self.verb,
            path: self.path.clone(),
            body: self.body.clone(),
        }
    }
}

/// Executes calls with per-class timeouts and bounded retries
pub struct RetryingCaller {
    correlator: Arc<RequestCorrelator>,
    transport: Arc<dyn Transport>,
    policy: CallPolicy,
}

impl RetryingCaller {
    /// Create a caller over a shared correlator and transport
    pub fn new(
        correlator: Arc<RequestCorrelator>,
        transport: Arc<dyn Transport>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            correlator,
            transport,
            policy,
        }
    }

    /// The shared correlator
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// Active call policy
    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Call and return the raw response body
    pub async fn call(
        &self,
        class: OperationClass,
        request: &ApiRequest,
    ) -> Result<String, CallError> {
        self.call_with(class, request, Ok).await
    }

    /// Call and decode the response body as JSON
    ///
    /// A body that fails to decode counts as a transport failure and is
    /// retried like one.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        class: OperationClass,
        request: &ApiRequest,
    ) -> Result<T, CallError> {
        self.call_with(class, request, |body| decode_body(&request.path, &body))
            .await
    }

    /// Call and convert the body with `decode`, retrying transport failures
    pub async fn call_with<T, F>(
        &self,
        class: OperationClass,
        request: &ApiRequest,
        decode: F,
    ) -> Result<T, CallError>
    where
        F: Fn(String) -> Result<T, CallError>,
    {
        let timeout = self.policy.tier_timeout(class);
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let result = self
                .attempt_once(request, timeout)
                .await
                .and_then(&decode);

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        verb = %request.verb,
                        path = %request.path,
                        %class,
                        attempt,
                        max_attempts,
                        "Controller call failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(self.policy.backoff()).await;
                    attempt += 1;
                }
                Err(err) => {
                    log_final_failure(request, class, attempt, &err);
                    return Err(err);
                }
            }
        }
    }

    /// One allocate/send/await cycle with an explicit timeout
    ///
    /// The timeout covers the send as well as the wait, so a backend that
    /// stops reading still yields `TimedOut`. Never retries. Used directly
    /// by the readiness probe, which runs its own polling schedule.
    pub async fn attempt_once(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<String, CallError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || CallError::TimedOut {
            path: request.path.clone(),
            after: timeout,
        };

        let pending = self.correlator.allocate();
        let request_id = pending.id();

        tracing::trace!(%request_id, verb = %request.verb, path = %request.path, "Sending request");

        // On failure `pending` is dropped, which removes the entry
        match tokio::time::timeout_at(deadline, self.transport.send(request.envelope(request_id)))
            .await
        {
            Ok(sent) => sent?,
            Err(_) => {
                tracing::debug!(%request_id, path = %request.path, "Send did not complete before the deadline");
                return Err(timed_out());
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let response = match pending.wait_timeout(remaining).await {
            Ok(response) => response,
            Err(WaitError::TimedOut(_)) => return Err(timed_out()),
            Err(WaitError::Cancelled) => {
                return Err(CallError::Transport(TransportError::new(
                    TransportErrorKind::Closed,
                    "pending request cancelled before a response arrived",
                )))
            }
        };

        classify_response(response)
    }
}

/// Map an inbound envelope onto the call taxonomy
fn classify_response(response: InboundEnvelope) -> Result<String, CallError> {
    if !response.success {
        let message = response
            .error_message
            .unwrap_or_else(|| "request rejected by backend".to_string());

        return Err(match response.failure {
            Some(FailureKind::NotReady) => CallError::BackendNotReady(message),
            Some(FailureKind::Transport) => CallError::Transport(TransportError::severed(message)),
            None => CallError::BackendRejected {
                status: response.status_code,
                message,
            },
        });
    }

    if !response.is_success_status() {
        let status = response.status_code;
        return Err(CallError::BackendRejected {
            status,
            message: response
                .error_message
                .unwrap_or_else(|| format!("HTTP {}", status)),
        });
    }

    Ok(response.body)
}

/// Decode a JSON response body
fn decode_body<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, CallError> {
    serde_json::from_str(body).map_err(|e| {
        CallError::Transport(TransportError::decode(format!(
            "invalid response body for {}: {}",
            path, e
        )))
    })
}

fn log_final_failure(request: &ApiRequest, class: OperationClass, attempts: u32, err: &CallError) {
    match err {
        // Normal during backend cold start
        CallError::BackendNotReady(_) => {
            tracing::debug!(verb = %request.verb, path = %request.path, "Backend not ready: {}", err);
        }
        CallError::Validation(_) => {}
        _ => {
            tracing::error!(
                verb = %request.verb,
                path = %request.path,
                %class,
                attempts,
                "Controller call failed: {}",
                err
            );
        }
    }
}
