//! Envelope types for the controller channel
//!
//! Every call is carried by exactly one [`OutboundEnvelope`]; the backend
//! answers with one [`InboundEnvelope`] bearing the same [`RequestId`].
//! The request id is the only correlation key. Responses for distinct
//! requests may arrive in any order.
//!
//! # Example
//!
//! ```
//! use px_protocol::{OutboundEnvelope, RequestId, Verb};
//!
//! let env = OutboundEnvelope::new(RequestId::new(3), Verb::Patch, "/configs")
//!     .with_body(r#"{"mode":"global"}"#);
//! assert_eq!(env.verb.as_str(), "PATCH");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request_id::RequestId;

/// HTTP-like verb semantics of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// Read a resource
    Get,
    /// Trigger an action on a resource
    Post,
    /// Replace a resource
    Put,
    /// Merge into a resource
    Patch,
    /// Delete a resource
    Delete,
}

impl Verb {
    /// Uppercase method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request sent from the control plane to the backend
///
/// Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Correlation key
    pub request_id: RequestId,
    /// Verb semantics
    pub verb: Verb,
    /// Target resource path, including any query string
    pub path: String,
    /// Optional request body (JSON text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl OutboundEnvelope {
    /// Create an envelope without a body
    pub fn new(request_id: RequestId, verb: Verb, path: impl Into<String>) -> Self {
        Self {
            request_id,
            verb,
            path: path.into(),
            body: None,
        }
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Typed category of a failure the backend relays instead of answering
///
/// Set by a sidecar that forwards requests to the core when the forward
/// itself failed, so the client never has to inspect `error_message` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The core's endpoint does not exist yet
    NotReady,
    /// The link to the core broke while forwarding
    Transport,
}

/// Response delivered from the backend to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Correlation key, copied from the request
    pub request_id: RequestId,
    /// Whether the backend handled the request
    pub success: bool,
    /// HTTP status reported by the controller, 0 if the request never reached it
    #[serde(default)]
    pub status_code: u16,
    /// Error detail when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set when the request failed before reaching the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Opaque payload, decoded by the caller
    #[serde(default)]
    pub body: String,
}

impl InboundEnvelope {
    /// Successful response with a 200 status
    pub fn ok(request_id: RequestId, body: impl Into<String>) -> Self {
        Self {
            request_id,
            success: true,
            status_code: 200,
            error_message: None,
            failure: None,
            body: body.into(),
        }
    }

    /// Rejected response
    pub fn rejected(request_id: RequestId, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            status_code,
            error_message: Some(message.into()),
            failure: None,
            body: String::new(),
        }
    }

    /// Response for a request the backend could not forward
    pub fn failed(request_id: RequestId, failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            status_code: 0,
            error_message: Some(message.into()),
            failure: Some(failure),
            body: String::new(),
        }
    }

    /// Whether the status code is in the 2xx range (or absent)
    pub fn is_success_status(&self) -> bool {
        self.status_code == 0 || (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_serialization_omits_empty_body() {
        let env = OutboundEnvelope::new(RequestId::new(1), Verb::Get, "/version");
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"request_id":1,"verb":"GET","path":"/version"}"#);
    }

    #[test]
    fn test_inbound_defaults_when_fields_missing() {
        let json = r#"{"request_id":9,"success":true}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.request_id, RequestId::new(9));
        assert_eq!(env.status_code, 0);
        assert!(env.body.is_empty());
        assert!(env.is_success_status());
    }

    #[test]
    fn test_rejected_envelope() {
        let env = InboundEnvelope::rejected(RequestId::new(2), 400, "bad mode");
        assert!(!env.success);
        assert!(!env.is_success_status());
        assert_eq!(env.error_message.as_deref(), Some("bad mode"));
    }

    #[test]
    fn test_failure_kind_wire_name() {
        let env = InboundEnvelope::failed(RequestId::new(3), FailureKind::NotReady, "no pipe");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""failure":"not_ready""#));
    }

    #[test]
    fn test_verb_display() {
        assert_eq!(Verb::Patch.to_string(), "PATCH");
        assert_eq!(Verb::Delete.to_string(), "DELETE");
    }
}
