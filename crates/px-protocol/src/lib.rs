//! px-protocol: Envelope types for the proxyctl controller channel
//!
//! This crate defines the request/response envelopes exchanged between the
//! control plane and the backend controller, plus a newline-delimited JSON
//! codec for carrying them over a byte stream.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod request_id;

pub use codec::{EnvelopeCodec, DEFAULT_MAX_FRAME_LENGTH};
pub use envelope::{FailureKind, InboundEnvelope, OutboundEnvelope, Verb};
pub use error::ProtocolError;
pub use request_id::{RequestId, MAX_REQUEST_ID};
