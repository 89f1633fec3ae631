//! px-core: request correlation layer for the proxyctl controller channel
//!
//! The backend controller is reached through a one-way message channel.
//! This crate turns it into awaitable calls:
//!
//! - [`RequestCorrelator`] pairs responses with requests by explicit id
//! - [`RetryingCaller`] adds per-class timeouts and bounded retries
//! - [`ResponseCache`] coalesces and briefly caches hot reads
//! - [`ControllerClient`] exposes the named controller operations
//!
//! Transports live behind the [`Transport`] trait; responses flow through a
//! single inbound listener into the correlator.

pub mod cache;
pub mod caller;
pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod policy;
pub mod readiness;
pub mod transport;

pub use cache::ResponseCache;
pub use caller::{ApiRequest, RetryingCaller};
pub use client::{ControllerClient, Mode};
pub use config::ClientConfig;
pub use correlator::{spawn_inbound_listener, PendingResponse, RequestCorrelator, WaitError};
pub use error::{CallError, PxError, TransportError, TransportErrorKind};
pub use policy::{CallPolicy, OperationClass};
pub use readiness::ReadinessProbe;
pub use transport::{ChannelTransport, StreamTransport, Transport};
