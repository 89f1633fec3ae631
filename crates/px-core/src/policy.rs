//! Operation classes and the call policy derived from them

use std::fmt;
use std::time::Duration;

use crate::config::{RetryConfig, TimeoutConfig};

/// Latency budget category of an operation
///
/// Fixed per operation in the client catalogue, never chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Cheap reads
    Quick,
    /// Ordinary mutations and larger reads
    Normal,
    /// Calls that trigger a configuration reload on the backend
    Long,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Quick => write!(f, "quick"),
            OperationClass::Normal => write!(f, "normal"),
            OperationClass::Long => write!(f, "long"),
        }
    }
}

/// Timeout tiers plus the bounded retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallPolicy {
    /// Per-class timeouts
    pub timeouts: TimeoutConfig,
    /// Retry budget
    pub retry: RetryConfig,
}

impl CallPolicy {
    /// Build a policy from configuration sections
    pub fn new(timeouts: TimeoutConfig, retry: RetryConfig) -> Self {
        Self { timeouts, retry }
    }

    /// Timeout for one attempt of an operation in `class`
    pub fn tier_timeout(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Quick => self.timeouts.quick,
            OperationClass::Normal => self.timeouts.normal,
            OperationClass::Long => self.timeouts.long,
        }
    }

    /// Total attempts, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts.max(1)
    }

    /// Fixed delay between attempts
    pub fn backoff(&self) -> Duration {
        self.retry.backoff
    }
}
