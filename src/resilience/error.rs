use std::time::Duration;

use thiserror::Error;

use crate::client::error::AttemptError;

/// Every way a protected call can fail. Callers turn all of them into a fallback value.
#[derive(Error, Debug)]
pub enum CallError {
    /// Rejected without a network attempt because the circuit is open
    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    /// Rejected without a network attempt because the circuit's pool is saturated
    #[error("circuit '{name}' rejected the call: {limit} concurrent requests already running")]
    MaxConcurrency { name: String, limit: usize },

    #[error("call on circuit '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("request failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    #[error("downstream unreachable after {attempts} attempts: {last}")]
    Unreachable {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

/// Coarse classification used for logging and metrics at the fallback boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CircuitOpen,
    MaxConcurrency,
    Timeout,
    ExhaustedRetries,
    Unreachable,
}

impl CallError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CallError::CircuitOpen { .. } => FailureKind::CircuitOpen,
            CallError::MaxConcurrency { .. } => FailureKind::MaxConcurrency,
            CallError::Timeout { .. } => FailureKind::Timeout,
            CallError::ExhaustedRetries { .. } => FailureKind::ExhaustedRetries,
            CallError::Unreachable { .. } => FailureKind::Unreachable,
        }
    }

    /// Build the terminal error for a retry loop that gave up
    pub fn from_attempts(attempts: u32, last: AttemptError) -> Self {
        if last.is_unreachable() {
            CallError::Unreachable { attempts, last }
        } else {
            CallError::ExhaustedRetries { attempts, last }
        }
    }

    /// True when the call never reached the network
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::CircuitOpen | FailureKind::MaxConcurrency
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::MaxConcurrency => "max_concurrency",
            FailureKind::Timeout => "timeout",
            FailureKind::ExhaustedRetries => "exhausted_retries",
            FailureKind::Unreachable => "unreachable",
        };
        f.write_str(label)
    }
}
