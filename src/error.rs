//! # Error — Engine Error Taxonomy
//!
//! Every failure an account can hit while being processed. The orchestrator
//! converts each of these into that account's `Failure { reason }`; none of
//! them ever aborts sibling accounts.
//!
//! | Variant | Raised by |
//! |---------|-----------|
//! | `SessionUnavailable` | session provider returned nothing usable |
//! | `StatusUnavailable` | status endpoint malformed or missing fields |
//! | `ChallengeUnavailable` | challenge response lacks `challenge`/`difficulty` |
//! | `SubmitFailed` | submit response lacks the reward field |
//! | `TransportException` | network / HTTP-level failure at any step |
//! | `UnparseableResponse` | body is not JSON or not the expected frame |
//! | `TransientFailure` | a harvest draw failed (surfaced, not retried) |
//! | `Cancelled` | external interrupt stopped the account mid-flight |
//! | `InterruptedAfterCodes` | interrupt landed mid-harvest, codes already obtained |

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("session unavailable")]
    SessionUnavailable,
    #[error("status unavailable: {0}")]
    StatusUnavailable(String),
    #[error("challenge unavailable: {0}")]
    ChallengeUnavailable(String),
    #[error("submit failed: {0}")]
    SubmitFailed(String),
    #[error("transport error: {0}")]
    TransportException(String),
    #[error("unparseable response from {endpoint}: {reason}")]
    UnparseableResponse { endpoint: String, reason: String },
    #[error("draw failed: {0}")]
    TransientFailure(String),
    #[error("cancelled")]
    Cancelled,
    #[error("interrupted after obtaining {} code(s): {}", .0.len(), .0.join(","))]
    InterruptedAfterCodes(Vec<String>),
}

impl EngineError {
    /// Lift a transport failure into the taxonomy. Unparseable bodies keep
    /// their own variant so callers can remap them per step.
    pub fn from_transport(endpoint: &str, err: TransportError) -> Self {
        match err {
            TransportError::Request(msg) => EngineError::TransportException(msg),
            TransportError::Unparseable(reason) => EngineError::UnparseableResponse {
                endpoint: endpoint.to_string(),
                reason,
            },
        }
    }
}

impl EngineError {
    /// Raised because the stop flag was set, not because the account failed.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, EngineError::Cancelled | EngineError::InterruptedAfterCodes(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
