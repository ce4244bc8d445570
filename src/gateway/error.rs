//! Transport failures of the suggestion service.

use thiserror::Error;

use super::wire::Operation;

/// Any failure to obtain a usable response from the suggestion service.
///
/// The composer degrades locally on every variant except during `start`,
/// where the error is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, DNS or I/O failure before a response arrived.
    #[error("{operation} request failed: {message}")]
    Network {
        operation: Operation,
        message: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("{operation} request timed out")]
    Timeout { operation: Operation },

    /// The service answered with a non-success status.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// The service answered 2xx but the body did not match the contract.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        operation: Operation,
        message: String,
        body: String,
    },
}

impl TransportError {
    pub(crate) fn from_reqwest(operation: Operation, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout { operation }
        } else {
            TransportError::Network {
                operation,
                message: e.to_string(),
            }
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            TransportError::Network { operation, .. }
            | TransportError::Timeout { operation }
            | TransportError::Status { operation, .. }
            | TransportError::Decode { operation, .. } => *operation,
        }
    }

    /// HTTP status, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } | TransportError::Decode { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }
}
