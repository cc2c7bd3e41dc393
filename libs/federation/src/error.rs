//! Management Error Types
//!
//! Failures raised by the gateway, the connector and the models. Failures
//! that cross the wire travel as [`RemoteFailure`] and are rebuilt into the
//! matching variant on the calling member.

use codec::{FailureKind, ProtocolError, RemoteFailure};
use network::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ManagementError {
    /// Bad name, unknown attribute, unknown owner
    #[error("{message}")]
    IllegalArgument { message: String },

    #[error("{message}")]
    IllegalState { message: String },

    /// No compatible member, or an operation the bean does not support
    #[error("{message}")]
    UnsupportedOperation { message: String },

    #[error("Security violation: {message}")]
    Security { message: String },

    #[error("{message}")]
    ReadOnly { message: String },

    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Management service is not running")]
    ServiceStopped,

    /// Failure raised on the member that ran the request
    #[error("Remote failure: {0}")]
    Remote(RemoteFailure),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for management operations
pub type Result<T> = std::result::Result<T, ManagementError>;

impl ManagementError {
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
        }
    }

    pub fn read_only(name: &str) -> Self {
        Self::ReadOnly {
            message: format!("MBean {} is read-only", name),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn instance_not_found(name: &str) -> Self {
        Self::illegal_argument(format!("Cannot find MBean named: {}", name))
    }

    pub fn unknown_attribute(attribute: &str, name: &str) -> Self {
        Self::illegal_argument(format!(
            "Unknown attribute \"{}\" for MBean {}",
            attribute, name
        ))
    }

    /// Form sent back to the requesting member
    pub fn to_remote_failure(&self) -> RemoteFailure {
        let kind = match self {
            ManagementError::IllegalArgument { .. } => FailureKind::IllegalArgument,
            ManagementError::IllegalState { .. } | ManagementError::ServiceStopped => {
                FailureKind::IllegalState
            }
            ManagementError::UnsupportedOperation { .. } => FailureKind::UnsupportedOperation,
            ManagementError::Security { .. } => FailureKind::Security,
            ManagementError::ReadOnly { .. } => FailureKind::ReadOnly,
            ManagementError::Remote(failure) => return failure.clone(),
            ManagementError::Timeout { .. }
            | ManagementError::Transport(_)
            | ManagementError::Protocol(_) => FailureKind::Runtime,
        };
        RemoteFailure::new(kind, self.to_string())
    }

    pub fn category(&self) -> &'static str {
        match self {
            ManagementError::IllegalArgument { .. } => "illegal_argument",
            ManagementError::IllegalState { .. } => "illegal_state",
            ManagementError::UnsupportedOperation { .. } => "unsupported_operation",
            ManagementError::Security { .. } => "security",
            ManagementError::ReadOnly { .. } => "read_only",
            ManagementError::Timeout { .. } => "timeout",
            ManagementError::ServiceStopped => "service_stopped",
            ManagementError::Remote(_) => "remote",
            ManagementError::Transport(_) => "transport",
            ManagementError::Protocol(_) => "protocol",
        }
    }
}

impl From<RemoteFailure> for ManagementError {
    fn from(failure: RemoteFailure) -> Self {
        match failure.kind {
            FailureKind::IllegalArgument => Self::illegal_argument(failure.message),
            FailureKind::IllegalState => Self::illegal_state(failure.message),
            FailureKind::UnsupportedOperation => Self::unsupported(failure.message),
            FailureKind::Security => Self::security(failure.message),
            FailureKind::ReadOnly => Self::ReadOnly {
                message: failure.message,
            },
            FailureKind::Runtime => Self::Remote(failure),
        }
    }
}
