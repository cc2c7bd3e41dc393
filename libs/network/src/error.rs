//! Transport Error Types
//!
//! Failures of the invocation service: stopped services, departed members,
//! timeouts and name service conflicts.

use types::MemberId;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// The local service is not running
    #[error("Service '{service}' is not running")]
    ServiceStopped { service: String },

    /// The target left the service before replying
    #[error("Member {member} left the service")]
    MemberLeft { member: MemberId },

    /// Request timeout
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Payload could not be handled by the receiving member
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Name service binding conflicts
    #[error("Name service error: {name}: {message}")]
    NameService { name: String, message: String },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn service_stopped(service: impl Into<String>) -> Self {
        Self::ServiceStopped {
            service: service.into(),
        }
    }

    pub fn member_left(member: MemberId) -> Self {
        Self::MemberLeft { member }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn name_service(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NameService {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Worth retrying against another member
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::MemberLeft { .. } | TransportError::Timeout { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            TransportError::ServiceStopped { .. } => "service_stopped",
            TransportError::MemberLeft { .. } => "member_left",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Protocol { .. } => "protocol",
            TransportError::NameService { .. } => "name_service",
        }
    }
}

// Box<dyn Error> is not Clone, so the source is flattened into the message
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::ServiceStopped { service } => Self::service_stopped(service.clone()),
            TransportError::MemberLeft { member } => Self::member_left(*member),
            TransportError::Timeout {
                operation,
                timeout_ms,
            } => Self::timeout(operation.clone(), *timeout_ms),
            TransportError::Protocol { message, source } => match source {
                Some(source) => Self::protocol(format!("{}: {}", message, source)),
                None => Self::protocol(message.clone()),
            },
            TransportError::NameService { name, message } => {
                Self::name_service(name.clone(), message.clone())
            }
        }
    }
}
