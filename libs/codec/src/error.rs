//! Protocol-level errors for federation task encoding and decoding
//!
//! Each variant carries enough context to tell a truncated frame from a
//! corrupted one and an old peer from a broken one.

use thiserror::Error;
use types::ProductVersion;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too small for the next field
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Frame magic validation failed
    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x} (indicates: {diagnosis})")]
    InvalidMagic {
        expected: u32,
        actual: u32,
        diagnosis: String,
    },

    /// Frame checksum validation failed
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} (payload: {payload_size} bytes)")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        payload_size: usize,
    },

    /// A length field exceeds a hard limit
    #[error("Payload too large: {size} bytes exceeds limit {limit} (context: {context})")]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        context: String,
    },

    /// Declared element count cannot possibly fit in the remaining input
    #[error("Invalid array length {declared} for {context}: only {available} bytes remain")]
    InvalidArrayLength {
        declared: i64,
        available: usize,
        context: String,
    },

    /// Frame format version is not understood
    #[error("Unsupported frame version {version}: supported versions are {supported_versions}")]
    UnsupportedVersion {
        version: u8,
        supported_versions: String,
    },

    /// Task type code is not recognized
    #[error("Unknown task type {code}")]
    UnknownTask { code: u8 },

    /// Remote action code is not recognized
    #[error("Unknown remote action {code}")]
    UnknownAction { code: u8 },

    /// The target member runs a version that cannot decode this action
    #[error("{feature} not supported by management node (requires {required}, member runs {actual})")]
    UnsupportedAction {
        feature: String,
        required: ProductVersion,
        actual: ProductVersion,
    },

    /// General parsing error with contextual information
    #[error("Parse error at byte {offset}: {description} (context: {context})")]
    ParseError {
        offset: usize,
        description: String,
        context: String,
    },

    /// Nested payload could not be serialized or deserialized
    #[error("Serialization error in {context}: {message}")]
    Serialization { context: String, message: String },
}

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_magic(expected: u32, actual: u32) -> Self {
        let diagnosis = match actual {
            0x0000_0000 => "uninitialized buffer",
            0xFFFF_FFFF => "corrupted buffer or wrong endianness",
            _ if actual.swap_bytes() == expected => "byte order (endianness) mismatch",
            _ => "data corruption or foreign protocol",
        };
        Self::InvalidMagic {
            expected,
            actual,
            diagnosis: diagnosis.to_string(),
        }
    }

    pub fn payload_too_large(size: usize, limit: usize, context: impl Into<String>) -> Self {
        Self::PayloadTooLarge {
            size,
            limit,
            context: context.into(),
        }
    }

    pub fn parse_error(
        offset: usize,
        description: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::ParseError {
            offset,
            description: description.into(),
            context: context.into(),
        }
    }

    pub fn serialization(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Serialization {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
