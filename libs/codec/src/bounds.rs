//! Bounds checking for decoding untrusted input
//!
//! Every length read off the wire is checked against what is actually left
//! in the buffer before anything is allocated for it.

use crate::error::{ProtocolError, ProtocolResult};

/// Arrays with fewer elements than this are allocated in one go.
pub const CHUNK_THRESHOLD: usize = 0x7FFFF;

/// Batch size used when reading arrays at or above [`CHUNK_THRESHOLD`].
pub const CHUNK_SIZE: usize = 0x3FFFF;

/// Upper bound for any single string or blob field.
pub const MAX_FIELD_SIZE: usize = 64 * 1024 * 1024;

/// Check if a buffer has enough bytes for a read operation
pub fn check_buffer_bounds(buffer: &[u8], offset: usize, size: usize) -> ProtocolResult<()> {
    if offset.saturating_add(size) > buffer.len() {
        return Err(ProtocolError::message_too_small(
            offset.saturating_add(size),
            buffer.len(),
            "Buffer bounds check",
        ));
    }
    Ok(())
}

/// Check if a size value is within reasonable bounds
pub fn validate_size_bounds(size: usize, max_size: usize, context: &str) -> ProtocolResult<()> {
    if size > max_size {
        return Err(ProtocolError::payload_too_large(size, max_size, context));
    }
    Ok(())
}

/// Validate a declared array length against the input that is left.
///
/// Each element needs at least `min_element_size` bytes, so a count that
/// cannot fit is rejected before any allocation happens.
pub fn validate_load_array(
    declared: i64,
    min_element_size: usize,
    available: usize,
    context: &str,
) -> ProtocolResult<()> {
    if declared <= 0 {
        return Ok(());
    }
    let needed = (declared as u64).saturating_mul(min_element_size.max(1) as u64);
    if needed > available as u64 {
        return Err(ProtocolError::InvalidArrayLength {
            declared,
            available,
            context: context.to_string(),
        });
    }
    Ok(())
}
