//! Primitive field encoding shared by all task types.
//!
//! Integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8. Optional strings use an `i32` length where `-1` means absent.
//! Nested structured payloads (values, filters, notifications) are bincode
//! blobs with a `u32` length prefix, so a payload that fails to deserialize
//! can be skipped without losing the framing of the fields around it.

use crate::bounds::{check_buffer_bounds, validate_load_array, validate_size_bounds, CHUNK_SIZE, CHUNK_THRESHOLD, MAX_FIELD_SIZE};
use crate::error::{ProtocolError, ProtocolResult};
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Append-only field writer
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_utf(&mut self, s: &str) {
        self.buf.put_u32(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }

    pub fn put_opt_utf(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.buf.put_i32(s.len() as i32);
                self.buf.put_slice(s.as_bytes());
            }
            None => self.buf.put_i32(-1),
        }
    }

    pub fn put_blob(&mut self, bytes: &[u8]) {
        self.buf.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    /// Serialize a structured value as a length-prefixed blob
    pub fn put_serialized<T: Serialize>(&mut self, value: &T, context: &str) -> ProtocolResult<()> {
        let bytes =
            bincode::serialize(value).map_err(|e| ProtocolError::serialization(context, e))?;
        self.put_blob(&bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

/// Bounds-checked cursor over an encoded payload
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    fn take(&mut self, size: usize) -> ProtocolResult<&'a [u8]> {
        check_buffer_bounds(self.buf, self.offset, size)?;
        let slice = &self.buf[self.offset..self.offset + size];
        self.offset += size;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::parse_error(
                self.offset - 1,
                format!("invalid boolean byte {}", other),
                "read_bool",
            )),
        }
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> ProtocolResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    fn read_utf_body(&mut self, len: usize, context: &str) -> ProtocolResult<String> {
        validate_size_bounds(len, MAX_FIELD_SIZE, context)?;
        let start = self.offset;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            ProtocolError::parse_error(start, format!("invalid UTF-8: {}", e), context)
        })
    }

    pub fn read_utf(&mut self) -> ProtocolResult<String> {
        let len = self.read_u32()? as usize;
        self.read_utf_body(len, "read_utf")
    }

    pub fn read_opt_utf(&mut self) -> ProtocolResult<Option<String>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        self.read_utf_body(len as usize, "read_opt_utf").map(Some)
    }

    pub fn read_blob(&mut self) -> ProtocolResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        validate_size_bounds(len, MAX_FIELD_SIZE, "read_blob")?;
        self.take(len)
    }

    /// Read a serialized blob whose framing must be intact.
    pub fn read_serialized<T: DeserializeOwned>(&mut self, context: &str) -> ProtocolResult<T> {
        let blob = self.read_blob()?;
        bincode::deserialize(blob).map_err(|e| ProtocolError::serialization(context, e))
    }

    /// Read a serialized blob, deferring content errors to the caller.
    ///
    /// The outer result fails only when the frame itself is broken. The
    /// inner result carries the deserialization failure, if any, so the
    /// remaining fields can still be read.
    pub fn read_deferred<T: DeserializeOwned>(
        &mut self,
        context: &str,
    ) -> ProtocolResult<Result<T, String>> {
        let blob = self.read_blob()?;
        Ok(bincode::deserialize(blob)
            .map_err(|e| format!("Failed to deserialize {}: {}", context, e)))
    }

    /// Read `count` elements, allocating in bounded batches.
    ///
    /// `min_element_size` is the smallest encoding of one element and is
    /// used to reject counts that cannot fit in the remaining input. Arrays
    /// smaller than `threshold` elements are read into a single allocation;
    /// larger ones are read `chunk` elements at a time and merged.
    pub fn read_chunked<T, F>(
        &mut self,
        count: i64,
        min_element_size: usize,
        threshold: usize,
        chunk: usize,
        context: &str,
        mut read_one: F,
    ) -> ProtocolResult<Vec<T>>
    where
        F: FnMut(&mut WireReader<'a>) -> ProtocolResult<T>,
    {
        if count <= 0 {
            return Ok(Vec::new());
        }
        validate_load_array(count, min_element_size, self.remaining(), context)?;

        let count = count as usize;
        if count < threshold {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                out.push(read_one(self)?);
            }
            return Ok(out);
        }

        let chunk = chunk.max(1);
        let mut merged: Vec<T> = Vec::new();
        let mut left = count;
        while left > 0 {
            let batch = left.min(chunk);
            let mut part = Vec::with_capacity(batch);
            for _ in 0..batch {
                part.push(read_one(self)?);
            }
            merged.append(&mut part);
            left -= batch;
        }
        Ok(merged)
    }

    /// Object arrays use thresholds scaled down for larger elements.
    pub fn read_object_array<T, F>(
        &mut self,
        count: i64,
        min_element_size: usize,
        context: &str,
        read_one: F,
    ) -> ProtocolResult<Vec<T>>
    where
        F: FnMut(&mut WireReader<'a>) -> ProtocolResult<T>,
    {
        self.read_chunked(
            count,
            min_element_size,
            CHUNK_THRESHOLD >> 4,
            CHUNK_SIZE >> 4,
            context,
            read_one,
        )
    }

    /// `i64` arrays.
    pub fn read_long_array(&mut self, count: i64, context: &str) -> ProtocolResult<Vec<i64>> {
        self.read_chunked(
            count,
            8,
            CHUNK_THRESHOLD >> 3,
            CHUNK_SIZE >> 3,
            context,
            |r| r.read_i64(),
        )
    }

    pub fn expect_end(&self, context: &str) -> ProtocolResult<()> {
        if self.remaining() != 0 {
            return Err(ProtocolError::parse_error(
                self.offset,
                format!("{} trailing bytes", self.remaining()),
                context,
            ));
        }
        Ok(())
    }
}
