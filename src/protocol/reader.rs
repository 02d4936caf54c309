//! Buffered reader over a [`Transport`].
//!
//! Uses `bytes::BytesMut` as a contiguous read-ahead buffer. Typed reads
//! first make sure enough bytes are buffered, pulling more from the
//! transport on demand. If the transport stalls (a zero-byte read) before
//! enough bytes arrive, the read fails with
//! [`BridgeError::StreamTerminated`] and the connection must be reset.
//!
//! # Example
//!
//! ```
//! use clrbridge_client::protocol::BufferedReader;
//! use clrbridge_client::transport::MemoryTransport;
//!
//! let transport = MemoryTransport::with_inbound(&[3, 0, 0, 0, b'a', b'b', b'c']);
//! let mut reader = BufferedReader::new(transport);
//! assert_eq!(reader.read_string().unwrap(), "abc");
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::{Header, HEADER_SIZE};
use crate::config::DEFAULT_READ_BUFFER_SIZE;
use crate::error::{BridgeError, Result};
use crate::transport::Transport;

/// Smallest buffer that still holds any fixed-size field.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Upper bound on up-front allocation for a length-prefixed read.
///
/// Counts come from the peer; larger collections grow as elements arrive.
const MAX_PREALLOC: usize = 64 * 1024;

/// Read side of a connection.
pub struct BufferedReader<T> {
    transport: T,
    /// Unread bytes; consumed from the front.
    buffer: BytesMut,
    capacity: usize,
}

impl<T: Transport> BufferedReader<T> {
    /// Create a reader with the default 32KB buffer.
    pub fn new(transport: T) -> Self {
        Self::with_capacity(transport, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Create a reader with a custom buffer size.
    pub fn with_capacity(transport: T, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_BUFFER_SIZE);
        Self {
            transport,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of buffered, unread bytes.
    #[inline]
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Read from the transport until at least `n` bytes are buffered
    /// (capped at the buffer size) or the transport stalls.
    ///
    /// Returns the number of buffered bytes, which may still be short.
    pub fn replenish(&mut self, n: usize) -> Result<usize> {
        let target = n.min(self.capacity);
        if self.buffer.len() >= target {
            return Ok(self.buffer.len());
        }

        // Moves the unread residual to the front when space allows.
        let residual = self.buffer.len();
        self.buffer.reserve(self.capacity - residual);

        while self.buffer.len() < target {
            let start = self.buffer.len();
            self.buffer.resize(self.capacity, 0);
            match self.transport.read(&mut self.buffer[start..]) {
                Ok(read) => {
                    self.buffer.truncate(start + read);
                    if read == 0 {
                        break;
                    }
                    tracing::trace!("Read {} bytes from transport", read);
                }
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e.into());
                }
            }
        }

        Ok(self.buffer.len())
    }

    /// Make sure `n` bytes are buffered, or fail.
    fn ensure(&mut self, n: usize) -> Result<()> {
        if self.buffer.len() < n && self.replenish(n)? < n {
            return Err(BridgeError::StreamTerminated(format!(
                "failed to complete stream read: needed {} bytes, got {}",
                n,
                self.buffer.len()
            )));
        }
        Ok(())
    }

    /// Read a frame header (magic + tag). The magic is not checked here.
    pub fn read_header(&mut self) -> Result<Header> {
        self.ensure(HEADER_SIZE)?;
        let magic = self.buffer.get_u16_le();
        let tag = self.buffer.get_u8();
        Ok(Header { magic, tag })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    /// Read a one-byte boolean; any nonzero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buffer.get_i16_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buffer.get_i32_le())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buffer.get_i64_le())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buffer.get_f64_le())
    }

    /// Read an int32 count prefix. Negative counts are a framing error.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count)
            .map_err(|_| BridgeError::Framing(format!("negative length prefix: {}", count)))
    }

    /// Read an int16 argument count.
    pub fn read_argc(&mut self) -> Result<usize> {
        let argc = self.read_i16()?;
        usize::try_from(argc)
            .map_err(|_| BridgeError::Framing(format!("negative argument count: {}", argc)))
    }

    /// Read exactly `len` raw bytes, streaming through the buffer if needed.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
        let mut remaining = len;

        while remaining > 0 {
            if self.buffer.is_empty() && self.replenish(remaining)? == 0 {
                return Err(BridgeError::StreamTerminated(format!(
                    "failed to complete stream read: {} of {} bytes missing",
                    remaining, len
                )));
            }
            let take = remaining.min(self.buffer.len());
            out.extend_from_slice(&self.buffer[..take]);
            self.buffer.advance(take);
            remaining -= take;
        }

        Ok(out)
    }

    /// Read a length-prefixed string.
    ///
    /// Bytes that are not valid UTF-8 are replaced, never rejected.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_count()?;
        let bytes = self.read_bytes(len)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Read `count` elements with `read_one`, after an int32 count prefix.
    fn read_array<V>(&mut self, mut read_one: impl FnMut(&mut Self) -> Result<V>) -> Result<Vec<V>> {
        let count = self.read_count()?;
        let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            values.push(read_one(self)?);
        }
        Ok(values)
    }

    pub fn read_bool_array(&mut self) -> Result<Vec<bool>> {
        self.read_array(Self::read_bool)
    }

    pub fn read_i32_array(&mut self) -> Result<Vec<i32>> {
        self.read_array(Self::read_i32)
    }

    pub fn read_f64_array(&mut self) -> Result<Vec<f64>> {
        self.read_array(Self::read_f64)
    }

    pub fn read_string_array(&mut self) -> Result<Vec<String>> {
        self.read_array(Self::read_string)
    }

    /// Read `n` float64 values with no count prefix.
    pub fn read_f64_values(&mut self, n: usize) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(n.min(MAX_PREALLOC));
        for _ in 0..n {
            values.push(self.read_f64()?);
        }
        Ok(values)
    }

    /// Close the underlying transport.
    pub fn close(&mut self) {
        self.buffer.clear();
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAGIC;
    use crate::transport::MemoryTransport;

    fn reader_over(bytes: &[u8]) -> BufferedReader<MemoryTransport> {
        BufferedReader::new(MemoryTransport::with_inbound(bytes))
    }

    #[test]
    fn test_read_primitives_little_endian() {
        let mut bytes = Vec::new();
        bytes.push(1u8);
        bytes.extend_from_slice(&(-2i16).to_le_bytes());
        bytes.extend_from_slice(&123_456i32.to_le_bytes());
        bytes.extend_from_slice(&(-9_000_000_000i64).to_le_bytes());
        bytes.extend_from_slice(&2.5f64.to_le_bytes());

        let mut reader = reader_over(&bytes);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_i32().unwrap(), 123_456);
        assert_eq!(reader.read_i64().unwrap(), -9_000_000_000);
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_read_header() {
        let mut reader = reader_over(&[0x0D, 0xD0, 7]);
        let header = reader.read_header().unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.tag, 7);
    }

    #[test]
    fn test_short_read_is_stream_terminated() {
        let mut reader = reader_over(&[1, 2]);
        let err = reader.read_i32().unwrap_err();
        assert!(matches!(err, BridgeError::StreamTerminated(_)));
        assert!(err.to_string().contains("failed to complete stream read"));
    }

    #[test]
    fn test_values_split_across_reads() {
        let transport = MemoryTransport::with_inbound(&0x0102_0304i32.to_le_bytes());
        transport.set_read_chunk(1);
        let mut reader = BufferedReader::new(transport);
        assert_eq!(reader.read_i32().unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_residual_moves_to_front() {
        // Tiny buffer forces compaction between reads.
        let mut bytes = Vec::new();
        for i in 0..10i32 {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        let transport = MemoryTransport::with_inbound(&bytes);
        transport.set_read_chunk(6);
        let mut reader = BufferedReader::with_capacity(transport, MIN_BUFFER_SIZE);

        let values: Vec<i32> = (0..10).map(|_| reader.read_i32().unwrap()).collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_string_larger_than_buffer() {
        let text = "x".repeat(100);
        let mut bytes = (text.len() as i32).to_le_bytes().to_vec();
        bytes.extend_from_slice(text.as_bytes());

        let mut reader = BufferedReader::with_capacity(MemoryTransport::with_inbound(&bytes), 16);
        assert_eq!(reader.read_string().unwrap(), text);
    }

    #[test]
    fn test_empty_string() {
        let mut reader = reader_over(&0i32.to_le_bytes());
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn test_truncated_string() {
        let mut bytes = 10i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let err = reader_over(&bytes).read_string().unwrap_err();
        assert!(matches!(err, BridgeError::StreamTerminated(_)));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = 2i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF, b'a']);
        assert_eq!(reader_over(&bytes).read_string().unwrap(), "\u{FFFD}a");
    }

    #[test]
    fn test_negative_count_is_framing_error() {
        let err = reader_over(&(-1i32).to_le_bytes()).read_i32_array().unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
    }

    #[test]
    fn test_huge_count_does_not_allocate_up_front() {
        let err = reader_over(&i32::MAX.to_le_bytes()).read_f64_array().unwrap_err();
        assert!(matches!(err, BridgeError::StreamTerminated(_)));
    }

    #[test]
    fn test_bool_array_uses_one_byte_per_element() {
        let mut bytes = 3i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 0, 7]);
        assert_eq!(reader_over(&bytes).read_bool_array().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_string_array() {
        let mut bytes = 2i32.to_le_bytes().to_vec();
        for s in ["ab", ""] {
            bytes.extend_from_slice(&(s.len() as i32).to_le_bytes());
            bytes.extend_from_slice(s.as_bytes());
        }
        assert_eq!(
            reader_over(&bytes).read_string_array().unwrap(),
            vec!["ab".to_string(), String::new()]
        );
    }
}
