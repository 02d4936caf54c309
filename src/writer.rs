//! Buffered writer over a [`Transport`].
//!
//! Typed writes append to a fixed-size `BytesMut`. When the next write would
//! overflow the buffer, the buffer is written out first. Callers compose a
//! whole request and then call [`BufferedWriter::flush`] before waiting for
//! the response:
//!
//! ```text
//! encode request ─► flush ─► read response
//! ```
//!
//! A short write is a hard error; nothing is retried at this layer.

use bytes::{BufMut, BytesMut};

use crate::config::DEFAULT_WRITE_BUFFER_SIZE;
use crate::error::{BridgeError, Result};
use crate::protocol::{Header, Tag, HEADER_SIZE, MIN_BUFFER_SIZE};
use crate::transport::Transport;

/// Check that `count` fits an int32 length prefix.
pub fn check_count(count: usize) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| BridgeError::Marshal(format!("length {} exceeds int32 range", count)))
}

/// Check that `argc` fits the int16 argument count.
pub fn check_argc(argc: usize) -> Result<i16> {
    i16::try_from(argc)
        .map_err(|_| BridgeError::Marshal(format!("{} arguments exceed int16 range", argc)))
}

/// Write side of a connection.
pub struct BufferedWriter<T> {
    transport: T,
    buffer: BytesMut,
    capacity: usize,
}

impl<T: Transport> BufferedWriter<T> {
    /// Create a writer with the default 8KB buffer.
    pub fn new(transport: T) -> Self {
        Self::with_capacity(transport, DEFAULT_WRITE_BUFFER_SIZE)
    }

    /// Create a writer with a custom buffer size.
    pub fn with_capacity(transport: T, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_BUFFER_SIZE);
        Self {
            transport,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes buffered but not yet flushed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flush first if `n` more bytes would not fit.
    fn reserve(&mut self, n: usize) -> Result<()> {
        if self.buffer.len() + n > self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the whole buffer to the transport.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let len = self.buffer.len();
        let result = self.transport.write(&self.buffer);
        self.buffer.clear();

        let written = result?;
        if written < len {
            return Err(BridgeError::StreamTerminated(format!(
                "could not complete message: wrote {} of {} bytes",
                written, len
            )));
        }
        tracing::trace!("Flushed {} bytes", len);
        Ok(())
    }

    /// Write a frame header for `tag`.
    pub fn write_header(&mut self, tag: Tag) -> Result<()> {
        self.reserve(HEADER_SIZE)?;
        self.buffer.put_slice(&Header::new(tag).encode());
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?;
        self.buffer.put_u8(value);
        Ok(())
    }

    /// Write a one-byte boolean (0 or 1).
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.reserve(2)?;
        self.buffer.put_i16_le(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.reserve(4)?;
        self.buffer.put_i32_le(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.reserve(8)?;
        self.buffer.put_i64_le(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.reserve(8)?;
        self.buffer.put_f64_le(value);
        Ok(())
    }

    /// Write an int32 count prefix.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        self.write_i32(check_count(count)?)
    }

    /// Write an int16 argument count.
    pub fn write_argc(&mut self, argc: usize) -> Result<()> {
        self.write_i16(check_argc(argc)?)
    }

    /// Write raw bytes, streaming through the buffer if they do not fit.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            if self.buffer.len() == self.capacity {
                self.flush()?;
            }
            let room = self.capacity - self.buffer.len();
            let (now, rest) = bytes.split_at(room.min(bytes.len()));
            self.buffer.put_slice(now);
            bytes = rest;
        }
        Ok(())
    }

    /// Write a length-prefixed string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_count(value.len())?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_bool_array(&mut self, values: &[bool]) -> Result<()> {
        self.write_count(values.len())?;
        values.iter().try_for_each(|v| self.write_bool(*v))
    }

    pub fn write_i32_array(&mut self, values: &[i32]) -> Result<()> {
        self.write_count(values.len())?;
        values.iter().try_for_each(|v| self.write_i32(*v))
    }

    pub fn write_f64_array(&mut self, values: &[f64]) -> Result<()> {
        self.write_count(values.len())?;
        self.write_f64_values(values)
    }

    pub fn write_string_array(&mut self, values: &[String]) -> Result<()> {
        self.write_count(values.len())?;
        values.iter().try_for_each(|v| self.write_string(v))
    }

    /// Write float64 values with no count prefix.
    pub fn write_f64_values(&mut self, values: &[f64]) -> Result<()> {
        values.iter().try_for_each(|v| self.write_f64(*v))
    }

    /// Close the underlying transport, dropping anything unflushed.
    pub fn close(&mut self) {
        self.buffer.clear();
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_nothing_sent_before_flush() {
        let transport = MemoryTransport::new();
        let mut writer = BufferedWriter::new(transport.clone());

        writer.write_i32(7).unwrap();
        assert!(transport.outbound().is_empty());
        assert_eq!(writer.pending(), 4);

        writer.flush().unwrap();
        assert_eq!(transport.outbound(), 7i32.to_le_bytes());
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_header_bytes() {
        let transport = MemoryTransport::new();
        let mut writer = BufferedWriter::new(transport.clone());
        writer.write_header(Tag::Release).unwrap();
        writer.flush().unwrap();
        assert_eq!(transport.outbound(), vec![0x0D, 0xD0, 211]);
    }

    #[test]
    fn test_auto_flush_when_full() {
        let transport = MemoryTransport::new();
        let mut writer = BufferedWriter::with_capacity(transport.clone(), 16);

        for i in 0..4 {
            writer.write_i32(i).unwrap();
        }
        assert!(transport.outbound().is_empty());

        // Fifth int does not fit; the first four go out.
        writer.write_i32(4).unwrap();
        assert_eq!(transport.outbound().len(), 16);
        assert_eq!(writer.pending(), 4);
    }

    #[test]
    fn test_long_string_streams_through() {
        let transport = MemoryTransport::new();
        let mut writer = BufferedWriter::with_capacity(transport.clone(), 16);
        let text = "abcdefghij".repeat(5);

        writer.write_string(&text).unwrap();
        writer.flush().unwrap();

        let out = transport.outbound();
        assert_eq!(&out[..4], &50i32.to_le_bytes());
        assert_eq!(&out[4..], text.as_bytes());
    }

    #[test]
    fn test_short_write_is_error() {
        let transport = MemoryTransport::new();
        transport.set_write_limit(2);
        let mut writer = BufferedWriter::new(transport.clone());

        writer.write_i32(1).unwrap();
        let err = writer.flush().unwrap_err();
        assert!(matches!(err, BridgeError::StreamTerminated(_)));
        assert!(err.to_string().contains("could not complete message"));
    }

    #[test]
    fn test_bool_array_one_byte_each() {
        let transport = MemoryTransport::new();
        let mut writer = BufferedWriter::new(transport.clone());
        writer.write_bool_array(&[true, false]).unwrap();
        writer.flush().unwrap();

        let mut expected = 2i32.to_le_bytes().to_vec();
        expected.extend_from_slice(&[1, 0]);
        assert_eq!(transport.outbound(), expected);
    }

    #[test]
    fn test_argc_range() {
        let mut writer = BufferedWriter::new(MemoryTransport::new());
        assert!(writer.write_argc(3).is_ok());
        let err = writer.write_argc(40_000).unwrap_err();
        assert!(matches!(err, BridgeError::Marshal(_)));
        assert_eq!(writer.pending(), 2);
    }

    #[test]
    fn test_count_checks() {
        assert_eq!(check_argc(i16::MAX as usize).unwrap(), i16::MAX);
        assert!(check_argc(i16::MAX as usize + 1).is_err());
        assert_eq!(check_count(7).unwrap(), 7);
        if usize::BITS > 32 {
            assert!(matches!(check_count(usize::MAX), Err(BridgeError::Marshal(_))));
        }
    }
}
