//! Blocking TCP transport.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use clrbridge_client::transport::{Connector, TcpConnector};
//!
//! let connector = TcpConnector::new("localhost", 56789)
//!     .retries(4)
//!     .retry_delay(Duration::from_secs(2));
//! let transport = connector.connect()?;
//! ```

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

use super::{Connector, Transport};
use crate::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::error::{BridgeError, Result};

/// TCP connection to a bridge server.
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    /// Connect once, without retrying.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        // Requests are small and always followed by a blocking read.
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let mut written = 0;
        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            // Also unblocks any clone of this stream.
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(Self {
            stream: self.stream.try_clone()?,
            closed: self.closed,
        }))
    }
}

/// Connect with a bounded number of retries.
///
/// Makes `retries + 1` attempts, sleeping `delay` between failed attempts.
pub fn connect_with_retry(
    host: &str,
    port: u16,
    retries: u32,
    delay: Duration,
) -> Result<TcpTransport> {
    let mut last_error = None;

    for attempt in 0..=retries {
        match TcpTransport::connect(host, port) {
            Ok(transport) => {
                tracing::debug!("Connected to {}:{} (attempt {})", host, port, attempt + 1);
                return Ok(transport);
            }
            Err(e) => {
                if attempt < retries {
                    tracing::warn!(
                        "Connect to {}:{} failed ({}), retrying in {:?}",
                        host,
                        port,
                        e,
                        delay
                    );
                    thread::sleep(delay);
                }
                last_error = Some(e);
            }
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    Err(BridgeError::Connection(format!(
        "could not connect to bridge server at {}:{} after {} attempts: {}",
        host,
        port,
        retries + 1,
        cause
    )))
}

/// Connector producing [`TcpTransport`]s for one (host, port).
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    retries: u32,
    retry_delay: Duration,
}

impl TcpConnector {
    /// Create a connector with the default retry policy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the number of retries after the first failed attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        let transport = connect_with_retry(&self.host, self.port, self.retries, self.retry_delay)?;
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connector_defaults() {
        let connector = TcpConnector::default();
        assert_eq!(connector.host(), "localhost");
        assert_eq!(connector.port(), 56789);
        assert_eq!(connector.retries, 4);
        assert_eq!(connector.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(&buf).unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port).unwrap();
        assert_eq!(transport.write(b"ping").unwrap(), 4);

        let mut buf = [0u8; 4];
        let mut got = 0;
        while got < 4 {
            let n = transport.read(&mut buf[got..]).unwrap();
            assert!(n > 0);
            got += n;
        }
        assert_eq!(&buf, b"ping");
        server.join().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::connect("127.0.0.1", port).unwrap();
        transport.close();
        transport.close();

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(transport.write(b"x").unwrap(), 0);
    }

    #[test]
    fn test_retries_exhausted() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = connect_with_retry("127.0.0.1", port, 2, Duration::from_millis(1));
        let err = result.err().unwrap();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
