//! Transport module - byte-stream connections to the bridge server.
//!
//! The rest of the crate only sees the [`Transport`] capability set
//! (read, write, close) and a [`Connector`] that produces transports.
//!
//! - [`TcpConnector`] / [`TcpTransport`] - blocking TCP with connect retry
//! - [`MemoryTransport`] - scripted in-process transport for tests

mod memory;
mod tcp;

use std::io;

use crate::error::Result;

pub use memory::{MemoryConnector, MemoryTransport};
pub use tcp::{connect_with_retry, TcpConnector, TcpTransport};

/// A connected, blocking byte stream.
///
/// A `read` or `write` that moves zero bytes (or fewer than asked, for
/// writes) is treated by the buffered layers as connection loss. Transports
/// do not retry internally.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer stalled or closed.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close the connection. Calling this more than once is harmless.
    fn close(&mut self);

    /// Open a second handle on the same connection.
    ///
    /// The reader and writer each own one handle.
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        (**self).try_clone()
    }
}

/// Produces fresh transports, on first use and after every reset.
pub trait Connector: Send {
    /// Establish a new connection.
    fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String;
}

impl<C: Connector + Sync + ?Sized> Connector for std::sync::Arc<C> {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        (**self).connect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
