//! In-process scripted transport.
//!
//! Inbound bytes are queued up front; everything written is captured.
//! Reading with nothing queued returns 0, which the buffered reader treats
//! as a stalled peer.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Connector, Transport};
use crate::error::{BridgeError, Result};

#[derive(Debug, Default)]
struct State {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    closed: bool,
    close_count: usize,
    /// Remaining bytes the peer will accept; `None` = unlimited.
    write_limit: Option<usize>,
    /// Largest chunk handed out per read; `None` = everything queued.
    read_chunk: Option<usize>,
}

/// Scripted transport sharing its state across clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with `bytes` queued for reading.
    pub fn with_inbound(bytes: &[u8]) -> Self {
        let transport = Self::new();
        transport.push_inbound(bytes);
        transport
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked; the bytes are still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue more bytes for reading.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state().inbound.extend(bytes.iter().copied());
    }

    /// Number of queued bytes not yet read.
    pub fn inbound_len(&self) -> usize {
        self.state().inbound.len()
    }

    /// Copy of everything written so far.
    pub fn outbound(&self) -> Vec<u8> {
        self.state().outbound.clone()
    }

    /// Take everything written so far, leaving the capture empty.
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().outbound)
    }

    /// Accept at most `limit` more bytes, then report short writes.
    pub fn set_write_limit(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    /// Hand out at most `chunk` bytes per read.
    pub fn set_read_chunk(&self, chunk: usize) {
        self.state().read_chunk = Some(chunk.max(1));
    }

    /// Whether `close` has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// How many times `close` was called across all handles.
    pub fn close_count(&self) -> usize {
        self.state().close_count
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Ok(0);
        }
        let mut n = buf.len().min(state.inbound.len());
        if let Some(chunk) = state.read_chunk {
            n = n.min(chunk);
        }
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Ok(0);
        }
        let n = match state.write_limit {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        if let Some(limit) = state.write_limit.as_mut() {
            *limit -= n;
        }
        state.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.closed = true;
        state.close_count += 1;
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }
}

/// Connector handing out a fixed sequence of [`MemoryTransport`]s.
///
/// Each `connect` takes the next transport; when the script runs out,
/// `connect` fails with a connection error.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    script: Mutex<VecDeque<MemoryTransport>>,
    connects: Mutex<usize>,
}

impl MemoryConnector {
    /// Create a connector serving `transports` in order.
    pub fn new(transports: impl IntoIterator<Item = MemoryTransport>) -> Self {
        Self {
            script: Mutex::new(transports.into_iter().collect()),
            connects: Mutex::new(0),
        }
    }

    /// Append a transport to the end of the script.
    pub fn push(&self, transport: MemoryTransport) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(transport);
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        *self.connects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(transport) => {
                *self.connects.lock().unwrap_or_else(|e| e.into_inner()) += 1;
                Ok(Box::new(transport))
            }
            None => Err(BridgeError::Connection(
                "memory connector has no transports left".to_string(),
            )),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
