//! Bridge client and builder.
//!
//! The [`Api`] owns one connection to a bridge server and exposes the
//! request verbs. The lifecycle is:
//! 1. The first verb connects (with retry)
//! 2. Each verb writes its request, flushes, and (except release) reads
//!    exactly one response frame
//! 3. Any I/O or framing fault tears the connection down; query verbs
//!    reconnect immediately, exec verbs leave it closed until the next call
//!
//! ```text
//! Unstarted ──start──► Connected ──fault──► Faulted ──┬─► Connected (restart)
//!                          ▲                          └─► Closed
//!                          └──────────── next verb ───────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use clrbridge_client::{Api, Value};
//!
//! let api = Api::builder().host("localhost").port(56789).build();
//!
//! let sb = api.create("System.Text.StringBuilder", &[])?.into_object()?;
//! api.call(&sb, "Append", &["hello".into()])?;
//! let len = api.get(&sb, "Length")?;
//! assert_eq!(len.as_i32(), Some(5));
//! // `sb` is released on the server when it goes out of scope.
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};
use std::time::Duration;

use crate::codec::{by_value, by_values, Message, ObjectRef, Request};
use crate::config::{
    BridgeConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE, DEFAULT_RETRIES,
    DEFAULT_RETRY_DELAY, DEFAULT_WRITE_BUFFER_SIZE,
};
use crate::error::{BridgeError, Result};
use crate::handle::{ReleaseSink, RemoteObject};
use crate::protocol::BufferedReader;
use crate::transport::{Connector, TcpConnector, Transport};
use crate::value::{ClassTemplate, Value};
use crate::writer::{check_argc, BufferedWriter};

/// Static factory used by [`Api::ctor`].
pub const CTOR_CLASS: &str = "com.pydotnet.common.reflection.Creator";

/// Static method used by [`Api::ctor`].
pub const CTOR_METHOD: &str = "NewByCtor";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connection state of an [`Api`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Unstarted,
    /// Connected and in step with the server.
    Connected,
    /// Tearing down after a fault.
    Faulted,
    /// Closed; the next verb reconnects.
    Closed,
}

/// Builder for an [`Api`].
pub struct ApiBuilder {
    host: String,
    port: u16,
    retries: u32,
    retry_delay: Duration,
    read_buffer_size: usize,
    write_buffer_size: usize,
    connector: Option<Box<dyn Connector>>,
}

impl ApiBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            connector: None,
        }
    }

    /// Take every setting from `config`.
    pub fn config(self, config: &BridgeConfig) -> Self {
        self.host(config.host.clone())
            .port(config.port)
            .retries(config.retries)
            .retry_delay(config.retry_delay())
            .read_buffer_size(config.read_buffer_size)
            .write_buffer_size(config.write_buffer_size)
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set how many times a failed connect is retried.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay between connect attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the write buffer size.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Use a custom connector instead of TCP to host:port.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Build the client. No connection is made until the first verb.
    pub fn build(self) -> Api {
        let connector = self.connector.unwrap_or_else(|| {
            Box::new(
                TcpConnector::new(self.host, self.port)
                    .retries(self.retries)
                    .retry_delay(self.retry_delay),
            )
        });

        let session = Session {
            connector,
            connection: None,
            state: ConnectionState::Unstarted,
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
        };

        Api {
            shared: Arc::new(Shared {
                id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
                session: Mutex::new(session),
                pending: Mutex::new(Vec::new()),
                templates: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for ApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader/writer pair over one transport.
struct Connection {
    reader: BufferedReader<Box<dyn Transport>>,
    writer: BufferedWriter<Box<dyn Transport>>,
}

impl Connection {
    fn open(connector: &dyn Connector, read_size: usize, write_size: usize) -> Result<Self> {
        let transport = connector.connect()?;
        let write_half = transport.try_clone()?;
        Ok(Self {
            reader: BufferedReader::with_capacity(transport, read_size),
            writer: BufferedWriter::with_capacity(write_half, write_size),
        })
    }

    /// Write pending releases and the request as one flush.
    fn send(&mut self, releases: &[i32], request: Option<&Request>) -> Result<()> {
        for &object_id in releases {
            Request::Release { object_id }.encode(&mut self.writer)?;
        }
        if let Some(request) = request {
            request.encode(&mut self.writer)?;
        }
        self.writer.flush()
    }

    fn close(&mut self) {
        self.writer.close();
        self.reader.close();
    }
}

struct Session {
    connector: Box<dyn Connector>,
    connection: Option<Connection>,
    state: ConnectionState,
    read_buffer_size: usize,
    write_buffer_size: usize,
}

impl Session {
    /// Connect if not already connected.
    fn start(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to bridge server at {}", self.connector.describe());
        match Connection::open(
            self.connector.as_ref(),
            self.read_buffer_size,
            self.write_buffer_size,
        ) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                if self.state == ConnectionState::Faulted {
                    self.state = ConnectionState::Closed;
                }
                Err(e)
            }
        }
    }

    /// Drop the connection, then optionally reconnect.
    fn reset(&mut self, restart: bool) -> Result<()> {
        tracing::debug!("Resetting connection (restart: {})", restart);
        self.state = ConnectionState::Faulted;
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }

        if restart {
            self.start()
        } else {
            self.state = ConnectionState::Closed;
            Ok(())
        }
    }

    /// Reset after a fault, keeping the fault as the reported error.
    fn fault(&mut self, restart: bool, tag: &dyn fmt::Debug, error: &BridgeError) {
        tracing::error!("{:?} failed: {}", tag, error);
        if let Err(e) = self.reset(restart) {
            tracing::warn!("Reconnect after fault failed: {}", e);
            self.state = ConnectionState::Closed;
        }
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| BridgeError::Connection("not connected".to_string()))
    }

    /// Send a request and read its single response frame.
    fn query(&mut self, releases: &[i32], request: &Request) -> Result<Message> {
        self.start()?;
        tracing::debug!("Sending {:?} request", request.tag());

        let result = self.connection().and_then(|connection| {
            connection.send(releases, Some(request))?;
            Message::decode(&mut connection.reader)
        });

        if let Err(e) = &result {
            self.fault(true, &request.tag(), e);
        }
        result
    }

    /// Send a request that has no response.
    fn exec(&mut self, releases: &[i32], request: Option<&Request>) -> Result<()> {
        self.start()?;
        if let Some(request) = request {
            tracing::debug!("Sending {:?} request", request.tag());
        }

        let result = self
            .connection()
            .and_then(|connection| connection.send(releases, request));

        if let Err(e) = &result {
            let tag = request.map(Request::tag);
            self.fault(false, &tag, e);
        }
        result
    }

    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.state = ConnectionState::Closed;
    }
}

/// State shared between an [`Api`] and the proxies it issued.
struct Shared {
    id: u64,
    session: Mutex<Session>,
    /// Handles whose release could not be sent at drop time.
    pending: Mutex<Vec<i32>>,
    templates: Mutex<HashMap<String, ClassTemplate>>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        // A panic mid-request leaves the stream in an unknown state; the
        // next fault check resets it.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_pending(&self) -> Vec<i32> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn defer(&self, id: i32) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
    }

    /// Send deferred releases if the session is free and connected.
    fn flush_pending(&self, session: &mut Session) {
        if session.connection.is_none() {
            return;
        }
        let pending = self.take_pending();
        if pending.is_empty() {
            return;
        }
        tracing::debug!("Releasing {} deferred handles", pending.len());
        if let Err(e) = session.exec(&pending, None) {
            tracing::warn!("Could not release handles {:?}: {}", pending, e);
        }
    }
}

impl ReleaseSink for Shared {
    fn release(&self, id: i32) {
        match self.session.try_lock() {
            Ok(mut session) => {
                self.defer(id);
                self.flush_pending(&mut session);
            }
            // Busy (possibly on this very thread): send with the next request.
            Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => self.defer(id),
        }
    }
}

/// Client for a bridge server.
///
/// All verbs are blocking and serialized: one request is in flight at a
/// time, and responses are consumed in request order.
pub struct Api {
    shared: Arc<Shared>,
}

impl Api {
    /// Create a builder.
    pub fn builder() -> ApiBuilder {
        ApiBuilder::new()
    }

    /// Create a client for host:port with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ApiBuilder::new().host(host).port(port).build()
    }

    /// Create a client from a validated configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(ApiBuilder::new().config(config).build())
    }

    /// Create a client from defaults overlaid with `CLRBRIDGE_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&BridgeConfig::from_env()?)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.session().state
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.shared.session().connection.is_some()
    }

    /// Number of releases waiting for the connection to become free.
    pub fn pending_releases(&self) -> usize {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Connect now instead of on the first verb. No-op when connected.
    pub fn start(&self) -> Result<()> {
        self.shared.session().start()
    }

    /// Drop the connection and, if `restart`, reconnect immediately.
    pub fn reset(&self, restart: bool) -> Result<()> {
        self.shared.session().reset(restart)
    }

    /// Send deferred releases, then close the connection.
    pub fn close(&self) {
        let mut session = self.shared.session();
        self.shared.flush_pending(&mut session);
        session.close();
    }

    /// Construct a remote object.
    pub fn create(&self, class_name: &str, args: &[Value]) -> Result<Value> {
        let request = Request::Create {
            class_name: class_name.to_string(),
            args: self.marshal_args(args)?,
        };
        self.query_value(request)
    }

    /// Construct a remote object from a constructor expression.
    pub fn ctor(&self, expression: &str) -> Result<Value> {
        self.call_static(CTOR_CLASS, CTOR_METHOD, &[Value::from(expression)])
    }

    /// Call a static method.
    pub fn call_static(&self, class_name: &str, method: &str, args: &[Value]) -> Result<Value> {
        let request = Request::CallStatic {
            class_name: class_name.to_string(),
            method: method.to_string(),
            args: self.marshal_args(args)?,
        };
        self.query_value(request)
    }

    /// Call a method on a remote object.
    pub fn call(&self, object: &RemoteObject, method: &str, args: &[Value]) -> Result<Value> {
        self.check_owner(object)?;
        let request = Request::CallMethod {
            object_id: object.id(),
            method: method.to_string(),
            args: self.marshal_args(args)?,
        };
        self.query_value(request)
    }

    /// Read a property of a remote object.
    pub fn get(&self, object: &RemoteObject, property: &str) -> Result<Value> {
        self.check_owner(object)?;
        self.query_value(Request::GetProperty {
            object_id: object.id(),
            property: property.to_string(),
        })
    }

    /// Set a property of a remote object.
    ///
    /// The server acknowledges with a null (or an exception), which is
    /// consumed here.
    pub fn set(&self, object: &RemoteObject, property: &str, value: &Value) -> Result<()> {
        self.check_owner(object)?;
        let request = Request::SetProperty {
            object_id: object.id(),
            property: property.to_string(),
            value: self.marshal(value)?,
        };
        self.query_value(request).map(drop)
    }

    /// Read an indexed element of a remote collection.
    pub fn get_indexed(&self, object: &RemoteObject, index: i32) -> Result<Value> {
        self.check_owner(object)?;
        self.query_value(Request::GetIndexed {
            object_id: object.id(),
            index,
        })
    }

    /// Read a static property.
    pub fn get_static(&self, class_name: &str, property: &str) -> Result<Value> {
        self.query_value(Request::GetStaticProperty {
            class_name: class_name.to_string(),
            property: property.to_string(),
        })
    }

    /// Set a static property.
    pub fn set_static(&self, class_name: &str, property: &str, value: &Value) -> Result<()> {
        let request = Request::SetStaticProperty {
            class_name: class_name.to_string(),
            property: property.to_string(),
            value: self.marshal(value)?,
        };
        self.query_value(request).map(drop)
    }

    /// Release a remote object now.
    ///
    /// If other clones of `object` are alive, only this reference is given
    /// up; the release is sent when the last clone goes away.
    pub fn release(&self, object: RemoteObject) -> Result<()> {
        self.check_owner(&object)?;
        let Some(object_id) = object.take_last() else {
            return Ok(());
        };
        let mut session = self.shared.session();
        if let Err(e) = session.start() {
            // Nothing was written; keep the id for the next connection.
            self.shared.defer(object_id);
            return Err(e);
        }
        let pending = self.shared.take_pending();
        session.exec(&pending, Some(&Request::Release { object_id }))
    }

    /// Member listing for a remote class, cached per class name.
    pub fn template(&self, class_name: &str) -> Result<ClassTemplate> {
        if let Some(template) = self.cached_template(class_name) {
            return Ok(template);
        }

        let message = self.query(Request::TemplateReq {
            class_name: class_name.to_string(),
        })?;
        match message {
            Message::TemplateReply(template) => {
                self.shared
                    .templates
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(class_name.to_string(), template.clone());
                Ok(template)
            }
            Message::Exception(text) => Err(BridgeError::Remote(text)),
            other => Err(BridgeError::UnexpectedResponse(format!(
                "expected class template, got {:?}",
                other.tag()
            ))),
        }
    }

    fn cached_template(&self, class_name: &str) -> Option<ClassTemplate> {
        self.shared
            .templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(class_name)
            .cloned()
    }

    fn query(&self, request: Request) -> Result<Message> {
        request.check()?;
        let mut session = self.shared.session();
        // Deferred releases stay queued until there is a connection to carry them.
        session.start()?;
        let pending = self.shared.take_pending();
        session.query(&pending, &request)
    }

    fn query_value(&self, request: Request) -> Result<Value> {
        let message = self.query(request)?;
        let sink: Weak<dyn ReleaseSink> = Arc::downgrade(&self.shared) as Weak<dyn ReleaseSink>;
        let owner = self.shared.id;
        let issue =
            |r: ObjectRef| RemoteObject::new(r.id, r.class_name, owner, Weak::clone(&sink));
        message.into_value(&issue)
    }

    fn marshal(&self, value: &Value) -> Result<Message> {
        self.check_value_owner(value)?;
        by_value(value)
    }

    fn marshal_args(&self, args: &[Value]) -> Result<Vec<Message>> {
        check_argc(args.len())?;
        args.iter().try_for_each(|arg| self.check_value_owner(arg))?;
        by_values(args)
    }

    fn check_owner(&self, object: &RemoteObject) -> Result<()> {
        if object.owner() != self.shared.id {
            return Err(BridgeError::Usage(format!(
                "{} was not issued by this client",
                object
            )));
        }
        Ok(())
    }

    fn check_value_owner(&self, value: &Value) -> Result<()> {
        match value {
            Value::Object(object) => self.check_owner(object),
            Value::List(items) => items.iter().try_for_each(|v| self.check_value_owner(v)),
            _ => Ok(()),
        }
    }
}

impl Drop for Api {
    fn drop(&mut self) {
        self.close();
        let undelivered = self.shared.take_pending();
        if !undelivered.is_empty() {
            tracing::warn!(
                "Dropping client with {} undelivered releases: {:?}",
                undelivered.len(),
                undelivered
            );
        }
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}
