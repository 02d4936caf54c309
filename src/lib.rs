//! # clrbridge-client
//!
//! Client for a .NET object bridge server.
//!
//! The server hosts CLR objects; this crate talks to it over TCP, creating
//! objects, calling methods, reading and writing properties, and releasing
//! handles when their proxies go away.
//!
//! ## Architecture
//!
//! - **Wire** ([`protocol`], [`writer`]): 3-byte frame header (`0xD00D`
//!   magic + tag) and little-endian payloads over buffered streams
//! - **Codec** ([`codec`]): closed set of value and request message kinds
//! - **Client** ([`Api`]): serialized request/response verbs, connection
//!   reset and retry, handle release
//!
//! ## Example
//!
//! ```ignore
//! use clrbridge_client::{Api, Value};
//!
//! let api = Api::from_env()?;
//!
//! let pi = api.get_static("System.Math", "PI")?;
//! let list = api.create("System.Collections.ArrayList", &[])?.into_object()?;
//! api.call(&list, "Add", &[Value::from(pi)])?;
//! assert_eq!(api.get(&list, "Count")?.as_i32(), Some(1));
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod handle;
mod value;

pub use client::{Api, ApiBuilder, ConnectionState, CTOR_CLASS, CTOR_METHOD};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use handle::RemoteObject;
pub use value::{ClassTemplate, Matrix, Value, Vector};
