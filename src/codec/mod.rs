//! Codec module - the message kinds and their wire encodings.
//!
//! - [`Message`] - value kinds the server sends back (and that travel as arguments)
//! - [`Request`] - control kinds the client sends
//! - [`by_tag`] / [`by_value`] - the two factory mappings
//!
//! # Design
//!
//! Kinds are variants of closed enums rather than trait objects, so every
//! dispatch over them is an exhaustive `match` checked by the compiler.
//!
//! # Example
//!
//! ```
//! use clrbridge_client::codec::{by_value, Message};
//! use clrbridge_client::protocol::BufferedReader;
//! use clrbridge_client::transport::MemoryTransport;
//! use clrbridge_client::writer::BufferedWriter;
//! use clrbridge_client::Value;
//!
//! let transport = MemoryTransport::new();
//! let mut writer = BufferedWriter::new(transport.clone());
//! by_value(&Value::from("hello")).unwrap().encode(&mut writer).unwrap();
//! writer.flush().unwrap();
//!
//! let mut reader = BufferedReader::new(MemoryTransport::with_inbound(&transport.outbound()));
//! assert_eq!(Message::decode(&mut reader).unwrap(), Message::String("hello".into()));
//! ```

mod ctrl;
mod data;
mod factory;

pub use ctrl::Request;
pub use data::{Message, ObjectRef, MAX_NESTING_DEPTH};
pub use factory::{by_tag, by_value, by_values};
