//! Protocol module - wire format and the read side of the connection.
//!
//! This module implements the framing layer:
//! - 3-byte frame header (magic + tag) encoding/decoding
//! - The closed set of message tags
//! - Buffered, typed reads over a transport

mod reader;
mod wire_format;

pub use reader::{BufferedReader, MIN_BUFFER_SIZE};
pub use wire_format::{Header, Tag, HEADER_SIZE, MAGIC};
