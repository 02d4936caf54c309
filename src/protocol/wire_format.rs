//! Wire format constants and the frame header.
//!
//! Every message on the wire is a frame:
//! ```text
//! ┌──────────┬───────┬──────────────────────┐
//! │ Magic    │ Tag   │ Payload              │
//! │ 2 bytes  │ 1 byte│ kind-specific        │
//! │ int16 LE │       │                      │
//! └──────────┴───────┴──────────────────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. The magic is `0xD00D` and must
//! match on every frame; a mismatch means the stream is out of step and the
//! connection can no longer be trusted.

use crate::error::{BridgeError, Result};

/// Frame header size in bytes (magic + tag).
pub const HEADER_SIZE: usize = 3;

/// Magic number leading every frame.
pub const MAGIC: u16 = 0xD00D;

/// Message kind tags.
///
/// The numbering is wire-stable. Tags 102, 106, 205 and 210 are reserved:
/// peers may define them, this client never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    Bool = 1,
    Byte = 2,
    Int32 = 5,
    Int64 = 6,
    Float64 = 7,
    String = 8,
    Object = 9,

    Vector = 21,
    Matrix = 22,
    Exception = 23,

    BoolArray = 101,
    ByteArray = 102,
    Int32Array = 105,
    Int64Array = 106,
    Float64Array = 107,
    StringArray = 108,
    ObjectArray = 109,

    Create = 201,
    CallStatic = 202,
    CallMethod = 203,
    GetProperty = 204,
    GetIndexedProperty = 205,
    GetIndexed = 206,
    SetProperty = 207,
    GetStaticProperty = 208,
    SetStaticProperty = 209,
    Protect = 210,
    Release = 211,
    TemplateReq = 212,
    TemplateReply = 213,
}

impl Tag {
    /// Every defined tag, in wire order.
    pub const ALL: [Tag; 31] = [
        Tag::Null,
        Tag::Bool,
        Tag::Byte,
        Tag::Int32,
        Tag::Int64,
        Tag::Float64,
        Tag::String,
        Tag::Object,
        Tag::Vector,
        Tag::Matrix,
        Tag::Exception,
        Tag::BoolArray,
        Tag::ByteArray,
        Tag::Int32Array,
        Tag::Int64Array,
        Tag::Float64Array,
        Tag::StringArray,
        Tag::ObjectArray,
        Tag::Create,
        Tag::CallStatic,
        Tag::CallMethod,
        Tag::GetProperty,
        Tag::GetIndexedProperty,
        Tag::GetIndexed,
        Tag::SetProperty,
        Tag::GetStaticProperty,
        Tag::SetStaticProperty,
        Tag::Protect,
        Tag::Release,
        Tag::TemplateReq,
        Tag::TemplateReply,
    ];

    /// Look up a tag by its wire byte.
    ///
    /// # Example
    ///
    /// ```
    /// use clrbridge_client::protocol::Tag;
    ///
    /// assert_eq!(Tag::from_u8(22), Some(Tag::Matrix));
    /// assert_eq!(Tag::from_u8(200), None);
    /// ```
    pub fn from_u8(value: u8) -> Option<Tag> {
        Tag::ALL.iter().copied().find(|tag| *tag as u8 == value)
    }

    /// Wire byte for this tag.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this tag names a client-to-server control request.
    #[inline]
    pub fn is_request(self) -> bool {
        (self as u8) > 200 && self != Tag::TemplateReply
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number as read from the wire.
    pub magic: u16,
    /// Raw tag byte (may be undefined).
    pub tag: u8,
}

impl Header {
    /// Create a header for the given tag.
    pub fn new(tag: Tag) -> Self {
        Self {
            magic: MAGIC,
            tag: tag.as_u8(),
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use clrbridge_client::protocol::{Header, Tag};
    ///
    /// let bytes = Header::new(Tag::String).encode();
    /// assert_eq!(bytes, [0x0D, 0xD0, 8]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let magic = self.magic.to_le_bytes();
        [magic[0], magic[1], self.tag]
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: u16::from_le_bytes([buf[0], buf[1]]),
            tag: buf[2],
        })
    }

    /// Validate the magic number.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(BridgeError::Framing(format!(
                "message magic # is wrong (0x{:04X}), garbled sequence",
                self.magic
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(HEADER_SIZE, 3);
        assert_eq!(Header::new(Tag::Null).encode().len(), HEADER_SIZE);
    }

    #[test]
    fn test_magic_is_little_endian() {
        let bytes = Header::new(Tag::Bool).encode();
        assert_eq!(bytes[0], 0x0D);
        assert_eq!(bytes[1], 0xD0);
        assert_eq!(bytes[2], 1);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(Header::decode(&[0x0D, 0xD0]).is_none());
    }

    #[test]
    fn test_validate_rejects_wrong_magic() {
        let header = Header::decode(&[0xAD, 0xDE, 5]).unwrap();
        let err = header.validate().unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_tag_lookup_is_total() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_u8(tag.as_u8()), Some(tag));
        }

        let defined = Tag::ALL.len();
        let known = (0u8..=255).filter(|b| Tag::from_u8(*b).is_some()).count();
        assert_eq!(defined, known);
    }

    #[test]
    fn test_reserved_tag_values_are_kept() {
        assert_eq!(Tag::ByteArray.as_u8(), 102);
        assert_eq!(Tag::Int64Array.as_u8(), 106);
        assert_eq!(Tag::GetIndexedProperty.as_u8(), 205);
        assert_eq!(Tag::Protect.as_u8(), 210);
    }

    #[test]
    fn test_is_request() {
        assert!(Tag::Create.is_request());
        assert!(Tag::TemplateReq.is_request());
        assert!(!Tag::TemplateReply.is_request());
        assert!(!Tag::ObjectArray.is_request());
        assert!(!Tag::Exception.is_request());
    }
}
