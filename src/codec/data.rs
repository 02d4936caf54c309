//! Value message kinds.
//!
//! [`Message`] is the tagged variant over every kind the server can send
//! back: scalars, arrays, vector, matrix, object handles, exceptions and
//! class templates. Each variant knows how to write itself as a full frame
//! and how to read its payload once the header has been consumed.
//!
//! Payload layouts (all little endian):
//! ```text
//! String      int32 len, len bytes
//! Array<T>    int32 count, count × T
//! Vector      int32 nameCount, names, int32 valueCount, valueCount × f64
//! Matrix      int32 rowNameCount, names, int32 colNameCount, names,
//!             int32 nrow, int32 ncol, nrow*ncol × f64 (column-major)
//! Object      int32 id, u8 hasClassName, [string className]
//! ObjectArray int32 count, count × full frame
//! ```

use super::factory;
use crate::error::{BridgeError, Result};
use crate::handle::RemoteObject;
use crate::protocol::{BufferedReader, Tag};
use crate::transport::Transport;
use crate::value::{ClassTemplate, Matrix, Value, Vector};
use crate::writer::BufferedWriter;

/// Deepest ObjectArray nesting accepted from the peer.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Object handle as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: i32,
    pub class_name: Option<String>,
}

/// A decoded (or to-be-encoded) value frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Null,
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Object(ObjectRef),
    Vector(Vector),
    Matrix(Matrix),
    /// Server-side failure text.
    Exception(String),
    BoolArray(Vec<bool>),
    Int32Array(Vec<i32>),
    Float64Array(Vec<f64>),
    StringArray(Vec<String>),
    ObjectArray(Vec<Message>),
    TemplateReply(ClassTemplate),
}

impl Message {
    /// Wire tag for this kind.
    pub fn tag(&self) -> Tag {
        match self {
            Message::Null => Tag::Null,
            Message::Bool(_) => Tag::Bool,
            Message::Byte(_) => Tag::Byte,
            Message::Int32(_) => Tag::Int32,
            Message::Int64(_) => Tag::Int64,
            Message::Float64(_) => Tag::Float64,
            Message::String(_) => Tag::String,
            Message::Object(_) => Tag::Object,
            Message::Vector(_) => Tag::Vector,
            Message::Matrix(_) => Tag::Matrix,
            Message::Exception(_) => Tag::Exception,
            Message::BoolArray(_) => Tag::BoolArray,
            Message::Int32Array(_) => Tag::Int32Array,
            Message::Float64Array(_) => Tag::Float64Array,
            Message::StringArray(_) => Tag::StringArray,
            Message::ObjectArray(_) => Tag::ObjectArray,
            Message::TemplateReply(_) => Tag::TemplateReply,
        }
    }

    /// Write the full frame: header then payload.
    pub fn encode<T: Transport>(&self, w: &mut BufferedWriter<T>) -> Result<()> {
        w.write_header(self.tag())?;
        self.encode_payload(w)
    }

    fn encode_payload<T: Transport>(&self, w: &mut BufferedWriter<T>) -> Result<()> {
        match self {
            Message::Null => Ok(()),
            Message::Bool(v) => w.write_bool(*v),
            Message::Byte(v) => w.write_u8(*v),
            Message::Int32(v) => w.write_i32(*v),
            Message::Int64(v) => w.write_i64(*v),
            Message::Float64(v) => w.write_f64(*v),
            Message::String(v) | Message::Exception(v) => w.write_string(v),
            Message::Object(obj) => {
                w.write_i32(obj.id)?;
                match &obj.class_name {
                    Some(class) => {
                        w.write_u8(1)?;
                        w.write_string(class)
                    }
                    None => w.write_u8(0),
                }
            }
            Message::Vector(v) => {
                w.write_string_array(v.names())?;
                w.write_f64_array(v.values())
            }
            Message::Matrix(m) => {
                w.write_string_array(m.row_names())?;
                w.write_string_array(m.col_names())?;
                w.write_count(m.rows())?;
                w.write_count(m.cols())?;
                w.write_f64_values(m.data())
            }
            Message::BoolArray(v) => w.write_bool_array(v),
            Message::Int32Array(v) => w.write_i32_array(v),
            Message::Float64Array(v) => w.write_f64_array(v),
            Message::StringArray(v) => w.write_string_array(v),
            Message::ObjectArray(items) => {
                w.write_count(items.len())?;
                items.iter().try_for_each(|item| item.encode(w))
            }
            Message::TemplateReply(t) => {
                w.write_string_array(&t.properties)?;
                w.write_string_array(&t.methods)?;
                w.write_string_array(&t.static_methods)
            }
        }
    }

    /// Read a full frame: header, magic check, tag dispatch, payload.
    pub fn decode<T: Transport>(r: &mut BufferedReader<T>) -> Result<Message> {
        Self::decode_at(r, 0)
    }

    fn decode_at<T: Transport>(r: &mut BufferedReader<T>, depth: usize) -> Result<Message> {
        let header = r.read_header()?;
        header.validate()?;
        let tag = factory::by_tag(header.tag)?;
        let message = Self::decode_payload_at(tag, r, depth)?;
        tracing::trace!("Decoded {:?} frame", tag);
        Ok(message)
    }

    /// Read the payload for `tag`; the header has already been consumed.
    pub fn decode_payload<T: Transport>(tag: Tag, r: &mut BufferedReader<T>) -> Result<Message> {
        Self::decode_payload_at(tag, r, 0)
    }

    fn decode_payload_at<T: Transport>(
        tag: Tag,
        r: &mut BufferedReader<T>,
        depth: usize,
    ) -> Result<Message> {
        Ok(match tag {
            Tag::Null => Message::Null,
            Tag::Bool => Message::Bool(r.read_bool()?),
            Tag::Byte => Message::Byte(r.read_u8()?),
            Tag::Int32 => Message::Int32(r.read_i32()?),
            Tag::Int64 => Message::Int64(r.read_i64()?),
            Tag::Float64 => Message::Float64(r.read_f64()?),
            Tag::String => Message::String(r.read_string()?),
            Tag::Object => {
                let id = r.read_i32()?;
                let class_name = if r.read_bool()? {
                    Some(r.read_string()?)
                } else {
                    None
                };
                Message::Object(ObjectRef { id, class_name })
            }
            Tag::Vector => Message::Vector(decode_vector(r)?),
            Tag::Matrix => Message::Matrix(decode_matrix(r)?),
            Tag::Exception => Message::Exception(r.read_string()?),
            Tag::BoolArray => Message::BoolArray(r.read_bool_array()?),
            Tag::Int32Array => Message::Int32Array(r.read_i32_array()?),
            Tag::Float64Array => Message::Float64Array(r.read_f64_array()?),
            Tag::StringArray => Message::StringArray(r.read_string_array()?),
            Tag::ObjectArray => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(BridgeError::Framing(format!(
                        "object arrays nested deeper than {}",
                        MAX_NESTING_DEPTH
                    )));
                }
                let count = r.read_count()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(Message::decode_at(r, depth + 1)?);
                }
                Message::ObjectArray(items)
            }
            Tag::TemplateReply => Message::TemplateReply(ClassTemplate {
                properties: r.read_string_array()?,
                methods: r.read_string_array()?,
                static_methods: r.read_string_array()?,
            }),
            Tag::ByteArray | Tag::Int64Array => return Err(factory::unsupported_array(tag)),
            Tag::Create
            | Tag::CallStatic
            | Tag::CallMethod
            | Tag::GetProperty
            | Tag::GetIndexedProperty
            | Tag::GetIndexed
            | Tag::SetProperty
            | Tag::GetStaticProperty
            | Tag::SetStaticProperty
            | Tag::Protect
            | Tag::Release
            | Tag::TemplateReq => return Err(factory::unexpected_request(tag)),
        })
    }

    /// Convert to a native value, issuing proxies through `issue`.
    ///
    /// An `Exception` becomes [`BridgeError::Remote`]. Proxies issued before
    /// a failure are dropped, and so released.
    pub(crate) fn into_value(self, issue: &dyn Fn(ObjectRef) -> RemoteObject) -> Result<Value> {
        Ok(match self {
            Message::Null => Value::Null,
            Message::Bool(v) => Value::Bool(v),
            Message::Byte(v) => Value::Byte(v),
            Message::Int32(v) => Value::Int(v),
            Message::Int64(v) => Value::Long(v),
            Message::Float64(v) => Value::Float(v),
            Message::String(v) => Value::Str(v),
            Message::Object(obj) => Value::Object(issue(obj)),
            Message::Vector(v) => Value::Vector(v),
            Message::Matrix(m) => Value::Matrix(m),
            Message::Exception(text) => return Err(BridgeError::Remote(text)),
            Message::BoolArray(v) => Value::BoolArray(v),
            Message::Int32Array(v) => Value::IntArray(v),
            Message::Float64Array(v) => Value::FloatArray(v),
            Message::StringArray(v) => Value::StrArray(v),
            Message::ObjectArray(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| item.into_value(issue))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Message::TemplateReply(_) => {
                return Err(BridgeError::UnexpectedResponse(
                    "class template where a value was expected".to_string(),
                ))
            }
        })
    }
}

fn decode_vector<T: Transport>(r: &mut BufferedReader<T>) -> Result<Vector> {
    let names = r.read_string_array()?;
    let values = r.read_f64_array()?;
    let (name_count, value_count) = (names.len(), values.len());
    Vector::named(names, values).map_err(|_| {
        BridgeError::Framing(format!(
            "vector name count {} does not match value count {}",
            name_count, value_count
        ))
    })
}

fn decode_matrix<T: Transport>(r: &mut BufferedReader<T>) -> Result<Matrix> {
    let row_names = r.read_string_array()?;
    let col_names = r.read_string_array()?;
    let rows = r.read_count()?;
    let cols = r.read_count()?;
    let len = rows
        .checked_mul(cols)
        .ok_or_else(|| BridgeError::Framing(format!("matrix {}x{} is too large", rows, cols)))?;
    let data = r.read_f64_values(len)?;

    Matrix::new(rows, cols, data)
        .and_then(|m| m.with_row_names(row_names))
        .and_then(|m| m.with_col_names(col_names))
        .map_err(|e| BridgeError::Framing(format!("malformed matrix: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn encode(message: &Message) -> Vec<u8> {
        let transport = MemoryTransport::new();
        let mut w = BufferedWriter::new(transport.clone());
        message.encode(&mut w).unwrap();
        w.flush().unwrap();
        transport.outbound()
    }

    fn decode(bytes: &[u8]) -> Result<Message> {
        Message::decode(&mut BufferedReader::new(MemoryTransport::with_inbound(bytes)))
    }

    fn round_trip(message: Message) {
        let bytes = encode(&message);
        assert_eq!(decode(&bytes).unwrap(), message, "bytes: {:?}", bytes);
    }

    #[test]
    fn test_scalar_round_trips() {
        for message in [
            Message::Null,
            Message::Bool(true),
            Message::Bool(false),
            Message::Byte(255),
            Message::Int32(-1),
            Message::Int32(0),
            Message::Int32(i32::MAX),
            Message::Int64(i64::MIN),
            Message::Float64(-0.5),
            Message::Float64(1e300),
            Message::String(String::new()),
            Message::String("héllo".into()),
            Message::Exception("boom".into()),
        ] {
            round_trip(message);
        }
    }

    #[test]
    fn test_array_round_trips() {
        round_trip(Message::BoolArray(vec![]));
        round_trip(Message::BoolArray(vec![true]));
        round_trip(Message::Int32Array(vec![-3, 0, 3]));
        round_trip(Message::Float64Array(vec![2.5]));
        round_trip(Message::StringArray(vec!["".into(), "b".into()]));
        round_trip(Message::ObjectArray(vec![]));
        round_trip(Message::ObjectArray(vec![
            Message::Object(ObjectRef { id: 1, class_name: None }),
            Message::Int32(5),
        ]));
    }

    #[test]
    fn test_vector_and_matrix_round_trips() {
        round_trip(Message::Vector(Vector::new(vec![])));
        round_trip(Message::Vector(
            Vector::named(vec!["a".into(), "b".into()], vec![1.0, -1.0]).unwrap(),
        ));
        round_trip(Message::Matrix(Matrix::new(0, 0, vec![]).unwrap()));
        round_trip(Message::Matrix(
            Matrix::new(1, 2, vec![1.0, 2.0])
                .unwrap()
                .with_row_names(vec!["r".into()])
                .unwrap()
                .with_col_names(vec!["x".into(), "y".into()])
                .unwrap(),
        ));
    }

    #[test]
    fn test_object_with_and_without_class_name() {
        let bytes = encode(&Message::Object(ObjectRef { id: 42, class_name: None }));
        assert_eq!(&bytes[3..], &[42, 0, 0, 0, 0]);

        round_trip(Message::Object(ObjectRef {
            id: 42,
            class_name: Some("System.Text.StringBuilder".into()),
        }));
    }

    #[test]
    fn test_template_reply_round_trip() {
        round_trip(Message::TemplateReply(ClassTemplate {
            properties: vec!["Length".into()],
            methods: vec!["Append".into(), "ToString".into()],
            static_methods: vec![],
        }));
    }

    #[test]
    fn test_vector_count_mismatch_is_framing_error() {
        let mut bytes = vec![0x0D, 0xD0, Tag::Vector.as_u8()];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(b'a');
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        bytes.extend_from_slice(&2.0f64.to_le_bytes());

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert!(err.to_string().contains("name count 1"));
    }

    #[test]
    fn test_matrix_layout_is_column_major() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let bytes = encode(&Message::Matrix(m));

        // header, two empty name lists, nrow, ncol, then values
        let values: Vec<f64> = bytes[3 + 16..]
            .chunks(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_wrong_magic() {
        let err = decode(&[0x00, 0xD0, 0]).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
    }

    #[test]
    fn test_request_tag_is_rejected() {
        let err = decode(&[0x0D, 0xD0, Tag::CallMethod.as_u8()]).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert!(err.to_string().contains("should never receive"));
    }

    #[test]
    fn test_reserved_array_tags_are_unsupported() {
        for tag in [Tag::ByteArray, Tag::Int64Array] {
            let err = decode(&[0x0D, 0xD0, tag.as_u8(), 0, 0, 0, 0]).unwrap_err();
            assert!(matches!(err, BridgeError::Marshal(_)));
            assert!(err.to_string().contains("not supported"));
        }
    }

    #[test]
    fn test_exception_into_value_fails() {
        let issue = |r: ObjectRef| RemoteObject::detached(r.id, r.class_name);
        let err = Message::Exception("boom".into()).into_value(&issue).unwrap_err();
        assert!(matches!(err, BridgeError::Remote(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_object_array_into_value() {
        let issue = |r: ObjectRef| RemoteObject::detached(r.id, r.class_name);
        let message = Message::ObjectArray(vec![
            Message::Object(ObjectRef { id: 3, class_name: None }),
            Message::String("x".into()),
        ]);

        let value = message.into_value(&issue).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::Object(RemoteObject::detached(3, None)),
                Value::Str("x".into()),
            ])
        );
    }

    fn nested_arrays(levels: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..levels {
            bytes.extend_from_slice(&[0x0D, 0xD0, Tag::ObjectArray.as_u8()]);
            bytes.extend_from_slice(&1i32.to_le_bytes());
        }
        bytes.extend_from_slice(&[0x0D, 0xD0, Tag::Null.as_u8()]);
        bytes
    }

    #[test]
    fn test_nesting_depth_limit() {
        let ok = Message::decode(&mut BufferedReader::new(MemoryTransport::with_inbound(
            &nested_arrays(MAX_NESTING_DEPTH),
        )));
        assert!(ok.is_ok());

        let err = Message::decode(&mut BufferedReader::new(MemoryTransport::with_inbound(
            &nested_arrays(MAX_NESTING_DEPTH + 1),
        )))
        .unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));

        // A hostile peer cannot exhaust the stack.
        let err = Message::decode(&mut BufferedReader::new(MemoryTransport::with_inbound(
            &nested_arrays(100_000),
        )))
        .unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }
}
