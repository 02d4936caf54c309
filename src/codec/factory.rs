//! Mapping between tags, native values and message kinds.
//!
//! - [`by_tag`]: incoming tag byte → kind to decode
//! - [`by_value`]: outgoing native value → populated message
//!
//! Both are total over their closed input sets. Anything outside them fails
//! immediately: an unknown tag is a framing error, an unencodable value is a
//! marshal error raised before any byte is written. Length prefixes are
//! range-checked here too, so encoding a built message cannot fail on them.

use super::data::{Message, ObjectRef};
use crate::error::{BridgeError, Result};
use crate::protocol::Tag;
use crate::value::Value;
use crate::writer::check_count;

/// Resolve a received tag byte.
pub fn by_tag(tag: u8) -> Result<Tag> {
    Tag::from_u8(tag)
        .ok_or_else(|| BridgeError::Framing(format!("unknown message type: {}", tag)))
}

/// Build the message that carries `value`.
///
/// # Example
///
/// ```
/// use clrbridge_client::codec::{by_value, Message};
/// use clrbridge_client::Value;
///
/// assert_eq!(by_value(&Value::Int(3)).unwrap(), Message::Int32(3));
/// assert!(by_value(&Value::Complex { re: 1.0, im: 0.0 }).is_err());
/// ```
pub fn by_value(value: &Value) -> Result<Message> {
    Ok(match value {
        Value::Null => Message::Null,
        Value::Bool(v) => Message::Bool(*v),
        Value::Byte(v) => Message::Byte(*v),
        Value::Int(v) => Message::Int32(*v),
        Value::Long(v) => Message::Int64(*v),
        Value::Float(v) => Message::Float64(*v),
        Value::Str(v) => {
            check_count(v.len())?;
            Message::String(v.clone())
        }
        Value::Object(obj) => {
            if let Some(class_name) = obj.class_name() {
                check_count(class_name.len())?;
            }
            Message::Object(ObjectRef {
                id: obj.id(),
                class_name: obj.class_name().map(str::to_string),
            })
        }
        Value::BoolArray(v) => {
            check_count(v.len())?;
            Message::BoolArray(v.clone())
        }
        Value::IntArray(v) => {
            check_count(v.len())?;
            Message::Int32Array(v.clone())
        }
        Value::FloatArray(v) => {
            check_count(v.len())?;
            Message::Float64Array(v.clone())
        }
        Value::StrArray(v) => {
            check_strings(v)?;
            Message::StringArray(v.clone())
        }
        Value::Vector(v) => {
            check_strings(v.names())?;
            check_count(v.len())?;
            Message::Vector(v.clone())
        }
        Value::Matrix(m) => {
            check_strings(m.row_names())?;
            check_strings(m.col_names())?;
            check_count(m.rows())?;
            check_count(m.cols())?;
            Message::Matrix(m.clone())
        }
        Value::List(items) => {
            check_count(items.len())?;
            Message::ObjectArray(items.iter().map(by_value).collect::<Result<Vec<_>>>()?)
        }
        Value::LongArray(_) => return Err(unsupported_array(Tag::Int64Array)),
        Value::Raw(_) | Value::Complex { .. } => {
            return Err(BridgeError::Marshal(format!(
                "cannot handle type: {}",
                value.type_name()
            )))
        }
    })
}

/// Range-check a string list and each of its elements.
pub(crate) fn check_strings(values: &[String]) -> Result<()> {
    check_count(values.len())?;
    values.iter().try_for_each(|s| check_count(s.len()).map(drop))
}

/// Convert every argument, failing on the first unencodable one.
pub fn by_values(values: &[Value]) -> Result<Vec<Message>> {
    values.iter().map(by_value).collect()
}

/// Error for the reserved array kinds this client does not handle.
pub(crate) fn unsupported_array(tag: Tag) -> BridgeError {
    let what = match tag {
        Tag::ByteArray => "byte arrays",
        Tag::Int64Array => "int64 arrays",
        _ => "this array type",
    };
    BridgeError::Marshal(format!("{} are not supported by this client", what))
}

/// Error for a control request arriving from the server.
pub(crate) fn unexpected_request(tag: Tag) -> BridgeError {
    BridgeError::Framing(format!(
        "should never receive request message {:?} ({})",
        tag,
        tag.as_u8()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::RemoteObject;
    use crate::value::{Matrix, Vector};

    #[test]
    fn test_by_tag_unknown() {
        let err = by_tag(200).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert!(err.to_string().contains("unknown message type: 200"));

        assert!(by_tag(3).is_err());
        assert!(by_tag(255).is_err());
    }

    #[test]
    fn test_by_tag_defined() {
        for tag in Tag::ALL {
            assert_eq!(by_tag(tag.as_u8()).unwrap(), tag);
        }
    }

    #[test]
    fn test_scalars_map_to_kinds() {
        assert_eq!(by_value(&Value::Null).unwrap().tag(), Tag::Null);
        assert_eq!(by_value(&Value::Bool(true)).unwrap().tag(), Tag::Bool);
        assert_eq!(by_value(&Value::Int(1)).unwrap().tag(), Tag::Int32);
        assert_eq!(by_value(&Value::Long(1)).unwrap().tag(), Tag::Int64);
        assert_eq!(by_value(&Value::Float(1.0)).unwrap().tag(), Tag::Float64);
        assert_eq!(by_value(&"s".into()).unwrap().tag(), Tag::String);
    }

    #[test]
    fn test_sequences_map_to_kinds() {
        assert_eq!(by_value(&vec![true].into()).unwrap().tag(), Tag::BoolArray);
        assert_eq!(by_value(&vec![1i32].into()).unwrap().tag(), Tag::Int32Array);
        assert_eq!(by_value(&vec![1.0f64].into()).unwrap().tag(), Tag::Vector);
        assert_eq!(by_value(&Value::FloatArray(vec![1.0])).unwrap().tag(), Tag::Float64Array);
        assert_eq!(
            by_value(&vec!["a".to_string()].into()).unwrap().tag(),
            Tag::StringArray
        );
        assert_eq!(
            by_value(&Matrix::new(1, 1, vec![0.0]).unwrap().into()).unwrap().tag(),
            Tag::Matrix
        );
        assert_eq!(by_value(&Vector::default().into()).unwrap().tag(), Tag::Vector);
    }

    #[test]
    fn test_handles_map_to_object_kinds() {
        let obj = RemoteObject::detached(11, Some("Foo".into()));
        assert_eq!(
            by_value(&Value::Object(obj.clone())).unwrap(),
            Message::Object(ObjectRef { id: 11, class_name: Some("Foo".into()) })
        );

        let list = Value::List(vec![Value::Object(obj), Value::Null]);
        let message = by_value(&list).unwrap();
        assert_eq!(message.tag(), Tag::ObjectArray);
    }

    #[test]
    fn test_unencodable_values() {
        for value in [
            Value::Raw(vec![1, 2]),
            Value::Complex { re: 1.0, im: 2.0 },
            Value::LongArray(vec![1]),
            Value::List(vec![Value::Raw(vec![])]),
        ] {
            let err = by_value(&value).unwrap_err();
            assert!(matches!(err, BridgeError::Marshal(_)), "{:?}", value);
        }

        let err = by_value(&Value::Complex { re: 0.0, im: 1.0 }).unwrap_err();
        assert!(err.to_string().contains("cannot handle type: complex"));
    }

    #[test]
    fn test_by_values_keeps_order() {
        let messages = by_values(&[1i32.into(), "x".into(), true.into()]).unwrap();
        assert_eq!(
            messages,
            vec![Message::Int32(1), Message::String("x".into()), Message::Bool(true)]
        );
    }
}
