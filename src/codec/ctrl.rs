//! Control request kinds (client → server).
//!
//! Each request is a frame whose payload is a few fixed fields followed,
//! for the invoking kinds, by an argument list:
//!
//! ```text
//! Create             string class, argv
//! CallStatic         string class, string method, argv
//! CallMethod         int32 id, string method, argv
//! GetProperty        int32 id, string property
//! SetProperty        int32 id, string property, frame value
//! GetIndexed         int32 id, int32 index
//! GetStaticProperty  string class, string property
//! SetStaticProperty  string class, string property, frame value
//! Release            int32 id
//! TemplateReq        string class
//!
//! argv = int16 argc, argc × frame
//! ```
//!
//! The server answers every request with exactly one frame, except
//! Release, which has no answer.

use super::data::Message;
use crate::error::Result;
use crate::protocol::{BufferedReader, Tag};
use crate::transport::Transport;
use crate::writer::{check_argc, check_count, BufferedWriter};

/// A request frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Create {
        class_name: String,
        args: Vec<Message>,
    },
    CallStatic {
        class_name: String,
        method: String,
        args: Vec<Message>,
    },
    CallMethod {
        object_id: i32,
        method: String,
        args: Vec<Message>,
    },
    GetProperty {
        object_id: i32,
        property: String,
    },
    SetProperty {
        object_id: i32,
        property: String,
        value: Message,
    },
    GetIndexed {
        object_id: i32,
        index: i32,
    },
    GetStaticProperty {
        class_name: String,
        property: String,
    },
    SetStaticProperty {
        class_name: String,
        property: String,
        value: Message,
    },
    Release {
        object_id: i32,
    },
    TemplateReq {
        class_name: String,
    },
}

impl Request {
    /// Wire tag for this request.
    pub fn tag(&self) -> Tag {
        match self {
            Request::Create { .. } => Tag::Create,
            Request::CallStatic { .. } => Tag::CallStatic,
            Request::CallMethod { .. } => Tag::CallMethod,
            Request::GetProperty { .. } => Tag::GetProperty,
            Request::SetProperty { .. } => Tag::SetProperty,
            Request::GetIndexed { .. } => Tag::GetIndexed,
            Request::GetStaticProperty { .. } => Tag::GetStaticProperty,
            Request::SetStaticProperty { .. } => Tag::SetStaticProperty,
            Request::Release { .. } => Tag::Release,
            Request::TemplateReq { .. } => Tag::TemplateReq,
        }
    }

    /// Range-check the names and argument count.
    ///
    /// Values are checked when they are built, so after this `encode` can
    /// only fail on I/O.
    pub fn check(&self) -> Result<()> {
        let (names, argc): (Vec<&str>, Option<usize>) = match self {
            Request::Create { class_name, args } => (vec![class_name.as_str()], Some(args.len())),
            Request::CallStatic {
                class_name,
                method,
                args,
            } => (vec![class_name.as_str(), method.as_str()], Some(args.len())),
            Request::CallMethod { method, args, .. } => (vec![method.as_str()], Some(args.len())),
            Request::GetProperty { property, .. } | Request::SetProperty { property, .. } => {
                (vec![property.as_str()], None)
            }
            Request::GetStaticProperty {
                class_name,
                property,
            }
            | Request::SetStaticProperty {
                class_name,
                property,
                ..
            } => (vec![class_name.as_str(), property.as_str()], None),
            Request::TemplateReq { class_name } => (vec![class_name.as_str()], None),
            Request::GetIndexed { .. } | Request::Release { .. } => (vec![], None),
        };
        names.iter().try_for_each(|name| check_count(name.len()).map(drop))?;
        if let Some(argc) = argc {
            check_argc(argc)?;
        }
        Ok(())
    }

    /// Write the full frame. Does not flush.
    pub fn encode<T: Transport>(&self, w: &mut BufferedWriter<T>) -> Result<()> {
        w.write_header(self.tag())?;
        match self {
            Request::Create { class_name, args } => {
                w.write_string(class_name)?;
                write_args(w, args)
            }
            Request::CallStatic {
                class_name,
                method,
                args,
            } => {
                w.write_string(class_name)?;
                w.write_string(method)?;
                write_args(w, args)
            }
            Request::CallMethod {
                object_id,
                method,
                args,
            } => {
                w.write_i32(*object_id)?;
                w.write_string(method)?;
                write_args(w, args)
            }
            Request::GetProperty {
                object_id,
                property,
            } => {
                w.write_i32(*object_id)?;
                w.write_string(property)
            }
            Request::SetProperty {
                object_id,
                property,
                value,
            } => {
                w.write_i32(*object_id)?;
                w.write_string(property)?;
                value.encode(w)
            }
            Request::GetIndexed { object_id, index } => {
                w.write_i32(*object_id)?;
                w.write_i32(*index)
            }
            Request::GetStaticProperty {
                class_name,
                property,
            } => {
                w.write_string(class_name)?;
                w.write_string(property)
            }
            Request::SetStaticProperty {
                class_name,
                property,
                value,
            } => {
                w.write_string(class_name)?;
                w.write_string(property)?;
                value.encode(w)
            }
            Request::Release { object_id } => w.write_i32(*object_id),
            Request::TemplateReq { class_name } => w.write_string(class_name),
        }
    }

    /// Read a full request frame, as the server side would.
    ///
    /// Returns `Ok(None)` for tags that are not requests this crate models.
    pub fn decode<T: Transport>(r: &mut BufferedReader<T>) -> Result<Option<Request>> {
        let header = r.read_header()?;
        header.validate()?;
        let tag = super::factory::by_tag(header.tag)?;

        Ok(Some(match tag {
            Tag::Create => Request::Create {
                class_name: r.read_string()?,
                args: read_args(r)?,
            },
            Tag::CallStatic => Request::CallStatic {
                class_name: r.read_string()?,
                method: r.read_string()?,
                args: read_args(r)?,
            },
            Tag::CallMethod => Request::CallMethod {
                object_id: r.read_i32()?,
                method: r.read_string()?,
                args: read_args(r)?,
            },
            Tag::GetProperty => Request::GetProperty {
                object_id: r.read_i32()?,
                property: r.read_string()?,
            },
            Tag::SetProperty => Request::SetProperty {
                object_id: r.read_i32()?,
                property: r.read_string()?,
                value: Message::decode(r)?,
            },
            Tag::GetIndexed => Request::GetIndexed {
                object_id: r.read_i32()?,
                index: r.read_i32()?,
            },
            Tag::GetStaticProperty => Request::GetStaticProperty {
                class_name: r.read_string()?,
                property: r.read_string()?,
            },
            Tag::SetStaticProperty => Request::SetStaticProperty {
                class_name: r.read_string()?,
                property: r.read_string()?,
                value: Message::decode(r)?,
            },
            Tag::Release => Request::Release {
                object_id: r.read_i32()?,
            },
            Tag::TemplateReq => Request::TemplateReq {
                class_name: r.read_string()?,
            },
            _ => return Ok(None),
        }))
    }
}

fn write_args<T: Transport>(w: &mut BufferedWriter<T>, args: &[Message]) -> Result<()> {
    w.write_argc(args.len())?;
    args.iter().try_for_each(|arg| arg.encode(w))
}

fn read_args<T: Transport>(r: &mut BufferedReader<T>) -> Result<Vec<Message>> {
    let argc = r.read_argc()?;
    (0..argc).map(|_| Message::decode(r)).collect()
}
