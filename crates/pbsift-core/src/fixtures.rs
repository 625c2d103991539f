//! Descriptor fixtures shared by unit tests.
//!
//! `im.Request` and `im.Response` share field 1 so either one parses
//! the other's bytes; only the body field tells them apart.

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, Type::Message)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub(crate) fn file_descriptor_set() -> FileDescriptorSet {
    let file = FileDescriptorProto {
        name: Some("im.proto".to_string()),
        package: Some("im".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message(
                "Request",
                vec![
                    field("cmd", 1, Type::Int32),
                    field("token", 2, Type::String),
                    field("body", 8, Type::Bytes),
                ],
            ),
            message(
                "Response",
                vec![
                    field("status_code", 1, Type::Int32),
                    field("body", 6, Type::String),
                    message_field("extra", 7, ".im.Extra"),
                ],
            ),
            message("Extra", vec![field("note", 1, Type::String)]),
        ],
        ..Default::default()
    };

    FileDescriptorSet { file: vec![file] }
}

pub(crate) fn descriptor_set_bytes() -> Vec<u8> {
    file_descriptor_set().encode_to_vec()
}

pub(crate) fn pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(file_descriptor_set()).unwrap()
}

fn encode(name: &str, fields: &[(&str, Value)]) -> Vec<u8> {
    let desc = pool().get_message_by_name(name).unwrap();
    let mut msg = DynamicMessage::new(desc);
    for (field, value) in fields {
        msg.set_field_by_name(field, value.clone());
    }
    msg.encode_to_vec()
}

/// Bytes only `im.Request` accepts as plausible
pub(crate) fn request_bytes() -> Vec<u8> {
    encode(
        "im.Request",
        &[
            ("cmd", Value::I32(100)),
            ("body", Value::Bytes(bytes::Bytes::from_static(b"\x01\x02"))),
        ],
    )
}

/// Bytes only `im.Response` accepts as plausible
pub(crate) fn response_bytes() -> Vec<u8> {
    encode(
        "im.Response",
        &[
            ("status_code", Value::I32(0)),
            ("body", Value::String("hello".to_string())),
        ],
    )
}

/// Bytes that parse under both schemas with both body fields populated
pub(crate) fn ambiguous_bytes() -> Vec<u8> {
    let mut buf = request_bytes();
    buf.extend(response_bytes());
    buf
}

/// Bytes that no schema can parse
pub(crate) fn garbage_bytes() -> Vec<u8> {
    vec![0xff, 0xff, 0xff]
}
