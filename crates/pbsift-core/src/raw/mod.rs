//! Schema-less dump of protobuf wire data.
//!
//! Renders a buffer the way `protoc --decode_raw` does, which is handy for
//! checking what a schema decode left out. Length-delimited values are
//! shown as text when they are printable UTF-8, as a nested block when
//! they parse completely as a message, and as escaped bytes otherwise.

mod wire;

use crate::batch::{Artifact, FileDecoder};
use crate::error::Result;
use crate::naming::raw_output_file_name;
use std::fmt::Write as FmtWrite;
use std::path::Path;

pub use wire::{
    decode_varint, parse_fields, RawField, RawValue, WireType, MAX_GROUP_DEPTH, MAX_VALID_NUMBER,
};

/// Nested messages deeper than this are printed as bytes
const MAX_NESTING: usize = 64;

const INDENT: &str = "  ";

/// Render `buf` as a raw field listing
pub fn render(buf: &[u8]) -> Result<String> {
    let fields = parse_fields(buf)?;
    let mut out = String::new();
    write_fields(&mut out, &fields, 0);
    Ok(out)
}

fn write_fields(out: &mut String, fields: &[RawField], depth: usize) {
    for field in fields {
        write_field(out, field, depth);
    }
}

fn write_field(out: &mut String, field: &RawField, depth: usize) {
    let indent = INDENT.repeat(depth);
    // Writing to a String cannot fail
    let _ = match &field.value {
        RawValue::Varint(v) => writeln!(out, "{}{}: {}", indent, field.number, v),
        RawValue::Fixed32(v) => writeln!(out, "{}{}: 0x{:08x}", indent, field.number, v),
        RawValue::Fixed64(v) => writeln!(out, "{}{}: 0x{:016x}", indent, field.number, v),
        RawValue::Group(inner) => write_block(out, &indent, field.number, inner, depth),
        RawValue::Len(bytes) => {
            if let Some(text) = printable_text(bytes) {
                writeln!(out, "{}{}: \"{}\"", indent, field.number, escape_text(text))
            } else if let Some(inner) = nested_message(bytes, depth) {
                write_block(out, &indent, field.number, &inner, depth)
            } else {
                writeln!(out, "{}{}: \"{}\"", indent, field.number, escape_bytes(bytes))
            }
        }
    };
}

fn write_block(
    out: &mut String,
    indent: &str,
    number: u32,
    fields: &[RawField],
    depth: usize,
) -> std::fmt::Result {
    writeln!(out, "{}{} {{", indent, number)?;
    write_fields(out, fields, depth + 1);
    writeln!(out, "{}}}", indent)
}

fn nested_message(bytes: &[u8], depth: usize) -> Option<Vec<RawField>> {
    if bytes.is_empty() || depth >= MAX_NESTING {
        return None;
    }
    parse_fields(bytes).ok()
}

fn printable_text(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .then_some(text)
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        match b {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7e => escaped.push(b as char),
            _ => {
                let _ = write!(escaped, "\\{:03o}", b);
            }
        }
    }
    escaped
}

/// [`FileDecoder`] producing `<stem>_Result.txt` raw dumps
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl FileDecoder for RawDecoder {
    fn decode_file(&self, path: &Path, bytes: &[u8]) -> Result<Artifact> {
        Ok(Artifact {
            file_name: raw_output_file_name(path),
            contents: render(bytes)?,
        })
    }
}
