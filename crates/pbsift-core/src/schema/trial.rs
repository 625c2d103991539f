//! Directed and trial decoding against the registry.

use super::{SchemaCandidate, SchemaRegistry};
use crate::error::{Error, Result};
use prost_reflect::{DynamicMessage, SerializeOptions, Value};
use tracing::{trace, warn};

/// What to do when more than one candidate decodes a buffer plausibly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Stop at the first plausible candidate in declaration order
    #[default]
    FirstMatch,
    /// Try every candidate, warn about ambiguity, keep the first
    Warn,
    /// Try every candidate and give up if more than one is plausible
    Reject,
}

/// A decoded message and the tag of the schema that produced it
#[derive(Debug, Clone)]
pub struct DecodeResult {
    /// Tag of the winning schema
    pub tag: String,
    /// The decoded message
    pub value: DynamicMessage,
}

impl DecodeResult {
    /// Converts the message to a JSON value using proto field names.
    ///
    /// Object keys come out sorted, so the rendering is stable across runs.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let options = SerializeOptions::new().use_proto_field_name(true);
        Ok(self
            .value
            .serialize_with_options(serde_json::value::Serializer, &options)?)
    }

    /// Pretty-printed JSON with two-space indentation and a trailing newline
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.to_json()?)?;
        out.push('\n');
        Ok(out)
    }
}

impl SchemaCandidate {
    /// Decodes `buf` as this candidate's message type
    pub fn decode(&self, buf: &[u8]) -> std::result::Result<DynamicMessage, prost::DecodeError> {
        DynamicMessage::decode(self.message.clone(), buf)
    }

    /// True if the body field of `message` is set and not empty
    pub fn is_plausible(&self, message: &DynamicMessage) -> bool {
        if !message.has_field(&self.body_field) {
            return false;
        }

        match &*message.get_field(&self.body_field) {
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Message(inner) => inner.fields().next().is_some(),
            _ => true,
        }
    }

    /// Decode and apply the plausibility check; decode errors are swallowed
    fn try_plausible(&self, buf: &[u8]) -> Option<DecodeResult> {
        let value = match self.decode(buf) {
            Ok(value) => value,
            Err(e) => {
                trace!("Schema '{}' rejected buffer: {}", self.tag, e);
                return None;
            }
        };

        if !self.is_plausible(&value) {
            trace!(
                "Schema '{}' parsed but field '{}' is empty",
                self.tag,
                self.body_field.name()
            );
            return None;
        }

        Some(DecodeResult {
            tag: self.tag.clone(),
            value,
        })
    }
}

impl SchemaRegistry {
    /// Undirected decode: first plausible candidate in declaration order
    pub fn decode_any(&self, buf: &[u8]) -> Option<DecodeResult> {
        self.decode_any_with(buf, AmbiguityPolicy::FirstMatch)
    }

    /// Undirected decode with an explicit ambiguity policy
    pub fn decode_any_with(&self, buf: &[u8], policy: AmbiguityPolicy) -> Option<DecodeResult> {
        if policy == AmbiguityPolicy::FirstMatch {
            return self.candidates.iter().find_map(|c| c.try_plausible(buf));
        }

        let mut plausible = self.candidates.iter().filter_map(|c| c.try_plausible(buf));
        let first = plausible.next()?;
        let others: Vec<String> = plausible.map(|r| r.tag).collect();
        if others.is_empty() {
            return Some(first);
        }

        warn!(
            "Buffer decodes plausibly as '{}' and also as {:?}",
            first.tag, others
        );
        match policy {
            AmbiguityPolicy::Reject => None,
            _ => Some(first),
        }
    }

    /// Directed decode against one tag, no plausibility check and no fallback
    pub fn decode_as(&self, tag: &str, buf: &[u8]) -> Result<DecodeResult> {
        let candidate = self.get(tag).ok_or_else(|| Error::unknown_schema(tag))?;
        let value = candidate.decode(buf).map_err(|source| Error::MessageDecode {
            tag: tag.to_string(),
            source,
        })?;

        Ok(DecodeResult {
            tag: candidate.tag.clone(),
            value,
        })
    }
}
